use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "sabiscore";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Vec<Value>,
    pub stored_at: u64,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: u64) -> bool {
        now.saturating_sub(self.stored_at) <= self.ttl_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

/// Upstream response rows keyed by request signature.
///
/// Entries past their TTL are hidden from [`ResponseCache::get`] but kept, so
/// [`ResponseCache::get_stale`] can still hand them out when nothing better exists.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Vec<Value>> {
        self.get_at(key, now_secs())
    }

    pub fn get_at(&self, key: &str, now: u64) -> Option<Vec<Value>> {
        let entry = self.entries.get(key)?;
        if !entry.is_fresh_at(now) {
            return None;
        }
        Some(entry.payload.clone())
    }

    pub fn get_stale(&self, key: &str) -> Option<Vec<Value>> {
        self.entries.get(key).map(|entry| entry.payload.clone())
    }

    pub fn put(&mut self, key: &str, payload: Vec<Value>, ttl: Duration) {
        self.put_at(key, payload, ttl, now_secs());
    }

    pub fn put_at(&mut self, key: &str, payload: Vec<Value>, ttl: Duration, now: u64) {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            stored_at: now,
            ttl_secs: ttl.as_secs(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn load_snapshot(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        let file = serde_json::from_str::<CacheFile>(&raw).unwrap_or_default();
        if file.version != CACHE_VERSION {
            return Self::default();
        }
        Self {
            entries: file.entries,
        }
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).ok();
        }
        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.entries.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string(&file).context("serialize upstream cache")?;
        fs::write(&tmp, json).context("write upstream cache")?;
        fs::rename(&tmp, path).context("swap upstream cache")?;
        Ok(())
    }
}

/// Snapshot location for one upstream source, e.g. `~/.cache/sabiscore/api-football.json`.
pub fn snapshot_path(source: &str) -> Option<PathBuf> {
    let file = format!("{}.json", source.replace([':', '/'], "_"));
    app_cache_dir().map(|dir| dir.join(file))
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn now_secs() -> u64 {
    system_time_to_secs(SystemTime::now()).unwrap_or_default()
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_entry_is_served_until_ttl_passes() {
        let mut cache = ResponseCache::new();
        cache.put_at("/odds?fixture=1", vec![json!({"a": 1})], Duration::from_secs(600), 1_000);

        assert!(cache.get_at("/odds?fixture=1", 1_600).is_some());
        assert!(cache.get_at("/odds?fixture=1", 1_601).is_none());
    }

    #[test]
    fn stale_entry_is_retained_for_fallback() {
        let mut cache = ResponseCache::new();
        cache.put_at("k", vec![json!(1)], Duration::from_secs(10), 0);

        assert!(cache.get_at("k", 1_000_000).is_none());
        assert_eq!(cache.get_stale("k"), Some(vec![json!(1)]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_payload_is_a_real_entry() {
        let mut cache = ResponseCache::new();
        cache.put_at("k", Vec::new(), Duration::from_secs(10), 0);
        assert_eq!(cache.get_at("k", 5), Some(Vec::new()));
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("sabiscore-cache-{}", std::process::id()));
        let path = dir.join("snap.json");
        let mut cache = ResponseCache::new();
        cache.put_at("k", vec![json!({"x": 2})], Duration::from_secs(30), 42);
        cache.save_snapshot(&path).unwrap();

        let loaded = ResponseCache::load_snapshot(&path);
        let entry = loaded.entry("k").unwrap();
        assert_eq!(entry.stored_at, 42);
        assert_eq!(entry.ttl_secs, 30);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let cache = ResponseCache::load_snapshot(Path::new("/nonexistent/sabiscore/none.json"));
        assert!(cache.is_empty());
    }
}
