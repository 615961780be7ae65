#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sabiscore::config::{BreakerPolicy, CacheTtls, RetryPolicy};
use sabiscore::data_client::DataClient;
use sabiscore::error::TransportError;
use sabiscore::http_client::{RawResponse, Transport};
use sabiscore::upstream_store::UpstreamStore;

pub fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

pub fn ok(body: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status(code: u16) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: code,
        body: String::new(),
    })
}

/// Answers by `path?sorted-query`. Each route plays its script in order and
/// repeats the last answer; unknown routes get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Vec<Result<RawResponse, TransportError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, path: &str, params: &[(&str, &str)], script: Vec<Result<RawResponse, TransportError>>) {
        let owned: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.routes
            .lock()
            .unwrap()
            .insert(route_key(path, &owned), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.split('?').next() == Some(path))
            .count()
    }
}

fn route_key(path: &str, params: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    format!("{path}?{}", pairs.join("&"))
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        let key = route_key(path, params);
        self.calls.lock().unwrap().push(key.clone());
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&key) {
            Some(script) if script.len() > 1 => script.remove(0),
            Some(script) if !script.is_empty() => script[0].clone(),
            _ => status(404),
        }
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        request_timeout: Duration::from_millis(500),
    }
}

pub fn client_with(transport: Arc<ScriptedTransport>, breaker: BreakerPolicy) -> DataClient {
    DataClient::new(
        "api-football",
        transport,
        UpstreamStore::new(breaker),
        fast_retry(),
        CacheTtls::default(),
    )
}

pub fn client(transport: Arc<ScriptedTransport>) -> DataClient {
    client_with(transport, BreakerPolicy::default())
}
