//! Resilient access to one upstream: breaker, bounded retry, cache and fallback.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::circuit_breaker::{BreakerState, Permit};
use crate::config::{CacheTtls, RetryPolicy};
use crate::error::{TransportError, UpstreamFailure};
use crate::http_client::Transport;
use crate::upstream::{DataKind, Payload, cache_key, classify_response, synthetic_rows};
use crate::upstream_store::UpstreamStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Network,
    Cache,
    StaleCache,
    Synthetic,
}

/// Result of one [`DataClient::fetch`]. Never an error: failures surface as the origin tag.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub source: String,
    pub origin: Origin,
    pub payload: Payload,
    /// Last classified failure when the data did not come from the network.
    pub failure: Option<UpstreamFailure>,
}

impl Fetched {
    /// Data that came from the upstream at some point, now or earlier.
    pub fn is_real(&self) -> bool {
        !matches!(self.origin, Origin::Synthetic)
    }
}

pub struct DataClient {
    source: String,
    transport: Arc<dyn Transport>,
    store: UpstreamStore,
    retry: RetryPolicy,
    ttls: CacheTtls,
}

impl DataClient {
    pub fn new(
        source: &str,
        transport: Arc<dyn Transport>,
        store: UpstreamStore,
        retry: RetryPolicy,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            source: source.to_string(),
            transport,
            store,
            retry,
            ttls,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn store(&self) -> &UpstreamStore {
        &self.store
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.store.breaker_state()
    }

    pub async fn fetch(&self, kind: DataKind, params: &[(String, String)]) -> Fetched {
        let key = cache_key(kind, params);

        let permit = self.store.try_acquire();
        let max_attempts = match permit {
            Permit::Rejected => {
                debug!(source = %self.source, %kind, "circuit open, skipping network");
                return self.fallback(kind, params, &key, None);
            }
            Permit::Trial => 1,
            Permit::Granted => self.retry.max_attempts.max(1),
        };
        // Dropping this future mid-trial must not leave the breaker waiting forever.
        let mut trial = TrialGuard {
            store: &self.store,
            armed: permit == Permit::Trial,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt(kind, params).await {
                Ok(rows) => {
                    debug!(
                        source = %self.source,
                        %kind,
                        rows = rows.len(),
                        attempt,
                        "upstream ok"
                    );
                    self.store.put(&key, rows.clone(), self.ttls.for_kind(kind));
                    trial.settle();
                    self.store.record_success();
                    return Fetched {
                        source: self.source.clone(),
                        origin: Origin::Network,
                        payload: Payload::decode(kind, &rows),
                        failure: None,
                    };
                }
                Err(failure) if failure.is_policy_limit() => {
                    warn!(source = %self.source, %kind, %failure, "upstream limit, serving fallback");
                    trial.settle();
                    self.store.record_success();
                    return self.fallback(kind, params, &key, Some(failure));
                }
                Err(failure @ UpstreamFailure::Unauthorized(_)) => {
                    error!(source = %self.source, %kind, %failure, "upstream rejected request");
                    trial.settle();
                    self.store.record_failure();
                    return self.fallback(kind, params, &key, Some(failure));
                }
                Err(failure) => {
                    if attempt >= max_attempts {
                        warn!(
                            source = %self.source,
                            %kind,
                            %failure,
                            attempts = attempt,
                            "upstream retries exhausted"
                        );
                        trial.settle();
                        self.store.record_failure();
                        return self.fallback(kind, params, &key, Some(failure));
                    }
                    let delay = jittered(self.retry.backoff(attempt));
                    warn!(
                        source = %self.source,
                        %kind,
                        %failure,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        kind: DataKind,
        params: &[(String, String)],
    ) -> Result<Vec<serde_json::Value>, UpstreamFailure> {
        let call = self.transport.get(kind.path(), params);
        let resp = match tokio::time::timeout(self.retry.request_timeout, call).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(TransportError::Timeout.into()),
        };
        classify_response(resp.status, &resp.body)
    }

    fn fallback(
        &self,
        kind: DataKind,
        params: &[(String, String)],
        key: &str,
        failure: Option<UpstreamFailure>,
    ) -> Fetched {
        let (origin, rows) = if let Some(rows) = self.store.get(key) {
            (Origin::Cache, rows)
        } else if let Some(rows) = self.store.get_stale(key) {
            (Origin::StaleCache, rows)
        } else {
            (Origin::Synthetic, synthetic_rows(kind, params))
        };
        if origin == Origin::Cache {
            debug!(source = %self.source, %kind, "serving cached data");
        } else {
            warn!(source = %self.source, %kind, ?origin, "serving fallback data");
        }
        Fetched {
            source: self.source.clone(),
            origin,
            payload: Payload::decode(kind, &rows),
            failure,
        }
    }
}

/// Hands an unsettled half-open trial back to the breaker when the fetch is dropped.
struct TrialGuard<'a> {
    store: &'a UpstreamStore,
    armed: bool,
}

impl TrialGuard<'_> {
    fn settle(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.release_trial();
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let ms = base.as_millis() as u64;
    if ms == 0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..=ms / 2);
    Duration::from_millis(ms + extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerPolicy;
    use crate::http_client::RawResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        responses: Mutex<Vec<Result<RawResponse, TransportError>>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn get(
            &self,
            _path: &str,
            _params: &[(String, String)],
        ) -> Result<RawResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    fn client(responses: Vec<Result<RawResponse, TransportError>>) -> (DataClient, Arc<Canned>) {
        let transport = Arc::new(Canned {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
        });
        let retry = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
        };
        let client = DataClient::new(
            "test",
            transport.clone(),
            UpstreamStore::new(BreakerPolicy::default()),
            retry,
            CacheTtls::default(),
        );
        (client, transport)
    }

    #[tokio::test]
    async fn transient_then_success_retries() {
        let (client, transport) = client(vec![
            Ok(RawResponse {
                status: 502,
                body: String::new(),
            }),
            Ok(RawResponse {
                status: 200,
                body: r#"{"response":[]}"#.to_string(),
            }),
        ]);
        let got = client.fetch(DataKind::Injuries, &[]).await;
        assert_eq!(got.origin, Origin::Network);
        assert_eq!(*transport.calls.lock().unwrap(), 2);
        assert_eq!(client.store().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_count_one_failure() {
        let (client, transport) = client(vec![Err(TransportError::Timeout)]);
        let got = client.fetch(DataKind::Weather, &[]).await;
        assert_eq!(got.origin, Origin::Synthetic);
        assert_eq!(*transport.calls.lock().unwrap(), 4);
        assert_eq!(client.store().consecutive_failures(), 1);
        assert!(matches!(got.failure, Some(UpstreamFailure::Transient(_))));
    }
}
