mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use common::{ScriptedTransport, client, client_with, fast_retry, ok, read_fixture, status};
use sabiscore::circuit_breaker::BreakerState;
use sabiscore::config::{BreakerPolicy, CacheTtls, RetryPolicy};
use sabiscore::data_client::{DataClient, Origin};
use sabiscore::error::{TransportError, UpstreamFailure};
use sabiscore::http_cache::ResponseCache;
use sabiscore::http_client::{RawResponse, Transport};
use sabiscore::upstream::{DataKind, cache_key, param};
use sabiscore::upstream_store::UpstreamStore;

#[tokio::test]
async fn success_is_decoded_and_tagged_network() {
    let transport = ScriptedTransport::new();
    transport.route("/fixtures", &[("id", "1001")], vec![ok(&read_fixture("fixture_1001.json"))]);
    let client = client(transport.clone());

    let got = client.fetch(DataKind::Fixture, &[param("id", 1001)]).await;
    assert_eq!(got.origin, Origin::Network);
    assert_eq!(got.source, "api-football");
    assert!(got.failure.is_none());
    let fixture = &got.payload.fixtures()[0];
    assert_eq!(fixture.teams.home.name, "Lions FC");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn rate_limit_is_one_call_and_not_a_failure() {
    let transport = ScriptedTransport::new();
    transport.route("/fixtures", &[("id", "1001")], vec![ok(&read_fixture("rate_limited.json"))]);
    let client = client(transport.clone());

    let got = client.fetch(DataKind::Fixture, &[param("id", 1001)]).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.store().consecutive_failures(), 0);
    assert_eq!(got.origin, Origin::Synthetic);
    assert!(matches!(got.failure, Some(UpstreamFailure::RateLimited(_))));
    // Placeholder still carries the requested id.
    assert_eq!(got.payload.fixtures()[0].fixture.id, 1001);
}

#[tokio::test]
async fn http_429_is_rate_limited() {
    let transport = ScriptedTransport::new();
    transport.route("/odds", &[("fixture", "5")], vec![status(429)]);
    let client = client(transport.clone());

    let got = client.fetch(DataKind::Odds, &[param("fixture", 5)]).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.store().consecutive_failures(), 0);
    assert!(matches!(got.failure, Some(UpstreamFailure::RateLimited(_))));
}

#[tokio::test]
async fn plan_limit_is_handled_like_rate_limit() {
    let transport = ScriptedTransport::new();
    transport.route("/injuries", &[("fixture", "5")], vec![ok(&read_fixture("plan_limited.json"))]);
    let client = client(transport.clone());

    let got = client.fetch(DataKind::Injuries, &[param("fixture", 5)]).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.store().consecutive_failures(), 0);
    assert!(matches!(got.failure, Some(UpstreamFailure::PlanLimited(_))));
}

#[tokio::test]
async fn auth_failure_is_not_retried_but_counts() {
    let transport = ScriptedTransport::new();
    transport.route("/injuries", &[("fixture", "5")], vec![status(401)]);
    transport.route("/injuries", &[("fixture", "6")], vec![ok(&read_fixture("missing_token.json"))]);
    let client = client(transport.clone());

    let got = client.fetch(DataKind::Injuries, &[param("fixture", 5)]).await;
    assert_eq!(transport.calls(), 1);
    assert!(matches!(got.failure, Some(UpstreamFailure::Unauthorized(_))));
    assert_eq!(client.store().consecutive_failures(), 1);

    let got = client.fetch(DataKind::Injuries, &[param("fixture", 6)]).await;
    assert_eq!(transport.calls(), 2);
    assert!(matches!(got.failure, Some(UpstreamFailure::Unauthorized(_))));
    assert_eq!(client.store().consecutive_failures(), 2);
}

#[tokio::test]
async fn empty_response_is_cached_and_served_when_upstream_breaks() {
    let transport = ScriptedTransport::new();
    transport.route(
        "/injuries",
        &[("fixture", "9")],
        vec![ok(&read_fixture("empty.json")), status(503)],
    );
    let client = client(transport.clone());
    let params = [param("fixture", 9)];

    let first = client.fetch(DataKind::Injuries, &params).await;
    assert_eq!(first.origin, Origin::Network);
    assert!(first.payload.is_empty());
    assert_eq!(client.store().consecutive_failures(), 0);
    assert_eq!(client.store().cached_entries(), 1);

    let second = client.fetch(DataKind::Injuries, &params).await;
    assert_eq!(second.origin, Origin::Cache);
    assert!(second.payload.is_empty());
    assert!(second.is_real());
    // one success, then four attempts at the 503
    assert_eq!(transport.calls(), 5);
    assert_eq!(client.store().consecutive_failures(), 1);
}

#[tokio::test]
async fn stale_entry_is_used_before_synthetic() {
    let transport = ScriptedTransport::new();
    transport.route("/injuries", &[("fixture", "3")], vec![status(500)]);
    let params = [param("fixture", 3)];

    let mut cache = ResponseCache::new();
    let rows = vec![serde_json::json!({
        "player": {"name": "Old News", "reason": "Fracture"},
        "team": {"id": 1}
    })];
    cache.put_at(
        &cache_key(DataKind::Injuries, &params),
        rows,
        Duration::from_secs(60),
        0,
    );
    let client = DataClient::new(
        "api-football",
        transport.clone(),
        UpstreamStore::with_cache(BreakerPolicy::default(), cache),
        fast_retry(),
        CacheTtls::default(),
    );

    let got = client.fetch(DataKind::Injuries, &params).await;
    assert_eq!(got.origin, Origin::StaleCache);
    assert_eq!(got.payload.injuries()[0].player.name, "Old News");
    assert!(matches!(got.failure, Some(UpstreamFailure::Transient(_))));
}

#[tokio::test]
async fn five_exhausted_fetches_open_the_circuit() {
    let transport = ScriptedTransport::new();
    transport.route("/weather", &[("fixture", "1")], vec![status(503)]);
    let client = client(transport.clone());
    let params = [param("fixture", 1)];

    for i in 1..=5 {
        let got = client.fetch(DataKind::Weather, &params).await;
        assert_eq!(got.origin, Origin::Synthetic);
        assert_eq!(transport.calls(), i * 4);
    }
    assert_eq!(client.breaker_state(), BreakerState::Open);

    let got = client.fetch(DataKind::Weather, &params).await;
    assert_eq!(transport.calls(), 20, "open circuit must not touch the network");
    assert_eq!(got.origin, Origin::Synthetic);
    assert!(got.failure.is_none());
}

#[tokio::test]
async fn half_open_allows_a_single_attempt() {
    let transport = ScriptedTransport::new();
    transport.route("/odds", &[("fixture", "2")], vec![status(502)]);
    let client = client_with(
        transport.clone(),
        BreakerPolicy {
            failure_threshold: 1,
            cooldown: Duration::from_millis(40),
        },
    );
    let params = [param("fixture", 2)];

    client.fetch(DataKind::Odds, &params).await;
    assert_eq!(client.breaker_state(), BreakerState::Open);
    assert_eq!(transport.calls(), 4);

    client.fetch(DataKind::Odds, &params).await;
    assert_eq!(transport.calls(), 4);

    tokio::time::sleep(Duration::from_millis(60)).await;
    client.fetch(DataKind::Odds, &params).await;
    assert_eq!(transport.calls(), 5, "trial call is made without retries");
    assert_eq!(client.breaker_state(), BreakerState::Open);

    transport.route("/odds", &[("fixture", "2")], vec![ok(&read_fixture("odds.json"))]);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let got = client.fetch(DataKind::Odds, &params).await;
    assert_eq!(got.origin, Origin::Network);
    assert_eq!(client.breaker_state(), BreakerState::Closed);
    assert_eq!(client.store().consecutive_failures(), 0);
}

struct Stalled;

#[async_trait]
impl Transport for Stalled {
    async fn get(
        &self,
        _path: &str,
        _params: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Err(TransportError::Other("unreachable".to_string()))
    }
}

#[tokio::test]
async fn slow_upstream_times_out_per_call() {
    let client = DataClient::new(
        "api-football",
        Arc::new(Stalled),
        UpstreamStore::new(BreakerPolicy::default()),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_millis(20),
        },
        CacheTtls::default(),
    );
    let started = std::time::Instant::now();
    let got = client.fetch(DataKind::Weather, &[param("fixture", 1)]).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(got.origin, Origin::Synthetic);
    assert_eq!(
        got.failure,
        Some(UpstreamFailure::Transient("request timed out".to_string()))
    );
    assert_eq!(client.store().consecutive_failures(), 1);
}

/// Stalls while `stalled` is set, otherwise answers with the recorded odds.
struct Flaky {
    stalled: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for Flaky {
    async fn get(
        &self,
        _path: &str,
        _params: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        ok(&read_fixture("odds.json"))
    }
}

#[tokio::test]
async fn cancelled_trial_does_not_wedge_the_circuit() {
    let transport = Arc::new(Flaky {
        stalled: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });
    let client = DataClient::new(
        "api-football",
        transport.clone(),
        UpstreamStore::new(BreakerPolicy {
            failure_threshold: 1,
            cooldown: Duration::from_millis(20),
        }),
        fast_retry(),
        CacheTtls::default(),
    );
    let params = [param("fixture", 8)];

    client.store().record_failure();
    assert_eq!(client.breaker_state(), BreakerState::Open);
    tokio::time::sleep(Duration::from_millis(30)).await;

    transport.stalled.store(true, Ordering::SeqCst);
    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), client.fetch(DataKind::Odds, &params)).await;
    assert!(cancelled.is_err());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    transport.stalled.store(false, Ordering::SeqCst);
    let got = client.fetch(DataKind::Odds, &params).await;
    assert_eq!(got.origin, Origin::Network);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.breaker_state(), BreakerState::Closed);
}
