pub mod betting;
pub mod calibration;
pub mod circuit_breaker;
pub mod config;
pub mod data_client;
pub mod error;
pub mod expected_goals;
pub mod factors;
pub mod feature_extractor;
pub mod features;
pub mod form;
pub mod head_to_head;
pub mod http_cache;
pub mod http_client;
pub mod injuries;
pub mod market;
pub mod normalize;
pub mod poisson;
pub mod prediction;
pub mod scorer;
pub mod upstream;
pub mod upstream_store;
pub mod venue;
pub mod weather;
