use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;

use crate::config::UpstreamConfig;
use crate::error::TransportError;

const USER_AGENT_VALUE: &str = "sabiscore/0.1";

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(4)
        .build()
        .context("failed to build http client")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// One GET against an upstream. Implementations do no retrying or caching.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, params: &[(String, String)])
    -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    upstream: UpstreamConfig,
}

impl ReqwestTransport {
    pub fn new(client: Client, upstream: UpstreamConfig) -> Self {
        Self { client, upstream }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.upstream.base_url, path);
        let mut req = self
            .client
            .get(&url)
            .query(params)
            .header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(key) = self.upstream.api_key.as_deref() {
            req = req.header(self.upstream.api_key_header.as_str(), key);
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
