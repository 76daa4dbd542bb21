//! HTTP transport collaborator behind a trait seam so workers are testable
//! without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{FeedError, FeedResult};

/// A fully-formed request against an exchange's public REST surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub url: String,
}

impl RequestTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
pub trait RestTransport: Send + Sync {
    /// Fetch the target and decode the body as JSON. Non-2xx statuses and
    /// timeouts surface as transport failures.
    async fn request(&self, target: &RequestTarget) -> FeedResult<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Every request carries `timeout`; a hung exchange is routed through the
    /// same backoff path as any other transport error.
    pub fn new(timeout: Duration) -> FeedResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RestTransport for HttpTransport {
    async fn request(&self, target: &RequestTarget) -> FeedResult<Value> {
        let response = self.client.get(&target.url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status {
                url: target.url.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}
