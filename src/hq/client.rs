// src/hq/client.rs
// =============================================================================
// Talking to crawl HQ.
//
// HqClient is the seam the three bridge loops depend on. HttpHqClient is the
// real implementation: JSON over HTTP with reqwest, credentials in headers.
//
// Endpoints (relative to {address}/api/projects/{project}):
// - POST discovered   {"type", "bypassSeencheck", "urls": [{value, via, path}]}
// - GET  feed?size=N  -> {"urls": [{id, value, path}]}
// - POST finished     {"urls": [{id, value}]}
// =============================================================================

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::HqConfig;

/// One URL as crawl HQ sees it. Empty fields are left off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HqUrl {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub via: String,
    /// Hop depth, one marker per hop
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeedBatch {
    #[serde(default)]
    pub urls: Vec<HqUrl>,
}

#[derive(Debug, Error)]
pub enum HqError {
    #[error("request to crawl HQ failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("crawl HQ answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid crawl HQ credentials: {0}")]
    Credentials(#[from] InvalidHeaderValue),
}

#[async_trait]
pub trait HqClient: Send + Sync {
    /// Reports newly discovered URLs.
    async fn discovered(
        &self,
        urls: Vec<HqUrl>,
        url_type: &str,
        bypass_seencheck: bool,
    ) -> Result<(), HqError>;

    /// Asks for up to `size` URLs to crawl.
    async fn feed(&self, size: usize) -> Result<FeedBatch, HqError>;

    /// Marks URLs as done.
    async fn finished(&self, urls: Vec<HqUrl>) -> Result<(), HqError>;
}

#[derive(Debug, Clone)]
pub struct HttpHqClient {
    client: Client,
    base: String,
}

#[derive(Serialize)]
struct DiscoveredPayload<'a> {
    #[serde(rename = "type")]
    url_type: &'a str,
    #[serde(rename = "bypassSeencheck")]
    bypass_seencheck: bool,
    urls: Vec<HqUrl>,
}

#[derive(Serialize)]
struct FinishedPayload {
    urls: Vec<HqUrl>,
}

impl HttpHqClient {
    pub fn new(config: &HqConfig, user_agent: &str) -> Result<Self, HqError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-key", HeaderValue::from_str(&config.key)?);
        headers.insert("x-auth-secret", HeaderValue::from_str(&config.secret)?);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base: format!(
                "{}/api/projects/{}",
                config.address.trim_end_matches('/'),
                config.project
            ),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }
}

// Turns non-2xx answers into errors, keeping the body for the logs
async fn check_status(response: Response) -> Result<Response, HqError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HqError::Status { status, body })
}

#[async_trait]
impl HqClient for HttpHqClient {
    async fn discovered(
        &self,
        urls: Vec<HqUrl>,
        url_type: &str,
        bypass_seencheck: bool,
    ) -> Result<(), HqError> {
        let payload = DiscoveredPayload {
            url_type,
            bypass_seencheck,
            urls,
        };
        let response = self
            .client
            .post(self.endpoint("discovered"))
            .json(&payload)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn feed(&self, size: usize) -> Result<FeedBatch, HqError> {
        let response = self
            .client
            .get(self.endpoint("feed"))
            .query(&[("size", size)])
            .send()
            .await?;
        let response = check_status(response).await?;

        // HQ has nothing for us right now
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(FeedBatch::default());
        }
        Ok(response.json().await?)
    }

    async fn finished(&self, urls: Vec<HqUrl>) -> Result<(), HqError> {
        let response = self
            .client
            .post(self.endpoint("finished"))
            .json(&FinishedPayload { urls })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
