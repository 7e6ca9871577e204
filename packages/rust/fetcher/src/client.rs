//! HTTP fetch capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::{Attempt, Policy};
use tracing::{debug, warn};
use url::Url;

use contentplan_shared::{ContentPlanError, Result, WebConfig};

use crate::guard::{RedirectDecision, check_redirect};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("contentplan/", env!("CARGO_PKG_VERSION"));

/// Raw response of a single GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Anything that can GET a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse>;
}

/// [`Fetcher`] backed by a shared `reqwest` client with connect and total timeouts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &WebConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(config.block_private_hosts))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ContentPlanError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

/// Every redirect hop goes back through the URL guard.
fn redirect_policy(block_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        let decision = check_redirect(attempt.previous().len(), attempt.url(), block_private_hosts);
        match decision {
            RedirectDecision::Follow => attempt.follow(),
            RedirectDecision::TooManyRedirects => attempt.error("too many redirects"),
            RedirectDecision::Refused => {
                let reason = format!("refusing redirect to {}", attempt.url());
                warn!(target_url = %attempt.url(), "redirect refused");
                attempt.error(reason)
            }
        }
    })
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ContentPlanError::fetch_failed(url.as_str(), e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| {
                ContentPlanError::fetch_failed(url.as_str(), format!("body read failed: {e}"))
            })?
            .to_vec();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
