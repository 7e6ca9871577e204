//! Webpage normalization: validate, fetch, decode and convert to Markdown.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use contentplan_markdown::{ConvertOptions, convert_html, decode_html};
use contentplan_shared::{ContentPlanError, ProcessedContent, Result, SourceKind, WebConfig};

use crate::client::{Fetcher, HttpFetcher};
use crate::guard::validate_url;

/// Processor id recorded on every normalized webpage.
pub const HTML_PROCESSOR_ID: &str = "html";

/// Outcome of a sequential batch: successes plus `(url, error)` pairs.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub contents: Vec<ProcessedContent>,
    pub errors: Vec<(String, String)>,
}

/// Turns webpage URLs into [`ProcessedContent`].
pub struct WebNormalizer {
    fetcher: Arc<dyn Fetcher>,
    block_private_hosts: bool,
}

impl WebNormalizer {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &WebConfig) -> Self {
        Self {
            fetcher,
            block_private_hosts: config.block_private_hosts,
        }
    }

    /// Normalizer backed by an [`HttpFetcher`].
    pub fn from_config(config: &WebConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpFetcher::new(config)?), config))
    }

    /// Fetch one URL and normalize it.
    #[instrument(skip(self))]
    pub async fn normalize(&self, raw_url: &str) -> Result<ProcessedContent> {
        let url = validate_url(raw_url, self.block_private_hosts)?;
        let response = self.fetcher.fetch(&url).await?;

        if response.status >= 400 {
            return Err(ContentPlanError::fetch_failed(
                url.as_str(),
                format!("HTTP {}", response.status),
            ));
        }
        if response.body.is_empty() {
            return Err(ContentPlanError::fetch_failed(url.as_str(), "empty response body"));
        }

        let html = decode_html(response.content_type.as_deref(), &response.body);
        let opts = ConvertOptions::new(url.as_str()).with_base_url(url.clone());
        let converted = convert_html(&html, &opts)?;

        let mut metadata = converted.metadata;
        metadata
            .custom_properties
            .insert("source_url".into(), url.to_string());
        metadata
            .custom_properties
            .insert("content_hash".into(), compute_hash(&converted.markdown));

        debug!(
            status = response.status,
            markdown_len = converted.markdown.len(),
            "webpage normalized"
        );

        Ok(ProcessedContent::new(
            SourceKind::Webpage,
            url.as_str(),
            HTML_PROCESSOR_ID,
            converted.markdown,
            metadata,
        ))
    }

    /// Normalize URLs one after another. Failures are logged and skipped.
    #[instrument(skip_all, fields(count = urls.len()))]
    pub async fn normalize_all<S: AsRef<str>>(&self, urls: &[S]) -> BatchResult {
        let mut result = BatchResult::default();

        for raw in urls {
            let raw = raw.as_ref();
            match self.normalize(raw).await {
                Ok(content) => result.contents.push(content),
                Err(e) => {
                    warn!(url = %raw, error = %e, "skipping webpage");
                    result.errors.push((raw.to_string(), e.to_string()));
                }
            }
        }

        info!(
            normalized = result.contents.len(),
            failed = result.errors.len(),
            "webpage batch complete"
        );
        result
    }
}

/// SHA-256 of content, as lowercase hex.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
