//! Webpage fetching and normalization.
//!
//! This crate provides:
//! - [`Fetcher`] / [`HttpFetcher`]: the HTTP GET capability
//! - [`guard`]: URL validation and SSRF protection
//! - [`WebNormalizer`]: URL to [`contentplan_shared::ProcessedContent`], singly or in batches

pub mod client;
pub mod guard;
pub mod normalizer;

pub use client::{FetchResponse, Fetcher, HttpFetcher};
pub use guard::{check_redirect, validate_url};
pub use normalizer::{BatchResult, HTML_PROCESSOR_ID, WebNormalizer};
