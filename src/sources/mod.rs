pub mod dblp;
pub mod mlr;
pub mod neurips;
pub mod openreview;
pub mod usenix;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::Cache;
use crate::ratelimit::RateLimiter;

pub const USER_AGENT: &str = "conf-retriever/0.1 (academic metadata retrieval)";

const FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

/// Normalized paper record, the unit every adapter produces and the
/// pipeline carries through enrichment, deduplication, and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<Author>,
    pub conference: String,
    pub venue: String,
    pub year: u16,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields_of_study: Vec<String>,
    #[serde(default)]
    pub enriched: bool,
    pub source: String,
    pub retrieved_at: DateTime<Utc>,
}

impl Paper {
    pub fn new(
        paper_id: String,
        title: String,
        authors: Vec<Author>,
        conference: &str,
        venue: &str,
        year: u16,
        source: &str,
    ) -> Self {
        Self {
            paper_id,
            title,
            authors,
            conference: conference.to_string(),
            venue: venue.to_string(),
            year,
            abstract_text: None,
            url: None,
            pdf_url: None,
            doi: None,
            arxiv_id: None,
            semantic_scholar_id: None,
            citation_count: None,
            reference_count: None,
            keywords: Vec::new(),
            fields_of_study: Vec::new(),
            enriched: false,
            source: source.to_string(),
            retrieved_at: Utc::now(),
        }
    }

    /// A record must carry a title and a year to be emitted.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && self.year > 0
    }
}

/// Short stable suffix for synthesized paper ids.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..8].to_string()
}

/// Split a comma/semicolon separated author string into author entries.
pub fn split_authors(text: &str) -> Vec<Author> {
    text.replace(';', ",")
        .split(',')
        .map(str::trim)
        .filter(|name| name.len() > 1)
        .map(|name| Author {
            name: name.to_string(),
            affiliation: None,
        })
        .collect()
}

pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base, href)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("interrupted")]
    Interrupted,
}

/// A retrieval strategy for one venue. The pipeline depends only on this
/// capability, never on the concrete adapter.
#[async_trait]
pub trait PaperSource: Send + Sync {
    fn name(&self) -> &str;

    /// List papers for one year. A year the venue has no data for yields
    /// an empty vec, not an error.
    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError>;
}

/// Shared retrieval plumbing: every outbound request goes through the
/// per-host rate limiter and the disk cache, with retry on network
/// failure. One instance per adapter instance, so workers never share
/// limiter state.
pub struct Fetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    cache: Cache,
    shutdown: Arc<AtomicBool>,
}

impl Fetcher {
    pub fn new(requests_per_second: f64, cache: Cache, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap(),
            limiter: RateLimiter::new(requests_per_second),
            cache,
            shutdown,
        }
    }

    /// Fetch a URL as text, consulting the cache first. `key` is the
    /// fingerprint of the logical request, not the URL string.
    pub async fn fetch_text(&self, key: &str, url: &str) -> Result<String, SourceError> {
        self.cache
            .get_or_fetch(key, || self.fetch_with_retry(url))
            .await
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<String, SourceError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_err = None;
        for attempt in 0..FETCH_ATTEMPTS {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(SourceError::Interrupted);
            }
            if attempt > 0 {
                tracing::warn!(url, attempt, "retrying fetch");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            self.limiter.wait().await;
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| SourceError::Api("fetch failed".to_string())))
    }

    async fn try_fetch(&self, url: &str) -> Result<String, SourceError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_validation() {
        let paper = Paper::new(
            "demo_2023_1".into(),
            "A Valid Title".into(),
            vec![],
            "DEMO",
            "Demo Conference",
            2023,
            "demo",
        );
        assert!(paper.is_valid());

        let mut missing_title = paper.clone();
        missing_title.title = "  ".into();
        assert!(!missing_title.is_valid());

        let mut missing_year = paper;
        missing_year.year = 0;
        assert!(!missing_year.is_valid());
    }

    #[test]
    fn test_split_authors() {
        let authors = split_authors("Ada Lovelace, Alan Turing; Grace Hopper");
        let names: Vec<&str> = authors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Ada Lovelace", "Alan Turing", "Grace Hopper"]);
    }

    #[test]
    fn test_short_hash_is_stable() {
        assert_eq!(short_hash("Attention Is All You Need"), short_hash("Attention Is All You Need"));
        assert_eq!(short_hash("x").len(), 8);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://example.org", "/paper/1"),
            "https://example.org/paper/1"
        );
        assert_eq!(
            absolute_url("https://example.org", "https://other.org/p"),
            "https://other.org/p"
        );
    }

    #[test]
    fn test_paper_serialization_skips_empty_fields() {
        let paper = Paper::new(
            "demo_2023_1".into(),
            "Title".into(),
            vec![],
            "DEMO",
            "Demo Conference",
            2023,
            "demo",
        );
        let json = serde_json::to_string(&paper).unwrap();
        assert!(!json.contains("\"doi\""));
        assert!(!json.contains("\"abstract\""));
        assert!(json.contains("\"title\""));
    }
}
