use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{fingerprint, Cache};
use crate::ratelimit::RateLimiter;
use crate::similarity;
use crate::sources::{Paper, USER_AGENT};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str =
    "paperId,title,abstract,authors,year,citationCount,referenceCount,externalIds,url,venue,fieldsOfStudy";
const SEARCH_CANDIDATES: usize = 5;
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Request pacing tiers: a credential buys the faster pool.
const KEYED_RATE: f64 = 5.0;
const ANON_RATE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited after {0} attempts")]
    RateLimited(u32),
    #[error("interrupted")]
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S2Paper {
    #[serde(default)]
    paper_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    citation_count: Option<u32>,
    #[serde(default)]
    reference_count: Option<u32>,
    #[serde(default)]
    external_ids: Option<S2ExternalIds>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI", default)]
    doi: Option<String>,
    #[serde(rename = "ArXiv", default)]
    arxiv: Option<String>,
}

#[derive(Deserialize)]
struct S2SearchResponse {
    #[serde(default)]
    data: Option<Vec<S2Paper>>,
}

/// Supplements records with abstracts, citation counts, and identifiers
/// from the Semantic Scholar API. A record that cannot be matched is left
/// unchanged apart from its `enriched` flag; no lookup outcome is fatal.
pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_key: Option<String>,
    limiter: RateLimiter,
    cache: Cache,
    shutdown: Arc<AtomicBool>,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>, cache: Cache, shutdown: Arc<AtomicBool>) -> Self {
        let rate = if api_key.is_some() { KEYED_RATE } else { ANON_RATE };
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap(),
            api_key,
            limiter: RateLimiter::new(rate),
            cache,
            shutdown,
        }
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    /// Enrich every record in place, sequentially. `threshold` is the
    /// title-similarity bar for fuzzy matches, chosen by the caller per
    /// the records' origin.
    pub async fn enrich_batch(&self, papers: &mut [Paper], threshold: f64) {
        let total = papers.len();
        for (i, paper) in papers.iter_mut().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::warn!("interrupted, skipping remaining enrichment");
                break;
            }
            if i > 0 && i % 10 == 0 {
                tracing::info!(processed = i, total, "enrichment progress");
            }
            self.enrich(paper, threshold).await;
        }
        let enriched = papers.iter().filter(|p| p.enriched).count();
        tracing::info!(enriched, total, "enrichment complete");
    }

    /// Try DOI, then arXiv id, then a fuzzy title+year search; first
    /// match wins. Fields are only added, never overwritten.
    pub async fn enrich(&self, paper: &mut Paper, threshold: f64) {
        match self.find_match(paper, threshold).await {
            Some(data) => {
                apply(paper, &data);
                paper.enriched = true;
                tracing::debug!(title = %paper.title, "enriched");
            }
            None => {
                paper.enriched = false;
                tracing::debug!(title = %paper.title, "no enrichment match");
            }
        }
    }

    async fn find_match(&self, paper: &Paper, threshold: f64) -> Option<S2Paper> {
        if let Some(doi) = paper.doi.as_deref() {
            match self.lookup_doi(doi).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => tracing::warn!(doi, error = %e, "DOI lookup failed"),
            }
        }
        if let Some(arxiv_id) = paper.arxiv_id.as_deref() {
            match self.lookup_arxiv(arxiv_id).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => tracing::warn!(arxiv_id, error = %e, "arXiv lookup failed"),
            }
        }
        match self.search_title(&paper.title, Some(paper.year), threshold).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(title = %paper.title, error = %e, "title search failed");
                None
            }
        }
    }

    async fn lookup_doi(&self, doi: &str) -> Result<Option<S2Paper>, EnrichError> {
        let key = fingerprint(&["s2", "doi", doi]);
        let url = format!("{}/paper/DOI:{}", BASE_URL, doi);
        self.cache
            .get_or_fetch(&key, || self.request_paper(url))
            .await
    }

    async fn lookup_arxiv(&self, arxiv_id: &str) -> Result<Option<S2Paper>, EnrichError> {
        let key = fingerprint(&["s2", "arxiv", arxiv_id]);
        let url = format!("{}/paper/ARXIV:{}", BASE_URL, arxiv_id);
        self.cache
            .get_or_fetch(&key, || self.request_paper(url))
            .await
    }

    async fn search_title(
        &self,
        title: &str,
        year: Option<u16>,
        threshold: f64,
    ) -> Result<Option<S2Paper>, EnrichError> {
        let year_part = year.map(|y| y.to_string()).unwrap_or_default();
        let key = fingerprint(&["s2", "search", title, &year_part]);
        let candidates: Vec<S2Paper> = self
            .cache
            .get_or_fetch(&key, || async {
                let mut query = vec![
                    ("query", title.to_string()),
                    ("limit", SEARCH_CANDIDATES.to_string()),
                    ("fields", FIELDS.to_string()),
                ];
                if let Some(y) = year {
                    query.push(("year", y.to_string()));
                }
                let url = format!("{}/paper/search", BASE_URL);
                let resp: Option<S2SearchResponse> = self.request(&url, &query).await?;
                Ok::<_, EnrichError>(
                    resp.and_then(|r| r.data).unwrap_or_default(),
                )
            })
            .await?;
        Ok(find_best_match(title, year, &candidates, threshold).cloned())
    }

    async fn request_paper(&self, url: String) -> Result<Option<S2Paper>, EnrichError> {
        let query = vec![("fields", FIELDS.to_string())];
        self.request(&url, &query).await
    }

    /// One API call with backoff on rate-limit signals and transient
    /// network failures. 404 means "no such paper", not an error.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, EnrichError> {
        let mut delay = BACKOFF_BASE;
        for attempt in 1..=MAX_ATTEMPTS {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(EnrichError::Interrupted);
            }
            self.limiter.wait().await;
            let req = self.add_auth(self.client.get(url).query(query));
            match req.send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!(attempt, "rate limited by Semantic Scholar, backing off");
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(None);
                }
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => return Ok(Some(resp.json().await?)),
                    Err(e) => {
                        if attempt == MAX_ATTEMPTS {
                            return Err(e.into());
                        }
                        tracing::warn!(attempt, error = %e, "Semantic Scholar request failed, retrying");
                    }
                },
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    tracing::warn!(attempt, error = %e, "Semantic Scholar request failed, retrying");
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        Err(EnrichError::RateLimited(MAX_ATTEMPTS))
    }
}

/// Copy fields from the match into the record, filling gaps only.
fn apply(paper: &mut Paper, data: &S2Paper) {
    if paper.abstract_text.as_deref().map_or(true, str::is_empty) {
        paper.abstract_text = data.abstract_text.clone().filter(|a| !a.is_empty());
    }
    if paper.citation_count.is_none() {
        paper.citation_count = data.citation_count;
    }
    if paper.reference_count.is_none() {
        paper.reference_count = data.reference_count;
    }
    if let Some(ids) = &data.external_ids {
        if paper.doi.is_none() {
            paper.doi = ids.doi.clone();
        }
        if paper.arxiv_id.is_none() {
            paper.arxiv_id = ids.arxiv.clone();
        }
    }
    if paper.semantic_scholar_id.is_none() {
        paper.semantic_scholar_id = data.paper_id.clone();
    }
    if paper.url.is_none() {
        paper.url = data.url.clone();
    }
    if paper.fields_of_study.is_empty() {
        paper.fields_of_study = data.fields_of_study.clone().unwrap_or_default();
    }
}

/// Best qualifying candidate by Jaccard title similarity. A candidate is
/// disqualified outright when both sides carry a year and they differ.
/// Ties prefer a candidate with an abstract, then earlier order.
fn find_best_match<'a>(
    title: &str,
    year: Option<u16>,
    candidates: &'a [S2Paper],
    threshold: f64,
) -> Option<&'a S2Paper> {
    let mut best: Option<(&S2Paper, f64)> = None;
    for candidate in candidates {
        let Some(candidate_title) = candidate.title.as_deref() else {
            continue;
        };
        if let (Some(y), Some(cy)) = (year, candidate.year) {
            if y != cy {
                continue;
            }
        }
        let score = similarity::jaccard(title, candidate_title);
        if score < threshold {
            continue;
        }
        let better = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score
                        && candidate.abstract_text.is_some()
                        && current.abstract_text.is_none())
            }
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}
