use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::cache::{Cache, DEFAULT_TTL};
use crate::config::{self, Config, VenueConfig};
use crate::sources::{Fetcher, Paper, PaperSource, SourceError};

pub struct RetrieveReport {
    pub papers: Vec<Paper>,
    /// Years whose retrieval failed outright.
    pub failed_units: usize,
    /// Records dropped by validation.
    pub dropped: usize,
}

/// Retrieve one venue across the requested years with a bounded worker
/// pool. Each year gets its own adapter so limiter state is never shared
/// between concurrent workers.
pub async fn retrieve(
    config: &Config,
    venue: &'static VenueConfig,
    years: &[u16],
    limit: Option<usize>,
    workers: usize,
    shutdown: Arc<AtomicBool>,
) -> RetrieveReport {
    let cache_dir = config.cache_dir.join(venue.key);
    run_units(years, limit, workers, move |_year| {
        let cache = Cache::new(&cache_dir, DEFAULT_TTL)
            .map_err(|e| SourceError::Api(format!("cache init: {}", e)))?;
        let fetcher = Fetcher::new(venue.rate, cache, shutdown.clone());
        Ok(config::build_source(venue, fetcher))
    })
    .await
}

async fn run_units<F>(
    years: &[u16],
    limit: Option<usize>,
    workers: usize,
    make_source: F,
) -> RetrieveReport
where
    F: Fn(u16) -> Result<Box<dyn PaperSource>, SourceError> + Send + Sync,
{
    let results: Vec<(u16, Result<Vec<Paper>, SourceError>)> =
        stream::iter(years.iter().copied())
            .map(|year| {
                let make_source = &make_source;
                async move {
                    let result = match make_source(year) {
                        Ok(source) => {
                            tracing::info!(source = source.name(), year, "retrieving");
                            source.list(year, limit).await
                        }
                        Err(e) => Err(e),
                    };
                    (year, result)
                }
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

    let mut papers = Vec::new();
    let mut failed_units = 0;
    let mut sorted = results;
    sorted.sort_by_key(|(year, _)| *year);
    for (year, result) in sorted {
        match result {
            Ok(batch) => {
                tracing::info!(year, count = batch.len(), "retrieved papers");
                papers.extend(batch);
            }
            Err(e) => {
                tracing::error!(year, error = %e, "retrieval failed");
                failed_units += 1;
            }
        }
    }

    let before = papers.len();
    papers.retain(Paper::is_valid);
    let dropped = before - papers.len();
    if dropped > 0 {
        tracing::warn!(dropped, "dropped invalid records");
    }

    RetrieveReport {
        papers,
        failed_units,
        dropped,
    }
}
