mod cache;
mod config;
mod dedup;
mod enrich;
mod filter;
mod output;
mod pipeline;
mod ratelimit;
mod similarity;
mod sources;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cache::{Cache, DEFAULT_TTL};
use crate::config::Config;
use crate::enrich::SemanticScholarClient;
use crate::filter::{KeywordFilter, MatchMode};

#[derive(Parser)]
#[command(
    name = "conf-retriever",
    about = "Retrieve, enrich, and filter conference paper metadata",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Retrieve paper metadata for one venue.
    Retrieve {
        /// Venue key, e.g. neurips, iclr, usenix_security, icse.
        venue: String,
        /// Single year to retrieve.
        #[arg(long, conflicts_with = "years")]
        year: Option<u16>,
        /// Inclusive year range, e.g. 2020-2024.
        #[arg(long)]
        years: Option<String>,
        /// Cap on papers per year, mainly for smoke runs.
        #[arg(long)]
        limit: Option<usize>,
        /// Output path; defaults to output/<venue>_<years>.json.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Enrich records via Semantic Scholar after retrieval.
        #[arg(long)]
        enrich: bool,
        /// Semantic Scholar API key; falls back to SEMANTIC_SCHOLAR_API_KEY.
        #[arg(long)]
        api_key: Option<String>,
        /// Concurrent per-year workers.
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Filter and deduplicate previously retrieved papers.
    Filter {
        /// Directory of *.json paper files to load.
        #[arg(long, default_value = "output")]
        input_dir: PathBuf,
        /// Output path for the filtered collection.
        #[arg(long, default_value = "filtered_papers.json")]
        output: PathBuf,
        /// Keyword group as a comma-separated list; repeatable. Defaults
        /// to the built-in agent/coding/security groups.
        #[arg(long = "keywords")]
        keywords: Vec<String>,
        /// Whether every group must match or any one group.
        #[arg(long, value_enum, default_value = "all")]
        match_mode: MatchMode,
        /// Skip deduplication.
        #[arg(long)]
        no_deduplicate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Retrieve {
            venue,
            year,
            years,
            limit,
            output,
            enrich,
            api_key,
            workers,
        } => {
            run_retrieve(
                &venue,
                year,
                years.as_deref(),
                limit,
                output,
                enrich,
                api_key,
                workers,
            )
            .await
        }
        Command::Filter {
            input_dir,
            output,
            keywords,
            match_mode,
            no_deduplicate,
        } => run_filter(&input_dir, &output, keywords, match_mode, no_deduplicate),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_retrieve(
    venue_key: &str,
    year: Option<u16>,
    years: Option<&str>,
    limit: Option<usize>,
    output: Option<PathBuf>,
    enrich: bool,
    api_key: Option<String>,
    workers: usize,
) -> Result<()> {
    let Some(venue) = config::venue(venue_key) else {
        bail!(
            "unknown venue {:?}; available: {}",
            venue_key,
            config::venue_keys().join(", ")
        );
    };
    let years = config::parse_years(year, years)?;
    let cfg = Config::from_env();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight work");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let report =
        pipeline::retrieve(&cfg, venue, &years, limit, workers, shutdown.clone()).await;
    let mut papers = report.papers;
    if papers.is_empty() {
        if report.failed_units > 0 {
            bail!("retrieval failed for {} year(s)", report.failed_units);
        }
        tracing::warn!(venue = venue.key, "no papers found, nothing to write");
        return Ok(());
    }

    if enrich {
        let cache = Cache::new(&cfg.cache_dir.join("semantic_scholar"), DEFAULT_TTL)?;
        let client =
            SemanticScholarClient::new(api_key.or(cfg.api_key), cache, shutdown.clone());
        client.enrich_batch(&mut papers, venue.match_threshold).await;
    }

    let path = output.unwrap_or_else(|| {
        let span = match (years.first(), years.last()) {
            (Some(first), Some(last)) if first != last => format!("{}-{}", first, last),
            (Some(first), _) => first.to_string(),
            _ => "all".to_string(),
        };
        PathBuf::from(format!("output/{}_{}.json", venue.key, span))
    });
    output::write_papers(&mut papers, &path)?;

    if report.failed_units > 0 {
        tracing::warn!(
            failed = report.failed_units,
            "some years failed; output is partial"
        );
    }
    tracing::info!(
        venue = venue.key,
        papers = papers.len(),
        path = %path.display(),
        "retrieval complete"
    );
    Ok(())
}

fn run_filter(
    input_dir: &std::path::Path,
    output_path: &std::path::Path,
    keywords: Vec<String>,
    match_mode: MatchMode,
    no_deduplicate: bool,
) -> Result<()> {
    let groups = if keywords.is_empty() {
        filter::default_groups()
    } else {
        keywords
            .iter()
            .map(|group| {
                group
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .collect()
    };

    let papers = output::load_papers_from_dir(input_dir)?;
    tracing::info!(count = papers.len(), "loaded papers");

    let keyword_filter = KeywordFilter::new(groups, match_mode);
    let mut papers = keyword_filter.apply(papers);
    if !no_deduplicate {
        papers = dedup::deduplicate(papers);
    }

    output::write_papers(&mut papers, output_path)?;
    tracing::info!(
        papers = papers.len(),
        path = %output_path.display(),
        "filtering complete"
    );
    Ok(())
}
