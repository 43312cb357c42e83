use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::similarity::{LOOKUP_THRESHOLD, MERGE_THRESHOLD};
use crate::sources::dblp::DblpSource;
use crate::sources::mlr::MlrSource;
use crate::sources::neurips::NeuripsSource;
use crate::sources::openreview::OpenReviewSource;
use crate::sources::usenix::UsenixSource;
use crate::sources::{Fetcher, PaperSource};

/// Environment-derived settings.
pub struct Config {
    pub api_key: Option<String>,
    pub cache_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            cache_dir: std::env::var("CONF_RETRIEVER_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".cache")),
        }
    }
}

/// How a venue's listings are fetched.
pub enum Strategy {
    Neurips,
    Mlr,
    Usenix,
    OpenReview { invitation: &'static str },
    Dblp { queries: &'static [&'static str] },
}

pub struct VenueConfig {
    pub key: &'static str,
    pub short_name: &'static str,
    pub full_name: &'static str,
    pub strategy: Strategy,
    /// Requests per second against the venue's host.
    pub rate: f64,
    /// Title-similarity bar for enrichment matches. DBLP-sourced venues
    /// use the stricter merge threshold because their records are sparse
    /// and a wrong match is harder to spot downstream.
    pub match_threshold: f64,
}

pub const VENUES: &[VenueConfig] = &[
    VenueConfig {
        key: "neurips",
        short_name: "NeurIPS",
        full_name: "Conference on Neural Information Processing Systems",
        strategy: Strategy::Neurips,
        rate: 1.0,
        match_threshold: LOOKUP_THRESHOLD,
    },
    VenueConfig {
        key: "icml",
        short_name: "ICML",
        full_name: "International Conference on Machine Learning",
        strategy: Strategy::Mlr,
        rate: 1.0,
        match_threshold: LOOKUP_THRESHOLD,
    },
    VenueConfig {
        key: "iclr",
        short_name: "ICLR",
        full_name: "International Conference on Learning Representations",
        strategy: Strategy::OpenReview {
            invitation: "ICLR.cc/{year}/Conference/-/Blind_Submission",
        },
        rate: 0.5,
        match_threshold: LOOKUP_THRESHOLD,
    },
    VenueConfig {
        key: "usenix_security",
        short_name: "USENIX Security",
        full_name: "USENIX Security Symposium",
        strategy: Strategy::Usenix,
        rate: 1.0,
        match_threshold: LOOKUP_THRESHOLD,
    },
    VenueConfig {
        key: "icse",
        short_name: "ICSE",
        full_name: "International Conference on Software Engineering",
        strategy: Strategy::Dblp { queries: &["ICSE"] },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
    VenueConfig {
        key: "fse",
        short_name: "FSE",
        full_name: "ACM International Conference on the Foundations of Software Engineering",
        strategy: Strategy::Dblp {
            queries: &["SIGSOFT FSE", "ESEC/FSE", "FSE"],
        },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
    VenueConfig {
        key: "ase",
        short_name: "ASE",
        full_name: "IEEE/ACM International Conference on Automated Software Engineering",
        strategy: Strategy::Dblp { queries: &["ASE"] },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
    VenueConfig {
        key: "issta",
        short_name: "ISSTA",
        full_name: "ACM SIGSOFT International Symposium on Software Testing and Analysis",
        strategy: Strategy::Dblp { queries: &["ISSTA"] },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
    VenueConfig {
        key: "ccs",
        short_name: "CCS",
        full_name: "ACM Conference on Computer and Communications Security",
        strategy: Strategy::Dblp { queries: &["CCS"] },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
    VenueConfig {
        key: "sp",
        short_name: "IEEE S&P",
        full_name: "IEEE Symposium on Security and Privacy",
        strategy: Strategy::Dblp {
            queries: &["IEEE Symposium on Security and Privacy", "SP"],
        },
        rate: 1.0,
        match_threshold: MERGE_THRESHOLD,
    },
];

pub fn venue(key: &str) -> Option<&'static VenueConfig> {
    VENUES.iter().find(|v| v.key == key)
}

pub fn venue_keys() -> Vec<&'static str> {
    VENUES.iter().map(|v| v.key).collect()
}

/// Resolve `--year`/`--years` into a concrete year list. Exactly one of
/// the two must be given.
pub fn parse_years(year: Option<u16>, years: Option<&str>) -> Result<Vec<u16>> {
    match (year, years) {
        (Some(_), Some(_)) => bail!("pass either --year or --years, not both"),
        (Some(y), None) => Ok(vec![y]),
        (None, Some(range)) => {
            let Some((start, end)) = range.split_once('-') else {
                bail!("--years must look like 2020-2024, got {:?}", range);
            };
            let start: u16 = start
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid start year in {:?}", range))?;
            let end: u16 = end
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid end year in {:?}", range))?;
            if start > end {
                bail!("--years start {} is after end {}", start, end);
            }
            Ok((start..=end).collect())
        }
        (None, None) => bail!("one of --year or --years is required"),
    }
}

/// Build the adapter for a venue. The fetcher is owned by the adapter so
/// concurrent per-year workers never share rate-limiter state.
pub fn build_source(venue: &'static VenueConfig, fetcher: Fetcher) -> Box<dyn PaperSource> {
    match venue.strategy {
        Strategy::Neurips => Box::new(NeuripsSource::new(fetcher)),
        Strategy::Mlr => Box::new(MlrSource::new(fetcher)),
        Strategy::Usenix => Box::new(UsenixSource::new(fetcher)),
        Strategy::OpenReview { invitation } => Box::new(OpenReviewSource::new(
            fetcher,
            venue.short_name,
            venue.full_name,
            invitation,
        )),
        Strategy::Dblp { queries } => Box::new(DblpSource::new(
            fetcher,
            venue.short_name,
            venue.full_name,
            queries,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_year() {
        assert_eq!(parse_years(Some(2023), None).unwrap(), vec![2023]);
    }

    #[test]
    fn test_parse_year_range() {
        assert_eq!(
            parse_years(None, Some("2021-2023")).unwrap(),
            vec![2021, 2022, 2023]
        );
    }

    #[test]
    fn test_parse_years_rejects_bad_input() {
        assert!(parse_years(None, None).is_err());
        assert!(parse_years(Some(2023), Some("2021-2023")).is_err());
        assert!(parse_years(None, Some("2023")).is_err());
        assert!(parse_years(None, Some("2024-2021")).is_err());
        assert!(parse_years(None, Some("20xx-2023")).is_err());
    }

    #[test]
    fn test_venue_lookup() {
        assert!(venue("neurips").is_some());
        assert!(venue("iclr").is_some());
        assert!(venue("nope").is_none());
        assert!(venue_keys().contains(&"icse"));
    }

    #[test]
    fn test_dblp_venues_use_strict_threshold() {
        let icse = venue("icse").unwrap();
        assert!(matches!(icse.strategy, Strategy::Dblp { .. }));
        assert_eq!(icse.match_threshold, MERGE_THRESHOLD);
        assert_eq!(venue("neurips").unwrap().match_threshold, LOOKUP_THRESHOLD);
    }
}
