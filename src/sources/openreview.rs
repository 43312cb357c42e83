use async_trait::async_trait;
use serde::Deserialize;

use super::{Author, Fetcher, Paper, PaperSource, SourceError};
use crate::cache::fingerprint;

const BASE_URL: &str = "https://api.openreview.net";
const FORUM_URL: &str = "https://openreview.net/forum?id=";
const PAGE_SIZE: usize = 1000;

/// Accepted papers from the OpenReview notes API (v1).
///
/// The invitation pattern contains a `{year}` placeholder, e.g.
/// `ICLR.cc/{year}/Conference/-/Blind_Submission`. Acceptance is decided
/// from the note's venue string, since the blind-submission invitation
/// also returns rejected and withdrawn submissions.
pub struct OpenReviewSource {
    fetcher: Fetcher,
    conference: &'static str,
    venue_name: &'static str,
    invitation_pattern: &'static str,
}

impl OpenReviewSource {
    pub fn new(
        fetcher: Fetcher,
        conference: &'static str,
        venue_name: &'static str,
        invitation_pattern: &'static str,
    ) -> Self {
        Self {
            fetcher,
            conference,
            venue_name,
            invitation_pattern,
        }
    }
}

#[derive(Deserialize)]
struct NotesResponse {
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Deserialize)]
struct Note {
    id: String,
    #[serde(default)]
    forum: Option<String>,
    content: NoteContent,
}

#[derive(Deserialize, Default)]
struct NoteContent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    pdf: Option<String>,
    #[serde(default)]
    keywords: Option<Keywords>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Keywords {
    List(Vec<String>),
    Text(String),
}

#[async_trait]
impl PaperSource for OpenReviewSource {
    fn name(&self) -> &str {
        "openreview"
    }

    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError> {
        let invitation = self
            .invitation_pattern
            .replace("{year}", &year.to_string());
        let mut papers = Vec::new();
        let mut offset = 0usize;

        loop {
            let url = format!(
                "{}/notes?invitation={}&limit={}&offset={}",
                BASE_URL,
                urlencoded(&invitation),
                PAGE_SIZE,
                offset
            );
            let key = fingerprint(&[
                "openreview",
                self.conference,
                &year.to_string(),
                &offset.to_string(),
            ]);
            let body = self.fetcher.fetch_text(&key, &url).await?;
            let resp: NotesResponse = serde_json::from_str(&body)
                .map_err(|e| SourceError::Parse(format!("notes response: {}", e)))?;
            let batch = resp.notes.len();
            if batch == 0 {
                break;
            }

            for note in resp.notes {
                let venue = note.content.venue.as_deref().unwrap_or("");
                if !is_accepted_venue(venue, self.conference, year) {
                    continue;
                }
                if let Some(paper) = self.parse_note(note, year) {
                    papers.push(paper);
                }
            }
            tracing::info!(
                conference = self.conference,
                year,
                processed = offset + batch,
                accepted = papers.len(),
                "processed OpenReview submissions"
            );

            if batch < PAGE_SIZE || limit.is_some_and(|n| papers.len() >= n) {
                break;
            }
            offset += batch;
        }

        if let Some(n) = limit {
            papers.truncate(n);
        }
        Ok(papers)
    }
}

impl OpenReviewSource {
    fn parse_note(&self, note: Note, year: u16) -> Option<Paper> {
        let title = note.content.title.as_deref().unwrap_or("").trim().to_string();
        if title.is_empty() {
            return None;
        }

        let authors = note
            .content
            .authors
            .iter()
            .map(|name| Author {
                name: name.clone(),
                affiliation: None,
            })
            .collect();

        let forum = note.forum.clone().unwrap_or_else(|| note.id.clone());
        let venue = note
            .content
            .venue
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.venue_name, year));

        let mut paper = Paper::new(
            format!("openreview_{}", note.id),
            title,
            authors,
            self.conference,
            &venue,
            year,
            "openreview",
        );
        paper.abstract_text = note.content.abstract_text.filter(|a| !a.is_empty());
        paper.url = Some(format!("{}{}", FORUM_URL, forum));
        paper.pdf_url = note.content.pdf.map(|p| {
            if p.starts_with("http") {
                p
            } else {
                format!("https://openreview.net{}", p)
            }
        });
        paper.keywords = match note.content.keywords {
            Some(Keywords::List(list)) => list,
            Some(Keywords::Text(text)) => text
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        Some(paper)
    }
}

/// Accepted papers carry a venue like "ICLR 2023 poster"; rejected and
/// withdrawn ones read "Submitted to ICLR 2023" or similar.
fn is_accepted_venue(venue: &str, conference: &str, year: u16) -> bool {
    if venue.is_empty() {
        return false;
    }
    let venue_lower = venue.to_lowercase();
    if !venue.contains(&year.to_string()) || !venue_lower.contains(&conference.to_lowercase()) {
        return false;
    }
    if venue_lower.contains("submitted") || venue_lower.contains("withdrawn") {
        return false;
    }
    ["poster", "oral", "spotlight", "notable", "conference"]
        .iter()
        .any(|kind| venue_lower.contains(kind))
}

fn urlencoded(s: &str) -> String {
    s.replace('/', "%2F").replace(' ', "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_accepted_venue() {
        assert!(is_accepted_venue("ICLR 2023 poster", "ICLR", 2023));
        assert!(is_accepted_venue("ICLR 2023 notable top 5%", "ICLR", 2023));
        assert!(!is_accepted_venue("Submitted to ICLR 2023", "ICLR", 2023));
        assert!(!is_accepted_venue("ICLR 2022 poster", "ICLR", 2023));
        assert!(!is_accepted_venue("", "ICLR", 2023));
    }

    #[test]
    fn test_parse_note_fields() {
        let body = r#"{
          "notes": [{
            "id": "abc123",
            "forum": "abc123",
            "content": {
              "title": "Emergent Abilities Revisited",
              "authors": ["Ada Lovelace", "Alan Turing"],
              "abstract": "We revisit emergent abilities.",
              "venue": "ICLR 2023 poster",
              "pdf": "/pdf/abc123.pdf",
              "keywords": ["scaling", "evaluation"]
            }
          }]
        }"#;
        let resp: NotesResponse = serde_json::from_str(body).unwrap();
        let source = OpenReviewSource {
            fetcher: test_fetcher(),
            conference: "ICLR",
            venue_name: "International Conference on Learning Representations",
            invitation_pattern: "ICLR.cc/{year}/Conference/-/Blind_Submission",
        };
        let note = resp.notes.into_iter().next().unwrap();
        let paper = source.parse_note(note, 2023).unwrap();
        assert_eq!(paper.paper_id, "openreview_abc123");
        assert_eq!(paper.authors.len(), 2);
        assert_eq!(paper.abstract_text.as_deref(), Some("We revisit emergent abilities."));
        assert_eq!(paper.pdf_url.as_deref(), Some("https://openreview.net/pdf/abc123.pdf"));
        assert_eq!(paper.url.as_deref(), Some("https://openreview.net/forum?id=abc123"));
        assert_eq!(paper.keywords, vec!["scaling", "evaluation"]);
    }

    #[test]
    fn test_keywords_as_comma_separated_string() {
        let content: NoteContent =
            serde_json::from_str(r#"{"title": "T", "keywords": "a, b, c"}"#).unwrap();
        match content.keywords {
            Some(Keywords::Text(t)) => assert_eq!(t, "a, b, c"),
            _ => panic!("expected text keywords"),
        }
    }

    fn test_fetcher() -> Fetcher {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;
        let dir = tempfile::tempdir().unwrap();
        let cache = crate::cache::Cache::new(dir.path(), std::time::Duration::from_secs(60)).unwrap();
        Fetcher::new(1.0, cache, Arc::new(AtomicBool::new(false)))
    }
}
