use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{short_hash, Author, Fetcher, Paper, PaperSource, SourceError};
use crate::cache::fingerprint;

const BASE_URL: &str = "https://dblp.org/search/publ/api";
const PAGE_SIZE: usize = 1000;

/// Venue substrings marking workshop and co-located tracks, which are
/// dropped in favor of the main proceedings.
const VENUE_EXCLUSIONS: &[&str] = &[
    "@",
    "FoSE",
    "Workshop",
    "Demo",
    "Poster",
    "Companion",
    "NIER",
    "SEIP",
    "SEET",
    "Doctoral",
    "Student",
];

/// Papers from the DBLP publication search API.
///
/// Some conferences are listed under several venue strings (e.g. ESEC/FSE
/// vs. SIGSOFT FSE), so each alias is queried and the union deduplicated
/// by lowercase title.
pub struct DblpSource {
    fetcher: Fetcher,
    conference: &'static str,
    venue_name: &'static str,
    queries: &'static [&'static str],
}

impl DblpSource {
    pub fn new(
        fetcher: Fetcher,
        conference: &'static str,
        venue_name: &'static str,
        queries: &'static [&'static str],
    ) -> Self {
        Self {
            fetcher,
            conference,
            venue_name,
            queries,
        }
    }

    async fn query_venue(&self, venue_query: &str, year: u16) -> Result<Vec<Paper>, SourceError> {
        let mut papers = Vec::new();
        let mut first = 0usize;

        loop {
            let query = format!("venue:{} year:{}", venue_query, year);
            let url = format!(
                "{}?q={}&format=xml&h={}&f={}",
                BASE_URL,
                urlencoded(&query),
                PAGE_SIZE,
                first
            );
            let key = fingerprint(&[
                "dblp",
                self.conference,
                venue_query,
                &year.to_string(),
                &first.to_string(),
            ]);
            let body = self.fetcher.fetch_text(&key, &url).await?;
            let page = parse_response(&body, year, self.conference, self.venue_name)?;

            papers.extend(
                page.papers
                    .into_iter()
                    .filter(|p| is_main_track(&p.venue)),
            );

            first += page.sent;
            if page.sent == 0 || first >= page.total {
                break;
            }
        }
        Ok(papers)
    }
}

#[async_trait]
impl PaperSource for DblpSource {
    fn name(&self) -> &str {
        "dblp"
    }

    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError> {
        let mut papers: Vec<Paper> = Vec::new();
        for venue_query in self.queries {
            let batch = self.query_venue(venue_query, year).await?;
            if !batch.is_empty() {
                tracing::info!(
                    conference = self.conference,
                    venue_query,
                    year,
                    count = batch.len(),
                    "found DBLP papers"
                );
            }
            for paper in batch {
                let title_lower = paper.title.to_lowercase();
                if !papers.iter().any(|p| p.title.to_lowercase() == title_lower) {
                    papers.push(paper);
                }
            }
        }
        if let Some(n) = limit {
            papers.truncate(n);
        }
        Ok(papers)
    }
}

fn is_main_track(venue: &str) -> bool {
    let venue_lower = venue.to_lowercase();
    !VENUE_EXCLUSIONS
        .iter()
        .any(|excl| venue_lower.contains(&excl.to_lowercase()))
}

fn urlencoded(s: &str) -> String {
    s.replace(' ', "+")
        .replace(':', "%3A")
        .replace('/', "%2F")
        .replace('"', "%22")
}

struct DblpPage {
    papers: Vec<Paper>,
    total: usize,
    sent: usize,
}

fn parse_response(
    xml: &str,
    year: u16,
    conference: &str,
    venue_name: &str,
) -> Result<DblpPage, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut total = 0usize;
    let mut sent = 0usize;

    let mut in_info = false;
    let mut in_authors = false;
    let mut current_tag = String::new();
    let mut title = String::new();
    let mut venue = String::new();
    let mut doi = String::new();
    let mut url = String::new();
    let mut year_text = String::new();
    let mut authors: Vec<Author> = Vec::new();
    let mut author_name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"hits" => {
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let val = String::from_utf8_lossy(&attr.value).to_string();
                    match key.as_str() {
                        "total" => total = val.parse().unwrap_or(0),
                        "sent" => sent = val.parse().unwrap_or(0),
                        _ => {}
                    }
                }
            }
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "info" => {
                        in_info = true;
                        title.clear();
                        venue.clear();
                        doi.clear();
                        url.clear();
                        year_text.clear();
                        authors.clear();
                    }
                    "authors" if in_info => in_authors = true,
                    "author" if in_authors => author_name.clear(),
                    _ => {}
                }
                if in_info {
                    current_tag = tag;
                }
            }
            Ok(Event::Text(e)) if in_info => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "title" => title.push_str(&text),
                    "venue" => venue.push_str(&text),
                    "doi" => doi.push_str(&text),
                    "url" => url.push_str(&text),
                    "year" => year_text.push_str(&text),
                    "author" if in_authors => author_name.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "author" if in_authors => {
                        let name = author_name.trim().to_string();
                        if !name.is_empty() {
                            authors.push(Author {
                                name,
                                affiliation: None,
                            });
                        }
                    }
                    "authors" => in_authors = false,
                    "info" => {
                        in_info = false;
                        let title = title.trim().to_string();
                        if !title.is_empty() {
                            let paper_year = year_text.trim().parse::<u16>().unwrap_or(year);
                            let hit_venue = if venue.trim().is_empty() {
                                venue_name.to_string()
                            } else {
                                venue.trim().to_string()
                            };
                            let mut paper = Paper::new(
                                format!(
                                    "{}_{}_{}",
                                    conference.to_lowercase(),
                                    paper_year,
                                    short_hash(&title)
                                ),
                                title,
                                authors.clone(),
                                conference,
                                &hit_venue,
                                paper_year,
                                "dblp",
                            );
                            if !doi.trim().is_empty() {
                                paper.doi = Some(doi.trim().to_string());
                            }
                            if !url.trim().is_empty() {
                                paper.url = Some(url.trim().to_string());
                            }
                            papers.push(paper);
                        }
                    }
                    _ => {}
                }
                if tag == current_tag {
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(DblpPage {
        papers,
        total,
        sent,
    })
}
