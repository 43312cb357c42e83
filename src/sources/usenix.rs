use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{absolute_url, short_hash, Author, Fetcher, Paper, PaperSource, SourceError};
use crate::cache::fingerprint;

const BASE_URL: &str = "https://www.usenix.org";
const CONFERENCE: &str = "USENIX Security";
const VENUE: &str = "USENIX Security Symposium";

/// Technical-sessions page entries that are not papers.
const SKIP_TITLES: &[&str] = &[
    "Show details",
    "Hide details",
    "Proceedings Cover",
    "Proceedings Front Matter",
    "Errata",
    "Attendee List",
    "Full Proceedings",
];

/// USENIX Security papers from the technical sessions page.
pub struct UsenixSource {
    fetcher: Fetcher,
}

impl UsenixSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PaperSource for UsenixSource {
    fn name(&self) -> &str {
        "usenix_security"
    }

    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError> {
        let year_short = year % 100;
        let url = format!(
            "{}/conference/usenixsecurity{:02}/technical-sessions",
            BASE_URL, year_short
        );
        let key = fingerprint(&["usenix_security", "listing", &year.to_string()]);
        let html = self.fetcher.fetch_text(&key, &url).await?;
        let mut papers = parse_listing(&html, year)?;
        if let Some(n) = limit {
            papers.truncate(n);
        }
        Ok(papers)
    }
}

fn parse_listing(html: &str, year: u16) -> Result<Vec<Paper>, SourceError> {
    let document = Html::parse_document(html);
    let h2_sel = Selector::parse("h2").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let pres_sel = Selector::parse("a[href*='/presentation/']")
        .map_err(|e| SourceError::Parse(format!("{:?}", e)))?;

    let mut papers = Vec::new();
    for h2 in document.select(&h2_sel) {
        let Some(link) = h2.select(&pres_sel).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() || SKIP_TITLES.iter().any(|s| title.contains(s)) {
            continue;
        }
        let href = link.value().attr("href").unwrap_or("");
        let url = absolute_url(BASE_URL, href);

        // Authors live in the div.content immediately after the heading.
        let authors = h2
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "h2")
            .find(|el| el.value().name() == "div" && el.value().classes().any(|c| c == "content"))
            .map(|el| parse_authors(&el.text().collect::<String>()))
            .unwrap_or_default();

        let suffix = href
            .split("/presentation/")
            .nth(1)
            .map(|s| s.trim_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| short_hash(&title));

        let mut paper = Paper::new(
            format!("usenix_security_{}_{}", year, suffix),
            title,
            authors,
            CONFERENCE,
            VENUE,
            year,
            "usenix_website",
        );
        paper.url = Some(url);
        papers.push(paper);
    }
    Ok(papers)
}

/// Author blocks look like "Name, Affiliation; Name, Affiliation; ...".
fn parse_authors(text: &str) -> Vec<Author> {
    text.split(';')
        .filter_map(|part| {
            let part = part.trim();
            let mut name = part.split(',').next().unwrap_or("").trim();
            if let Some(stripped) = name.strip_suffix(" and") {
                name = stripped.trim();
            }
            if name.len() > 2 {
                let affiliation = part
                    .split_once(',')
                    .map(|(_, aff)| aff.trim().to_string())
                    .filter(|a| !a.is_empty());
                Some(Author {
                    name: name.to_string(),
                    affiliation,
                })
            } else {
                None
            }
        })
        .collect()
}
