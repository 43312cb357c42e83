use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{absolute_url, short_hash, split_authors, Fetcher, Paper, PaperSource, SourceError};
use crate::cache::fingerprint;

const BASE_URL: &str = "https://papers.neurips.cc";
const CONFERENCE: &str = "NeurIPS";
const VENUE: &str = "Conference on Neural Information Processing Systems";

/// Papers from the yearly listing at papers.neurips.cc.
pub struct NeuripsSource {
    fetcher: Fetcher,
}

impl NeuripsSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PaperSource for NeuripsSource {
    fn name(&self) -> &str {
        "neurips"
    }

    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError> {
        let url = format!("{}/paper/{}", BASE_URL, year);
        let key = fingerprint(&["neurips", "listing", &year.to_string()]);
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
    let item_sel = Selector::parse("li").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let link_sel =
        Selector::parse("a[href*='/paper']").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let authors_sel = Selector::parse("i").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;

    let mut papers = Vec::new();
    for item in document.select(&item_sel) {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let href = link.value().attr("href").unwrap_or("");

        let authors = item
            .select(&authors_sel)
            .next()
            .map(|el| split_authors(&el.text().collect::<String>()))
            .unwrap_or_default();

        let mut paper = Paper::new(
            format!("neurips_{}_{}", year, short_hash(&title)),
            title,
            authors,
            CONFERENCE,
            VENUE,
            year,
            "neurips_website",
        );
        if !href.is_empty() {
            paper.url = Some(absolute_url(BASE_URL, href));
        }
        papers.push(paper);
    }
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body><ul>
      <li>
        <a href="/paper/2023/hash/abc123-Abstract.html">Scaling Laws for Neural Retrieval</a>
        <i>Ada Lovelace, Alan Turing</i>
      </li>
      <li>
        <a href="/paper/2023/hash/def456-Abstract.html">Robust Program Synthesis</a>
        <i>Grace Hopper</i>
      </li>
      <li><span>Not a paper entry</span></li>
    </ul></body></html>"#;

    #[test]
    fn test_parse_listing() {
        let papers = parse_listing(SAMPLE_HTML, 2023).unwrap();
        assert_eq!(papers.len(), 2);
        let p = &papers[0];
        assert_eq!(p.title, "Scaling Laws for Neural Retrieval");
        assert_eq!(p.authors.len(), 2);
        assert_eq!(p.year, 2023);
        assert_eq!(p.conference, "NeurIPS");
        assert_eq!(
            p.url.as_deref(),
            Some("https://papers.neurips.cc/paper/2023/hash/abc123-Abstract.html")
        );
        assert!(p.is_valid());
    }

    #[test]
    fn test_parse_listing_skips_untitled_entries() {
        let html = r#"<ul><li><a href="/paper/2023/x"></a></li></ul>"#;
        let papers = parse_listing(html, 2023).unwrap();
        assert!(papers.is_empty());
    }
}
