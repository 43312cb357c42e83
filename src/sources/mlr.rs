use async_trait::async_trait;
use scraper::{Html, Selector};

use super::{short_hash, split_authors, Fetcher, Paper, PaperSource, SourceError};
use crate::cache::fingerprint;

const BASE_URL: &str = "https://proceedings.mlr.press";
const CONFERENCE: &str = "ICML";
const VENUE: &str = "International Conference on Machine Learning";

/// PMLR volume numbers for ICML proceedings.
const VOLUME_MAP: &[(u16, u32)] = &[
    (2015, 37),
    (2016, 48),
    (2017, 70),
    (2018, 80),
    (2019, 97),
    (2020, 119),
    (2021, 139),
    (2022, 162),
    (2023, 202),
    (2024, 235),
];

/// ICML papers from the PMLR proceedings site.
pub struct MlrSource {
    fetcher: Fetcher,
}

impl MlrSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

fn volume_for(year: u16) -> Option<u32> {
    VOLUME_MAP.iter().find(|(y, _)| *y == year).map(|(_, v)| *v)
}

#[async_trait]
impl PaperSource for MlrSource {
    fn name(&self) -> &str {
        "icml"
    }

    async fn list(&self, year: u16, limit: Option<usize>) -> Result<Vec<Paper>, SourceError> {
        let Some(volume) = volume_for(year) else {
            tracing::warn!(year, "no PMLR volume mapped for ICML, nothing to retrieve");
            return Ok(Vec::new());
        };
        let url = format!("{}/v{}/", BASE_URL, volume);
        let key = fingerprint(&["icml", "listing", &year.to_string()]);
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
    let entry_sel =
        Selector::parse("div.paper").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let title_sel =
        Selector::parse("p.title").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let authors_sel =
        Selector::parse("span.authors").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;
    let link_sel = Selector::parse("a").map_err(|e| SourceError::Parse(format!("{:?}", e)))?;

    let mut papers = Vec::new();
    for entry in document.select(&entry_sel) {
        let Some(title_el) = entry.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let authors = entry
            .select(&authors_sel)
            .next()
            .map(|el| {
                // Drop any trailing proceedings blurb after a semicolon.
                let text = el.text().collect::<String>();
                let names = text.split(';').next().unwrap_or("").to_string();
                split_authors(&names)
            })
            .unwrap_or_default();

        let mut abs_url = None;
        let mut pdf_url = None;
        for link in entry.select(&link_sel) {
            let href = link.value().attr("href").unwrap_or("");
            if href.ends_with(".pdf") && pdf_url.is_none() {
                pdf_url = Some(href.to_string());
            } else if href.ends_with(".html") && abs_url.is_none() {
                abs_url = Some(href.to_string());
            }
        }

        let mut paper = Paper::new(
            format!("icml_{}_{}", year, short_hash(&title)),
            title,
            authors,
            CONFERENCE,
            VENUE,
            year,
            "icml_website",
        );
        paper.url = abs_url;
        paper.pdf_url = pdf_url;
        papers.push(paper);
    }
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body>
      <div class="paper">
        <p class="title">Gradient Descent on Two-Layer Nets</p>
        <p class="details"><span class="authors">Ada Lovelace, Alan Turing;&nbsp;Proceedings of ICML</span></p>
        <p class="links">
          <a href="https://proceedings.mlr.press/v202/lovelace23a.html">abs</a>
          <a href="https://proceedings.mlr.press/v202/lovelace23a/lovelace23a.pdf">Download PDF</a>
        </p>
      </div>
      <div class="paper">
        <p class="title"></p>
      </div>
    </body></html>"#;

    #[test]
    fn test_parse_listing() {
        let papers = parse_listing(SAMPLE_HTML, 2023).unwrap();
        assert_eq!(papers.len(), 1);
        let p = &papers[0];
        assert_eq!(p.title, "Gradient Descent on Two-Layer Nets");
        assert_eq!(p.authors.len(), 2);
        assert!(p.url.as_deref().unwrap().ends_with(".html"));
        assert!(p.pdf_url.as_deref().unwrap().ends_with(".pdf"));
    }

    #[test]
    fn test_unmapped_year_has_no_volume() {
        assert!(volume_for(1999).is_none());
        assert_eq!(volume_for(2023), Some(202));
    }
}
