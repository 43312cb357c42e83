use std::collections::HashMap;

use crate::similarity::normalize_title;
use crate::sources::Paper;

/// Identity key for a record: DOI when present, then Semantic Scholar id,
/// then the normalized title. Records sharing a key are the same paper.
fn group_key(paper: &Paper) -> String {
    if let Some(doi) = paper.doi.as_deref().filter(|d| !d.trim().is_empty()) {
        return format!("doi:{}", doi.trim().to_lowercase());
    }
    if let Some(id) = paper
        .semantic_scholar_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return format!("ss:{}", id.trim());
    }
    format!("title:{}", normalize_title(&paper.title))
}

/// Collapse duplicate records, keeping first-seen order of the surviving
/// keys. Within a cluster the richer record survives and gaps in it are
/// backfilled from the losers.
pub fn deduplicate(papers: Vec<Paper>) -> Vec<Paper> {
    let before = papers.len();
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Paper> = HashMap::new();

    for paper in papers {
        let key = group_key(&paper);
        match by_key.remove(&key) {
            Some(existing) => {
                by_key.insert(key, merge(existing, paper));
            }
            None => {
                order.push(key.clone());
                by_key.insert(key, paper);
            }
        }
    }

    let result: Vec<Paper> = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();
    if result.len() < before {
        tracing::info!(before, after = result.len(), "deduplicated records");
    }
    result
}

fn merge(earlier: Paper, later: Paper) -> Paper {
    if prefer_later(&earlier, &later) {
        backfill(later, &earlier)
    } else {
        backfill(earlier, &later)
    }
}

/// Survivor selection: abstract presence, then citation count (a known
/// count beats an unknown one), then the enriched flag. Ties keep the
/// earlier record.
fn prefer_later(earlier: &Paper, later: &Paper) -> bool {
    let has_abstract = |p: &Paper| p.abstract_text.as_deref().is_some_and(|a| !a.is_empty());
    match (has_abstract(earlier), has_abstract(later)) {
        (false, true) => return true,
        (true, false) => return false,
        _ => {}
    }
    // Option<u32> orders None below Some, which is what we want.
    match earlier.citation_count.cmp(&later.citation_count) {
        std::cmp::Ordering::Less => return true,
        std::cmp::Ordering::Greater => return false,
        std::cmp::Ordering::Equal => {}
    }
    !earlier.enriched && later.enriched
}

/// Fill the survivor's missing fields from the losing duplicate. Title,
/// year, and venue are identity fields and never taken from the loser.
fn backfill(mut survivor: Paper, loser: &Paper) -> Paper {
    fn fill(slot: &mut Option<String>, other: &Option<String>) {
        if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
            if let Some(v) = other.as_deref().filter(|v| !v.trim().is_empty()) {
                *slot = Some(v.to_string());
            }
        }
    }
    fill(&mut survivor.abstract_text, &loser.abstract_text);
    fill(&mut survivor.url, &loser.url);
    fill(&mut survivor.pdf_url, &loser.pdf_url);
    fill(&mut survivor.doi, &loser.doi);
    fill(&mut survivor.arxiv_id, &loser.arxiv_id);
    fill(&mut survivor.semantic_scholar_id, &loser.semantic_scholar_id);
    if survivor.citation_count.is_none() {
        survivor.citation_count = loser.citation_count;
    }
    if survivor.reference_count.is_none() {
        survivor.reference_count = loser.reference_count;
    }
    if survivor.authors.is_empty() {
        survivor.authors = loser.authors.clone();
    }
    if survivor.keywords.is_empty() {
        survivor.keywords = loser.keywords.clone();
    }
    if survivor.fields_of_study.is_empty() {
        survivor.fields_of_study = loser.fields_of_study.clone();
    }
    survivor.enriched = survivor.enriched || loser.enriched;
    survivor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, title: &str) -> Paper {
        Paper::new(
            id.into(),
            title.into(),
            vec![],
            "DEMO",
            "Demo Conference",
            2023,
            "demo",
        )
    }

    #[test]
    fn test_doi_duplicates_prefer_abstract() {
        let mut a = paper("a", "Paper One");
        a.doi = Some("10.1/X".into());
        let mut b = paper("b", "Paper One (extended)");
        b.doi = Some("10.1/x".into());
        b.abstract_text = Some("An abstract.".into());
        b.url = Some("https://example.org/b".into());

        let result = deduplicate(vec![a, b]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].paper_id, "b");
        assert_eq!(result[0].abstract_text.as_deref(), Some("An abstract."));
    }

    #[test]
    fn test_title_variants_collapse() {
        let result = deduplicate(vec![
            paper("a", "Deep Learning for NLP"),
            paper("b", "deep learning for nlp!!"),
            paper("c", "DEEP LEARNING FOR NLP"),
        ]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].paper_id, "a");
    }

    #[test]
    fn test_cluster_of_five_collapses_to_one() {
        let papers: Vec<Paper> = (0..5)
            .map(|i| paper(&format!("p{}", i), "Same Title"))
            .collect();
        assert_eq!(deduplicate(papers).len(), 1);
    }

    #[test]
    fn test_citation_count_breaks_tie() {
        let mut a = paper("a", "Same Title");
        a.citation_count = Some(3);
        let mut b = paper("b", "Same Title");
        b.citation_count = Some(50);
        let result = deduplicate(vec![a, b]);
        assert_eq!(result[0].paper_id, "b");
    }

    #[test]
    fn test_known_count_beats_unknown() {
        let a = paper("a", "Same Title");
        let mut b = paper("b", "Same Title");
        b.citation_count = Some(0);
        let result = deduplicate(vec![a, b]);
        assert_eq!(result[0].paper_id, "b");
    }

    #[test]
    fn test_backfill_from_loser() {
        let mut a = paper("a", "Same Title");
        a.abstract_text = Some("Abs".into());
        let mut b = paper("b", "Same Title");
        b.pdf_url = Some("https://example.org/b.pdf".into());

        let result = deduplicate(vec![a, b]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].paper_id, "a");
        assert_eq!(result[0].pdf_url.as_deref(), Some("https://example.org/b.pdf"));
        assert_eq!(result[0].abstract_text.as_deref(), Some("Abs"));
    }

    #[test]
    fn test_distinct_papers_survive_in_order() {
        let result = deduplicate(vec![
            paper("a", "First Paper"),
            paper("b", "Second Paper"),
            paper("c", "Third Paper"),
        ]);
        let ids: Vec<&str> = result.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
