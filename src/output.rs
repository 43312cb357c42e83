use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::sources::Paper;

/// Write records as pretty-printed JSON, with a `_stats.txt` companion
/// summarizing the collection. The JSON write is atomic.
pub fn write_papers(papers: &mut Vec<Paper>, path: &Path) -> Result<()> {
    papers.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.title.cmp(&b.title)));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new_in("."),
    }
    .context("creating temporary output file")?;
    serde_json::to_writer_pretty(tmp.as_file(), papers).context("serializing papers")?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(count = papers.len(), path = %path.display(), "wrote papers");

    let stats_path = path.with_file_name(format!(
        "{}_stats.txt",
        path.file_stem().and_then(|s| s.to_str()).unwrap_or("papers")
    ));
    fs::write(&stats_path, generate_statistics(papers))
        .with_context(|| format!("writing {}", stats_path.display()))?;
    Ok(())
}

fn generate_statistics(papers: &[Paper]) -> String {
    let total = papers.len();
    let mut by_year: BTreeMap<u16, usize> = BTreeMap::new();
    let mut by_venue: BTreeMap<String, usize> = BTreeMap::new();
    for paper in papers {
        *by_year.entry(paper.year).or_default() += 1;
        *by_venue.entry(paper.conference.clone()).or_default() += 1;
    }
    let with_abstract = papers
        .iter()
        .filter(|p| p.abstract_text.as_deref().is_some_and(|a| !a.is_empty()))
        .count();
    let enriched = papers.iter().filter(|p| p.enriched).count();
    let pct = |n: usize| {
        if total == 0 {
            0.0
        } else {
            100.0 * n as f64 / total as f64
        }
    };

    let mut out = String::new();
    out.push_str(&format!("Total papers: {}\n\n", total));
    out.push_str("By year:\n");
    for (year, count) in by_year.iter().rev() {
        out.push_str(&format!("  {}: {}\n", year, count));
    }
    out.push_str("\nBy conference:\n");
    for (venue, count) in &by_venue {
        out.push_str(&format!("  {}: {}\n", venue, count));
    }
    out.push_str(&format!(
        "\nWith abstract: {} ({:.1}%)\n",
        with_abstract,
        pct(with_abstract)
    ));
    out.push_str(&format!("Enriched: {} ({:.1}%)\n", enriched, pct(enriched)));
    out
}

/// Load every `*.json` array of papers in a directory. A file that fails
/// to parse is skipped with a warning rather than aborting the run.
pub fn load_papers_from_dir(dir: &Path) -> Result<Vec<Paper>> {
    if !dir.is_dir() {
        bail!("input directory {} does not exist", dir.display());
    }
    let mut papers = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    for path in entries {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        match serde_json::from_str::<Vec<Paper>>(&content) {
            Ok(batch) => {
                tracing::info!(path = %path.display(), count = batch.len(), "loaded papers");
                papers.extend(batch);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unparseable file");
            }
        }
    }
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Paper;

    fn paper(title: &str, year: u16) -> Paper {
        Paper::new(
            format!("demo_{}_{}", year, title.len()),
            title.into(),
            vec![],
            "DEMO",
            "Demo Conference",
            year,
            "demo",
        )
    }

    #[test]
    fn test_write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo_2023.json");
        let mut papers = vec![paper("B Paper", 2022), paper("A Paper", 2023)];
        write_papers(&mut papers, &path).unwrap();

        let loaded = load_papers_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        // Sorted newest year first.
        assert_eq!(loaded[0].title, "A Paper");
        assert_eq!(loaded[0].year, 2023);
    }

    #[test]
    fn test_stats_companion_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo_2023.json");
        let mut papers = vec![paper("A Paper", 2023)];
        papers[0].abstract_text = Some("Abs".into());
        write_papers(&mut papers, &path).unwrap();

        let stats = std::fs::read_to_string(dir.path().join("demo_2023_stats.txt")).unwrap();
        assert!(stats.contains("Total papers: 1"));
        assert!(stats.contains("2023: 1"));
        assert!(stats.contains("With abstract: 1 (100.0%)"));
    }

    #[test]
    fn test_loader_skips_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.json");
        let mut papers = vec![paper("A Paper", 2023)];
        write_papers(&mut papers, &path).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let loaded = load_papers_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        assert!(load_papers_from_dir(Path::new("/nonexistent/dir")).is_err());
    }
}
