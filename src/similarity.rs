use std::collections::HashSet;

/// Threshold for opportunistic enrichment lookups by title.
pub const LOOKUP_THRESHOLD: f64 = 0.70;
/// Stricter threshold used when merging records across catalogs
/// (bibliography-sourced records carry less context, so a wrong match
/// is more costly).
pub const MERGE_THRESHOLD: f64 = 0.90;

/// Normalize a title for comparison: lowercase, punctuation to spaces,
/// collapsed whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_set(title: &str) -> HashSet<String> {
    normalize_title(title)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity between the normalized word sets of two titles.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Deep   Learning, for NLP!! "),
            "deep learning for nlp"
        );
    }

    #[test]
    fn test_jaccard_reflexive() {
        assert_eq!(jaccard("Attention Is All You Need", "Attention Is All You Need"), 1.0);
    }

    #[test]
    fn test_jaccard_symmetric() {
        let a = "Deep Learning for Program Repair";
        let b = "Program Repair with Deep Models";
        assert_eq!(jaccard(a, b), jaccard(b, a));
    }

    #[test]
    fn test_jaccard_ignores_case_and_punctuation() {
        assert_eq!(jaccard("Deep Learning for NLP", "deep learning for nlp!!"), 1.0);
    }

    #[test]
    fn test_jaccard_disjoint() {
        assert_eq!(jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_jaccard_empty() {
        assert_eq!(jaccard("", "something"), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        // {a, b} vs {a, c}: 1 shared of 3 total
        let score = jaccard("alpha beta", "alpha gamma");
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }
}
