use crate::sources::Paper;

/// How keyword groups combine: every group must match, or any one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MatchMode {
    All,
    Any,
}

/// Keyword filter over title and abstract. Each group is a set of
/// alternatives; a group matches when any of its keywords appears as a
/// case-insensitive substring.
pub struct KeywordFilter {
    groups: Vec<Vec<String>>,
    mode: MatchMode,
}

impl KeywordFilter {
    pub fn new(groups: Vec<Vec<String>>, mode: MatchMode) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|group: &Vec<String>| !group.is_empty())
            .collect();
        Self { groups, mode }
    }

    pub fn matches(&self, paper: &Paper) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        let haystack = format!(
            "{} {}",
            paper.title,
            paper.abstract_text.as_deref().unwrap_or("")
        )
        .to_lowercase();
        let group_hit =
            |group: &Vec<String>| group.iter().any(|keyword| haystack.contains(keyword));
        match self.mode {
            MatchMode::All => self.groups.iter().all(group_hit),
            MatchMode::Any => self.groups.iter().any(group_hit),
        }
    }

    pub fn apply(&self, papers: Vec<Paper>) -> Vec<Paper> {
        let before = papers.len();
        let kept: Vec<Paper> = papers.into_iter().filter(|p| self.matches(p)).collect();
        tracing::info!(before, after = kept.len(), "applied keyword filter");
        kept
    }
}

/// Default keyword groups: papers about agents that also touch coding
/// and security.
pub fn default_groups() -> Vec<Vec<String>> {
    vec![
        vec!["agent".into(), "agentic".into(), "llm agent".into()],
        vec![
            "code".into(),
            "coding".into(),
            "software".into(),
            "program".into(),
            "repository".into(),
        ],
        vec![
            "security".into(),
            "vulnerability".into(),
            "exploit".into(),
            "attack".into(),
            "malware".into(),
            "safety".into(),
        ],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str, abstract_text: Option<&str>) -> Paper {
        let mut p = Paper::new(
            "x".into(),
            title.into(),
            vec![],
            "DEMO",
            "Demo Conference",
            2023,
            "demo",
        );
        p.abstract_text = abstract_text.map(str::to_string);
        p
    }

    #[test]
    fn test_all_mode_requires_every_group() {
        let filter = KeywordFilter::new(
            vec![
                vec!["agent".into()],
                vec!["security".into()],
                vec!["code".into()],
            ],
            MatchMode::All,
        );
        assert!(filter.matches(&paper(
            "Security Agents",
            Some("LLM agents that patch vulnerable code.")
        )));
        // Missing the security group.
        assert!(!filter.matches(&paper("Coding Agents", Some("Agents that write code."))));
    }

    #[test]
    fn test_any_mode_needs_one_group() {
        let filter = KeywordFilter::new(
            vec![vec!["agent".into()], vec!["security".into()]],
            MatchMode::Any,
        );
        assert!(filter.matches(&paper("A Security Study", None)));
        assert!(!filter.matches(&paper("Gradient Descent", None)));
    }

    #[test]
    fn test_matching_is_case_insensitive_substring() {
        let filter = KeywordFilter::new(vec![vec!["agent".into()]], MatchMode::All);
        assert!(filter.matches(&paper("Multi-AGENT Systems", None)));
        // Substring semantics: "agent" matches inside "agentic".
        assert!(filter.matches(&paper("Agentic Workflows", None)));
    }

    #[test]
    fn test_empty_groups_match_everything() {
        let filter = KeywordFilter::new(vec![vec!["  ".into()]], MatchMode::All);
        assert!(filter.matches(&paper("Anything", None)));
    }

    #[test]
    fn test_apply_filters_list() {
        let filter = KeywordFilter::new(vec![vec!["fuzzing".into()]], MatchMode::All);
        let kept = filter.apply(vec![
            paper("Fuzzing the Kernel", None),
            paper("Unrelated", None),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Fuzzing the Kernel");
    }
}
