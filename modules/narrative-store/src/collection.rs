use std::fmt;

/// The six persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    SocialSignals,
    GithubSignals,
    OnchainSignals,
    Narratives,
    Reports,
    ScanRuns,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::SocialSignals,
        Collection::GithubSignals,
        Collection::OnchainSignals,
        Collection::Narratives,
        Collection::Reports,
        Collection::ScanRuns,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::SocialSignals => "social_signals",
            Collection::GithubSignals => "github_signals",
            Collection::OnchainSignals => "onchain_signals",
            Collection::Narratives => "narratives",
            Collection::Reports => "reports",
            Collection::ScanRuns => "scan_runs",
        }
    }

    /// Columns an upsert merges on. `None` means insert-only.
    pub fn conflict_key(&self) -> Option<&'static str> {
        match self {
            Collection::SocialSignals => Some("tweet_id"),
            Collection::GithubSignals => Some("repo_full_name,signal_type,captured_on"),
            Collection::OnchainSignals => Some("program_name,metric_name,captured_on"),
            Collection::Narratives => Some("report_period,narrative_slug"),
            Collection::Reports => None,
            Collection::ScanRuns => Some("id"),
        }
    }

    /// The natural-key columns as a list.
    pub fn key_columns(&self) -> Vec<&'static str> {
        self.conflict_key()
            .map(|k| k.split(',').collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_append_only() {
        assert_eq!(Collection::Reports.conflict_key(), None);
        assert!(Collection::Reports.key_columns().is_empty());
    }

    #[test]
    fn every_other_collection_has_a_natural_key() {
        for c in Collection::ALL.into_iter().filter(|c| *c != Collection::Reports) {
            assert!(!c.key_columns().is_empty(), "{c} has no key");
        }
        assert_eq!(
            Collection::Narratives.key_columns(),
            vec!["report_period", "narrative_slug"]
        );
    }
}
