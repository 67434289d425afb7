use std::fmt;

use serde_json::Value;

use crate::client::StoreClient;
use crate::collection::Collection;
use crate::error::StoreError;
use crate::query::Query;

const TOP_NARRATIVES: u32 = 20;

/// What the public dashboard reads: the latest report, the top narratives
/// by confidence and how many signals each source has collected.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub latest_report: Option<Value>,
    pub narratives: Vec<Value>,
    pub social_signals: u64,
    pub github_signals: u64,
    pub onchain_signals: u64,
}

impl DashboardSnapshot {
    /// Issue all five reads concurrently. Any failure fails the snapshot.
    pub async fn load(store: &StoreClient) -> Result<Self, StoreError> {
        let latest = Query::from(Collection::Reports)
            .order_desc("created_at")
            .limit(1);
        let top = Query::from(Collection::Narratives)
            .order_desc("confidence")
            .limit(TOP_NARRATIVES);

        let (reports, narratives, social, github, onchain) = tokio::try_join!(
            store.must_get(&latest),
            store.must_get(&top),
            store.count(Collection::SocialSignals),
            store.count(Collection::GithubSignals),
            store.count(Collection::OnchainSignals),
        )?;

        Ok(Self {
            latest_report: reports.into_iter().next(),
            narratives,
            social_signals: social,
            github_signals: github,
            onchain_signals: onchain,
        })
    }

    pub fn total_signals(&self) -> u64 {
        self.social_signals + self.github_signals + self.onchain_signals
    }
}

fn str_field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

impl fmt::Display for DashboardSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.latest_report {
            Some(report) => {
                writeln!(f, "Latest report: {}", str_field(report, "title"))?;
                writeln!(f, "  {}", str_field(report, "summary"))?;
            }
            None => writeln!(f, "Latest report: none yet")?,
        }
        writeln!(
            f,
            "Signals: social {} | github {} | onchain {} (total {})",
            self.social_signals,
            self.github_signals,
            self.onchain_signals,
            self.total_signals()
        )?;
        writeln!(f, "Narratives ({}):", self.narratives.len())?;
        for n in &self.narratives {
            let confidence = n.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
            writeln!(
                f,
                "  {:.2}  {} [{}, {}]",
                confidence,
                str_field(n, "narrative_name"),
                str_field(n, "status"),
                str_field(n, "category"),
            )?;
        }
        Ok(())
    }
}
