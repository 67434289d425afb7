use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use serde_json::json;
use tracing::{info, warn};

use narrative_common::{classify, FinancialSignal};
use narrative_sources::defillama::{ChainTvlPoint, ProtocolDetail, ProtocolSummary};
use narrative_store::Collection;

use super::{pace, store_signal};
use crate::traits::{is_fatal, MetricSource, SignalStore};

/// Protocols below this TVL (USD) are not recorded.
pub const MIN_PROTOCOL_TVL: f64 = 100_000.0;
/// Absolute 14-day change (percent) that makes a protocol a big mover.
pub const BIG_MOVER_PCT: f64 = 20.0;
/// How many ranked protocols are taken by 7-day change.
pub const TOP_MOVERS: usize = 10;
/// History entries back to the comparison point (daily series).
const LOOKBACK_ENTRIES: usize = 14;

const SOURCE_TAG: &str = "defillama";
const SIGNAL_TYPE: &str = "tvl_change";

/// Percent change from the entry `LOOKBACK_ENTRIES` before the latest (or the
/// oldest available) to `current`. Zero when there is nothing positive to
/// compare against.
pub fn percent_delta(current: f64, history: &[f64]) -> f64 {
    match comparison_point(history) {
        Some(prior) if prior > 0.0 && prior.is_finite() && current.is_finite() => {
            (current - prior) / prior * 100.0
        }
        _ => 0.0,
    }
}

fn comparison_point(history: &[f64]) -> Option<f64> {
    match history.len().checked_sub(LOOKBACK_ENTRIES + 1) {
        Some(idx) => history.get(idx).copied(),
        None => history.first().copied(),
    }
}

pub fn chain_signal(
    chain: &str,
    points: &[ChainTvlPoint],
    captured_on: NaiveDate,
) -> Option<FinancialSignal> {
    let latest = points.last()?;
    let history: Vec<f64> = points.iter().map(|p| p.tvl).collect();
    let delta = percent_delta(latest.tvl, &history);
    let previous = comparison_point(&history);
    let date = DateTime::from_timestamp(latest.date, 0).map(|d| d.to_rfc3339());

    Some(FinancialSignal {
        signal_type: SIGNAL_TYPE.to_string(),
        program_name: format!("{chain} (chain)"),
        metric_name: "total_tvl".to_string(),
        metric_value: latest.tvl,
        metric_delta: delta,
        source: SOURCE_TAG.to_string(),
        metadata: json!({
            "current": latest.tvl,
            "previous": previous,
            "deltaPercent": delta,
            "date": date,
        }),
        category: classify(&format!("{chain} tvl")),
        captured_on,
        created_at: None,
    })
}

/// `None` when the protocol's TVL on `chain` is under the materiality floor.
pub fn protocol_signal(
    detail: &ProtocolDetail,
    chain: &str,
    captured_on: NaiveDate,
) -> Option<FinancialSignal> {
    let current = detail.current_tvl(chain);
    if current < MIN_PROTOCOL_TVL {
        return None;
    }
    let category = detail.category.as_deref().unwrap_or_default();

    Some(FinancialSignal {
        signal_type: SIGNAL_TYPE.to_string(),
        program_name: detail.name.clone(),
        metric_name: "protocol_tvl".to_string(),
        metric_value: current,
        metric_delta: percent_delta(current, &detail.tvl_history(chain)),
        source: SOURCE_TAG.to_string(),
        metadata: json!({
            "slug": detail.slug,
            "category": detail.category,
            "url": detail.url,
        }),
        category: classify(&format!("{} {category}", detail.name)),
        captured_on,
        created_at: None,
    })
}

pub fn ranked_signal(summary: &ProtocolSummary, captured_on: NaiveDate) -> FinancialSignal {
    let category = summary.category.as_deref().unwrap_or_default();
    FinancialSignal {
        signal_type: SIGNAL_TYPE.to_string(),
        program_name: summary.name.clone(),
        metric_name: "tvl_7d_growth".to_string(),
        metric_value: summary.tvl.unwrap_or(0.0),
        metric_delta: summary.change_7d.unwrap_or(0.0),
        source: SOURCE_TAG.to_string(),
        metadata: json!({
            "slug": summary.slug,
            "category": summary.category,
            "change_1d": summary.change_1d,
            "change_7d": summary.change_7d,
        }),
        category: classify(&format!("{} {category}", summary.name)),
        captured_on,
        created_at: None,
    }
}

/// Protocols on `chain`, best 7-day change first, capped at `TOP_MOVERS`.
pub fn top_movers(protocols: Vec<ProtocolSummary>, chain: &str) -> Vec<ProtocolSummary> {
    let mut on_chain: Vec<ProtocolSummary> = protocols
        .into_iter()
        .filter(|p| p.chains.iter().any(|c| c == chain))
        .collect();
    on_chain.sort_by(|a, b| {
        b.change_7d
            .unwrap_or(0.0)
            .total_cmp(&a.change_7d.unwrap_or(0.0))
    });
    on_chain.truncate(TOP_MOVERS);
    on_chain
}

pub struct MetricScanner {
    source: Arc<dyn MetricSource>,
    store: Arc<dyn SignalStore>,
    chain: String,
    protocols: Vec<String>,
    delay: Duration,
}

impl MetricScanner {
    pub fn new(
        source: Arc<dyn MetricSource>,
        store: Arc<dyn SignalStore>,
        chain: impl Into<String>,
        protocols: Vec<String>,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            store,
            chain: chain.into(),
            protocols,
            delay,
        }
    }

    pub async fn run(&self, captured_on: NaiveDate) -> Result<u32> {
        info!(chain = self.chain.as_str(), protocols = self.protocols.len(), "Starting onchain scan");
        let mut stored = 0u32;

        match self.source.chain_tvl_history(&self.chain).await {
            Ok(points) => match chain_signal(&self.chain, &points, captured_on) {
                Some(signal) => {
                    info!(
                        tvl = signal.metric_value,
                        delta_pct = signal.metric_delta,
                        "Chain TVL"
                    );
                    if store_signal(self.store.as_ref(), Collection::OnchainSignals, &signal).await {
                        stored += 1;
                    }
                }
                None => warn!(chain = self.chain.as_str(), "Chain TVL history was empty"),
            },
            Err(e) if is_fatal(&e) => return Err(e.context("metrics source unavailable")),
            Err(e) => warn!(chain = self.chain.as_str(), error = %e, "Chain TVL fetch failed"),
        }

        let mut captured: HashSet<String> = HashSet::new();
        let mut movers: Vec<(String, f64)> = Vec::new();
        for (i, slug) in self.protocols.iter().enumerate() {
            if i > 0 {
                pace(self.delay).await;
            }
            let detail = match self.source.protocol(slug).await {
                Ok(detail) => detail,
                Err(e) if is_fatal(&e) => return Err(e.context("metrics source unavailable")),
                Err(e) => {
                    warn!(slug = slug.as_str(), error = %e, "Protocol fetch failed, skipping");
                    continue;
                }
            };
            let Some(signal) = protocol_signal(&detail, &self.chain, captured_on) else {
                continue;
            };

            captured.insert(detail.slug.clone().unwrap_or_else(|| slug.clone()));
            if signal.metric_delta.abs() > BIG_MOVER_PCT {
                movers.push((signal.program_name.clone(), signal.metric_delta));
            }
            if store_signal(self.store.as_ref(), Collection::OnchainSignals, &signal).await {
                stored += 1;
            }
        }

        movers.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (name, delta) in &movers {
            info!(protocol = name.as_str(), delta_pct = format!("{delta:+.1}"), "Big mover");
        }

        match self.source.protocols().await {
            Ok(all) => {
                for summary in top_movers(all, &self.chain) {
                    if summary.slug.as_ref().is_some_and(|s| captured.contains(s)) {
                        continue;
                    }
                    let signal = ranked_signal(&summary, captured_on);
                    if store_signal(self.store.as_ref(), Collection::OnchainSignals, &signal).await {
                        stored += 1;
                    }
                }
            }
            Err(e) if is_fatal(&e) => return Err(e.context("metrics source unavailable")),
            Err(e) => warn!(error = %e, "Protocol ranking fetch failed"),
        }

        info!(stored, "Onchain scan complete");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockMetricSource, MockStore};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 18).unwrap()
    }

    fn summary(name: &str, slug: &str, chain: &str, change_7d: Option<f64>) -> ProtocolSummary {
        ProtocolSummary {
            name: name.into(),
            slug: Some(slug.into()),
            category: Some("Dexes".into()),
            chains: vec![chain.into()],
            tvl: Some(1_000_000.0),
            change_1d: Some(1.0),
            change_7d,
        }
    }

    fn detail(name: &str, slug: &str, current: f64, history: &[f64]) -> ProtocolDetail {
        serde_json::from_value(json!({
            "name": name,
            "slug": slug,
            "category": "Liquid Staking",
            "currentChainTvls": { "Solana": current },
            "chainTvls": {
                "Solana": {
                    "tvl": history
                        .iter()
                        .enumerate()
                        .map(|(i, v)| json!({ "date": i, "totalLiquidityUSD": v }))
                        .collect::<Vec<_>>()
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn delta_uses_fourteen_entries_back() {
        let mut history = vec![50.0];
        history.extend(std::iter::repeat(100.0).take(14));
        history.push(150.0);
        // 16 entries: latest is index 15, comparison is index 1.
        assert_eq!(percent_delta(150.0, &history), 50.0);
    }

    #[test]
    fn delta_falls_back_to_oldest() {
        assert_eq!(percent_delta(120.0, &[100.0, 110.0, 120.0]), 20.0);
        assert_eq!(percent_delta(120.0, &[]), 0.0);
        assert_eq!(percent_delta(120.0, &[0.0, 120.0]), 0.0);
    }

    #[test]
    fn chain_signal_carries_metadata() {
        let points = vec![
            ChainTvlPoint { date: 1_760_000_000, tvl: 8.0e9 },
            ChainTvlPoint { date: 1_760_086_400, tvl: 1.0e10 },
        ];
        let signal = chain_signal("Solana", &points, today()).unwrap();
        assert_eq!(signal.program_name, "Solana (chain)");
        assert_eq!(signal.metric_name, "total_tvl");
        assert_eq!(signal.metric_delta, 25.0);
        assert_eq!(signal.metadata["previous"], 8.0e9);
        assert!(signal.metadata["date"].is_string());
        assert!(chain_signal("Solana", &[], today()).is_none());
    }

    #[test]
    fn small_protocols_are_skipped() {
        assert!(protocol_signal(&detail("Tiny", "tiny", 99_999.0, &[]), "Solana", today()).is_none());
        let signal =
            protocol_signal(&detail("Jito", "jito", 2.0e9, &[1.0e9, 2.0e9]), "Solana", today()).unwrap();
        assert_eq!(signal.metric_name, "protocol_tvl");
        assert_eq!(signal.metric_delta, 100.0);
        assert_eq!(signal.metadata["slug"], "jito");
    }

    #[test]
    fn top_movers_filters_chain_and_orders_by_change() {
        let mut all = vec![
            summary("Elsewhere", "elsewhere", "Ethereum", Some(500.0)),
            summary("Flat", "flat", "Solana", None),
            summary("Rocket", "rocket", "Solana", Some(80.0)),
            summary("Dip", "dip", "Solana", Some(-10.0)),
        ];
        for i in 0..12 {
            all.push(summary(&format!("P{i}"), &format!("p{i}"), "Solana", Some(i as f64)));
        }
        let top = top_movers(all, "Solana");
        assert_eq!(top.len(), TOP_MOVERS);
        assert_eq!(top[0].name, "Rocket");
        assert!(top.iter().all(|p| p.name != "Elsewhere"));
        assert!(top.iter().all(|p| p.name != "Dip"));
    }

    #[tokio::test]
    async fn scan_records_chain_protocols_and_new_movers() {
        let store = Arc::new(MockStore::new());
        let source = MockMetricSource::new()
            .with_chain_history(vec![
                ChainTvlPoint { date: 1_760_000_000, tvl: 8.0e9 },
                ChainTvlPoint { date: 1_760_086_400, tvl: 1.0e10 },
            ])
            .on_protocol(detail("Jito", "jito", 2.0e9, &[1.0e9, 2.0e9]))
            .on_protocol(detail("Tiny", "tiny", 10.0, &[]))
            .with_ranking(vec![
                summary("Jito", "jito", "Solana", Some(40.0)),
                summary("Rocket", "rocket", "Solana", Some(80.0)),
            ]);
        let scanner = MetricScanner::new(
            Arc::new(source),
            store.clone(),
            "Solana",
            vec!["jito".into(), "tiny".into(), "missing".into()],
            Duration::ZERO,
        );

        let stored = scanner.run(today()).await.unwrap();
        assert_eq!(stored, 3);

        let metrics: Vec<(String, String)> = store
            .rows(Collection::OnchainSignals)
            .iter()
            .map(|r| {
                (
                    r["program_name"].as_str().unwrap().to_string(),
                    r["metric_name"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            metrics,
            vec![
                ("Solana (chain)".to_string(), "total_tvl".to_string()),
                ("Jito".to_string(), "protocol_tvl".to_string()),
                ("Rocket".to_string(), "tvl_7d_growth".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn rescan_on_same_day_overwrites() {
        let store = Arc::new(MockStore::new());
        let scanner = MetricScanner::new(
            Arc::new(MockMetricSource::new().on_protocol(detail("Jito", "jito", 2.0e9, &[1.0e9]))),
            store.clone(),
            "Solana",
            vec!["jito".into()],
            Duration::ZERO,
        );
        scanner.run(today()).await.unwrap();
        scanner.run(today()).await.unwrap();
        assert_eq!(store.rows(Collection::OnchainSignals).len(), 1);
    }

    #[tokio::test]
    async fn unavailable_source_fails_the_phase() {
        let scanner = MetricScanner::new(
            Arc::new(MockMetricSource::new().unavailable("llama is down")),
            Arc::new(MockStore::new()),
            "Solana",
            vec!["jito".into()],
            Duration::ZERO,
        );
        assert!(scanner.run(today()).await.is_err());
    }
}
