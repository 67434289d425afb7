// Narrative synthesis: read the window's signals, render a bounded summary,
// ask the reasoning service for narratives, then persist them and a report.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use ai_client::{extract_json_array, strip_code_blocks};
use narrative_common::{
    coerce_score, slugify, truncate_chars, BuildIdea, Category, Difficulty, FinancialSignal,
    Narrative, NarrativeStatus, Period, RepoSignal, Report, ReportData, SignalCounts,
    SocialSignal, WINDOW_DAYS,
};
use narrative_store::{Collection, Query, UpsertOutcome};

use crate::error::SynthesisError;
use crate::traits::{Reasoner, SignalStore};

const SOCIAL_READ_LIMIT: u32 = 100;
const GITHUB_READ_LIMIT: u32 = 50;
const ONCHAIN_READ_LIMIT: u32 = 50;

const SOCIAL_SUMMARY_LINES: usize = 50;
const GITHUB_SUMMARY_LINES: usize = 30;
const ONCHAIN_SUMMARY_LINES: usize = 30;
const SOCIAL_TEXT_CHARS: usize = 200;
const GITHUB_DESCRIPTION_CHARS: usize = 150;

/// How much of an unparseable response is logged.
const RESPONSE_PREVIEW_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    pub social: Vec<SocialSignal>,
    pub github: Vec<RepoSignal>,
    pub onchain: Vec<FinancialSignal>,
}

impl SignalSet {
    pub fn counts(&self) -> SignalCounts {
        SignalCounts {
            social: self.social.len(),
            github: self.github.len(),
            onchain: self.onchain.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }
}

fn decode_rows<T: DeserializeOwned>(collection: Collection, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!(collection = %collection, error = %e, "Skipping undecodable signal row");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Plain-text digest of the signals, grouped by source, for the user prompt.
pub fn render_summary(signals: &SignalSet) -> String {
    let mut out = String::from("## Social Signals (X/Twitter)\n");
    if signals.social.is_empty() {
        out.push_str("- No social signals collected yet\n");
    }
    for s in signals.social.iter().take(SOCIAL_SUMMARY_LINES) {
        let _ = writeln!(
            out,
            "- @{} [{}]: {} (keywords: {})",
            s.handle,
            s.category,
            truncate_chars(&s.tweet_text, SOCIAL_TEXT_CHARS),
            s.keywords_matched.join(", ")
        );
    }

    out.push_str("\n## GitHub Activity\n");
    if signals.github.is_empty() {
        out.push_str("- No GitHub signals collected yet\n");
    }
    for g in signals.github.iter().take(GITHUB_SUMMARY_LINES) {
        let _ = write!(out, "- {}: {} stars, {}", g.repo_full_name, g.stars, g.signal_type);
        if let Some(description) = g.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " - {}", truncate_chars(description, GITHUB_DESCRIPTION_CHARS));
        }
        out.push('\n');
    }

    out.push_str("\n## Onchain Metrics\n");
    if signals.onchain.is_empty() {
        out.push_str("- No onchain signals collected yet\n");
    }
    for o in signals.onchain.iter().take(ONCHAIN_SUMMARY_LINES) {
        let _ = write!(
            out,
            "- {}: {} = {}",
            o.program_name,
            o.metric_name,
            format_metric(o.metric_value)
        );
        if o.metric_delta != 0.0 && o.metric_delta.is_finite() {
            let _ = write!(out, " ({:+.1}%)", o.metric_delta);
        }
        let _ = writeln!(out, " [{}]", o.source);
    }

    out
}

/// Thousands-grouped with at most two decimals, e.g. `1,234,567.89`.
fn format_metric(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let rounded = format!("{:.2}", value.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let frac = frac_part.trim_end_matches('0');
    let sign = if value < 0.0 && rounded != "0.00" { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn system_prompt(ecosystem: &str) -> String {
    format!(
        "You are an expert {ecosystem} ecosystem analyst. Your job is to analyze raw signals \
         (social media posts, GitHub activity, onchain metrics) and identify emerging narratives \
         in the {ecosystem} ecosystem.\n\nYou must output valid JSON only, no markdown."
    )
}

pub fn user_prompt(ecosystem: &str, period: &Period, summary: &str) -> String {
    format!(
        r#"Analyze these signals from the past {WINDOW_DAYS} days ({start} to {end}) and identify 4-7 emerging or accelerating narratives in the {ecosystem} ecosystem.

{summary}
For each narrative, provide:
1. A clear name
2. A slug (kebab-case)
3. A 2-4 sentence description explaining what's happening and why it matters
4. Confidence score (0-1)
5. Status: "detected", "accelerating", "peaked", or "fading"
6. Category: "defi", "infra", "consumer", "depin", "gaming", "ai", or "other"
7. The number of supporting signals and brief references to them
8. 3-5 concrete build ideas that founders could execute on this narrative. Each build idea needs: title, description (2-3 sentences), difficulty (easy/medium/hard), and how it fits the narrative.

Output as a JSON array:
[{{
  "name": "Narrative Name",
  "slug": "narrative-name",
  "description": "What is happening...",
  "confidence": 0.8,
  "status": "accelerating",
  "category": "defi",
  "signal_count": 12,
  "supporting_signals": ["brief signal reference 1", "brief signal reference 2"],
  "build_ideas": [
    {{
      "title": "Build Idea Name",
      "description": "What to build and why...",
      "difficulty": "medium",
      "narrative_fit": "How this connects to the narrative"
    }}
  ]
}}]"#,
        start = period.start(),
        end = period.end(),
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Raw narrative objects from a response that should hold a JSON array,
/// possibly fenced or wrapped in prose.
pub fn parse_narratives(response: &str) -> Result<Vec<Value>, SynthesisError> {
    let body = strip_code_blocks(response);
    if let Ok(items) = serde_json::from_str::<Vec<Value>>(body) {
        return Ok(items);
    }
    let array = extract_json_array(body)
        .ok_or_else(|| SynthesisError::Parse("no JSON array in response".to_string()))?;
    serde_json::from_str(array).map_err(|e| SynthesisError::Parse(e.to_string()))
}

fn str_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn count_field(raw: &Value, key: &str) -> u32 {
    match raw.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn build_idea(raw: &Value) -> Option<BuildIdea> {
    Some(BuildIdea {
        title: str_field(raw, "title")?.to_string(),
        description: str_field(raw, "description").unwrap_or_default().to_string(),
        difficulty: str_field(raw, "difficulty")
            .map(Difficulty::from_lenient)
            .unwrap_or_default(),
        narrative_fit: str_field(raw, "narrative_fit").unwrap_or_default().to_string(),
    })
}

/// Coerce one raw narrative into the stored shape. `None` when it has no
/// usable name or slug.
pub fn normalize_narrative(raw: &Value, report_period: &str) -> Option<Narrative> {
    let name = str_field(raw, "name")?;
    let narrative_slug = slugify(str_field(raw, "slug").unwrap_or(name));
    if narrative_slug.is_empty() {
        return None;
    }

    let supporting_signals = raw
        .get("supporting_signals")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let build_ideas = raw
        .get("build_ideas")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(build_idea).collect())
        .unwrap_or_default();

    Some(Narrative {
        report_period: report_period.to_string(),
        narrative_name: name.to_string(),
        narrative_slug,
        description: str_field(raw, "description").unwrap_or_default().to_string(),
        confidence: coerce_score(raw.get("confidence").unwrap_or(&Value::Null)),
        status: str_field(raw, "status")
            .map(NarrativeStatus::from_lenient)
            .unwrap_or_default(),
        category: str_field(raw, "category")
            .map(Category::from_lenient)
            .unwrap_or_default(),
        signal_count: count_field(raw, "signal_count"),
        supporting_signals,
        build_ideas,
    })
}

pub fn build_report(
    ecosystem: &str,
    period: &Period,
    raw_narratives: Vec<Value>,
    narratives_count: usize,
    signal_counts: SignalCounts,
    published_at: DateTime<Utc>,
) -> Report {
    let total_signals = signal_counts.total();
    Report {
        period_start: period.start(),
        period_end: period.end(),
        title: format!(
            "{ecosystem} Narrative Report: {} to {}",
            period.start(),
            period.end()
        ),
        summary: format!(
            "{narratives_count} narratives detected from {total_signals} signals across social, GitHub, and onchain sources."
        ),
        narratives_count,
        total_signals,
        report_data: ReportData {
            narratives: raw_narratives,
            signal_counts,
        },
        published_at,
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOutcome {
    pub signal_counts: SignalCounts,
    pub narratives_parsed: usize,
    pub narratives_stored: usize,
    pub report_stored: bool,
}

impl std::fmt::Display for SynthesisOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Synthesis: {} signals ({} social, {} github, {} onchain), {} narratives parsed, {} stored, report {}",
            self.signal_counts.total(),
            self.signal_counts.social,
            self.signal_counts.github,
            self.signal_counts.onchain,
            self.narratives_parsed,
            self.narratives_stored,
            if self.report_stored { "stored" } else { "not stored" },
        )
    }
}

pub struct Synthesizer {
    store: Arc<dyn SignalStore>,
    reasoner: Arc<dyn Reasoner>,
    ecosystem: String,
}

impl Synthesizer {
    pub fn new(
        store: Arc<dyn SignalStore>,
        reasoner: Arc<dyn Reasoner>,
        ecosystem: impl Into<String>,
    ) -> Self {
        Self {
            store,
            reasoner,
            ecosystem: ecosystem.into(),
        }
    }

    /// The three signal reads for the window, issued concurrently.
    pub async fn read_signals(&self, period: &Period) -> Result<SignalSet, SynthesisError> {
        let social = Query::from(Collection::SocialSignals)
            .created_since(period.since)
            .order_desc("signal_strength")
            .limit(SOCIAL_READ_LIMIT);
        let github = Query::from(Collection::GithubSignals)
            .created_since(period.since)
            .order_desc("stars")
            .limit(GITHUB_READ_LIMIT);
        let onchain = Query::from(Collection::OnchainSignals)
            .created_since(period.since)
            .order_desc("created_at")
            .limit(ONCHAIN_READ_LIMIT);

        let (social, github, onchain) = futures::try_join!(
            self.store.must_get(&social),
            self.store.must_get(&github),
            self.store.must_get(&onchain),
        )
        .map_err(SynthesisError::Read)?;

        Ok(SignalSet {
            social: decode_rows(Collection::SocialSignals, social),
            github: decode_rows(Collection::GithubSignals, github),
            onchain: decode_rows(Collection::OnchainSignals, onchain),
        })
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<SynthesisOutcome, SynthesisError> {
        let period = Period::rolling(now);
        let signals = self.read_signals(&period).await?;
        let counts = signals.counts();
        info!(
            social = counts.social,
            github = counts.github,
            onchain = counts.onchain,
            "Signals collected"
        );

        let mut outcome = SynthesisOutcome {
            signal_counts: counts,
            ..Default::default()
        };
        if signals.is_empty() {
            warn!("No signals in the window, skipping narrative generation");
            return Ok(outcome);
        }

        let summary = render_summary(&signals);
        let response = self
            .reasoner
            .complete(
                &system_prompt(&self.ecosystem),
                &user_prompt(&self.ecosystem, &period, &summary),
            )
            .await
            .map_err(SynthesisError::Reasoning)?;

        let raw_narratives = match parse_narratives(&response) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    error = %e,
                    response = truncate_chars(&response, RESPONSE_PREVIEW_CHARS),
                    "Could not parse reasoning response"
                );
                return Ok(outcome);
            }
        };
        outcome.narratives_parsed = raw_narratives.len();

        let label = period.label();
        let narratives: Vec<Narrative> = raw_narratives
            .iter()
            .filter_map(|raw| normalize_narrative(raw, &label))
            .collect();
        if narratives.len() < raw_narratives.len() {
            warn!(
                dropped = raw_narratives.len() - narratives.len(),
                "Dropped narratives without a name"
            );
        }

        for narrative in &narratives {
            info!(
                name = narrative.narrative_name.as_str(),
                status = %narrative.status,
                confidence = narrative.confidence,
                build_ideas = narrative.build_ideas.len(),
                "Narrative"
            );
            let Ok(record) = serde_json::to_value(narrative) else {
                continue;
            };
            match self.store.try_upsert(Collection::Narratives, &record).await {
                UpsertOutcome::Stored(_) => outcome.narratives_stored += 1,
                UpsertOutcome::Skipped { reason } => {
                    warn!(slug = narrative.narrative_slug.as_str(), reason = reason.as_str(), "Narrative write skipped");
                }
            }
        }

        let report = build_report(
            &self.ecosystem,
            &period,
            raw_narratives,
            narratives.len(),
            counts,
            Utc::now(),
        );
        match serde_json::to_value(&report) {
            Ok(record) => {
                outcome.report_stored = self
                    .store
                    .try_upsert(Collection::Reports, &record)
                    .await
                    .is_stored();
            }
            Err(e) => warn!(error = %e, "Could not encode report"),
        }
        if !outcome.report_stored {
            warn!(period = label.as_str(), "Report was not stored");
        }

        info!(%outcome, period = label.as_str(), "Narrative generation complete");
        Ok(outcome)
    }
}
