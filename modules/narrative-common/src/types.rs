use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Period ---

/// Length of the rolling window signals are collected and synthesized over.
pub const WINDOW_DAYS: i64 = 14;

/// The rolling `[now - 14d, now]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Period {
    pub fn rolling(now: DateTime<Utc>) -> Self {
        Self {
            since: now - Duration::days(WINDOW_DAYS),
            until: now,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.since.date_naive()
    }

    pub fn end(&self) -> NaiveDate {
        self.until.date_naive()
    }

    /// Narrative period key, e.g. `2025-10-04_2025-10-18`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.start(), self.end())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.since
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Defi,
    Infra,
    Consumer,
    Depin,
    Gaming,
    Ai,
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Defi,
        Category::Infra,
        Category::Consumer,
        Category::Depin,
        Category::Gaming,
        Category::Ai,
        Category::Other,
    ];

    /// Case-insensitive parse; anything outside the closed set is `Other`.
    pub fn from_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "defi" => Category::Defi,
            "infra" => Category::Infra,
            "consumer" => Category::Consumer,
            "depin" => Category::Depin,
            "gaming" => Category::Gaming,
            "ai" => Category::Ai,
            _ => Category::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Defi => write!(f, "defi"),
            Category::Infra => write!(f, "infra"),
            Category::Consumer => write!(f, "consumer"),
            Category::Depin => write!(f, "depin"),
            Category::Gaming => write!(f, "gaming"),
            Category::Ai => write!(f, "ai"),
            Category::Other => write!(f, "other"),
        }
    }
}

// --- Social ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweets: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<u64>,
}

impl Engagement {
    /// Weighted engagement: reposts count double, replies one and a half.
    pub fn weighted_total(&self) -> f64 {
        self.likes.unwrap_or(0) as f64
            + self.retweets.unwrap_or(0) as f64 * 2.0
            + self.replies.unwrap_or(0) as f64 * 1.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSignal {
    pub source: String,
    pub handle: String,
    pub tweet_id: String,
    pub tweet_text: String,
    pub tweet_url: String,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub keywords_matched: Vec<String>,
    #[serde(default)]
    pub category: Category,
    pub signal_strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

// --- Repository ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoSignalKind {
    /// On the tracked roster.
    Tracked,
    /// Created inside the window with a star floor.
    NewRepo,
    /// Recently pushed to with a higher star floor.
    ActivitySpike,
}

impl std::fmt::Display for RepoSignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoSignalKind::Tracked => write!(f, "tracked"),
            RepoSignalKind::NewRepo => write!(f, "new_repo"),
            RepoSignalKind::ActivitySpike => write!(f, "activity_spike"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSignal {
    pub repo_full_name: String,
    pub repo_url: String,
    pub stars: u64,
    #[serde(default)]
    pub stars_delta: i64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub open_issues: u64,
    #[serde(default)]
    pub recent_commits: u32,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub last_push_at: Option<DateTime<Utc>>,
    pub signal_type: RepoSignalKind,
    #[serde(default)]
    pub category: Category,
    pub captured_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

// --- Financial ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSignal {
    pub signal_type: String,
    pub program_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    #[serde(default)]
    pub metric_delta: f64,
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub category: Category,
    pub captured_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

// --- Narrative Types ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeStatus {
    #[default]
    Detected,
    Accelerating,
    Peaked,
    Fading,
}

impl NarrativeStatus {
    /// Unrecognized values collapse to `Detected`.
    pub fn from_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "accelerating" => NarrativeStatus::Accelerating,
            "peaked" => NarrativeStatus::Peaked,
            "fading" => NarrativeStatus::Fading,
            _ => NarrativeStatus::Detected,
        }
    }
}

impl std::fmt::Display for NarrativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrativeStatus::Detected => write!(f, "detected"),
            NarrativeStatus::Accelerating => write!(f, "accelerating"),
            NarrativeStatus::Peaked => write!(f, "peaked"),
            NarrativeStatus::Fading => write!(f, "fading"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildIdea {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub narrative_fit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub report_period: String,
    pub narrative_name: String,
    pub narrative_slug: String,
    pub description: String,
    pub confidence: f64,
    pub status: NarrativeStatus,
    pub category: Category,
    pub signal_count: u32,
    #[serde(default)]
    pub supporting_signals: Vec<String>,
    #[serde(default)]
    pub build_ideas: Vec<BuildIdea>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub social: usize,
    pub github: usize,
    pub onchain: usize,
}

impl SignalCounts {
    pub fn total(&self) -> usize {
        self.social + self.github + self.onchain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// Narratives exactly as the reasoning service returned them.
    pub narratives: Vec<serde_json::Value>,
    pub signal_counts: SignalCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub title: String,
    pub summary: String,
    pub narratives_count: usize,
    pub total_signals: usize,
    pub report_data: ReportData,
    pub published_at: DateTime<Utc>,
}

// --- Scan Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Social,
    Repository,
    Financial,
    Synthesis,
}

impl ScanPhase {
    /// Execution order of one invocation.
    pub const ORDER: [ScanPhase; 4] = [
        ScanPhase::Social,
        ScanPhase::Repository,
        ScanPhase::Financial,
        ScanPhase::Synthesis,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ScanPhase::Social => "Social scan",
            ScanPhase::Repository => "GitHub scan",
            ScanPhase::Financial => "Onchain scan",
            ScanPhase::Synthesis => "Narrative generation",
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPhase::Social => write!(f, "social"),
            ScanPhase::Repository => write!(f, "repository"),
            ScanPhase::Financial => write!(f, "financial"),
            ScanPhase::Synthesis => write!(f, "synthesis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    Failed,
}

/// Longest error message persisted on a scan run.
pub const MAX_RUN_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: Uuid,
    pub scan_type: ScanPhase,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signals_found: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
