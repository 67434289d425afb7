//! Parsers for the human-oriented text the `bird` CLI prints.
//!
//! The output format is not a stable contract, so parsing sits behind
//! [`PostParser`] and each format gets its own versioned implementation.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use narrative_common::Engagement;

/// One post recovered from CLI output, before relevance filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPost {
    pub handle: String,
    pub post_id: String,
    pub url: String,
    pub text: String,
    pub posted_at: PostedAt,
    pub engagement: Engagement,
}

/// What the block's `📅` line said about when the post was made.
#[derive(Debug, Clone, PartialEq)]
pub enum PostedAt {
    /// No date line at all.
    Missing,
    At(DateTime<Utc>),
    /// A date line whose value could not be read.
    Unreadable(String),
}

pub trait PostParser: Send + Sync {
    fn version(&self) -> &'static str;

    /// Extract posts from raw output. Blocks that cannot be parsed are
    /// skipped; this never fails.
    fn parse(&self, raw: &str) -> Vec<RawPost>;
}

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"─{10,}").unwrap());
static STATUS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://x\.com/(\w+)/status/(\d+)").unwrap());
static LIKES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"❤\x{FE0F}?\s*(\d+)").unwrap());
static RETWEETS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"🔁\s*(\d+)").unwrap());
static REPLIES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"💬\s*(\d+)").unwrap());

const DATE_PREFIX: char = '📅';
const DECORATION_PREFIXES: [char; 7] = ['🖼', '🔗', '❤', '🎬', '┌', '│', '└'];
const QUOTE_PREFIX: &str = "│ ";

/// Plain-text layout: blocks separated by a rule of box-drawing dashes, an
/// `@handle` header, body lines, then `📅` date, `🔗` link and engagement.
#[derive(Debug, Default, Clone, Copy)]
pub struct BirdTextV1;

impl PostParser for BirdTextV1 {
    fn version(&self) -> &'static str {
        "bird-text-v1"
    }

    fn parse(&self, raw: &str) -> Vec<RawPost> {
        SEPARATOR_RE
            .split(raw)
            .filter_map(|block| parse_block(block.trim()))
            .collect()
    }
}

fn parse_block(block: &str) -> Option<RawPost> {
    let lines: Vec<&str> = block.lines().map(str::trim_end).collect();
    if lines.len() < 2 {
        return None;
    }

    let caps = lines.iter().find_map(|l| STATUS_URL_RE.captures(l))?;
    let handle = caps[1].to_string();
    let post_id = caps[2].to_string();
    let url = caps[0].to_string();

    let date_idx = lines.iter().position(|l| l.starts_with(DATE_PREFIX));
    let posted_at = match date_idx {
        None => PostedAt::Missing,
        Some(i) => {
            let raw = lines[i].trim_start_matches(DATE_PREFIX).trim();
            parse_timestamp(raw)
                .map(PostedAt::At)
                .unwrap_or_else(|| PostedAt::Unreadable(raw.to_string()))
        }
    };

    Some(RawPost {
        handle,
        post_id,
        url,
        text: extract_text(&lines, date_idx),
        posted_at,
        engagement: lines
            .iter()
            .find(|l| l.starts_with('❤'))
            .map(|line| Engagement {
                likes: capture_count(&LIKES_RE, line),
                retweets: capture_count(&RETWEETS_RE, line),
                replies: capture_count(&REPLIES_RE, line),
            })
            .unwrap_or_default(),
    })
}

fn is_decoration(line: &str) -> bool {
    line.starts_with(DECORATION_PREFIXES) || line.starts_with(DATE_PREFIX)
}

/// Body lines between the `@` header and the date line, followed by any
/// quoted-post lines. Falls back to every non-decoration line after the
/// header row.
fn extract_text(lines: &[&str], date_idx: Option<usize>) -> String {
    let account_idx = lines.iter().position(|l| l.starts_with('@'));

    let mut parts: Vec<&str> = match (account_idx, date_idx) {
        (Some(a), Some(d)) if a < d => lines[a + 1..d]
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !is_decoration(l))
            .collect(),
        _ => Vec::new(),
    };

    parts.extend(
        lines
            .iter()
            .filter_map(|l| l.strip_prefix(QUOTE_PREFIX))
            .map(str::trim)
            .filter(|l| !l.is_empty()),
    );

    if parts.is_empty() {
        parts = lines
            .iter()
            .skip(1)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !is_decoration(l) && !STATUS_URL_RE.is_match(l))
            .collect();
    }

    parts.join(" ")
}

fn capture_count(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line).and_then(|c| c[1].parse().ok())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // X's legacy `created_at` layout.
    if let Ok(ts) = DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y, %I:%M:%S %p"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}
