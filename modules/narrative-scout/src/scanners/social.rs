use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use narrative_common::{
    classify, is_domain_relevant, matched_keywords, normalize_score, truncate_chars, Engagement,
    Period, SocialSignal,
};
use narrative_sources::{PostParser, PostedAt, RawPost};
use narrative_store::Collection;

use super::{pace, store_signal};
use crate::traits::{is_fatal, PostSource, SignalStore};

pub const MAX_POST_CHARS: usize = 2000;
/// Weighted engagement that maps to full strength.
const FULL_STRENGTH_ENGAGEMENT: f64 = 5000.0;
const SOURCE_TAG: &str = "x_kol";

pub fn signal_strength(engagement: &Engagement) -> f64 {
    normalize_score(engagement.weighted_total() / FULL_STRENGTH_ENGAGEMENT)
}

/// Turn a parsed post into a signal, or `None` if it falls outside the window
/// or fails the domain gate. Posts with no date line count as current; posts
/// whose date line cannot be read are dropped.
pub fn build_signal(post: RawPost, period: &Period, now: DateTime<Utc>) -> Option<SocialSignal> {
    let posted_at = match &post.posted_at {
        PostedAt::At(ts) => *ts,
        PostedAt::Missing => now,
        PostedAt::Unreadable(raw) => {
            debug!(
                tweet_id = post.post_id.as_str(),
                date = raw.as_str(),
                "Unreadable post date, skipping"
            );
            return None;
        }
    };
    if !period.contains(posted_at) || !is_domain_relevant(&post.text) {
        return None;
    }

    Some(SocialSignal {
        source: SOURCE_TAG.to_string(),
        keywords_matched: matched_keywords(&post.text),
        category: classify(&post.text),
        signal_strength: signal_strength(&post.engagement),
        tweet_text: truncate_chars(&post.text, MAX_POST_CHARS).to_string(),
        handle: post.handle,
        tweet_id: post.post_id,
        tweet_url: post.url,
        posted_at,
        engagement: post.engagement,
        created_at: None,
    })
}

pub struct SocialScanner {
    source: Arc<dyn PostSource>,
    parser: Arc<dyn PostParser>,
    store: Arc<dyn SignalStore>,
    handles: Vec<String>,
    delay: Duration,
}

impl SocialScanner {
    pub fn new(
        source: Arc<dyn PostSource>,
        parser: Arc<dyn PostParser>,
        store: Arc<dyn SignalStore>,
        handles: Vec<String>,
        delay: Duration,
    ) -> Self {
        Self {
            source,
            parser,
            store,
            handles,
            delay,
        }
    }

    /// Scan every handle, returning how many signals were stored.
    pub async fn run(&self, period: &Period) -> Result<u32> {
        info!(
            handles = self.handles.len(),
            parser = self.parser.version(),
            "Starting social scan"
        );

        let mut stored = 0u32;
        for (i, handle) in self.handles.iter().enumerate() {
            if i > 0 {
                pace(self.delay).await;
            }

            let raw = match self.source.recent_posts(handle).await {
                Ok(raw) => raw,
                Err(e) if is_fatal(&e) => return Err(e.context("social source unavailable")),
                Err(e) => {
                    warn!(handle = handle.as_str(), error = %e, "Social fetch failed, skipping handle");
                    continue;
                }
            };

            let posts = self.parser.parse(&raw);
            let parsed = posts.len();
            let mut kept = 0u32;
            for post in posts {
                let Some(signal) = build_signal(post, period, period.until) else {
                    continue;
                };
                if store_signal(self.store.as_ref(), Collection::SocialSignals, &signal).await {
                    kept += 1;
                }
            }
            debug!(handle = handle.as_str(), parsed, stored = kept, "Handle scanned");
            stored += kept;
        }

        info!(stored, handles = self.handles.len(), "Social scan complete");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPostSource, MockStore};
    use chrono::TimeZone;
    use narrative_common::Category;
    use narrative_sources::BirdTextV1;

    const RAW: &str = "\
@jito_sol (Jito)
Jito restaking vaults are live on mainnet
📅 2025-10-16T14:02:11.000Z
🔗 https://x.com/jito_sol/status/111
❤️ 1200  🔁 300  💬 40
──────────────────────────────
@jito_sol (Jito)
gm
📅 2025-10-16T08:00:00.000Z
🔗 https://x.com/jito_sol/status/222
──────────────────────────────
@jito_sol (Jito)
Old news: new validator client
📅 2025-09-01T08:00:00.000Z
🔗 https://x.com/jito_sol/status/333
";

    fn period() -> Period {
        Period::rolling(Utc.with_ymd_and_hms(2025, 10, 18, 0, 0, 0).unwrap())
    }

    #[test]
    fn strength_weights_engagement() {
        let engagement = Engagement {
            likes: Some(1000),
            retweets: Some(500),
            replies: Some(200),
        };
        // 1000 + 1000 + 300 = 2300
        assert!((signal_strength(&engagement) - 0.46).abs() < 1e-9);
        let viral = Engagement {
            likes: Some(100_000),
            ..Default::default()
        };
        assert_eq!(signal_strength(&viral), 1.0);
        assert_eq!(signal_strength(&Engagement::default()), 0.0);
    }

    #[test]
    fn builds_signal_for_relevant_recent_post() {
        let now = period().until;
        let post = BirdTextV1.parse(RAW).into_iter().next().unwrap();
        let signal = build_signal(post, &period(), now).unwrap();
        assert_eq!(signal.tweet_id, "111");
        assert_eq!(signal.category, Category::Defi);
        assert!(signal.keywords_matched.contains(&"jito".to_string()));
        assert!(signal.keywords_matched.contains(&"restaking".to_string()));
        // 1200 + 600 + 60
        assert!((signal.signal_strength - 0.372).abs() < 1e-9);
    }

    #[test]
    fn undated_post_counts_as_current() {
        let now = period().until;
        let post = RawPost {
            handle: "solana".into(),
            post_id: "9".into(),
            url: "https://x.com/solana/status/9".into(),
            text: "Firedancer upgrade shipped".into(),
            posted_at: PostedAt::Missing,
            engagement: Engagement::default(),
        };
        let signal = build_signal(post, &period(), now).unwrap();
        assert_eq!(signal.posted_at, now);
    }

    #[test]
    fn old_date_only_post_stays_outside_window() {
        let now = period().until;
        let raw = "@jito_sol (Jito)\nJito restaking launch\n📅 2025-09-01\n🔗 https://x.com/jito_sol/status/444";
        let post = BirdTextV1.parse(raw).into_iter().next().unwrap();
        assert!(build_signal(post, &period(), now).is_none());
    }

    #[test]
    fn unreadable_date_drops_the_post() {
        let now = period().until;
        let post = RawPost {
            handle: "jito_sol".into(),
            post_id: "555".into(),
            url: "https://x.com/jito_sol/status/555".into(),
            text: "Jito restaking launch".into(),
            posted_at: PostedAt::Unreadable("last Tuesday".into()),
            engagement: Engagement::default(),
        };
        assert!(build_signal(post, &period(), now).is_none());
    }

    #[test]
    fn long_text_is_bounded() {
        let now = period().until;
        let post = RawPost {
            handle: "solana".into(),
            post_id: "10".into(),
            url: "https://x.com/solana/status/10".into(),
            text: format!("jito {}", "a".repeat(5000)),
            posted_at: PostedAt::At(now),
            engagement: Engagement::default(),
        };
        let signal = build_signal(post, &period(), now).unwrap();
        assert_eq!(signal.tweet_text.chars().count(), MAX_POST_CHARS);
    }

    #[tokio::test]
    async fn stores_only_relevant_posts_inside_window() {
        let store = Arc::new(MockStore::new());
        let source = MockPostSource::new()
            .on_handle("jito_sol", RAW)
            .failing("broken_handle");
        let scanner = SocialScanner::new(
            Arc::new(source),
            Arc::new(BirdTextV1),
            store.clone(),
            vec!["broken_handle".into(), "jito_sol".into(), "unknown".into()],
            Duration::ZERO,
        );

        let stored = scanner.run(&period()).await.unwrap();
        assert_eq!(stored, 1);
        let rows = store.rows(Collection::SocialSignals);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["tweet_id"], "111");
        assert_eq!(rows[0]["source"], "x_kol");
    }

    #[tokio::test]
    async fn rescanning_does_not_duplicate_posts() {
        let store = Arc::new(MockStore::new());
        let scanner = SocialScanner::new(
            Arc::new(MockPostSource::new().on_handle("jito_sol", RAW)),
            Arc::new(BirdTextV1),
            store.clone(),
            vec!["jito_sol".into()],
            Duration::ZERO,
        );

        scanner.run(&period()).await.unwrap();
        scanner.run(&period()).await.unwrap();
        assert_eq!(store.rows(Collection::SocialSignals).len(), 1);
    }

    #[tokio::test]
    async fn unavailable_source_fails_the_phase() {
        let scanner = SocialScanner::new(
            Arc::new(MockPostSource::new().unavailable("bird not installed")),
            Arc::new(BirdTextV1),
            Arc::new(MockStore::new()),
            vec!["jito_sol".into()],
            Duration::ZERO,
        );
        assert!(scanner.run(&period()).await.is_err());
    }
}
