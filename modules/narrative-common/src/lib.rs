pub mod config;
pub mod error;
pub mod retry;
pub mod taxonomy;
pub mod types;
pub mod util;

pub use config::{Config, Pacing, Rosters};
pub use error::{ConfigError, FetchError};
pub use retry::{send_with_retry, RetryPolicy};
pub use taxonomy::{
    classify, coerce_score, is_domain_relevant, matched_keywords, normalize_score, CategoryRule,
    Classifier,
};
pub use types::*;
pub use util::{slugify, truncate_chars};
