//! Keyword taxonomy: category rules, the domain relevance gate, keyword
//! extraction and score normalization. Everything here is pure.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::types::Category;

/// Built-in category rules, in precedence order.
pub const DEFAULT_CATEGORY_PATTERNS: &[(Category, &str)] = &[
    (
        Category::Defi,
        r"defi|dex|amm|lending|borrow|yield|tvl|liquidity|pool|swap|perp|margin|vault|stake|lst|restaking",
    ),
    (
        Category::Infra,
        r"validator|rpc|svm|firedancer|frankendancer|rollup|appchain|bridge|oracle|indexer|data|api|sdk",
    ),
    (
        Category::Consumer,
        r"wallet|phantom|solflare|mobile|saga|blink|action|payment|nft|cnft|compressed|marketplace",
    ),
    (
        Category::Depin,
        r"depin|helium|hivemapper|render|iot|sensor|wireless|compute|storage",
    ),
    (
        Category::Gaming,
        r"gaming|game|gameshift|star.atlas|genopets|aurory|stepn|play",
    ),
    (
        Category::Ai,
        r"\bai\b|agent|llm|machine.learning|gpt|neural|model|inference",
    ),
];

/// Posts that match none of these are dropped by the social scanner.
const DOMAIN_PATTERN: &str = r"launch|ship|new|feature|update|upgrade|v[234]|tvl|milestone|partnership|integration|governance|proposal|token|airdrop|reward|liquidity|pool|migrate|validator|stake|compressed|cnft|blink|action|firedancer|frankendancer|svm|rollup|appchain|depin|helium|hivemapper|render|pyth|wormhole|program|spl|mev|jito|tip|bundle|restaking|cambrian|solayer|sanctum|lst|jupiter|perp|dex|amm|clob|orderbook|drift|marginfi|kamino|meteora|raydium|orca|tensor|backpack|phantom|mobile|saga|seeker|gameshift|agent|\bai\b";

/// Vocabulary reported as `keywords_matched`.
pub const KEYWORD_VOCABULARY: &[&str] = &[
    "launch", "ship", "update", "upgrade", "tvl", "milestone", "partnership", "integration",
    "governance", "token", "airdrop", "reward", "liquidity", "migrate", "validator", "stake",
    "compressed", "blink", "firedancer", "svm", "rollup", "depin", "mev", "jito", "restaking",
    "lst", "perp", "dex", "amm", "nft", "mobile", "agent", "ai", "oracle", "bridge", "wallet",
    "program",
];

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| case_insensitive(DOMAIN_PATTERN).unwrap());

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(|| {
    Classifier::from_patterns(DEFAULT_CATEGORY_PATTERNS).unwrap()
});

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

// --- Classifier ---

/// One `{category, predicate}` entry of the ordered rule list.
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub category: Category,
    pattern: Regex,
}

impl CategoryRule {
    pub fn new(category: Category, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: case_insensitive(pattern)?,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
}

impl Classifier {
    pub fn from_patterns(patterns: &[(Category, &str)]) -> Result<Self, regex::Error> {
        let rules = patterns
            .iter()
            .map(|(category, pattern)| CategoryRule::new(*category, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn classify(&self, text: &str) -> Category {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| rule.category)
            .unwrap_or(Category::Other)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

/// Classify with the built-in rules.
pub fn classify(text: &str) -> Category {
    DEFAULT_CLASSIFIER.classify(text)
}

pub fn is_domain_relevant(text: &str) -> bool {
    DOMAIN_RE.is_match(text)
}

/// Vocabulary words contained in `text` (case-insensitive substring test),
/// in vocabulary order.
pub fn matched_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    KEYWORD_VOCABULARY
        .iter()
        .filter(|word| lower.contains(*word))
        .map(|word| word.to_string())
        .collect()
}

// --- Scores ---

/// Clamp to `[0, 1]`; NaN and infinities become 0.
pub fn normalize_score(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Coerce a loosely-typed JSON value (number, numeric string, bool, null)
/// into a normalized score.
pub fn coerce_score(value: &serde_json::Value) -> f64 {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) if s.trim().is_empty() => 0.0,
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
        serde_json::Value::Null => 0.0,
        _ => f64::NAN,
    };
    normalize_score(raw)
}
