use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.0-flash-001";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Store
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub supabase_anon_key: Option<String>,

    // Reasoning providers
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,

    // Upstreams
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub defillama_url: String,
    pub bird_bin: String,
    /// Whether the `bird` session cookies are present in the environment.
    pub bird_session_present: bool,

    pub rosters: Rosters,
    pub pacing: Pacing,
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration for a scan. Missing store credentials are fatal.
    pub fn scan_from_env() -> Result<Self, ConfigError> {
        let rosters = match optional_env("ROSTERS_PATH") {
            Some(path) => Rosters::load(path)?,
            None => Rosters::default(),
        };

        Ok(Self {
            supabase_url: required_env("SUPABASE_URL")?,
            supabase_service_key: required_env("SUPABASE_SERVICE_KEY")?,
            supabase_anon_key: optional_env("SUPABASE_ANON_KEY"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            anthropic_model: optional_env("ANTHROPIC_MODEL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            openrouter_api_key: optional_env("OPENROUTER_API_KEY"),
            openrouter_model: optional_env("OPENROUTER_MODEL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            github_token: optional_env("GITHUB_TOKEN"),
            github_api_url: optional_env("GITHUB_API_URL")
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            defillama_url: optional_env("DEFILLAMA_URL")
                .unwrap_or_else(|| "https://api.llama.fi".to_string()),
            bird_bin: optional_env("BIRD_BIN").unwrap_or_else(|| "bird".to_string()),
            bird_session_present: optional_env("AUTH_TOKEN").is_some()
                && optional_env("CT0").is_some(),
            rosters,
            pacing: Pacing::default(),
            retry: RetryPolicy::default(),
        })
    }

    /// Load the read-only configuration used for dashboard snapshots.
    pub fn snapshot_from_env() -> Result<(String, String), ConfigError> {
        Ok((
            required_env("SUPABASE_URL")?,
            required_env("SUPABASE_ANON_KEY")?,
        ))
    }

    /// Log which credentials are present without printing them.
    pub fn log_redacted(&self) {
        info!(
            supabase_url = self.supabase_url.as_str(),
            service_key = present(&Some(&self.supabase_service_key)),
            anon_key = present(&self.supabase_anon_key.as_ref()),
            anthropic = present(&self.anthropic_api_key.as_ref()),
            openrouter = present(&self.openrouter_api_key.as_ref()),
            github_token = present(&self.github_token.as_ref()),
            bird_session = self.bird_session_present,
            handles = self.rosters.handles.len(),
            repositories = self.rosters.repositories.len(),
            protocols = self.rosters.protocols.len(),
            "Configuration loaded"
        );
    }
}

fn present<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "set"
    } else {
        "unset"
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

// --- Pacing ---

/// Fixed delays between upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub social: Duration,
    pub repository: Duration,
    pub financial: Duration,
    /// Wait after a GitHub 403 before the single retry.
    pub rate_limit_wait: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            social: Duration::from_secs(2),
            repository: Duration::from_secs(1),
            financial: Duration::from_millis(500),
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            social: Duration::ZERO,
            repository: Duration::ZERO,
            financial: Duration::ZERO,
            rate_limit_wait: Duration::ZERO,
        }
    }
}

// --- Rosters ---

/// Tracked handles, repositories and protocols. Loadable from a JSON file;
/// omitted fields keep their built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Rosters {
    /// Display name used in prompts and report titles.
    pub ecosystem: String,
    /// Chain key in DeFi Llama responses.
    pub chain: String,
    /// Search term for repository discovery queries.
    pub discovery_topic: String,
    pub handles: Vec<String>,
    pub repositories: Vec<String>,
    pub protocols: Vec<String>,
}

impl Rosters {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let err = |reason: String| ConfigError::Rosters {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| err(e.to_string()))
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Rosters {
    fn default() -> Self {
        Self {
            ecosystem: "Solana".to_string(),
            chain: "Solana".to_string(),
            discovery_topic: "solana".to_string(),
            handles: owned(&[
                "0xMert_",
                "aeyakovenko",
                "rajgokal",
                "armaniferrante",
                "buffalu__",
                "VibhuNorby",
                "JupiterExchange",
                "jaboronkov",
                "jito_sol",
                "MarinadeFinance",
                "TensorFdn",
                "DriftProtocol",
                "PhoenixTrade",
                "KaminoFinance",
                "SanctumSo",
                "HeliusLabs",
                "MagicEden",
                "SolanaFndn",
                "solana",
                "SolanaFloor",
                "SuperteamDAO",
            ]),
            repositories: owned(&[
                "solana-labs/solana",
                "anza-xyz/agave",
                "firedancer-io/firedancer",
                "solana-foundation/solana-improvement-documents",
                "coral-xyz/anchor",
                "jito-foundation/jito-solana",
                "drift-labs/protocol-v2",
                "kamino-finance/kliquidity",
                "project-serum/serum-dex",
                "metaplex-foundation/mpl-core",
                "jupiter-project/jupiter-core",
                "marinade-finance/liquid-staking-program",
                "sanctumfi/sanctum-solana-program",
                "helium/helium-program-library",
                "hivemapper/hivemapper-data-logger",
                "tensor-foundation/marketplace",
                "magiceden-oss/open_creator_protocol",
                "squadsprotocol/v4",
                "switchboardxyz/switchboard",
                "pyth-network/pyth-sdk-solana",
            ]),
            protocols: owned(&[
                "jito",
                "marinade-finance",
                "jupiter",
                "raydium",
                "orca",
                "drift-protocol",
                "kamino",
                "solend",
                "marginfi",
                "sanctum",
                "meteora",
                "phoenix",
                "tensor",
                "magic-eden",
                "helium",
                "hivemapper",
                "render-network",
                "pyth-network",
                "parcl",
                "flash-trade",
                "lifinity",
                "tulip-protocol",
                "francium",
                "hubble",
                "port-finance",
                "larix",
                "apricot-finance",
            ]),
        }
    }
}
