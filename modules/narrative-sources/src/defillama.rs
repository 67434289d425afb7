use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use narrative_common::{send_with_retry, RetryPolicy};

use crate::Result;

const DEFILLAMA_API: &str = "https://api.llama.fi";
const USER_AGENT: &str = "narrative-tracker";

/// One point of `/v2/historicalChainTvl/{chain}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ChainTvlPoint {
    pub date: i64,
    #[serde(default)]
    pub tvl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TvlPoint {
    pub date: i64,
    #[serde(default, rename = "totalLiquidityUSD")]
    pub total_liquidity_usd: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainTvls {
    #[serde(default)]
    pub tvl: Vec<TvlPoint>,
}

/// `/protocol/{slug}`, reduced to the fields the scanner reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolDetail {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "currentChainTvls")]
    pub current_chain_tvls: HashMap<String, serde_json::Value>,
    #[serde(default, rename = "chainTvls")]
    pub chain_tvls: HashMap<String, ChainTvls>,
    /// Either a number or a history array depending on the endpoint version.
    #[serde(default)]
    pub tvl: serde_json::Value,
}

impl ProtocolDetail {
    /// Current TVL on `chain`, falling back to the protocol-wide figure.
    pub fn current_tvl(&self, chain: &str) -> f64 {
        self.current_chain_tvls
            .get(chain)
            .and_then(as_number)
            .or_else(|| as_number(&self.tvl))
            .or_else(|| {
                self.tvl
                    .as_array()
                    .and_then(|points| points.last())
                    .and_then(|p| p.get("totalLiquidityUSD"))
                    .and_then(as_number)
            })
            .unwrap_or(0.0)
    }

    /// Daily TVL history on `chain`, oldest first.
    pub fn tvl_history(&self, chain: &str) -> Vec<f64> {
        self.chain_tvls
            .get(chain)
            .map(|c| c.tvl.iter().map(|p| p.total_liquidity_usd).collect())
            .unwrap_or_default()
    }
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One row of the global `/protocols` ranking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProtocolSummary {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub tvl: Option<f64>,
    #[serde(default)]
    pub change_1d: Option<f64>,
    #[serde(default)]
    pub change_7d: Option<f64>,
}

pub struct DefiLlamaClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl DefiLlamaClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: policy.http_client(USER_AGENT)?,
            base_url: DEFILLAMA_API.to_string(),
            policy,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "DeFi Llama request");
        let resp = send_with_retry(&self.policy, "defillama", || self.http.get(&url)).await?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn chain_tvl_history(&self, chain: &str) -> Result<Vec<ChainTvlPoint>> {
        self.get_json(&format!(
            "/v2/historicalChainTvl/{}",
            urlencoding::encode(chain)
        ))
        .await
    }

    pub async fn protocol(&self, slug: &str) -> Result<ProtocolDetail> {
        self.get_json(&format!("/protocol/{}", urlencoding::encode(slug)))
            .await
    }

    pub async fn protocols(&self) -> Result<Vec<ProtocolSummary>> {
        self.get_json("/protocols").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail(value: serde_json::Value) -> ProtocolDetail {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn current_tvl_prefers_chain_figure() {
        let p = detail(json!({
            "name": "Jito",
            "currentChainTvls": {"Solana": 2.5e9, "Solana-staking": 1.0},
            "tvl": []
        }));
        assert_eq!(p.current_tvl("Solana"), 2.5e9);
    }

    #[test]
    fn current_tvl_falls_back_to_history_tail() {
        let p = detail(json!({
            "name": "Orca",
            "tvl": [
                {"date": 1, "totalLiquidityUSD": 10.0},
                {"date": 2, "totalLiquidityUSD": 12.5}
            ]
        }));
        assert_eq!(p.current_tvl("Solana"), 12.5);
        assert!(p.tvl_history("Solana").is_empty());
    }

    #[test]
    fn chain_history_in_order() {
        let p = detail(json!({
            "name": "Kamino",
            "chainTvls": {"Solana": {"tvl": [
                {"date": 1, "totalLiquidityUSD": 1.0},
                {"date": 2, "totalLiquidityUSD": 2.0}
            ], "tokens": null}}
        }));
        assert_eq!(p.tvl_history("Solana"), vec![1.0, 2.0]);
        assert_eq!(p.current_tvl("Solana"), 0.0);
    }
}
