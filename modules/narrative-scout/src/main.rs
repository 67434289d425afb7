use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::{Claude, OpenRouter, ProviderChain};
use narrative_common::{Config, ConfigError, RetryPolicy};
use narrative_scout::{Scan, ScanDeps, ScanPlan};
use narrative_sources::{BirdCli, BirdTextV1, DefiLlamaClient, GithubClient};
use narrative_store::{DashboardSnapshot, StoreClient, StoreError};

const APP_NAME: &str = "narrative-tracker";

#[derive(Parser)]
#[command(
    name = "narrative-scan",
    about = "Collect ecosystem signals and synthesize them into narratives"
)]
struct Cli {
    /// Skip the social (X) scan
    #[arg(long)]
    skip_social: bool,

    /// Skip the GitHub scan
    #[arg(long)]
    skip_github: bool,

    /// Skip the onchain (DeFi Llama) scan
    #[arg(long)]
    skip_onchain: bool,

    /// Only run narrative generation over already-collected signals
    #[arg(long, conflicts_with_all = ["skip_social", "skip_github", "skip_onchain"])]
    narratives_only: bool,

    /// Print the dashboard snapshot (latest report, top narratives, counts) and exit
    #[arg(long, conflicts_with = "narratives_only")]
    snapshot: bool,
}

impl Cli {
    fn plan(&self) -> ScanPlan {
        if self.narratives_only {
            return ScanPlan::narratives_only();
        }
        ScanPlan {
            social: !self.skip_social,
            repository: !self.skip_github,
            financial: !self.skip_onchain,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Could not initialize logging: {e}");
    }

    let cli = Cli::parse();
    if cli.snapshot {
        return snapshot().await;
    }

    let config = match Config::scan_from_env() {
        Ok(config) => config,
        Err(e) => return config_failure(e),
    };
    config.log_redacted();

    match scan(&cli, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = format!("{e:#}"), "Scan could not start");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("narrative=info".parse()?))
        .init();
    Ok(())
}

fn config_failure(e: ConfigError) -> ExitCode {
    error!(error = %e, "Configuration error");
    eprintln!("Configuration error: {e}");
    ExitCode::from(2)
}

/// Build the live clients and run every planned phase. `Ok(false)` when any
/// phase failed.
async fn scan(cli: &Cli, config: &Config) -> Result<bool> {
    info!("Narrative scan starting");

    if !config.bird_session_present {
        warn!("AUTH_TOKEN / CT0 not set; the social scan will likely fail");
    }

    let store = StoreClient::new(
        &config.supabase_url,
        &config.supabase_service_key,
        config.retry,
    )?;
    let github = GithubClient::new(config.github_token.clone(), config.retry)?
        .with_base_url(&config.github_api_url)
        .with_rate_limit_wait(config.pacing.rate_limit_wait);
    let defillama =
        DefiLlamaClient::new(config.retry)?.with_base_url(&config.defillama_url);

    let mut reasoner = ProviderChain::new();
    if let Some(key) = &config.anthropic_api_key {
        reasoner = reasoner.with(Claude::new(key, &config.anthropic_model));
    }
    if let Some(key) = &config.openrouter_api_key {
        reasoner = reasoner
            .with(OpenRouter::new(key, &config.openrouter_model).with_app_name(APP_NAME));
    }
    if reasoner.is_empty() {
        warn!("No reasoning provider configured; narrative generation will fail if there are signals");
    } else {
        info!(providers = ?reasoner.names(), "Reasoning providers");
    }

    let deps = ScanDeps {
        store: Arc::new(store),
        posts: Arc::new(BirdCli::new(&config.bird_bin)),
        parser: Arc::new(BirdTextV1),
        repos: Arc::new(github),
        metrics: Arc::new(defillama),
        reasoner: Arc::new(reasoner),
    };
    let summary = Scan::new(deps, &config.rosters, config.pacing)
        .run(cli.plan(), chrono::Utc::now())
        .await;

    println!("{summary}");
    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        eprintln!("\n{} phase(s) failed:", failures.len());
        for report in failures {
            if let narrative_scout::PhaseStatus::Failed { error } = &report.status {
                eprintln!("  {}: {error}", report.phase.label());
            }
        }
    }
    Ok(summary.succeeded())
}

async fn snapshot() -> ExitCode {
    let (url, anon_key) = match Config::snapshot_from_env() {
        Ok(keys) => keys,
        Err(e) => return config_failure(e),
    };

    match load_snapshot(url, anon_key).await {
        Ok(snapshot) => {
            println!("{snapshot}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Snapshot read failed");
            eprintln!("Snapshot read failed: {e}");
            ExitCode::from(1)
        }
    }
}

async fn load_snapshot(url: String, anon_key: String) -> Result<DashboardSnapshot, StoreError> {
    let store = StoreClient::new(url, anon_key, RetryPolicy::default())?;
    DashboardSnapshot::load(&store).await
}
