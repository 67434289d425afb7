use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use narrative_common::{Pacing, Period, Rosters, ScanPhase};
use narrative_sources::PostParser;

use crate::run_tracker::RunTracker;
use crate::scanners::{MetricScanner, RepoScanner, SocialScanner};
use crate::synthesis::{SynthesisOutcome, Synthesizer};
use crate::traits::{MetricSource, PostSource, Reasoner, RepoSource, SignalStore};

// --- Plan ---

/// Which collection phases run. Synthesis always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    pub social: bool,
    pub repository: bool,
    pub financial: bool,
}

impl ScanPlan {
    pub fn all() -> Self {
        Self {
            social: true,
            repository: true,
            financial: true,
        }
    }

    pub fn narratives_only() -> Self {
        Self {
            social: false,
            repository: false,
            financial: false,
        }
    }

    pub fn includes(&self, phase: ScanPhase) -> bool {
        match phase {
            ScanPhase::Social => self.social,
            ScanPhase::Repository => self.repository,
            ScanPhase::Financial => self.financial,
            ScanPhase::Synthesis => true,
        }
    }
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self::all()
    }
}

// --- Summary ---

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseStatus {
    Completed { signals: u32 },
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: ScanPhase,
    pub status: PhaseStatus,
    /// `scan_runs` id; `None` for skipped phases.
    pub run_id: Option<Uuid>,
}

impl PhaseReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, PhaseStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub phases: Vec<PhaseReport>,
    pub synthesis: Option<SynthesisOutcome>,
}

impl ScanSummary {
    pub fn failures(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|p| p.is_failure())
    }

    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn phase(&self, phase: ScanPhase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn signals_stored(&self) -> u32 {
        self.phases
            .iter()
            .filter(|p| p.phase != ScanPhase::Synthesis)
            .map(|p| match p.status {
                PhaseStatus::Completed { signals } => signals,
                _ => 0,
            })
            .sum()
    }
}

impl std::fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scan Summary ===")?;
        for report in &self.phases {
            match &report.status {
                PhaseStatus::Completed { signals } if report.phase == ScanPhase::Synthesis => {
                    writeln!(f, "{:<22} ok ({signals} narratives)", report.phase.label())?
                }
                PhaseStatus::Completed { signals } => {
                    writeln!(f, "{:<22} ok ({signals} signals)", report.phase.label())?
                }
                PhaseStatus::Failed { error } => {
                    writeln!(f, "{:<22} FAILED: {error}", report.phase.label())?
                }
                PhaseStatus::Skipped => writeln!(f, "{:<22} skipped", report.phase.label())?,
            }
        }
        write!(f, "Signals stored: {}", self.signals_stored())?;
        if let Some(outcome) = &self.synthesis {
            write!(f, "\n{outcome}")?;
        }
        Ok(())
    }
}

// --- Orchestrator ---

/// Everything a scan talks to.
pub struct ScanDeps {
    pub store: Arc<dyn SignalStore>,
    pub posts: Arc<dyn PostSource>,
    pub parser: Arc<dyn PostParser>,
    pub repos: Arc<dyn RepoSource>,
    pub metrics: Arc<dyn MetricSource>,
    pub reasoner: Arc<dyn Reasoner>,
}

/// Runs the collection phases then synthesis, tracking each phase as a
/// `scan_runs` row. A failed phase never blocks the ones after it.
pub struct Scan {
    social: SocialScanner,
    repos: RepoScanner,
    metrics: MetricScanner,
    synthesizer: Synthesizer,
    tracker: RunTracker,
}

impl Scan {
    pub fn new(deps: ScanDeps, rosters: &Rosters, pacing: Pacing) -> Self {
        Self {
            social: SocialScanner::new(
                deps.posts,
                deps.parser,
                deps.store.clone(),
                rosters.handles.clone(),
                pacing.social,
            ),
            repos: RepoScanner::new(
                deps.repos,
                deps.store.clone(),
                rosters.repositories.clone(),
                rosters.discovery_topic.clone(),
                pacing.repository,
            ),
            metrics: MetricScanner::new(
                deps.metrics,
                deps.store.clone(),
                rosters.chain.clone(),
                rosters.protocols.clone(),
                pacing.financial,
            ),
            synthesizer: Synthesizer::new(
                deps.store.clone(),
                deps.reasoner,
                rosters.ecosystem.clone(),
            ),
            tracker: RunTracker::new(deps.store),
        }
    }

    pub async fn run(&self, plan: ScanPlan, now: DateTime<Utc>) -> ScanSummary {
        let period = Period::rolling(now);
        let mut summary = ScanSummary::default();
        info!(period = period.label().as_str(), ?plan, "Scan starting");

        for phase in ScanPhase::ORDER {
            if !plan.includes(phase) {
                info!(phase = phase.label(), "Skipping");
                summary.phases.push(PhaseReport {
                    phase,
                    status: PhaseStatus::Skipped,
                    run_id: None,
                });
                continue;
            }

            let report = match phase {
                ScanPhase::Social => self.run_phase(phase, self.social.run(&period)).await,
                ScanPhase::Repository => self.run_phase(phase, self.repos.run(&period)).await,
                ScanPhase::Financial => {
                    self.run_phase(phase, self.metrics.run(period.end())).await
                }
                ScanPhase::Synthesis => {
                    self.run_phase(phase, async {
                        let outcome = self.synthesizer.run(now).await?;
                        let stored = outcome.narratives_stored as u32;
                        summary.synthesis = Some(outcome);
                        Ok::<_, anyhow::Error>(stored)
                    })
                    .await
                }
            };
            summary.phases.push(report);
        }

        info!(
            failed = summary.failures().count(),
            signals = summary.signals_stored(),
            "Scan finished"
        );
        summary
    }

    async fn run_phase<F>(&self, phase: ScanPhase, work: F) -> PhaseReport
    where
        F: Future<Output = anyhow::Result<u32>>,
    {
        info!(phase = phase.label(), "Phase starting");
        let run_id = self.tracker.begin(phase).await;

        let status = match work.await {
            Ok(signals) => {
                self.tracker.complete(run_id, phase, signals).await;
                info!(phase = phase.label(), signals, "Phase complete");
                PhaseStatus::Completed { signals }
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(phase = phase.label(), error = message.as_str(), "{} failed", phase.label());
                self.tracker.fail(run_id, phase, &message).await;
                PhaseStatus::Failed { error: message }
            }
        };

        PhaseReport {
            phase,
            status,
            run_id: Some(run_id),
        }
    }
}
