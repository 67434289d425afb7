use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use narrative_common::{truncate_chars, ScanPhase, ScanRun, ScanStatus, MAX_RUN_ERROR_CHARS};
use narrative_store::{Collection, UpsertOutcome};

use crate::traits::SignalStore;

/// Records one `scan_runs` row per phase. Store failures are logged and
/// swallowed; tracking never fails a phase.
pub struct RunTracker {
    store: Arc<dyn SignalStore>,
}

impl RunTracker {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self { store }
    }

    pub async fn begin(&self, phase: ScanPhase) -> Uuid {
        let run = ScanRun {
            id: Uuid::new_v4(),
            scan_type: phase,
            status: ScanStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            signals_found: 0,
            error_message: None,
            metadata: json!({}),
        };

        match serde_json::to_value(&run) {
            Ok(record) => {
                let outcome = self.store.try_upsert(Collection::ScanRuns, &record).await;
                log_skipped(&outcome, phase, "begin");
            }
            Err(e) => warn!(phase = phase.label(), error = %e, "Could not encode scan run"),
        }
        run.id
    }

    pub async fn complete(&self, id: Uuid, phase: ScanPhase, signals_found: u32) {
        let patch = json!({
            "status": ScanStatus::Completed,
            "completed_at": Utc::now(),
            "signals_found": signals_found,
        });
        let outcome = self
            .store
            .try_update(Collection::ScanRuns, &id.to_string(), &patch)
            .await;
        log_skipped(&outcome, phase, "complete");
    }

    pub async fn fail(&self, id: Uuid, phase: ScanPhase, error: &str) {
        let patch = json!({
            "status": ScanStatus::Failed,
            "completed_at": Utc::now(),
            "error_message": truncate_chars(error, MAX_RUN_ERROR_CHARS),
        });
        let outcome = self
            .store
            .try_update(Collection::ScanRuns, &id.to_string(), &patch)
            .await;
        log_skipped(&outcome, phase, "fail");
    }
}

fn log_skipped(outcome: &UpsertOutcome, phase: ScanPhase, step: &str) {
    if let UpsertOutcome::Skipped { reason } = outcome {
        warn!(phase = phase.label(), step, reason = reason.as_str(), "Run tracking write skipped");
    }
}
