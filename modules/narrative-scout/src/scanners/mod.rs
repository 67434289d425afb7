pub mod github;
pub mod onchain;
pub mod social;

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use narrative_store::{Collection, UpsertOutcome};

use crate::traits::SignalStore;

pub use github::RepoScanner;
pub use onchain::MetricScanner;
pub use social::SocialScanner;

/// Sleep between upstream calls; a zero delay does not yield.
pub(crate) async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Upsert one signal, returning whether the store accepted it.
pub(crate) async fn store_signal<T: Serialize>(
    store: &dyn SignalStore,
    collection: Collection,
    signal: &T,
) -> bool {
    let record = match serde_json::to_value(signal) {
        Ok(record) => record,
        Err(e) => {
            warn!(collection = %collection, error = %e, "Could not encode signal");
            return false;
        }
    };
    matches!(
        store.try_upsert(collection, &record).await,
        UpsertOutcome::Stored(_)
    )
}
