pub mod client;
pub mod collection;
pub mod error;
pub mod query;
pub mod snapshot;

pub use client::{StoreClient, UpsertOutcome};
pub use collection::Collection;
pub use error::StoreError;
pub use query::{Filter, Query};
pub use snapshot::DashboardSnapshot;
