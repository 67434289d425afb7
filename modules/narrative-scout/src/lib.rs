pub mod error;
pub mod run_tracker;
pub mod scan;
pub mod scanners;
pub mod synthesis;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use error::SynthesisError;
pub use run_tracker::RunTracker;
pub use scan::{PhaseReport, PhaseStatus, Scan, ScanDeps, ScanPlan, ScanSummary};
pub use synthesis::{SynthesisOutcome, Synthesizer};
