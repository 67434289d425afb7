use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Failed to read signals: {0:#}")]
    Read(anyhow::Error),

    #[error("Reasoning service failed: {0:#}")]
    Reasoning(anyhow::Error),

    /// Not fatal: the run continues with zero narratives.
    #[error("Could not parse narratives: {0}")]
    Parse(String),
}
