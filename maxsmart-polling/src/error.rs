use maxsmart_api::CommandError;
use thiserror::Error;

/// Errors surfaced by the polling engine itself
///
/// Failed state reads inside the loop are logged, not returned; these
/// variants only reach callers of the engine's own methods.
#[derive(Debug, Error)]
pub enum PollingError {
    /// Invalid polling configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The polling task panicked or could not be joined
    #[error("Polling task failed: {0}")]
    TaskJoin(String),

    /// A state read requested through the engine failed
    #[error("State read failed: {0}")]
    Source(#[from] CommandError),
}

/// Error an observer may return; it is logged and the loop continues
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;
