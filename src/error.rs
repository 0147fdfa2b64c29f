//! Error taxonomy for the ingestion pipeline.
//!
//! The split that matters operationally is `Transport` vs `RemoteApi`: a
//! transport failure may succeed on retry, while the provider rejecting a
//! parameter set will reject the identical parameters again. The orchestrator
//! keys its retry policy off `is_retryable`.

use crate::profile::SportId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported sport '{0}'")]
    UnsupportedSport(String),

    #[error("sport '{0}' has no player endpoint configured")]
    NoPlayerEndpoint(SportId),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("remote API error: {}", .errors.join("; "))]
    RemoteApi { errors: Vec<String> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database connection lost and reconnect failed: {0}")]
    ConnectionLost(String),

    #[error("no processable teams for sport '{0}'")]
    NoProcessableTeams(SportId),
}

impl IngestError {
    /// Whether a bounded retry with identical parameters can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transport(_))
    }

    /// Whether the error aborts the whole run (vs. being contained at the
    /// team or record level by the orchestrator).
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedSport(_)
                | IngestError::NoPlayerEndpoint(_)
                | IngestError::ConnectionLost(_)
                | IngestError::NoProcessableTeams(_)
        )
    }
}
