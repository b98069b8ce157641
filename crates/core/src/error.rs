//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid connection configuration: {0}")]
    ConnectionConfig(String),

    #[error("invalid environment variable name: {0:?}")]
    InvalidEnvKey(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidEnvValue { key: String, reason: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a failure is handled by the cold-start pipeline.
///
/// Only the bootstrap phase may turn a failure into a process exit. Every
/// later phase degrades to a logged warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing installer, database unreachable past its budget, bad config.
    FatalMisconfiguration,
    /// A collaborator is not ready yet. Retried within a bounded loop.
    TransientUnavailability,
    /// Key mismatch or rejected credentials, handled by a remediation loop.
    LogicalInconsistency,
    /// Settings update, secret write or probe cleanup. Logged, never propagated.
    BestEffortFailure,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FatalMisconfiguration => "fatal_misconfiguration",
            Self::TransientUnavailability => "transient_unavailability",
            Self::LogicalInconsistency => "logical_inconsistency",
            Self::BestEffortFailure => "best_effort_failure",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
