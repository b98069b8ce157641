//! Bootstrap error types.

use coldstart_core::ErrorClass;
use coldstart_database::DatabaseError;
use std::path::PathBuf;

/// Errors that end a phase.
///
/// Only the bootstrap phase turns these into a process exit; the self-healing
/// phases downgrade them to warnings.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("database unreachable after {attempts} attempts: {last_error}")]
    DatabaseUnreachable { attempts: u32, last_error: String },

    #[error("installer entry point not found: {}", .0.display())]
    InstallerMissing(PathBuf),

    #[error("failed to start installer: {0}")]
    InstallerSpawn(#[source] std::io::Error),

    #[error("installer exited with {}", .code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    InstallerFailed { code: Option<i32> },

    #[error("failed to restart {service}: {reason}")]
    Restart { service: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("connection configuration error: {0}")]
    ConnectionConfig(#[from] coldstart_core::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid update for {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: coldstart_core::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BootstrapError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DatabaseUnreachable { .. }
            | Self::InstallerMissing(_)
            | Self::InstallerSpawn(_)
            | Self::InstallerFailed { .. }
            | Self::ConnectionConfig(_)
            | Self::Write { .. }
            | Self::Read { .. }
            | Self::EnvFile { .. }
            | Self::Config(_) => ErrorClass::FatalMisconfiguration,
            Self::Database(_) => ErrorClass::TransientUnavailability,
            Self::Restart { .. } => ErrorClass::BestEffortFailure,
        }
    }

    /// Process exit code. The installer's own non-zero code is passed through.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InstallerFailed { code: Some(code) } if *code != 0 => *code,
            _ => 1,
        }
    }
}

pub type BootstrapResult<T> = std::result::Result<T, BootstrapError>;
