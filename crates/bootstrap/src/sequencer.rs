//! Bootstrap sequencer.
//!
//! Decides first boot versus reuse from the database itself, never from the
//! (ephemeral) filesystem, then leaves behind a connection-configuration file
//! with the configured flag set.

use crate::error::{BootstrapError, BootstrapResult};
use crate::files::write_atomic;
use crate::service::{Installer, InstallerParams};
use crate::settings::{SettingsReport, apply_settings};
use coldstart_core::config::AppConfig;
use coldstart_core::{ConnectionConfig, RetryOutcome, poll_until};
use coldstart_database::AppDatabase;
use std::collections::BTreeMap;
use std::fmt;

/// Whether the database already holds application data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationState {
    /// Canonical table absent.
    Uninitialized,
    /// Canonical table present but empty. Treated as uninitialized after a schema reset.
    PartiallyInitialized,
    /// Canonical table has rows.
    Ready,
}

impl InitializationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::PartiallyInitialized => "partially_initialized",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for InitializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the bootstrap phase did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// State detected before any change.
    pub state: InitializationState,
    pub installer_ran: bool,
    /// Tables removed by the partial-schema reset.
    pub dropped_tables: Vec<String>,
    pub settings: SettingsReport,
}

/// One detection attempt.
enum Detection {
    Unreachable(String),
    Detected(InitializationState),
}

pub struct BootstrapSequencer<'a> {
    config: &'a AppConfig,
    db: &'a dyn AppDatabase,
    installer: &'a dyn Installer,
}

impl<'a> BootstrapSequencer<'a> {
    pub fn new(config: &'a AppConfig, db: &'a dyn AppDatabase, installer: &'a dyn Installer) -> Self {
        Self {
            config,
            db,
            installer,
        }
    }

    async fn detect_once(&self, attempt: u32) -> Detection {
        let max_attempts = self.config.database.probe.max_attempts;
        if let Err(err) = self.db.ping().await {
            tracing::info!(attempt, max_attempts, error = %err, "Database not reachable yet");
            return Detection::Unreachable(err.to_string());
        }

        let table = &self.config.database.canonical_table;
        match self.db.table_row_count(table).await {
            Ok(None) => Detection::Detected(InitializationState::Uninitialized),
            Ok(Some(0)) => Detection::Detected(InitializationState::PartiallyInitialized),
            Ok(Some(_)) => Detection::Detected(InitializationState::Ready),
            Err(err) => {
                tracing::info!(
                    attempt,
                    max_attempts,
                    table = %table,
                    connectivity = err.is_connectivity(),
                    error = %err,
                    "Canonical table query failed"
                );
                Detection::Unreachable(err.to_string())
            }
        }
    }

    /// Poll the database until its initialization state is known.
    ///
    /// Any answer from a reachable database ends the loop, including an empty
    /// canonical table. Running out of attempts is fatal.
    pub async fn detect_state(&self) -> BootstrapResult<InitializationState> {
        let policy = self.config.database.probe;
        let outcome = poll_until(
            policy,
            |attempt| self.detect_once(attempt),
            |detection| matches!(detection, Detection::Detected(_)),
        )
        .await;

        match outcome {
            RetryOutcome::Ready {
                value: Detection::Detected(state),
                attempts,
            } => {
                tracing::info!(
                    state = %state,
                    attempts,
                    backend = self.db.backend_name(),
                    "Database initialization state detected"
                );
                Ok(state)
            }
            RetryOutcome::TimedOut {
                last: Some(Detection::Unreachable(last_error)),
                attempts,
            } => Err(BootstrapError::DatabaseUnreachable {
                attempts,
                last_error,
            }),
            other => Err(BootstrapError::DatabaseUnreachable {
                attempts: other.attempts(),
                last_error: "no attempt completed".to_string(),
            }),
        }
    }

    /// Render the connection configuration and verify it reads back configured.
    pub async fn write_connection_config(&self) -> BootstrapResult<ConnectionConfig> {
        let path = &self.config.site.connection_config;
        let connection = self.config.database.connection_config();
        let rendered = connection.render();

        write_atomic(path, rendered.as_bytes(), None)
            .await
            .map_err(|source| BootstrapError::Write {
                path: path.clone(),
                source,
            })?;

        let written = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BootstrapError::Write {
                path: path.clone(),
                source,
            })?;
        let parsed = ConnectionConfig::parse(&written)?;
        if !parsed.configured {
            return Err(BootstrapError::Config(format!(
                "{} does not assert the configured flag",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Connection configuration written");
        Ok(parsed)
    }

    /// Run the whole bootstrap phase.
    pub async fn run(&self, overrides: &BTreeMap<String, String>) -> BootstrapResult<BootstrapReport> {
        let state = self.detect_state().await?;
        let mut dropped_tables = Vec::new();
        let mut installer_ran = false;

        match state {
            InitializationState::Ready => {
                tracing::info!("Existing installation found, skipping installer");
                self.write_connection_config().await?;
            }
            InitializationState::PartiallyInitialized | InitializationState::Uninitialized => {
                if state == InitializationState::PartiallyInitialized {
                    tracing::warn!(
                        table = %self.config.database.canonical_table,
                        "Canonical table is empty, resetting partial schema"
                    );
                    dropped_tables = self.db.drop_all_tables().await?;
                } else {
                    // An installer that died before creating the canonical table leaves others behind.
                    let leftovers = self.db.list_tables().await?;
                    if !leftovers.is_empty() {
                        tracing::warn!(
                            table = %self.config.database.canonical_table,
                            leftover_tables = leftovers.len(),
                            "Canonical table is missing, resetting partial schema"
                        );
                        dropped_tables = self.db.drop_all_tables().await?;
                    }
                }

                let params = InstallerParams::from_config(self.config);
                self.installer.install(&params).await?;
                installer_ran = true;

                // Re-assert so `configured` holds regardless of what the installer wrote.
                self.write_connection_config().await?;
            }
        }

        let settings = apply_settings(self.db, overrides).await;

        Ok(BootstrapReport {
            state,
            installer_ran,
            dropped_tables,
            settings,
        })
    }
}
