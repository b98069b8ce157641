//! Credential consistency prober.
//!
//! The key pair on disk and the encrypted key rows in the database cannot be
//! compared directly. Instead a throwaway client registration is attempted:
//! the application only fails it with a 500 when it cannot decrypt its own
//! signing key.

use crate::app_client::{AppService, RegistrationRequest};
use coldstart_core::config::ProbeConfig;
use coldstart_core::{RetryPolicy, Warnings, poll_until};
use coldstart_database::AppDatabase;
use std::fmt;

/// Classification of the current key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Consistent,
    Inconsistent,
    /// Not installed, unreachable, or failing for reasons unrelated to keys.
    NotReady,
}

impl ProbeOutcome {
    /// Map a registration status. Only an exact 500 signals a key mismatch.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Consistent,
            500 => Self::Inconsistent,
            _ => Self::NotReady,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consistent => "consistent",
            Self::Inconsistent => "inconsistent",
            Self::NotReady => "not_ready",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    /// Registration status, if a response was received.
    pub status: Option<u16>,
    /// Whether the service reported itself installed before probing.
    pub installed: bool,
    pub warnings: Warnings,
}

/// Wait until the service reports itself installed. Transport errors count as "not yet".
pub async fn wait_until_installed(app: &dyn AppService, policy: RetryPolicy) -> bool {
    let outcome = poll_until(
        policy,
        |attempt| async move {
            match app.readiness().await {
                Ok(readiness) => readiness.installed,
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "Readiness check failed");
                    false
                }
            }
        },
        |installed| *installed,
    )
    .await;

    if !outcome.is_ready() {
        tracing::warn!(
            attempts = outcome.attempts(),
            "Application service did not report installed in time"
        );
    }
    outcome.is_ready()
}

pub struct ConsistencyProber<'a> {
    app: &'a dyn AppService,
    db: &'a dyn AppDatabase,
    config: &'a ProbeConfig,
}

impl<'a> ConsistencyProber<'a> {
    pub fn new(app: &'a dyn AppService, db: &'a dyn AppDatabase, config: &'a ProbeConfig) -> Self {
        Self { app, db, config }
    }

    /// Wait for installation, then probe once. Skips probing if the wait runs out.
    pub async fn probe(&self, install_wait: RetryPolicy) -> ProbeReport {
        if !wait_until_installed(self.app, install_wait).await {
            return ProbeReport {
                outcome: ProbeOutcome::NotReady,
                status: None,
                installed: false,
                warnings: Warnings::new(),
            };
        }
        self.probe_once().await
    }

    /// Issue one probe registration and always remove the probe's rows afterwards.
    pub async fn probe_once(&self) -> ProbeReport {
        let request = RegistrationRequest::private(
            &self.config.client_name,
            &self.config.redirect_uri,
            self.config.scope(),
        );

        let (outcome, status) = match self.app.register_client(&request).await {
            Ok(response) => (ProbeOutcome::from_status(response.status), Some(response.status)),
            Err(err) => {
                tracing::warn!(error = %err, "Probe registration request failed");
                (ProbeOutcome::NotReady, None)
            }
        };

        let mut warnings = Warnings::new();
        if let Some(deleted) = warnings.absorb(
            "probe.cleanup",
            self.db.delete_clients_by_name(&self.config.client_name).await,
        ) {
            tracing::debug!(deleted, client_name = %self.config.client_name, "Probe client rows removed");
        }

        tracing::info!(outcome = %outcome, status = ?status, "Key consistency probe finished");
        ProbeReport {
            outcome,
            status,
            installed: true,
            warnings,
        }
    }
}
