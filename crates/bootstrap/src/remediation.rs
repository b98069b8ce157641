//! Key remediation loop.
//!
//! On a confirmed mismatch both halves of the key material are destroyed so
//! the application regenerates a matching pair on its next authenticated
//! request. The loop is bounded and never fails the run.

use crate::app_client::AppService;
use crate::keys::clear_key_files;
use crate::prober::{ConsistencyProber, ProbeOutcome, wait_until_installed};
use crate::service::Restarter;
use coldstart_core::config::KeysConfig;
use coldstart_core::{RetryPolicy, Warnings};
use coldstart_database::AppDatabase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationReport {
    /// Clear-and-restart cycles performed.
    pub attempts: u32,
    /// Classification after the last probe.
    pub final_outcome: ProbeOutcome,
    /// True when a cycle ran and the last probe came back consistent.
    pub healed: bool,
    pub warnings: Warnings,
}

pub struct KeyRemediator<'a> {
    prober: &'a ConsistencyProber<'a>,
    app: &'a dyn AppService,
    db: &'a dyn AppDatabase,
    restarter: &'a dyn Restarter,
    keys: &'a KeysConfig,
    restart_wait: RetryPolicy,
}

impl<'a> KeyRemediator<'a> {
    pub fn new(
        prober: &'a ConsistencyProber<'a>,
        app: &'a dyn AppService,
        db: &'a dyn AppDatabase,
        restarter: &'a dyn Restarter,
        keys: &'a KeysConfig,
        restart_wait: RetryPolicy,
    ) -> Self {
        Self {
            prober,
            app,
            db,
            restarter,
            keys,
            restart_wait,
        }
    }

    /// Destroy both halves of the key material. Absent rows and files are fine.
    async fn clear_key_material(&self, warnings: &mut Warnings) {
        if let Some(rows) = warnings.absorb("remediation.key_rows", self.db.delete_key_rows().await) {
            tracing::info!(rows, "Deleted stored key rows");
        }
        if let Some(files) = warnings.absorb("remediation.key_files", clear_key_files(self.keys).await) {
            tracing::info!(files, "Deleted key files");
        }
    }

    async fn restart_and_wait(&self, warnings: &mut Warnings) {
        if warnings
            .absorb("remediation.restart", self.restarter.restart().await)
            .is_none()
        {
            return;
        }
        if !wait_until_installed(self.app, self.restart_wait).await {
            warnings.record(
                "remediation.restart_wait",
                format!("{} not ready after restart", self.restarter.service()),
            );
        }
    }

    /// Heal an inconsistent key state with at most `keys.remediation_attempts` cycles.
    ///
    /// Any other initial classification is returned untouched.
    pub async fn run(&self, initial: ProbeOutcome) -> RemediationReport {
        let mut warnings = Warnings::new();
        if initial != ProbeOutcome::Inconsistent {
            return RemediationReport {
                attempts: 0,
                final_outcome: initial,
                healed: false,
                warnings,
            };
        }

        let max_attempts = self.keys.remediation_attempts.max(1);
        let mut attempts = 0;
        let mut outcome = initial;

        while attempts < max_attempts {
            let report = self.prober.probe_once().await;
            warnings.extend(report.warnings);
            outcome = report.outcome;
            if outcome != ProbeOutcome::Inconsistent {
                break;
            }

            attempts += 1;
            tracing::warn!(attempt = attempts, max_attempts, "Key mismatch confirmed, clearing key material");
            self.clear_key_material(&mut warnings).await;
            self.restart_and_wait(&mut warnings).await;
        }

        // The last cycle still needs a verdict.
        if outcome == ProbeOutcome::Inconsistent {
            let report = self.prober.probe_once().await;
            warnings.extend(report.warnings);
            outcome = report.outcome;
        }

        let healed = attempts > 0 && outcome == ProbeOutcome::Consistent;
        match outcome {
            ProbeOutcome::Consistent => {
                tracing::info!(attempts, "Key material consistent");
            }
            ProbeOutcome::Inconsistent => {
                tracing::warn!(
                    attempts,
                    "Key material still inconsistent after all remediation attempts, continuing"
                );
            }
            ProbeOutcome::NotReady => {
                tracing::warn!(attempts, "Application not ready during remediation, continuing");
            }
        }

        RemediationReport {
            attempts,
            final_outcome: outcome,
            healed,
            warnings,
        }
    }
}
