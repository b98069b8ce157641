//! Cold-start pipeline.
//!
//! Bootstrap, then probe and heal the key material, then provision the
//! dependent-service client. Only the bootstrap phase can fail the run.

use crate::app_client::AppService;
use crate::error::BootstrapResult;
use crate::prober::{ConsistencyProber, ProbeReport};
use crate::provisioner::{OAuthProvisioner, ProvisionReport};
use crate::remediation::{KeyRemediator, RemediationReport};
use crate::sequencer::{BootstrapReport, BootstrapSequencer};
use crate::service::{Installer, Restarter};
use coldstart_core::config::AppConfig;
use coldstart_database::AppDatabase;
use coldstart_secrets::SecretStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub db: Arc<dyn AppDatabase>,
    pub app: Arc<dyn AppService>,
    pub secrets: Option<Arc<dyn SecretStore>>,
    pub installer: Arc<dyn Installer>,
    /// Restarts the application service during remediation.
    pub app_restarter: Arc<dyn Restarter>,
    /// Restarts the dependent service after new credentials are written.
    pub dependent_restarter: Arc<dyn Restarter>,
}

/// Reports of every phase of a full run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub bootstrap: BootstrapReport,
    pub probe: ProbeReport,
    pub remediation: RemediationReport,
    pub provisioning: ProvisionReport,
}

impl PipelineReport {
    /// Best-effort failures across all phases.
    pub fn warning_count(&self) -> usize {
        self.bootstrap.settings.warnings.len()
            + self.probe.warnings.len()
            + self.remediation.warnings.len()
            + self.provisioning.warnings.len()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            initialization_state = %self.bootstrap.state,
            installer_ran = self.bootstrap.installer_ran,
            settings_applied = self.bootstrap.settings.applied.len(),
            probe_outcome = %self.probe.outcome,
            remediation_attempts = self.remediation.attempts,
            key_outcome = %self.remediation.final_outcome,
            provisioning_state = %self.provisioning.state,
            warnings = self.warning_count(),
            "Cold start complete"
        );
    }
}

pub struct Pipeline {
    config: AppConfig,
    collab: Collaborators,
    overrides: BTreeMap<String, String>,
}

impl Pipeline {
    pub fn new(config: AppConfig, collab: Collaborators, overrides: BTreeMap<String, String>) -> Self {
        Self {
            config,
            collab,
            overrides,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn prober(&self) -> ConsistencyProber<'_> {
        ConsistencyProber::new(
            self.collab.app.as_ref(),
            self.collab.db.as_ref(),
            &self.config.probe,
        )
    }

    pub async fn bootstrap(&self) -> BootstrapResult<BootstrapReport> {
        BootstrapSequencer::new(
            &self.config,
            self.collab.db.as_ref(),
            self.collab.installer.as_ref(),
        )
        .run(&self.overrides)
        .await
    }

    /// Wait for installation and classify the key material once.
    pub async fn probe(&self) -> ProbeReport {
        self.prober().probe(self.config.app.install_wait).await
    }

    /// Probe, then remediate if the key material is inconsistent.
    pub async fn heal(&self) -> (ProbeReport, RemediationReport) {
        let prober = self.prober();
        let probe = prober.probe(self.config.app.install_wait).await;
        let remediation = KeyRemediator::new(
            &prober,
            self.collab.app.as_ref(),
            self.collab.db.as_ref(),
            self.collab.app_restarter.as_ref(),
            &self.config.keys,
            self.config.app.restart_wait,
        )
        .run(probe.outcome)
        .await;
        (probe, remediation)
    }

    pub async fn provision(&self, force: bool) -> ProvisionReport {
        OAuthProvisioner::new(
            self.collab.app.as_ref(),
            self.collab.db.as_ref(),
            self.collab.secrets.as_deref(),
            self.collab.dependent_restarter.as_ref(),
            &self.config.oauth,
        )
        .run(force)
        .await
    }

    /// Full cold start. Errors only come from the bootstrap phase.
    pub async fn run(&self) -> BootstrapResult<PipelineReport> {
        let bootstrap = self.bootstrap().await?;
        let (probe, remediation) = self.heal().await;
        let provisioning = self.provision(false).await;

        let report = PipelineReport {
            bootstrap,
            probe,
            remediation,
            provisioning,
        };
        report.log_summary();
        Ok(report)
    }
}
