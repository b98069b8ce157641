//! Cold-start bootstrap and credential self-healing.
//!
//! This crate runs the phases of a container cold start, in order:
//! - Bootstrap sequencer: first boot versus reuse, decided from the database
//! - Settings applier: configuration overrides pushed into the settings table
//! - Consistency prober and key remediation loop: detect and heal a key pair
//!   that no longer matches the encrypted values stored in the database
//! - OAuth provisioner: keep the dependent service's client credentials valid

pub mod app_client;
pub mod error;
pub mod files;
pub mod keys;
pub mod pipeline;
pub mod prober;
pub mod provisioner;
pub mod remediation;
pub mod sequencer;
pub mod service;
pub mod settings;

pub use app_client::{AppClient, AppClientError, AppService};
pub use error::{BootstrapError, BootstrapResult};
pub use pipeline::{Collaborators, Pipeline, PipelineReport};
pub use prober::{ConsistencyProber, ProbeOutcome, ProbeReport};
pub use provisioner::{Credentials, OAuthProvisioner, ProvisionReport, ProvisionState};
pub use remediation::{KeyRemediator, RemediationReport};
pub use sequencer::{BootstrapReport, BootstrapSequencer, InitializationState};
pub use service::{CommandInstaller, CommandRestarter, Installer, InstallerParams, Restarter};
pub use settings::{SettingsReport, apply_settings};
