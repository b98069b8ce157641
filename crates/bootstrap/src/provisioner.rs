//! OAuth client provisioner.
//!
//! Makes sure the dependent service holds credentials that complete a full
//! token exchange. Existing credentials are tried first; otherwise a new
//! client is registered, enabled, persisted and validated.

use crate::app_client::{AppService, RegistrationRequest, TokenRequest};
use crate::files::{read_env_var, update_env_file};
use crate::service::Restarter;
use coldstart_core::config::OAuthConfig;
use coldstart_core::{Warnings, redact};
use coldstart_database::AppDatabase;
use coldstart_secrets::SecretStore;
use std::fmt;

/// Provisioning state machine.
///
/// `Unchecked -> (FastPathValid | NeedsRegistration) -> Registered -> (Validated | Failed)`.
/// Registration failures also end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Unchecked,
    FastPathValid,
    NeedsRegistration,
    Registered,
    Validated,
    Failed,
}

impl ProvisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::FastPathValid => "fast_path_valid",
            Self::NeedsRegistration => "needs_registration",
            Self::Registered => "registered",
            Self::Validated => "validated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client identifier/secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

/// Where existing credentials were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    SecretStore,
    EnvFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub state: ProvisionState,
    /// States visited, in order, starting with `Unchecked`.
    pub transitions: Vec<ProvisionState>,
    /// Credentials in effect at the end of the run.
    pub credentials: Option<Credentials>,
    /// Source of the pre-existing credentials, if any were found.
    pub existing_source: Option<CredentialSource>,
    pub warnings: Warnings,
}

impl ProvisionReport {
    fn new() -> Self {
        Self {
            state: ProvisionState::Unchecked,
            transitions: vec![ProvisionState::Unchecked],
            credentials: None,
            existing_source: None,
            warnings: Warnings::new(),
        }
    }

    fn transition(&mut self, next: ProvisionState) {
        tracing::debug!(from = %self.state, to = %next, "Provisioning state change");
        self.state = next;
        self.transitions.push(next);
    }
}

pub struct OAuthProvisioner<'a> {
    app: &'a dyn AppService,
    db: &'a dyn AppDatabase,
    secrets: Option<&'a dyn SecretStore>,
    restarter: &'a dyn Restarter,
    config: &'a OAuthConfig,
}

impl<'a> OAuthProvisioner<'a> {
    pub fn new(
        app: &'a dyn AppService,
        db: &'a dyn AppDatabase,
        secrets: Option<&'a dyn SecretStore>,
        restarter: &'a dyn Restarter,
        config: &'a OAuthConfig,
    ) -> Self {
        Self {
            app,
            db,
            secrets,
            restarter,
            config,
        }
    }

    async fn read_secret_pair(&self, store: &dyn SecretStore) -> coldstart_secrets::SecretResult<Option<Credentials>> {
        let client_id = store.read(&self.config.client_id_secret).await?;
        let client_secret = store.read(&self.config.client_secret_secret).await?;
        Ok(pair(client_id, client_secret))
    }

    async fn read_env_pair(&self) -> std::io::Result<Option<Credentials>> {
        let path = &self.config.env_file;
        let client_id = read_env_var(path, &self.config.client_id_var).await?;
        let client_secret = read_env_var(path, &self.config.client_secret_var).await?;
        Ok(pair(client_id, client_secret))
    }

    /// Existing credentials: the secret store first, then the local env file.
    pub async fn load_existing(&self, warnings: &mut Warnings) -> Option<(Credentials, CredentialSource)> {
        if let Some(store) = self.secrets
            && let Some(Some(credentials)) =
                warnings.absorb("oauth.secret_read", self.read_secret_pair(store).await)
        {
            return Some((credentials, CredentialSource::SecretStore));
        }

        warnings
            .absorb("oauth.env_read", self.read_env_pair().await)
            .flatten()
            .map(|credentials| (credentials, CredentialSource::EnvFile))
    }

    /// Full password-grant exchange. Any failure reads as "not valid".
    pub async fn token_exchange(&self, credentials: &Credentials) -> bool {
        let request = TokenRequest {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            scope: self.config.scope(),
            user_role: self.config.user_role.clone(),
        };
        match self.app.request_token(&request).await {
            Ok(response) => {
                tracing::debug!(
                    status = response.status,
                    client_id = %redact(&credentials.client_id),
                    "Token exchange response"
                );
                response.is_success()
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token exchange request failed");
                false
            }
        }
    }

    /// Register a new client. A single attempt; missing credentials are an error.
    pub async fn register(&self) -> Result<Credentials, String> {
        let request = RegistrationRequest::private(
            &self.config.client_name,
            &self.config.redirect_uri,
            self.config.scope(),
        );
        let response = self
            .app
            .register_client(&request)
            .await
            .map_err(|e| format!("registration request failed: {e}"))?;

        if !(200..300).contains(&response.status) {
            return Err(format!("registration returned HTTP {}", response.status));
        }
        match (response.client_id, response.client_secret) {
            (Some(client_id), Some(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Ok(Credentials {
                    client_id,
                    client_secret,
                })
            }
            _ => Err("registration response is missing client_id or client_secret".to_string()),
        }
    }

    /// Enable, store remotely, rewrite the env file and restart the dependent service.
    /// Every step is best effort.
    async fn persist(&self, credentials: &Credentials, warnings: &mut Warnings) {
        match self.db.enable_client_by_name(&self.config.client_name).await {
            Ok(0) => warnings.record(
                "oauth.enable",
                format!("no client rows named {}", self.config.client_name),
            ),
            Ok(rows) => tracing::info!(rows, client_name = %self.config.client_name, "Client enabled"),
            Err(err) => warnings.record("oauth.enable", err.to_string()),
        }

        match self.secrets {
            Some(store) => {
                for (name, value) in [
                    (&self.config.client_id_secret, &credentials.client_id),
                    (&self.config.client_secret_secret, &credentials.client_secret),
                ] {
                    if warnings
                        .absorb("oauth.secret_write", store.write(name, value).await)
                        .is_some()
                    {
                        tracing::info!(secret = %name, backend = store.backend_name(), "Secret version added");
                    }
                }
            }
            None => tracing::info!("No secret store configured, credentials kept locally only"),
        }

        let env_update = update_env_file(
            &self.config.env_file,
            &[
                (self.config.client_id_var.as_str(), credentials.client_id.as_str()),
                (
                    self.config.client_secret_var.as_str(),
                    credentials.client_secret.as_str(),
                ),
            ],
        )
        .await;
        if warnings.absorb("oauth.env_file", env_update).is_some() {
            tracing::info!(path = %self.config.env_file.display(), "Env file updated");
        }

        warnings.absorb("oauth.restart", self.restarter.restart().await);
    }

    /// Run the state machine. `force` skips the fast path.
    pub async fn run(&self, force: bool) -> ProvisionReport {
        let mut report = ProvisionReport::new();

        let existing = self.load_existing(&mut report.warnings).await;
        report.existing_source = existing.as_ref().map(|(_, source)| *source);

        if let Some((credentials, source)) = existing {
            if force {
                tracing::info!("Forced re-provisioning, skipping fast path");
            } else if self.token_exchange(&credentials).await {
                tracing::info!(
                    source = ?source,
                    client_id = %redact(&credentials.client_id),
                    "Existing client credentials are valid"
                );
                report.credentials = Some(credentials);
                report.transition(ProvisionState::FastPathValid);
                return report;
            } else {
                tracing::info!(source = ?source, "Existing client credentials rejected");
            }
        } else {
            tracing::info!("No existing client credentials found");
        }
        report.transition(ProvisionState::NeedsRegistration);

        let credentials = match self.register().await {
            Ok(credentials) => credentials,
            Err(reason) => {
                tracing::error!(client_name = %self.config.client_name, reason = %reason, "Client registration failed");
                report.warnings.record("oauth.register", reason);
                report.transition(ProvisionState::Failed);
                return report;
            }
        };
        tracing::info!(
            client_name = %self.config.client_name,
            client_id = %redact(&credentials.client_id),
            "Client registered"
        );
        report.transition(ProvisionState::Registered);

        self.persist(&credentials, &mut report.warnings).await;

        let delay = self.config.stabilization_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.token_exchange(&credentials).await {
            tracing::info!(client_id = %redact(&credentials.client_id), "New client credentials validated");
            report.transition(ProvisionState::Validated);
        } else {
            report
                .warnings
                .record("oauth.validate", "token exchange with new credentials failed");
            report.transition(ProvisionState::Failed);
        }
        report.credentials = Some(credentials);
        report
    }
}

fn pair(client_id: Option<String>, client_secret: Option<String>) -> Option<Credentials> {
    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret))
            if !client_id.trim().is_empty() && !client_secret.trim().is_empty() =>
        {
            Some(Credentials {
                client_id: client_id.trim().to_string(),
                client_secret: client_secret.trim().to_string(),
            })
        }
        _ => None,
    }
}
