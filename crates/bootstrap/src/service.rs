//! External processes: the application installer and service restarts.

use crate::error::{BootstrapError, BootstrapResult};
use async_trait::async_trait;
use coldstart_core::config::{AppConfig, InstallerConfig};
use std::path::PathBuf;
use tokio::process::Command;

/// Parameters handed to the installer as `key=value` arguments.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InstallerParams(Vec<(String, String)>);

impl InstallerParams {
    /// Assemble the connection and identity parameters from configuration.
    /// `installer.extra` entries are appended and may override assembled keys.
    pub fn from_config(config: &AppConfig) -> Self {
        let db = &config.database;
        let installer = &config.installer;
        let mut params = Self::default();
        params.set("server", &db.host);
        params.set("port", &db.port.to_string());
        params.set("login", &db.login);
        params.set("pass", &db.password);
        params.set("dbname", &db.name);
        params.set("root", &db.root_login);
        params.set("rootpass", &db.root_password);
        params.set("loginhost", &installer.login_host);
        params.set("iuser", &installer.admin_user);
        params.set("iuserpass", &installer.admin_password);
        for (key, value) in &installer.extra {
            params.set(key, value);
        }
        params
    }

    /// Insert or replace a parameter, keeping first-insertion order.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.0.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// `key=value` command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl std::fmt::Debug for InstallerParams {
    // Values include passwords; only keys are printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// The application's own first-boot installer.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, params: &InstallerParams) -> BootstrapResult<()>;
}

/// Runs `<program> <script> key=value...`.
pub struct CommandInstaller {
    program: String,
    script: PathBuf,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Self {
        Self::new(config.program.clone(), config.script.clone())
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, params: &InstallerParams) -> BootstrapResult<()> {
        if !tokio::fs::try_exists(&self.script).await.unwrap_or(false) {
            return Err(BootstrapError::InstallerMissing(self.script.clone()));
        }

        tracing::info!(
            program = %self.program,
            script = %self.script.display(),
            params = ?params,
            "Running application installer"
        );
        let status = Command::new(&self.program)
            .arg(&self.script)
            .args(params.to_args())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(BootstrapError::InstallerSpawn)?;

        if !status.success() {
            return Err(BootstrapError::InstallerFailed {
                code: status.code(),
            });
        }
        tracing::info!("Application installer finished");
        Ok(())
    }
}

/// Restart primitive for one long-running service.
#[async_trait]
pub trait Restarter: Send + Sync {
    /// Service name for log fields.
    fn service(&self) -> &str;

    async fn restart(&self) -> BootstrapResult<()>;
}

/// Restarts a service by running a fixed command.
pub struct CommandRestarter {
    service: String,
    command: Vec<String>,
}

impl CommandRestarter {
    pub fn new(service: impl Into<String>, command: Vec<String>) -> BootstrapResult<Self> {
        let service = service.into();
        if command.is_empty() {
            return Err(BootstrapError::Config(format!(
                "restart command for {service} is empty"
            )));
        }
        Ok(Self { service, command })
    }
}

#[async_trait]
impl Restarter for CommandRestarter {
    fn service(&self) -> &str {
        &self.service
    }

    async fn restart(&self) -> BootstrapResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BootstrapError::Config("empty restart command".to_string()))?;

        tracing::info!(service = %self.service, command = ?self.command, "Restarting service");
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BootstrapError::Restart {
                service: self.service.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BootstrapError::Restart {
                service: self.service.clone(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}
