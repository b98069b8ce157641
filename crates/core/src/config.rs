//! Configuration types shared across crates.

use crate::connection::ConnectionConfig;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Database connection and readiness-probe configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host (e.g., "cloud-sql-proxy").
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port (default: 3306).
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Application login.
    #[serde(default = "default_db_login")]
    pub login: String,
    /// Application password.
    /// WARNING: Prefer COLDSTART_DATABASE__PASSWORD over storing it in a file.
    #[serde(default)]
    pub password: String,
    /// Database name.
    #[serde(default = "default_db_name")]
    pub name: String,
    /// Administrative login handed to the installer on first boot.
    #[serde(default = "default_root_login")]
    pub root_login: String,
    /// Administrative password handed to the installer on first boot.
    #[serde(default)]
    pub root_password: String,
    /// Table whose row count decides whether the database is initialized.
    #[serde(default = "default_canonical_table")]
    pub canonical_table: String,
    /// Maximum connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long one connectivity check may wait for a connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Readiness polling budget (default: 30 attempts, 2s apart).
    #[serde(default = "default_db_probe")]
    pub probe: RetryPolicy,
    /// Driver selection.
    #[serde(default)]
    pub backend: DatabaseBackend,
}

/// Database driver.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// MySQL-compatible server (production).
    #[default]
    Mysql,
    /// SQLite file (tests and local runs only).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("root_login", &self.root_login)
            .field("root_password", &"<redacted>")
            .field("canonical_table", &self.canonical_table)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("probe", &self.probe)
            .field("backend", &self.backend)
            .finish()
    }
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_login() -> String {
    "openemr".to_string()
}

fn default_db_name() -> String {
    "openemr".to_string()
}

fn default_root_login() -> String {
    "root".to_string()
}

fn default_canonical_table() -> String {
    "users".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_db_probe() -> RetryPolicy {
    RetryPolicy::new(30, 2_000)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            login: default_db_login(),
            password: String::new(),
            name: default_db_name(),
            root_login: default_root_login(),
            root_password: String::new(),
            canonical_table: default_canonical_table(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            probe: default_db_probe(),
            backend: DatabaseBackend::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// The connection-configuration file contents for these parameters.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            login: self.login.clone(),
            password: self.password.clone(),
            database: self.name.clone(),
            configured: true,
        }
    }
}

/// Application installer invocation.
#[derive(Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Interpreter used to run the installer entry point.
    #[serde(default = "default_installer_program")]
    pub program: String,
    /// Installer entry point. A missing file is a fatal misconfiguration.
    #[serde(default = "default_installer_script")]
    pub script: PathBuf,
    /// Initial administrator created by the installer.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    /// Initial administrator password.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Host pattern the application login is granted from.
    #[serde(default = "default_login_host")]
    pub login_host: String,
    /// Additional `key=value` parameters appended to the assembled ones.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl std::fmt::Debug for InstallerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerConfig")
            .field("program", &self.program)
            .field("script", &self.script)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"<redacted>")
            .field("login_host", &self.login_host)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn default_installer_program() -> String {
    "php".to_string()
}

fn default_installer_script() -> PathBuf {
    PathBuf::from("/var/www/localhost/htdocs/openemr/auto_configure.php")
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "pass".to_string()
}

fn default_login_host() -> String {
    "%".to_string()
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: default_installer_program(),
            script: default_installer_script(),
            admin_user: default_admin_user(),
            admin_password: default_admin_password(),
            login_host: default_login_host(),
            extra: BTreeMap::new(),
        }
    }
}

/// Files owned by the application site.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Connection-configuration file written by the bootstrap sequencer.
    #[serde(default = "default_connection_config_path")]
    pub connection_config: PathBuf,
}

fn default_connection_config_path() -> PathBuf {
    PathBuf::from("/var/www/localhost/htdocs/openemr/sites/default/sqlconf.php")
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            connection_config: default_connection_config_path(),
        }
    }
}

/// Externally supplied settings overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Explicit overrides (setting name -> value). Win over the environment.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    /// Environment variables with this prefix contribute one override each.
    #[serde(default = "default_settings_env_prefix")]
    pub env_prefix: String,
}

fn default_settings_env_prefix() -> String {
    "OPENEMR_SETTING_".to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            env_prefix: default_settings_env_prefix(),
        }
    }
}

impl SettingsConfig {
    /// Merge prefixed environment variables with the explicit overrides.
    pub fn resolve<I>(&self, env: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut resolved = BTreeMap::new();
        if !self.env_prefix.is_empty() {
            for (key, value) in env {
                if let Some(name) = key.strip_prefix(&self.env_prefix)
                    && !name.is_empty()
                {
                    resolved.insert(name.to_string(), value);
                }
            }
        }
        resolved.extend(
            self.overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        resolved
    }
}

/// Application service management API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppServiceConfig {
    /// Base URL of the application (e.g., "http://localhost").
    #[serde(default = "default_app_base_url")]
    pub base_url: String,
    /// Readiness endpoint; must return JSON with an `installed` boolean.
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,
    /// Client registration endpoint.
    #[serde(default = "default_registration_path")]
    pub registration_path: String,
    /// Token endpoint.
    #[serde(default = "default_token_path")]
    pub token_path: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Wait for `installed` before probing (default: 90 attempts, 2s apart).
    #[serde(default = "default_install_wait")]
    pub install_wait: RetryPolicy,
    /// Wait for readiness after a restart (default: 60 attempts, 2s apart).
    #[serde(default = "default_restart_wait")]
    pub restart_wait: RetryPolicy,
    /// Command that restarts the application service process.
    #[serde(default = "default_app_restart_command")]
    pub restart_command: Vec<String>,
}

fn default_app_base_url() -> String {
    "http://localhost".to_string()
}

fn default_readiness_path() -> String {
    "/meta/health/readyz".to_string()
}

fn default_registration_path() -> String {
    "/oauth2/default/registration".to_string()
}

fn default_token_path() -> String {
    "/oauth2/default/token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_install_wait() -> RetryPolicy {
    RetryPolicy::new(90, 2_000)
}

fn default_restart_wait() -> RetryPolicy {
    RetryPolicy::new(60, 2_000)
}

fn default_app_restart_command() -> Vec<String> {
    vec![
        "apachectl".to_string(),
        "-k".to_string(),
        "restart".to_string(),
    ]
}

impl Default for AppServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_app_base_url(),
            readiness_path: default_readiness_path(),
            registration_path: default_registration_path(),
            token_path: default_token_path(),
            request_timeout_secs: default_request_timeout_secs(),
            install_wait: default_install_wait(),
            restart_wait: default_restart_wait(),
            restart_command: default_app_restart_command(),
        }
    }
}

impl AppServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Authorization-server key material on the local filesystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Private half of the key pair.
    #[serde(default = "default_private_key")]
    pub private_key: PathBuf,
    /// Public half of the key pair.
    #[serde(default = "default_public_key")]
    pub public_key: PathBuf,
    /// Directory tree holding the per-method auxiliary key files.
    #[serde(default = "default_methods_dir")]
    pub methods_dir: PathBuf,
    /// Remediation attempts before giving up (default: 3).
    #[serde(default = "default_remediation_attempts")]
    pub remediation_attempts: u32,
}

fn default_private_key() -> PathBuf {
    PathBuf::from(
        "/var/www/localhost/htdocs/openemr/sites/default/documents/certificates/oaprivate.key",
    )
}

fn default_public_key() -> PathBuf {
    PathBuf::from(
        "/var/www/localhost/htdocs/openemr/sites/default/documents/certificates/oapublic.key",
    )
}

fn default_methods_dir() -> PathBuf {
    PathBuf::from("/var/www/localhost/htdocs/openemr/sites/default/documents/logs_and_misc/methods")
}

fn default_remediation_attempts() -> u32 {
    3
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
            public_key: default_public_key(),
            methods_dir: default_methods_dir(),
            remediation_attempts: default_remediation_attempts(),
        }
    }
}

/// Identity used by the throwaway consistency-probe registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Client name of the probe registration; rows with this name are deleted after every probe.
    #[serde(default = "default_probe_client_name")]
    pub client_name: String,
    /// Scopes requested by the probe.
    #[serde(default = "default_probe_scopes")]
    pub scopes: Vec<String>,
    /// Placeholder redirect target.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_probe_client_name() -> String {
    "coldstart-key-probe".to_string()
}

fn default_probe_scopes() -> Vec<String> {
    vec!["openid".to_string(), "api:oemr".to_string()]
}

fn default_redirect_uri() -> String {
    "https://localhost".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            client_name: default_probe_client_name(),
            scopes: default_probe_scopes(),
            redirect_uri: default_redirect_uri(),
        }
    }
}

impl ProbeConfig {
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Dependent-service OAuth client.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Registered client name.
    #[serde(default = "default_oauth_client_name")]
    pub client_name: String,
    /// Scopes requested at registration and token exchange.
    #[serde(default = "default_oauth_scopes")]
    pub scopes: Vec<String>,
    /// Placeholder redirect target.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// User for the password-grant exchange.
    #[serde(default = "default_admin_user")]
    pub username: String,
    /// Password for the password-grant exchange.
    #[serde(default = "default_admin_password")]
    pub password: String,
    /// Role sent with the password grant.
    #[serde(default = "default_user_role")]
    pub user_role: String,
    /// Env file read by the dependent service.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    /// Env file variable holding the client identifier.
    #[serde(default = "default_client_id_var")]
    pub client_id_var: String,
    /// Env file variable holding the client secret.
    #[serde(default = "default_client_secret_var")]
    pub client_secret_var: String,
    /// Secret-store name of the client identifier.
    #[serde(default = "default_client_id_var")]
    pub client_id_secret: String,
    /// Secret-store name of the client secret.
    #[serde(default = "default_client_secret_var")]
    pub client_secret_secret: String,
    /// Delay between restarting the dependent service and validating.
    #[serde(default = "default_stabilization_delay_secs")]
    pub stabilization_delay_secs: u64,
    /// Command that restarts the dependent service.
    #[serde(default = "default_dependent_restart_command")]
    pub dependent_restart_command: Vec<String>,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_name", &self.client_name)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_role", &self.user_role)
            .field("env_file", &self.env_file)
            .field("client_id_var", &self.client_id_var)
            .field("client_secret_var", &self.client_secret_var)
            .field("client_id_secret", &self.client_id_secret)
            .field("client_secret_secret", &self.client_secret_secret)
            .field("stabilization_delay_secs", &self.stabilization_delay_secs)
            .field("dependent_restart_command", &self.dependent_restart_command)
            .finish()
    }
}

fn default_oauth_client_name() -> String {
    "openemr-ai-agent".to_string()
}

fn default_oauth_scopes() -> Vec<String> {
    [
        "openid",
        "api:oemr",
        "user/appointment.read",
        "user/encounter.read",
        "user/patient.read",
        "user/insurance.read",
        "user/vital.read",
        "user/soap_note.read",
        "user/AllergyIntolerance.read",
        "user/Condition.read",
        "user/MedicationRequest.read",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_user_role() -> String {
    "users".to_string()
}

fn default_env_file() -> PathBuf {
    PathBuf::from("/opt/openemr/.env")
}

fn default_client_id_var() -> String {
    "OPENEMR_CLIENT_ID".to_string()
}

fn default_client_secret_var() -> String {
    "OPENEMR_CLIENT_SECRET".to_string()
}

fn default_stabilization_delay_secs() -> u64 {
    5
}

fn default_dependent_restart_command() -> Vec<String> {
    [
        "docker",
        "compose",
        "--env-file",
        "/opt/openemr/.env",
        "-f",
        "/opt/openemr/docker-compose.yml",
        "up",
        "-d",
        "ai-agent",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_name: default_oauth_client_name(),
            scopes: default_oauth_scopes(),
            redirect_uri: default_redirect_uri(),
            username: default_admin_user(),
            password: default_admin_password(),
            user_role: default_user_role(),
            env_file: default_env_file(),
            client_id_var: default_client_id_var(),
            client_secret_var: default_client_secret_var(),
            client_id_secret: default_client_id_var(),
            client_secret_secret: default_client_secret_var(),
            stabilization_delay_secs: default_stabilization_delay_secs(),
            dependent_restart_command: default_dependent_restart_command(),
        }
    }
}

impl OAuthConfig {
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_secs(self.stabilization_delay_secs)
    }
}

/// External secret store.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretsConfig {
    /// Google Cloud Secret Manager.
    Gcp {
        /// Project that owns the secrets.
        project_id: String,
        /// Metadata server used to obtain an access token.
        #[serde(default = "default_metadata_url")]
        metadata_url: String,
        /// Secret Manager API base URL.
        #[serde(default = "default_secret_manager_url")]
        api_base_url: String,
        /// Static access token. Skips the metadata server when set.
        /// WARNING: Prefer the metadata server outside of local testing.
        access_token: Option<String>,
    },
    /// One directory per secret, one file per version.
    Filesystem {
        /// Root directory.
        path: PathBuf,
    },
    /// No secret store; credentials live only in the local env file.
    #[default]
    Disabled,
}

fn default_metadata_url() -> String {
    "http://metadata.google.internal".to_string()
}

fn default_secret_manager_url() -> String {
    "https://secretmanager.googleapis.com".to_string()
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretsConfig::Gcp {
                project_id,
                metadata_url,
                api_base_url,
                access_token,
            } => f
                .debug_struct("Gcp")
                .field("project_id", project_id)
                .field("metadata_url", metadata_url)
                .field("api_base_url", api_base_url)
                .field("access_token", &access_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            SecretsConfig::Filesystem { path } => {
                f.debug_struct("Filesystem").field("path", path).finish()
            }
            SecretsConfig::Disabled => f.write_str("Disabled"),
        }
    }
}

impl SecretsConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            SecretsConfig::Gcp { project_id, .. } if project_id.trim().is_empty() => {
                Err("secrets.project_id is required for the gcp backend".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Complete bootstrap configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub installer: InstallerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub app: AppServiceConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses an SQLite database next to the given
    /// directory, no secret store, zero polling intervals and small budgets.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            database: DatabaseConfig {
                password: "openemr".to_string(),
                probe: RetryPolicy::immediate(3),
                backend: DatabaseBackend::Sqlite {
                    path: root.join("app.db"),
                },
                ..DatabaseConfig::default()
            },
            installer: InstallerConfig {
                script: root.join("auto_configure.php"),
                ..InstallerConfig::default()
            },
            site: SiteConfig {
                connection_config: root.join("sites/default/sqlconf.php"),
            },
            settings: SettingsConfig::default(),
            app: AppServiceConfig {
                install_wait: RetryPolicy::immediate(3),
                restart_wait: RetryPolicy::immediate(3),
                restart_command: vec!["true".to_string()],
                ..AppServiceConfig::default()
            },
            keys: KeysConfig {
                private_key: root.join("certificates/oaprivate.key"),
                public_key: root.join("certificates/oapublic.key"),
                methods_dir: root.join("methods"),
                remediation_attempts: default_remediation_attempts(),
            },
            probe: ProbeConfig::default(),
            oauth: OAuthConfig {
                env_file: root.join(".env"),
                stabilization_delay_secs: 0,
                dependent_restart_command: vec!["true".to_string()],
                ..OAuthConfig::default()
            },
            secrets: SecretsConfig::Disabled,
        }
    }

    /// Validate configuration invariants.
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if !is_sql_identifier(&self.database.canonical_table) {
            return Err(format!(
                "database.canonical_table {:?} is not a plain SQL identifier",
                self.database.canonical_table
            ));
        }
        if self.database.probe.max_attempts == 0 {
            return Err("database.probe.max_attempts must be at least 1".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("database.max_connections must be at least 1".to_string());
        }
        if !self.app.base_url.starts_with("http://") && !self.app.base_url.starts_with("https://")
        {
            return Err("app.base_url must start with http:// or https://".to_string());
        }
        if self.app.restart_command.is_empty() {
            return Err("app.restart_command cannot be empty".to_string());
        }
        if self.oauth.dependent_restart_command.is_empty() {
            return Err("oauth.dependent_restart_command cannot be empty".to_string());
        }
        if self.keys.remediation_attempts == 0 {
            return Err("keys.remediation_attempts must be at least 1".to_string());
        }
        if self.probe.client_name.trim().is_empty() || self.oauth.client_name.trim().is_empty() {
            return Err("probe and oauth client names cannot be empty".to_string());
        }
        if self.probe.client_name == self.oauth.client_name {
            // Probe cleanup deletes every row with the probe name.
            return Err("probe.client_name must differ from oauth.client_name".to_string());
        }
        for name in self.settings.overrides.keys() {
            if name.trim().is_empty() {
                return Err("settings.overrides contains an empty setting name".to_string());
            }
        }
        self.secrets.validate()
    }
}

/// Whether `name` is safe to splice into SQL as a bare identifier.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 64
}
