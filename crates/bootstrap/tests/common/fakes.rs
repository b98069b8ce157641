//! In-memory collaborators.
//!
//! `FakeApp` models the application's key handling closely enough for the
//! self-healing phases: the key pair lives in files, the encrypted values in
//! the `keys` table, and both are generated lazily on first use. A key row
//! written by one file generation cannot be read by another.

use async_trait::async_trait;
use coldstart_bootstrap::app_client::{
    AppClientError, AppService, Readiness, RegistrationRequest, RegistrationResponse,
    TokenRequest, TokenResponse,
};
use coldstart_bootstrap::{BootstrapError, BootstrapResult, Installer, InstallerParams, Restarter};
use coldstart_core::config::KeysConfig;
use coldstart_secrets::{SecretError, SecretResult, SecretStore};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::fixtures::{INSTALLED_ROWS, SQLITE_SCHEMA};

#[derive(Debug, Default)]
struct AppState {
    generation: u32,
    not_ready_polls: u32,
    not_installed: bool,
    forced_register_status: Option<u16>,
    omit_credentials: bool,
    reject_tokens: bool,
    registrations: u32,
    token_requests: u32,
    next_client: u32,
}

pub struct FakeApp {
    pool: SqlitePool,
    keys: KeysConfig,
    state: Mutex<AppState>,
}

impl FakeApp {
    pub fn new(pool: SqlitePool, keys: KeysConfig) -> Self {
        Self {
            pool,
            keys,
            state: Mutex::new(AppState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AppState> {
        self.state.lock().expect("fake app state poisoned")
    }

    /// Report `installed = false` for the next `polls` readiness checks.
    pub fn not_ready_for(&self, polls: u32) {
        self.state().not_ready_polls = polls;
    }

    /// Never report installed.
    pub fn never_installed(&self) {
        self.state().not_installed = true;
    }

    /// Answer every registration with `status` and no side effects.
    pub fn force_register_status(&self, status: u16) {
        self.state().forced_register_status = Some(status);
    }

    /// Register successfully but leave the secret out of the response.
    pub fn omit_credentials(&self) {
        self.state().omit_credentials = true;
    }

    /// Answer every token request with 401.
    pub fn reject_tokens(&self) {
        self.state().reject_tokens = true;
    }

    pub fn registrations(&self) -> u32 {
        self.state().registrations
    }

    pub fn token_requests(&self) -> u32 {
        self.state().token_requests
    }

    /// Generations of key files written so far.
    pub fn key_generation(&self) -> u32 {
        self.state().generation
    }

    fn file_generation(&self) -> Option<u32> {
        std::fs::read_to_string(&self.keys.private_key)
            .ok()?
            .trim()
            .strip_prefix("private-gen-")?
            .parse()
            .ok()
    }

    fn write_key_files(&self) -> u32 {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.generation
        };
        for (path, contents) in [
            (&self.keys.private_key, format!("private-gen-{generation}")),
            (&self.keys.public_key, format!("public-gen-{generation}")),
        ] {
            std::fs::create_dir_all(path.parent().expect("key path has a parent"))
                .expect("create key dir");
            std::fs::write(path, contents).expect("write key file");
        }
        let method_dir = self.keys.methods_dir.join("sodium");
        std::fs::create_dir_all(&method_dir).expect("create methods dir");
        std::fs::write(method_dir.join("sixa"), format!("method-gen-{generation}"))
            .expect("write method key");
        generation
    }

    /// Create missing key material and report whether both halves match.
    async fn keys_consistent(&self) -> Result<bool, AppClientError> {
        let generation = match self.file_generation() {
            Some(generation) => generation,
            None => self.write_key_files(),
        };

        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM `keys` WHERE name = 'oauth2key'")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match stored {
            Some(value) => Ok(value == format!("enc-by-gen-{generation}")),
            None => {
                sqlx::query("INSERT INTO `keys` (name, value) VALUES ('oauth2key', ?), ('oauth2passphrase', ?)")
                    .bind(format!("enc-by-gen-{generation}"))
                    .bind(format!("pass-by-gen-{generation}"))
                    .execute(&self.pool)
                    .await
                    .map_err(db_error)?;
                Ok(true)
            }
        }
    }
}

fn db_error(err: sqlx::Error) -> AppClientError {
    AppClientError::Decode(format!("fake application database error: {err}"))
}

#[async_trait]
impl AppService for FakeApp {
    async fn readiness(&self) -> Result<Readiness, AppClientError> {
        let mut state = self.state();
        if state.not_installed {
            return Ok(Readiness { installed: false });
        }
        if state.not_ready_polls > 0 {
            state.not_ready_polls -= 1;
            return Ok(Readiness { installed: false });
        }
        Ok(Readiness { installed: true })
    }

    async fn register_client(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, AppClientError> {
        let (forced, omit, n) = {
            let mut state = self.state();
            state.registrations += 1;
            state.next_client += 1;
            (
                state.forced_register_status,
                state.omit_credentials,
                state.next_client,
            )
        };

        if let Some(status) = forced {
            return Ok(RegistrationResponse {
                status,
                client_id: None,
                client_secret: None,
            });
        }

        if !self.keys_consistent().await? {
            return Ok(RegistrationResponse {
                status: 500,
                client_id: None,
                client_secret: None,
            });
        }

        let client_id = format!("client-{n}");
        let client_secret = format!("secret-{n}");
        sqlx::query(
            "INSERT INTO oauth_clients (client_id, client_name, client_secret, is_enabled) VALUES (?, ?, ?, 0)",
        )
        .bind(&client_id)
        .bind(&request.client_name)
        .bind(&client_secret)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(RegistrationResponse {
            status: 201,
            client_id: Some(client_id),
            client_secret: (!omit).then_some(client_secret),
        })
    }

    async fn request_token(&self, request: &TokenRequest) -> Result<TokenResponse, AppClientError> {
        let (n, reject) = {
            let mut state = self.state();
            state.token_requests += 1;
            (state.token_requests, state.reject_tokens)
        };

        if !self.keys_consistent().await? {
            return Ok(TokenResponse {
                status: 500,
                access_token: None,
            });
        }

        let row: Option<(Option<String>, bool)> = sqlx::query_as(
            "SELECT client_secret, is_enabled FROM oauth_clients WHERE client_id = ?",
        )
        .bind(&request.client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let valid = matches!(
            row,
            Some((Some(ref secret), true)) if *secret == request.client_secret
        ) && request.username == "admin"
            && request.password == "pass"
            && !reject;

        Ok(if valid {
            TokenResponse {
                status: 200,
                access_token: Some(format!("token-{n}")),
            }
        } else {
            TokenResponse {
                status: 401,
                access_token: None,
            }
        })
    }
}

/// Creates the schema and the installer rows, or fails with an exit code.
pub struct FakeInstaller {
    pool: SqlitePool,
    calls: AtomicU32,
    fail_code: Option<i32>,
    last_params: Mutex<Option<InstallerParams>>,
}

impl FakeInstaller {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            calls: AtomicU32::new(0),
            fail_code: None,
            last_params: Mutex::new(None),
        }
    }

    pub fn failing(pool: SqlitePool, code: i32) -> Self {
        Self {
            fail_code: Some(code),
            ..Self::new(pool)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<InstallerParams> {
        self.last_params.lock().expect("params poisoned").clone()
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, params: &InstallerParams) -> BootstrapResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().expect("params poisoned") = Some(params.clone());

        if let Some(code) = self.fail_code {
            return Err(BootstrapError::InstallerFailed { code: Some(code) });
        }
        sqlx::raw_sql(SQLITE_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| BootstrapError::Database(e.into()))?;
        sqlx::raw_sql(INSTALLED_ROWS)
            .execute(&self.pool)
            .await
            .map_err(|e| BootstrapError::Database(e.into()))?;
        Ok(())
    }
}

/// Counts restarts; optionally fails every one.
pub struct RecordingRestarter {
    service: String,
    calls: AtomicU32,
    fail: AtomicBool,
}

impl RecordingRestarter {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            calls: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Restarter for RecordingRestarter {
    fn service(&self) -> &str {
        &self.service
    }

    async fn restart(&self) -> BootstrapResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BootstrapError::Restart {
                service: self.service.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Versioned secrets in memory.
#[derive(Default)]
pub struct MemorySecretStore {
    versions: Mutex<HashMap<String, Vec<String>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn seed(&self, name: &str, value: &str) {
        self.versions
            .lock()
            .expect("secrets poisoned")
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn latest(&self, name: &str) -> Option<String> {
        self.versions
            .lock()
            .expect("secrets poisoned")
            .get(name)
            .and_then(|v| v.last().cloned())
    }

    pub fn version_count(&self, name: &str) -> usize {
        self.versions
            .lock()
            .expect("secrets poisoned")
            .get(name)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, name: &str) -> SecretResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SecretError::Api {
                status: 503,
                body: "injected read failure".to_string(),
            });
        }
        Ok(self.latest(name))
    }

    async fn write(&self, name: &str, value: &str) -> SecretResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecretError::Api {
                status: 403,
                body: "injected write failure".to_string(),
            });
        }
        self.seed(name, value);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
