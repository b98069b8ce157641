//! Application Service management API.
//!
//! Responses are returned with their HTTP status instead of being turned into
//! errors: the prober and the provisioner classify status codes themselves.
//! Only transport failures surface as [`AppClientError`].

use async_trait::async_trait;
use coldstart_core::config::AppServiceConfig;
use coldstart_core::redact;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application Service client errors.
#[derive(Debug, thiserror::Error)]
pub enum AppClientError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Installation state reported by the readiness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub installed: bool,
}

/// Dynamic client registration request.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub application_type: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
}

impl RegistrationRequest {
    pub fn private(client_name: &str, redirect_uri: &str, scope: String) -> Self {
        Self {
            application_type: "private".to_string(),
            client_name: client_name.to_string(),
            redirect_uris: vec![redirect_uri.to_string()],
            scope,
        }
    }
}

/// Registration outcome: the status plus whatever credentials the body carried.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub status: u16,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for RegistrationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationResponse")
            .field("status", &self.status)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_deref().map(redact))
            .finish()
    }
}

/// Password-grant token request.
#[derive(Clone, Serialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub user_role: String,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("scope", &self.scope)
            .field("user_role", &self.user_role)
            .finish()
    }
}

/// Token exchange outcome.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub status: u16,
    pub access_token: Option<String>,
}

impl TokenResponse {
    /// HTTP 200 with a non-empty access token.
    pub fn is_success(&self) -> bool {
        self.status == 200 && self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("status", &self.status)
            .field("access_token", &self.access_token.as_deref().map(redact))
            .finish()
    }
}

/// The Application Service operations a cold start depends on.
#[async_trait]
pub trait AppService: Send + Sync {
    /// Query the readiness endpoint.
    async fn readiness(&self) -> Result<Readiness, AppClientError>;

    /// Register an OAuth client.
    async fn register_client(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, AppClientError>;

    /// Exchange credentials for an access token.
    async fn request_token(&self, request: &TokenRequest) -> Result<TokenResponse, AppClientError>;
}

#[derive(Deserialize)]
struct CredentialsBody {
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct TokenBody {
    access_token: Option<String>,
}

/// HTTP implementation of [`AppService`].
#[derive(Clone)]
pub struct AppClient {
    http: reqwest::Client,
    readiness_url: Url,
    registration_url: Url,
    token_url: Url,
}

impl AppClient {
    pub fn new(config: &AppServiceConfig) -> Result<Self, AppClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            readiness_url: endpoint(&config.base_url, &config.readiness_path)?,
            registration_url: endpoint(&config.base_url, &config.registration_path)?,
            token_url: endpoint(&config.base_url, &config.token_path)?,
        })
    }
}

fn endpoint(base_url: &str, path: &str) -> Result<Url, AppClientError> {
    let url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&url).map_err(|e| AppClientError::InvalidUrl {
        url,
        reason: e.to_string(),
    })
}

/// Read `installed` from either the top level or a nested `checks` object.
fn parse_readiness(body: &str) -> Result<Readiness, AppClientError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AppClientError::Decode(e.to_string()))?;
    let installed = value
        .get("installed")
        .or_else(|| value.get("checks").and_then(|c| c.get("installed")))
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| AppClientError::Decode("missing boolean `installed`".to_string()))?;
    Ok(Readiness { installed })
}

#[async_trait]
impl AppService for AppClient {
    async fn readiness(&self) -> Result<Readiness, AppClientError> {
        // A not-yet-ready service may answer 503 with the same body shape.
        let response = self.http.get(self.readiness_url.clone()).send().await?;
        let body = response.text().await?;
        parse_readiness(&body)
    }

    async fn register_client(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, AppClientError> {
        let response = self
            .http
            .post(self.registration_url.clone())
            .json(request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let credentials = serde_json::from_str::<CredentialsBody>(&body).ok();

        tracing::debug!(status, client_name = %request.client_name, "Client registration response");
        Ok(RegistrationResponse {
            status,
            client_id: credentials.as_ref().and_then(|c| c.client_id.clone()),
            client_secret: credentials.and_then(|c| c.client_secret),
        })
    }

    async fn request_token(&self, request: &TokenRequest) -> Result<TokenResponse, AppClientError> {
        let form = [
            ("grant_type", "password"),
            ("username", request.username.as_str()),
            ("password", request.password.as_str()),
            ("client_id", request.client_id.as_str()),
            ("client_secret", request.client_secret.as_str()),
            ("scope", request.scope.as_str()),
            ("user_role", request.user_role.as_str()),
        ];
        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let access_token = serde_json::from_str::<TokenBody>(&body)
            .ok()
            .and_then(|b| b.access_token);

        Ok(TokenResponse {
            status,
            access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let url = endpoint("http://localhost/", "/oauth2/default/token").unwrap();
        assert_eq!(url.as_str(), "http://localhost/oauth2/default/token");

        let url = endpoint("https://emr.example.com/openemr", "meta/health/readyz").unwrap();
        assert_eq!(url.as_str(), "https://emr.example.com/openemr/meta/health/readyz");
    }

    #[test]
    fn readiness_accepts_top_level_and_nested_flag() {
        assert!(parse_readiness(r#"{"installed": true}"#).unwrap().installed);
        assert!(
            !parse_readiness(r#"{"status": "starting", "checks": {"installed": false}}"#)
                .unwrap()
                .installed
        );
        assert!(parse_readiness(r#"{"status": "ok"}"#).is_err());
        assert!(parse_readiness("<html>").is_err());
    }

    #[test]
    fn token_success_requires_200_and_token() {
        let ok = TokenResponse {
            status: 200,
            access_token: Some("abc".to_string()),
        };
        assert!(ok.is_success());
        assert!(
            !TokenResponse {
                status: 200,
                access_token: Some(String::new())
            }
            .is_success()
        );
        assert!(
            !TokenResponse {
                status: 401,
                access_token: Some("abc".to_string())
            }
            .is_success()
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let request = TokenRequest {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
            client_id: "client".to_string(),
            client_secret: "0123456789abcdef".to_string(),
            scope: "openid".to_string(),
            user_role: "users".to_string(),
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("01234567…"));
    }
}
