//! Google Cloud Secret Manager backend.
//!
//! Talks to the REST API directly. Access tokens come from the instance
//! metadata server unless a static token is configured.

use crate::error::{SecretError, SecretResult};
use crate::traits::{SecretStore, validate_secret_name};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize, Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: SecretPayload,
}

#[derive(Serialize)]
struct AddVersionRequest {
    payload: SecretPayload,
}

/// Secret Manager client for one project.
pub struct GcpSecretManager {
    http: reqwest::Client,
    project_id: String,
    metadata_url: String,
    api_base_url: String,
    static_token: Option<String>,
}

impl GcpSecretManager {
    /// Create a new Secret Manager backend.
    pub fn new(
        project_id: &str,
        metadata_url: &str,
        api_base_url: &str,
        static_token: Option<String>,
    ) -> SecretResult<Self> {
        if project_id.trim().is_empty() {
            return Err(SecretError::Config("project_id cannot be empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            project_id: project_id.to_string(),
            metadata_url: metadata_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            static_token,
        })
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/v1/projects/{}/secrets/{}",
            self.api_base_url, self.project_id, name
        )
    }

    async fn access_token(&self) -> SecretResult<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let response = self
            .http
            .get(format!("{}{}", self.metadata_url, METADATA_TOKEN_PATH))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SecretError::Token(format!("metadata server returned {status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SecretError::Token(e.to_string()))?;
        Ok(token.access_token)
    }
}

/// Decode a Secret Manager payload. Both base64 alphabets are accepted.
fn decode_payload(data: &str) -> SecretResult<String> {
    let bytes = STANDARD
        .decode(data)
        .or_else(|_| URL_SAFE.decode(data))
        .map_err(|e| SecretError::Payload(format!("invalid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| SecretError::Payload(format!("not UTF-8: {e}")))
}

#[async_trait]
impl SecretStore for GcpSecretManager {
    #[instrument(skip(self), fields(backend = "gcp", project = %self.project_id))]
    async fn read(&self, name: &str) -> SecretResult<Option<String>> {
        validate_secret_name(name)?;
        let token = self.access_token().await?;

        let url = format!("{}/versions/latest:access", self.secret_url(name));
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SecretError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let access: AccessResponse = response.json().await?;
        decode_payload(&access.payload.data).map(Some)
    }

    #[instrument(skip(self, value), fields(backend = "gcp", project = %self.project_id))]
    async fn write(&self, name: &str, value: &str) -> SecretResult<()> {
        validate_secret_name(name)?;
        let token = self.access_token().await?;

        let url = format!("{}:addVersion", self.secret_url(name));
        let request = AddVersionRequest {
            payload: SecretPayload {
                data: STANDARD.encode(value),
            },
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SecretError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "gcp"
    }
}
