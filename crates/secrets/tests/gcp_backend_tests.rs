//! Secret Manager backend against a mock REST API.

use coldstart_secrets::{GcpSecretManager, SecretError, SecretStore};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn backend(server: &MockServer, static_token: Option<&str>) -> GcpSecretManager {
    GcpSecretManager::new(
        "demo-project",
        &server.base_url(),
        &server.base_url(),
        static_token.map(str::to_string),
    )
    .unwrap()
}

#[tokio::test]
async fn read_uses_metadata_token_and_decodes_payload() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();

    let token_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google");
        then.status(200).json_body(json!({
            "access_token": "ya29.metadata-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        }));
    });
    let access_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/projects/demo-project/secrets/OPENEMR_CLIENT_ID/versions/latest:access")
            .header("authorization", "Bearer ya29.metadata-token");
        then.status(200).json_body(json!({
            "name": "projects/demo-project/secrets/OPENEMR_CLIENT_ID/versions/3",
            // "client-abc"
            "payload": { "data": "Y2xpZW50LWFiYw==" }
        }));
    });

    let store = backend(&server, None);
    let value = store.read("OPENEMR_CLIENT_ID").await.unwrap();

    assert_eq!(value.as_deref(), Some("client-abc"));
    token_mock.assert();
    access_mock.assert();
}

#[tokio::test]
async fn read_missing_secret_is_none() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/projects/demo-project/secrets/OPENEMR_CLIENT_SECRET/versions/latest:access");
        then.status(404).json_body(json!({
            "error": { "code": 404, "status": "NOT_FOUND" }
        }));
    });

    let store = backend(&server, Some("static"));
    assert_eq!(store.read("OPENEMR_CLIENT_SECRET").await.unwrap(), None);
}

#[tokio::test]
async fn read_surfaces_permission_errors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/projects/demo-project/secrets/OPENEMR_CLIENT_ID/versions/latest:access");
        then.status(403).body("permission denied");
    });

    let store = backend(&server, Some("static"));
    let err = store.read("OPENEMR_CLIENT_ID").await.unwrap_err();
    assert!(matches!(err, SecretError::Api { status: 403, .. }));
}

#[tokio::test]
async fn write_adds_base64_version() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    let add_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/demo-project/secrets/OPENEMR_CLIENT_SECRET:addVersion")
            .header("authorization", "Bearer static-token")
            // "s3cret"
            .json_body(json!({ "payload": { "data": "czNjcmV0" } }));
        then.status(200).json_body(json!({
            "name": "projects/demo-project/secrets/OPENEMR_CLIENT_SECRET/versions/4",
            "state": "ENABLED"
        }));
    });

    let store = backend(&server, Some("static-token"));
    store.write("OPENEMR_CLIENT_SECRET", "s3cret").await.unwrap();
    add_mock.assert();
}

#[tokio::test]
async fn metadata_failure_is_token_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/computeMetadata/v1/instance/service-accounts/default/token");
        then.status(500).body("metadata unavailable");
    });

    let store = backend(&server, None);
    let err = store.write("OPENEMR_CLIENT_ID", "x").await.unwrap_err();
    assert!(matches!(err, SecretError::Token(_)));
}
