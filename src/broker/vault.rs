//! HashiCorp Vault broker session.
//!
//! Speaks Vault's HTTP API directly: password login through an auth method
//! mount (`auth/{method}/login/{username}`), logical reads and writes under
//! `/v1`, and lease revocation through `sys/leases/revoke`.
//!
//! # Example
//!
//! ```rust,ignore
//! use breakglass::broker::{SecretsBroker, VaultSession};
//! use breakglass::config::BrokerConfig;
//!
//! let config = BrokerConfig { host: "vault.example.com".into(), ..Default::default() };
//! let session = VaultSession::open(&config, password).await?;
//! let secret = session.read("mysql/db1/creds/readonly").await?;
//! session.revoke(&secret.lease_id).await?;
//! ```
//!
//! # Security
//!
//! - The operator password is borrowed for the login request only
//! - The session token is held in a [`SecretString`] and never logged

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::client::{Ack, Params, SecretPayload, SecretsBroker};
use super::error::{BrokerError, Result};
use super::types::SecretString;
use crate::config::BrokerConfig;

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

#[derive(Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<AuthBlock>,
}

#[derive(Deserialize)]
struct AuthBlock {
    client_token: SecretString,
    #[serde(default)]
    accessor: String,
    #[serde(default)]
    lease_duration: u64,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    lease_id: &'a str,
}

/// An authenticated Vault session.
///
/// The session identifier (the token accessor Vault assigns at login) is fixed
/// for the lifetime of the value. The session is not `Clone`; share it behind
/// an `Arc` when a guard and the foreground path both need it.
pub struct VaultSession {
    http: Client,
    endpoint: String,
    namespace: Option<String>,
    token: SecretString,
    session_id: String,
    token_ttl: Duration,
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("token", &self.token)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl VaultSession {
    /// Log in with a username/password auth method and open a session.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Auth`] if Vault rejects the credentials, is unreachable,
    ///   or answers without an `auth` block
    /// - [`BrokerError::Config`] if the HTTP client cannot be built
    pub async fn open(config: &BrokerConfig, password: SecretString) -> Result<Self> {
        let endpoint = config.endpoint();
        let http = build_http_client(config)?;
        let path = format!("auth/{}/login/{}", config.auth_method, config.username);

        tracing::debug!(endpoint = %endpoint, path = %path, "Logging in to Vault");

        let response = request(&http, &endpoint, config.namespace.as_deref(), Method::POST, &path)
            .json(&LoginRequest { password: password.expose_secret() })
            .send()
            .await
            .map_err(|e| BrokerError::auth(format!("Vault at {} is unreachable: {}", endpoint, e)))?;
        drop(password);

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            tracing::warn!(status = status.as_u16(), username = %config.username, "Vault login rejected");
            return Err(BrokerError::auth(format!("login rejected ({}): {}", status.as_u16(), message)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::auth(format!("Unreadable login response: {}", e)))?;

        let auth = login.auth.ok_or_else(|| {
            BrokerError::auth("No token retrieved during login - check your login method")
        })?;

        tracing::info!(
            endpoint = %endpoint,
            username = %config.username,
            auth_method = %config.auth_method,
            session_id = %auth.accessor,
            "Authenticated to Vault"
        );

        Ok(Self {
            http,
            endpoint,
            namespace: config.namespace.clone(),
            token: auth.client_token,
            session_id: auth.accessor,
            token_ttl: Duration::from_secs(auth.lease_duration),
        })
    }

    /// Identifier Vault assigned to this login.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// TTL of the session token as reported at login.
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        request(&self.http, &self.endpoint, self.namespace.as_deref(), method, path)
            .header(TOKEN_HEADER, self.token.expose_secret())
    }

    async fn into_payload(path: &str, response: Response) -> Result<SecretPayload> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            tracing::debug!(path = %path, status = status.as_u16(), "No secret at path");
            return Err(BrokerError::not_found(path));
        }

        if !status.is_success() {
            let message = error_message(response).await;
            tracing::error!(path = %path, status = status.as_u16(), "Vault rejected request");
            return Err(BrokerError::rejected(status.as_u16().to_string(), message));
        }

        let payload: SecretPayload = response.json().await.map_err(|e| {
            BrokerError::transport(format!("Unreadable Vault response for '{}': {}", path, e))
        })?;

        tracing::debug!(path = %path, lease_id = %payload.lease_id, "Received secret from Vault");
        Ok(payload)
    }
}

#[async_trait]
impl SecretsBroker for VaultSession {
    async fn read(&self, path: &str) -> Result<SecretPayload> {
        let response = self.authed(Method::GET, path).send().await?;
        Self::into_payload(path, response).await
    }

    async fn write(&self, path: &str, params: &Params) -> Result<SecretPayload> {
        let response = self.authed(Method::PUT, path).json(params).send().await?;
        Self::into_payload(path, response).await
    }

    async fn revoke(&self, lease_id: &str) -> Result<Ack> {
        if lease_id.is_empty() {
            tracing::debug!("Empty lease identifier, nothing to revoke");
            return Ok(Ack);
        }

        let response = self
            .authed(Method::PUT, "sys/leases/revoke")
            .json(&RevokeRequest { lease_id })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(lease_id = %lease_id, "Vault lease revoked");
            return Ok(Ack);
        }

        let message = error_message(response).await;
        if status == StatusCode::NOT_FOUND
            || (status == StatusCode::BAD_REQUEST && message.to_lowercase().contains("invalid lease"))
        {
            tracing::debug!(lease_id = %lease_id, "Lease unknown to Vault, treating as revoked");
            return Ok(Ack);
        }

        Err(BrokerError::rejected(status.as_u16().to_string(), message))
    }
}

fn build_http_client(config: &BrokerConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .danger_accept_invalid_certs(config.skip_verify)
        .build()
        .map_err(|e| BrokerError::config(format!("Failed to build HTTP client: {}", e)))
}

fn request(
    http: &Client,
    endpoint: &str,
    namespace: Option<&str>,
    method: Method,
    path: &str,
) -> RequestBuilder {
    let url = format!("{}/v1/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'));
    let builder = http.request(method, url);
    match namespace {
        Some(ns) if !ns.is_empty() => builder.header(NAMESPACE_HEADER, ns),
        _ => builder,
    }
}

/// First entry of Vault's `errors` array, or the raw body.
async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|e| e.errors.into_iter().next())
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BrokerConfig {
        BrokerConfig {
            address: Some(server.uri()),
            username: "oncall".to_string(),
            auth_method: "ldap".to_string(),
            ..Default::default()
        }
    }

    async fn logged_in(server: &MockServer) -> VaultSession {
        Mock::given(method("POST"))
            .and(path("/v1/auth/ldap/login/oncall"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.token", "accessor": "acc-1", "lease_duration": 600}
            })))
            .mount(server)
            .await;

        VaultSession::open(&config_for(server), SecretString::new("pw")).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_exchanges_password_for_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/ldap/login/oncall"))
            .and(body_json(json!({"password": "correct horse"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.token", "accessor": "acc-1", "lease_duration": 600}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session =
            VaultSession::open(&config_for(&server), SecretString::new("correct horse")).await.unwrap();

        assert_eq!(session.session_id(), "acc-1");
        assert_eq!(session.token_ttl(), Duration::from_secs(600));
        assert!(!format!("{:?}", session).contains("s.token"));
    }

    #[tokio::test]
    async fn test_open_rejected_credentials_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"errors": ["ldap operation failed"]})),
            )
            .mount(&server)
            .await;

        let err = VaultSession::open(&config_for(&server), SecretString::new("wrong"))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Auth { .. }));
        assert!(err.to_string().contains("ldap operation failed"));
    }

    #[tokio::test]
    async fn test_open_without_auth_block_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let err =
            VaultSession::open(&config_for(&server), SecretString::new("pw")).await.unwrap_err();
        assert!(err.to_string().contains("check your login method"));
    }

    #[tokio::test]
    async fn test_open_unreachable_is_auth_error() {
        let config = BrokerConfig {
            address: Some("http://127.0.0.1:1".to_string()),
            timeout_seconds: 2,
            ..Default::default()
        };
        let err = VaultSession::open(&config, SecretString::new("pw")).await.unwrap_err();
        assert!(matches!(err, BrokerError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_read_sends_token_and_returns_payload() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/mysql/db1/creds/readonly"))
            .and(header(TOKEN_HEADER, "s.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "mysql/db1/creds/readonly/xyz",
                "lease_duration": 3600,
                "data": {"username": "v-ro-1", "password": "A1a-pw"}
            })))
            .mount(&server)
            .await;

        let payload = session.read("mysql/db1/creds/readonly").await.unwrap();
        assert_eq!(payload.lease_id, "mysql/db1/creds/readonly/xyz");
        assert_eq!(payload.data["username"], "v-ro-1");
    }

    #[tokio::test]
    async fn test_read_missing_role_is_not_found() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/mysql/nope/creds/readonly"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        let err = session.read("mysql/nope/creds/readonly").await.unwrap_err();
        assert_eq!(err, BrokerError::not_found("mysql/nope/creds/readonly"));
    }

    #[tokio::test]
    async fn test_read_permission_denied_carries_code() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/aws/creds/admin"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"errors": ["permission denied"]})),
            )
            .mount(&server)
            .await;

        let err = session.read("aws/creds/admin").await.unwrap_err();
        assert_eq!(err.code(), Some("403"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_write_sends_params() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("PUT"))
            .and(path("/v1/ssh/creds/breakglass"))
            .and(body_json(json!({"ip": "10.0.0.5", "username": "breakglass"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "ssh/creds/breakglass/1",
                "data": {"key": "otp", "key_type": "otp", "username": "breakglass", "ip": "10.0.0.5", "port": 22}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut params = Params::new();
        params.insert("ip".into(), json!("10.0.0.5"));
        params.insert("username".into(), json!("breakglass"));

        let payload = session.write("ssh/creds/breakglass", &params).await.unwrap();
        assert_eq!(payload.data["port"], 22);
    }

    #[tokio::test]
    async fn test_revoke_acknowledges_known_and_unknown_leases() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .and(body_json(json!({"lease_id": "aws/creds/x/1"})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .and(body_json(json!({"lease_id": "gone"})))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"errors": ["invalid lease ID"]})),
            )
            .mount(&server)
            .await;

        assert_eq!(session.revoke("aws/creds/x/1").await.unwrap(), Ack);
        assert_eq!(session.revoke("gone").await.unwrap(), Ack);
    }

    #[tokio::test]
    async fn test_revoke_empty_lease_makes_no_request() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(session.revoke("").await.unwrap(), Ack);
    }

    #[tokio::test]
    async fn test_revoke_server_error_is_reported() {
        let server = MockServer::start().await;
        let session = logged_in(&server).await;

        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"errors": ["storage down"]})))
            .mount(&server)
            .await;

        let err = session.revoke("aws/creds/x/1").await.unwrap_err();
        assert_eq!(err.code(), Some("500"));
    }

    #[tokio::test]
    async fn test_namespace_header_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/ldap/login/oncall"))
            .and(header(NAMESPACE_HEADER, "ops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.token", "accessor": "acc-ns"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = BrokerConfig { namespace: Some("ops".to_string()), ..config_for(&server) };
        let session = VaultSession::open(&config, SecretString::new("pw")).await.unwrap();
        assert_eq!(session.session_id(), "acc-ns");
    }
}
