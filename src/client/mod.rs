//! Management command client for Azure Data Explorer.
//!
//! Commands are posted to the cluster's `/v1/rest/mgmt` endpoint with a
//! bearer token from [`Authenticator`].

mod auth;
mod endpoint;

pub use auth::{
    force_interactive_setting, parse_bool, AccessToken, Authenticator, CredentialError,
    CredentialOptions, CredentialProvider, TokenSource, AZURE_PUBLIC_CLOUD,
    FORCE_INTERACTIVE_ENV,
};
pub use endpoint::{Endpoint, EndpointError};

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from submitting a command.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by cluster")]
    RateLimited,
    #[error("cluster unavailable: HTTP {0}")]
    Unavailable(u16),
    #[error("command failed (HTTP {status}): {message}")]
    Command { status: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_)
                | ClientError::Timeout
                | ClientError::RateLimited
                | ClientError::Unavailable(_)
        )
    }

    fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(e)
        }
    }
}

/// Executes management commands against a database.
#[allow(async_fn_in_trait)]
pub trait ManagementClient {
    async fn execute(&self, database: &str, command: &str) -> Result<(), ClientError>;
}

/// Everything needed to reach a database.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: Endpoint,
    pub credentials: CredentialOptions,
    pub request_timeout: Duration,
    /// Authority host override, e.g. for sovereign clouds.
    pub authority: Option<String>,
}

impl ConnectionConfig {
    pub fn new(endpoint: Endpoint, credentials: CredentialOptions) -> Self {
        Self {
            endpoint,
            credentials,
            request_timeout: Duration::from_secs(60),
            authority: None,
        }
    }
}

#[derive(Serialize)]
struct MgmtRequest<'a> {
    db: &'a str,
    csl: &'a str,
}

/// HTTP client for a single cluster.
pub struct KustoClient {
    http: reqwest::Client,
    mgmt_url: String,
    auth: Authenticator,
    timeout: Duration,
}

impl KustoClient {
    pub fn new(connection: &ConnectionConfig) -> Result<Self, ClientError> {
        let source = TokenSource::select(&connection.credentials)
            .map_err(|e| ClientError::Auth(e.to_string()))?;
        debug!(
            cluster = connection.endpoint.cluster(),
            credential = source.describe(),
            "connecting"
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("ksd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut auth = Authenticator::new(http.clone(), source, connection.endpoint.scope());
        if let Some(authority) = &connection.authority {
            auth = auth.with_authority(authority);
        }

        Ok(Self {
            http,
            mgmt_url: connection.endpoint.mgmt_url(),
            auth,
            timeout: connection.request_timeout,
        })
    }
}

impl ManagementClient for KustoClient {
    async fn execute(&self, database: &str, command: &str) -> Result<(), ClientError> {
        let token = self.auth.token().await?;

        let response = self
            .http
            .post(&self.mgmt_url)
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(&MgmtRequest { db: database, csl: command })
            .send()
            .await
            .map_err(ClientError::from_send)?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

fn status_error(status: u16, body: &str) -> ClientError {
    match status {
        408 => ClientError::Timeout,
        429 => ClientError::RateLimited,
        502..=504 => ClientError::Unavailable(status),
        _ => {
            let message = error_message(body).unwrap_or_else(|| format!("HTTP {}", status));
            match status {
                401 | 403 => ClientError::Auth(message),
                _ => ClientError::Command { status, message },
            }
        }
    }
}

/// Pull the service's error text out of a response body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    ["@message", "message"]
        .iter()
        .find_map(|key| error.get(key).and_then(|m| m.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(status_error(429, ""), ClientError::RateLimited));
        assert!(matches!(status_error(503, ""), ClientError::Unavailable(503)));
        assert!(matches!(status_error(408, ""), ClientError::Timeout));
        assert!(matches!(status_error(401, ""), ClientError::Auth(_)));

        let body = r#"{"error":{"code":"BadRequest","message":"Request is invalid","@message":"Syntax error: unexpected token"}}"#;
        match status_error(400, body) {
            ClientError::Command { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Syntax error: unexpected token");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        match status_error(500, "oops") {
            ClientError::Command { message, .. } => assert_eq!(message, "HTTP 500"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_message_fallback_field() {
        let body = r#"{"error":{"message":"Entity not found"}}"#;
        assert_eq!(error_message(body).as_deref(), Some("Entity not found"));
        assert_eq!(error_message("{}"), None);
    }

    #[test]
    fn test_transient_errors() {
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::RateLimited.is_transient());
        assert!(ClientError::Unavailable(502).is_transient());
        assert!(!ClientError::Auth("denied".to_string()).is_transient());
        assert!(!ClientError::Command {
            status: 400,
            message: "bad".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_client_rejects_incomplete_credentials() {
        let endpoint = Endpoint::parse("https://help.kusto.windows.net/Samples").unwrap();
        let credentials = CredentialOptions {
            client_id: Some("id".to_string()),
            ..Default::default()
        };
        let err = KustoClient::new(&ConnectionConfig::new(endpoint, credentials))
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Auth(_)));
    }
}
