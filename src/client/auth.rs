//! Credentials and access tokens.
//!
//! Credential selection, in order:
//!
//! 1. `client_id` + `credential_provider`: a federated token from the
//!    provider, exchanged as a client assertion
//! 2. `client_id` + `client_secret`: AAD client credentials
//! 3. otherwise the Azure CLI login, falling back to a device-code logon
//!    (or straight to device code when interactive logon is forced)
//!
//! Tokens are cached in memory until shortly before they expire.

use reqwest::{Client, Url};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

use super::ClientError;

/// Authority host for the Azure public cloud.
pub const AZURE_PUBLIC_CLOUD: &str = "https://login.microsoftonline.com";

/// Environment variable that forces the device-code logon.
pub const FORCE_INTERACTIVE_ENV: &str = "KSD_FORCE_INTERACTIVE_AUTH";

/// Public client used for device-code logon (the Azure CLI application).
const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Refresh tokens this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);
/// Lifetime assumed when a token response carries no expiry.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);

/// Errors in the credential settings themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("`--client-secret` must be set when `--client-id` is provided")]
    MissingSecret,
    #[error("`--tenant-id` must be set when `--client-id` is provided")]
    MissingTenant,
    #[error("`--client-id` must be set when `--client-secret` is provided")]
    SecretWithoutClient,
    #[error("`--client-id` must be set when `--tenant-id` is provided")]
    TenantWithoutClient,
    #[error("`--client-id` must be set when `--credential-provider` is provided")]
    ProviderWithoutClient,
    #[error("unsupported credential provider: '{0}'")]
    UnsupportedProvider(String),
    #[error(
        "invalid value for KSD_FORCE_INTERACTIVE_AUTH: '{0}'. expected truthy value: 1, true, TRUE, 0, false, FALSE"
    )]
    InvalidForceInteractive(String),
}

/// Issuers of federated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialProvider {
    /// GitHub Actions OIDC tokens.
    GitHub,
}

impl CredentialProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialProvider::GitHub => "github",
        }
    }
}

impl FromStr for CredentialProvider {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(CredentialProvider::GitHub),
            other => Err(CredentialError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credential settings for connecting to a database.
///
/// The default value authenticates with the Azure CLI login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialOptions {
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secret: Option<String>,
    pub provider: Option<CredentialProvider>,
    /// Skip the Azure CLI and use device-code logon directly.
    pub force_interactive: bool,
}

impl CredentialOptions {
    /// Build options from flag values, rejecting incomplete combinations.
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        tenant_id: Option<String>,
        provider: Option<&str>,
    ) -> Result<Self, CredentialError> {
        let provider = provider.map(CredentialProvider::from_str).transpose()?;

        if client_id.is_some() {
            if client_secret.is_none() && provider.is_none() {
                return Err(CredentialError::MissingSecret);
            }
            if tenant_id.is_none() {
                return Err(CredentialError::MissingTenant);
            }
        } else {
            if client_secret.is_some() {
                return Err(CredentialError::SecretWithoutClient);
            }
            if tenant_id.is_some() {
                return Err(CredentialError::TenantWithoutClient);
            }
            if provider.is_some() {
                return Err(CredentialError::ProviderWithoutClient);
            }
        }

        Ok(Self {
            client_id,
            tenant_id,
            client_secret,
            provider,
            force_interactive: false,
        })
    }

    pub fn force_interactive(mut self, force: bool) -> Self {
        self.force_interactive = force;
        self
    }
}

/// Parse a boolean the way `KSD_FORCE_INTERACTIVE_AUTH` accepts it.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Interpret a `KSD_FORCE_INTERACTIVE_AUTH` value; unset means false.
pub fn force_interactive_setting(value: Option<&str>) -> Result<bool, CredentialError> {
    match value {
        None => Ok(false),
        Some(v) => {
            parse_bool(v).ok_or_else(|| CredentialError::InvalidForceInteractive(v.to_string()))
        }
    }
}

/// How tokens are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    Federated {
        tenant_id: String,
        client_id: String,
        provider: CredentialProvider,
    },
    /// Azure CLI login, with device code as the fallback.
    AzureCli { tenant_id: Option<String> },
    DeviceCode { tenant_id: Option<String> },
}

impl TokenSource {
    pub fn select(options: &CredentialOptions) -> Result<Self, CredentialError> {
        let Some(client_id) = options.client_id.clone() else {
            let tenant_id = options.tenant_id.clone();
            return Ok(if options.force_interactive {
                TokenSource::DeviceCode { tenant_id }
            } else {
                TokenSource::AzureCli { tenant_id }
            });
        };

        let tenant_id = options
            .tenant_id
            .clone()
            .ok_or(CredentialError::MissingTenant)?;

        if let Some(provider) = options.provider {
            return Ok(TokenSource::Federated {
                tenant_id,
                client_id,
                provider,
            });
        }

        let client_secret = options
            .client_secret
            .clone()
            .ok_or(CredentialError::MissingSecret)?;
        Ok(TokenSource::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
        })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TokenSource::ClientSecret { .. } => "client secret",
            TokenSource::Federated { .. } => "federated credential",
            TokenSource::AzureCli { .. } => "azure cli",
            TokenSource::DeviceCode { .. } => "interactive logon",
        }
    }
}

/// A bearer token and when it stops being valid.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(secret: String, lifetime: Duration) -> Self {
        Self {
            secret,
            expires_at: Instant::now() + lifetime,
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct AadError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    message: String,
    expires_in: u64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Deserialize)]
struct GitHubTokenResponse {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<u64>,
}

/// Acquires and caches tokens for one cluster.
pub struct Authenticator {
    http: Client,
    source: TokenSource,
    scope: String,
    authority: String,
    cached: RwLock<Option<AccessToken>>,
}

impl Authenticator {
    pub fn new(http: Client, source: TokenSource, scope: String) -> Self {
        Self {
            http,
            source,
            scope,
            authority: AZURE_PUBLIC_CLOUD.to_string(),
            cached: RwLock::new(None),
        }
    }

    /// Use a different authority host, e.g. for sovereign clouds.
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    /// Return a valid bearer token, acquiring a new one if needed.
    pub async fn token(&self) -> Result<String, ClientError> {
        if let Ok(cached) = self.cached.read() {
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.secret.clone());
            }
        }

        let token = self.acquire().await?;
        let secret = token.secret.clone();
        if let Ok(mut cached) = self.cached.write() {
            *cached = Some(token);
        }
        Ok(secret)
    }

    async fn acquire(&self) -> Result<AccessToken, ClientError> {
        debug!(source = self.source.describe(), "acquiring token");
        match &self.source {
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                self.request_token(
                    tenant_id,
                    &[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", self.scope.as_str()),
                    ],
                )
                .await
            }
            TokenSource::Federated {
                tenant_id,
                client_id,
                provider,
            } => {
                let assertion = match provider {
                    CredentialProvider::GitHub => {
                        self.github_token(TOKEN_EXCHANGE_AUDIENCE).await?
                    }
                };
                self.request_token(
                    tenant_id,
                    &[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                        ("client_assertion", assertion.as_str()),
                        ("scope", self.scope.as_str()),
                    ],
                )
                .await
            }
            TokenSource::AzureCli { tenant_id } => {
                match self.azure_cli_token(tenant_id.as_deref()).await {
                    Ok(token) => Ok(token),
                    Err(e) => {
                        debug!(error = %e, "azure cli credential not available, using interactive logon");
                        self.device_code_token(tenant_id.as_deref()).await
                    }
                }
            }
            TokenSource::DeviceCode { tenant_id } => {
                self.device_code_token(tenant_id.as_deref()).await
            }
        }
    }

    fn token_url(&self, tenant: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, tenant)
    }

    async fn request_token(
        &self,
        tenant: &str,
        form: &[(&str, &str)],
    ) -> Result<AccessToken, ClientError> {
        let response = self
            .http
            .post(self.token_url(tenant))
            .form(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if (200..300).contains(&status) {
            parse_token_response(&body)
        } else {
            Err(ClientError::Auth(aad_error_message(&body, status)))
        }
    }

    /// Fetch an OIDC token from the GitHub Actions runtime.
    async fn github_token(&self, audience: &str) -> Result<String, ClientError> {
        let request_url = std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL")
            .map_err(|_| ClientError::Auth("ACTIONS_ID_TOKEN_REQUEST_URL is unset".to_string()))?;
        let request_token = std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN").map_err(|_| {
            ClientError::Auth("ACTIONS_ID_TOKEN_REQUEST_TOKEN is unset".to_string())
        })?;

        let mut url = Url::parse(&request_url)
            .map_err(|e| ClientError::Auth(format!("invalid ACTIONS_ID_TOKEN_REQUEST_URL: {}", e)))?;
        url.query_pairs_mut().append_pair("audience", audience);

        let response = self
            .http
            .get(url)
            .bearer_auth(request_token)
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Auth(format!(
                "fetching federated token: expected 200 response, got: {}",
                status
            )));
        }

        let token: GitHubTokenResponse = response.json().await?;
        if token.value.is_empty() {
            return Err(ClientError::Auth(
                "fetching federated token: no token in response".to_string(),
            ));
        }
        Ok(token.value)
    }

    async fn azure_cli_token(&self, tenant: Option<&str>) -> Result<AccessToken, ClientError> {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        let resource = self.scope.trim_end_matches("/.default");

        let mut command = tokio::process::Command::new(program);
        command.args([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            resource,
        ]);
        if let Some(tenant) = tenant {
            command.args(["--tenant", tenant]);
        }

        let output = command
            .output()
            .await
            .map_err(|e| ClientError::Auth(format!("running {}: {}", program, e)))?;
        if !output.status.success() {
            return Err(ClientError::Auth(format!(
                "az account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_cli_token(&output.stdout, unix_now())
    }

    async fn device_code_token(&self, tenant: Option<&str>) -> Result<AccessToken, ClientError> {
        let tenant = tenant.unwrap_or("organizations");
        let response = self
            .http
            .post(format!("{}/{}/oauth2/v2.0/devicecode", self.authority, tenant))
            .form(&[("client_id", AZURE_CLI_CLIENT_ID), ("scope", self.scope.as_str())])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(ClientError::Auth(aad_error_message(&body, status)));
        }
        let code: DeviceCodeResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Auth(format!("invalid device code response: {}", e)))?;

        eprintln!("{}", code.message);

        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = Duration::from_secs(code.interval.max(1));
        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(ClientError::Auth(
                    "device code expired before logon completed".to_string(),
                ));
            }

            let response = self
                .http
                .post(self.token_url(tenant))
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", AZURE_CLI_CLIENT_ID),
                    ("device_code", code.device_code.as_str()),
                ])
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            if (200..300).contains(&status) {
                return parse_token_response(&body);
            }

            match serde_json::from_str::<AadError>(&body) {
                Ok(e) if e.error == "authorization_pending" => {}
                Ok(e) if e.error == "slow_down" => interval += Duration::from_secs(5),
                _ => return Err(ClientError::Auth(aad_error_message(&body, status))),
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

fn parse_token_response(body: &str) -> Result<AccessToken, ClientError> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ClientError::Auth(format!("invalid token response: {}", e)))?;
    let lifetime = token
        .expires_in
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LIFETIME);
    Ok(AccessToken::new(token.access_token, lifetime))
}

/// Parse `az account get-access-token` output. `expires_on` is a unix
/// timestamp in recent CLI versions and absent in older ones.
fn parse_cli_token(stdout: &[u8], now: u64) -> Result<AccessToken, ClientError> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| ClientError::Auth(format!("invalid az output: {}", e)))?;
    let lifetime = token
        .expires_on
        .map(|at| Duration::from_secs(at.saturating_sub(now)))
        .unwrap_or(DEFAULT_LIFETIME);
    Ok(AccessToken::new(token.access_token, lifetime))
}

fn aad_error_message(body: &str, status: u16) -> String {
    match serde_json::from_str::<AadError>(body) {
        Ok(e) => match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        },
        Err(_) => format!("HTTP {}", status),
    }
}
