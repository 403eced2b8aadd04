//! Database endpoint parsing.

use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid endpoint: {0}")]
    Invalid(String),
    #[error(
        "endpoint must target a database, and not a cluster. Does the endpoint end with the database name?"
    )]
    MissingDatabase,
}

/// A cluster URL plus the database commands run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    cluster: String,
    database: String,
}

impl Endpoint {
    /// Parse `https://<cluster>/<database>`.
    pub fn parse(endpoint: &str) -> Result<Self, EndpointError> {
        let mut url = Url::parse(endpoint).map_err(|e| EndpointError::Invalid(e.to_string()))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(EndpointError::Invalid(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(EndpointError::Invalid("missing host".to_string()));
        }

        let database = url.path().trim_matches('/').to_string();
        if database.is_empty() {
            return Err(EndpointError::MissingDatabase);
        }
        if database.contains('/') {
            return Err(EndpointError::Invalid(format!(
                "expected a single database name, found '{}'",
                database
            )));
        }

        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        let cluster = url.as_str().trim_end_matches('/').to_string();

        Ok(Self { cluster, database })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// REST endpoint for management commands.
    pub fn mgmt_url(&self) -> String {
        format!("{}/v1/rest/mgmt", self.cluster)
    }

    /// OAuth scope for tokens accepted by this cluster.
    pub fn scope(&self) -> String {
        format!("{}/.default", self.cluster)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster, self.database)
    }
}
