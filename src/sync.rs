//! Submits built command files to a database.
//!
//! Files are sent one at a time in sorted path order. Transient client
//! errors are retried with a linear backoff; any other error fails the file
//! and the sync moves on to the next one.

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::build::is_kusto_source_file;
use crate::client::{ClientError, ConnectionConfig, KustoClient, ManagementClient};
use crate::config::SyncConfig;

/// How often and how patiently a command is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per file, including the first
    pub attempts: u32,
    /// Base delay; the nth retry waits `n * delay`
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            attempts: config.retries.saturating_add(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Result of syncing one command file.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Path relative to the output directory
    pub file: PathBuf,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub out_root: PathBuf,
    pub database: String,
    pub files: Vec<SyncOutcome>,
}

impl SyncReport {
    pub fn synced_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.files.len() - self.synced_count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Collect the command files under `out_root`, sorted.
pub fn collect_command_files(out_root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(out_root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", out_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !is_kusto_source_file(entry.path()) {
            debug!(file = %entry.path().display(), "skipping file due to non-matching extension");
            continue;
        }
        files.push(entry.into_path());
    }

    files.sort();
    Ok(files)
}

/// Execute `command`, retrying transient failures per `policy`.
///
/// Returns the number of attempts made along with the final result.
pub async fn execute_with_retry<C: ManagementClient>(
    client: &C,
    database: &str,
    command: &str,
    policy: &RetryPolicy,
) -> (u32, Result<(), ClientError>) {
    let mut attempt = 1;
    loop {
        match client.execute(database, command).await {
            Ok(()) => return (attempt, Ok(())),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let wait = policy.backoff(attempt);
                warn!(attempt, error = %e, "transient failure, retrying in {:?}", wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return (attempt, Err(e)),
        }
    }
}

/// Sync every command file under `out_root` using `client`.
pub async fn sync_with<C: ManagementClient>(
    client: &C,
    database: &str,
    out_root: &Path,
    policy: &RetryPolicy,
) -> anyhow::Result<SyncReport> {
    let files = collect_command_files(out_root)?;
    debug!(database, count = files.len(), "syncing command files");

    let mut outcomes = Vec::with_capacity(files.len());
    for path in files {
        let rel = path.strip_prefix(out_root).unwrap_or(&path).to_path_buf();

        let command = match fs::read_to_string(&path) {
            Ok(command) => command,
            Err(e) => {
                outcomes.push(SyncOutcome {
                    file: rel,
                    attempts: 0,
                    error: Some(format!("reading file: {}", e)),
                });
                continue;
            }
        };

        debug!(file = %rel.display(), "syncing");
        let (attempts, result) = execute_with_retry(client, database, &command, policy).await;
        let error = result.err().map(|e| {
            warn!(file = %rel.display(), attempts, error = %e, "sync failed");
            e.to_string()
        });

        outcomes.push(SyncOutcome {
            file: rel,
            attempts,
            error,
        });
    }

    Ok(SyncReport {
        out_root: out_root.to_path_buf(),
        database: database.to_string(),
        files: outcomes,
    })
}

/// Sync `out_root` to the database named by `connection`.
pub fn sync(
    out_root: &Path,
    connection: &ConnectionConfig,
    config: &SyncConfig,
) -> anyhow::Result<SyncReport> {
    let runtime = tokio::runtime::Runtime::new().context("creating async runtime")?;
    runtime.block_on(async {
        let client = KustoClient::new(connection).context("creating client")?;
        sync_with(
            &client,
            connection.endpoint.database(),
            out_root,
            &RetryPolicy::from_config(config),
        )
        .await
    })
}
