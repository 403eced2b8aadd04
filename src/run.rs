//! Runs a single script file against a database.

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::client::{ConnectionConfig, KustoClient, ManagementClient};

/// Execute the contents of `file` as one management command.
pub async fn run_with<C: ManagementClient>(
    client: &C,
    database: &str,
    file: &Path,
) -> anyhow::Result<()> {
    let script =
        fs::read_to_string(file).with_context(|| format!("reading file {}", file.display()))?;
    debug!(file = %file.display(), database, "running script");
    client
        .execute(database, &script)
        .await
        .context("running command")?;
    Ok(())
}

pub fn run(file: &Path, connection: &ConnectionConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("creating async runtime")?;
    runtime.block_on(async {
        let client = KustoClient::new(connection).context("creating client")?;
        run_with(&client, connection.endpoint.database(), file).await
    })
}
