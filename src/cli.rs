//! Command-line interface for ksd.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::build;
use crate::client::{
    force_interactive_setting, ConnectionConfig, CredentialOptions, Endpoint,
    FORCE_INTERACTIVE_ENV,
};
use crate::config::{self, ProjectConfig};
use crate::report;
use crate::run;
use crate::sync;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Environment variable that overrides the Azure authority host.
const AUTHORITY_HOST_ENV: &str = "AZURE_AUTHORITY_HOST";

const MISSING_ENDPOINT: &str = "missing `--endpoint`. Set this to a Azure Data Explorer database endpoint, i.e. https://samples.kusto.windows.net/MyDatabase";

/// Kusto synced - manage Kusto functions and tables as source files.
///
/// ksd builds declarative Kusto source files (`.kql`, `.csl`, `.kusto`)
/// holding a single `let` function or `datatable` declaration into
/// management commands, and syncs them to an Azure Data Explorer database.
#[derive(Parser)]
#[command(name = "ksd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build declarations into command files under the 'kout' directory
    Build(BuildArgs),
    /// Build, then sync command files to an Azure Data Explorer database
    Sync(SyncArgs),
    /// Run a script file against an Azure Data Explorer database
    Run(RunArgs),
}

/// Arguments for the build command.
#[derive(Parser)]
pub struct BuildArgs {
    /// Source directory (default: current directory)
    pub directory: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Arguments for the sync command.
#[derive(Parser)]
pub struct SyncArgs {
    /// Source directory (default: current directory)
    pub directory: Option<PathBuf>,

    /// Sync an already built output directory and skip the build
    #[arg(long)]
    pub from_out: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Arguments for the run command.
#[derive(Parser)]
pub struct RunArgs {
    /// Script file to run
    pub file: PathBuf,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Flags for reaching a database.
#[derive(Args)]
pub struct ConnectionArgs {
    /// The endpoint to the Azure Data Explorer database
    #[arg(long)]
    pub endpoint: Option<String>,

    /// The ID of the application to authenticate with
    #[arg(long)]
    pub client_id: Option<String>,

    /// The secret of the application to authenticate with
    #[arg(long, env = "KSD_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// The tenant ID of the application to authenticate with
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Issuer of a federated token for the application: github
    #[arg(long)]
    pub credential_provider: Option<String>,
}

/// Install the stderr log subscriber.
pub fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve a directory argument against the working directory.
fn resolve_directory(arg: Option<&Path>) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let root = match arg {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => cwd.join(p),
        None => cwd,
    };

    if !root.is_dir() {
        let display = arg.unwrap_or(root.as_path());
        anyhow::bail!("directory {} does not exist", display.display());
    }
    Ok(root)
}

/// Discover and validate the project config for `root`.
fn load_config(root: &Path) -> anyhow::Result<ProjectConfig> {
    let (config, path) = ProjectConfig::discover(root)?;
    match &path {
        Some(path) => debug!(path = %path.display(), "loaded config"),
        None => debug!("no config file found, using defaults"),
    }
    config::validate(&config).map_err(|e| anyhow::anyhow!("invalid config: {}", e))?;
    Ok(config)
}

/// Merge credential flags with the config file.
fn credential_options(
    args: &ConnectionArgs,
    config: &ProjectConfig,
) -> anyhow::Result<CredentialOptions> {
    let client_id = args
        .client_id
        .clone()
        .or_else(|| config.auth.client_id.clone());
    let tenant_id = args
        .tenant_id
        .clone()
        .or_else(|| config.auth.tenant_id.clone());
    let provider = args
        .credential_provider
        .clone()
        .or_else(|| config.auth.credential_provider.clone());

    let has_client = client_id.is_some();
    let options = CredentialOptions::new(
        client_id,
        args.client_secret.clone(),
        tenant_id,
        provider.as_deref(),
    )?;

    if has_client {
        return Ok(options);
    }
    let force = force_interactive_setting(std::env::var(FORCE_INTERACTIVE_ENV).ok().as_deref())?;
    Ok(options.force_interactive(force))
}

fn endpoint(args: &ConnectionArgs, config: &ProjectConfig) -> anyhow::Result<Endpoint> {
    let Some(raw) = args.endpoint.as_deref().or(config.endpoint.as_deref()) else {
        anyhow::bail!(MISSING_ENDPOINT);
    };
    Ok(Endpoint::parse(raw)?)
}

fn connection_config(
    endpoint: Endpoint,
    credentials: CredentialOptions,
    config: &ProjectConfig,
) -> ConnectionConfig {
    let mut connection = ConnectionConfig::new(endpoint, credentials);
    connection.request_timeout = Duration::from_millis(config.sync.request_timeout_ms);
    connection.authority = std::env::var(AUTHORITY_HOST_ENV).ok();
    connection
}

/// Run the build command.
pub fn run_build(args: &BuildArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let root = match resolve_directory(args.directory.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match load_config(&root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let out_root = root.join(config.out_dir());
    let result = build::build(&root, &out_root, &config)?;

    match args.format.as_str() {
        "json" => report::write_build_json(&result)?,
        _ => report::write_build_pretty(&result),
    }

    if result.is_success() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// Run the sync command.
pub fn run_sync(args: &SyncArgs) -> anyhow::Result<i32> {
    let root = match resolve_directory(args.directory.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match load_config(&root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let credentials = match credential_options(&args.connection, &config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let endpoint = match endpoint(&args.connection, &config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let out_root = match &args.from_out {
        Some(from_out) => {
            let out_root = if from_out.is_absolute() {
                from_out.clone()
            } else {
                root.join(from_out)
            };
            if let Err(e) = check_out_dir(&out_root, config.out_dir()) {
                eprintln!("Error: {}: {}", from_out.display(), e);
                return Ok(EXIT_ERROR);
            }
            out_root
        }
        None => {
            let out_root = root.join(config.out_dir());
            let result = build::build(&root, &out_root, &config)?;
            report::write_build_pretty(&result);
            if !result.is_success() {
                eprintln!("Error: build failed, nothing was synced");
                return Ok(EXIT_FAILED);
            }
            out_root
        }
    };

    let connection = connection_config(endpoint, credentials, &config);
    let result = sync::sync(&out_root, &connection, &config.sync)?;
    report::write_sync_pretty(&result, &connection.endpoint.to_string());

    if result.is_success() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILED)
    }
}

/// An explicit output directory must exist and carry the output directory name.
fn check_out_dir(out_root: &Path, out_dir: &str) -> anyhow::Result<()> {
    let name = out_root.file_name().and_then(|n| n.to_str());
    if name != Some(out_dir) {
        anyhow::bail!(
            "invalid out directory path. out directories are expected to be named '{}'",
            out_dir
        );
    }
    if !out_root.is_dir() {
        anyhow::bail!("out directory does not exist");
    }
    Ok(())
}

/// Run the run command.
pub fn run_run(args: &RunArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir()?;
    let config = match load_config(&cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let endpoint = match endpoint(&args.connection, &config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if !args.file.is_file() {
        eprintln!("Error: script file {} does not exist", args.file.display());
        return Ok(EXIT_ERROR);
    }

    let credentials = match credential_options(&args.connection, &config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let connection = connection_config(endpoint, credentials, &config);
    if let Err(e) = run::run(&args.file, &connection) {
        eprintln!("Error: {:#}", e);
        return Ok(EXIT_FAILED);
    }
    Ok(EXIT_SUCCESS)
}
