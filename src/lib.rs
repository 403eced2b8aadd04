//! ksd - Kusto synced.
//!
//! Manage Azure Data Explorer functions and tables as declarative source
//! files. Each `.kql`, `.csl` or `.kusto` file holds one `let` declaration
//! (a function, or a `datatable` table schema) optionally preceded by `//`
//! documentation comments. ksd builds these into management commands and
//! syncs them to a database.
//!
//! # Architecture
//!
//! - `syntax`: lexer and declaration parser
//! - `emit`: renders declarations as management commands
//! - `build`: walks a source tree and writes command files in parallel
//! - `client`: endpoint parsing, credentials and the REST client
//! - `sync` / `run`: submit command files or scripts to a database
//! - `config`: optional `ksd.yaml` project configuration
//! - `report`: output formatting (text, JSON)

pub mod build;
pub mod cli;
pub mod client;
pub mod config;
pub mod emit;
pub mod report;
pub mod run;
pub mod sync;
pub mod syntax;

pub use build::{build, build_file, BuildReport, FileOutcome, OUT_DIR};
pub use client::{ClientError, ConnectionConfig, KustoClient, ManagementClient};
pub use config::ProjectConfig;
pub use sync::{sync_with, RetryPolicy, SyncReport};
pub use syntax::{parse, parse_str, Declaration, DeclarationKind, ParseError, ParseWarning, Parsed};
