//! Output formatting for ksd results.
//!
//! Supports two output formats for builds:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption
//!
//! Sync results are always printed in the pretty format.

use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::build::{BuildReport, FileOutcome};
use crate::syntax::ParseWarning;
use crate::sync::SyncReport;

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize, Deserialize)]
pub struct JsonBuildReport {
    pub version: String,
    pub root: String,
    pub out_dir: String,
    pub passed: bool,
    pub built: usize,
    pub failed: usize,
    pub warnings: usize,
    pub files: Vec<JsonFile>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonFile {
    pub source: String,
    pub output: String,
    pub folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<JsonWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonWarning {
    pub row: usize,
    pub col: usize,
    pub message: String,
    pub ignored: String,
}

pub fn json_build_report(report: &BuildReport) -> JsonBuildReport {
    JsonBuildReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        root: report.root.to_string_lossy().to_string(),
        out_dir: report.out_root.to_string_lossy().to_string(),
        passed: report.is_success(),
        built: report.built_count(),
        failed: report.failed_count(),
        warnings: report.warning_count(),
        files: report.files.iter().map(file_to_json).collect(),
    }
}

/// Write build results in JSON format.
pub fn write_build_json(report: &BuildReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&json_build_report(report))?;
    println!("{}", json);
    Ok(())
}

fn file_to_json(f: &FileOutcome) -> JsonFile {
    JsonFile {
        source: display_path(&f.source),
        output: display_path(&f.output),
        folder: f.folder.clone(),
        name: f.name.clone(),
        kind: f.kind.map(str::to_string),
        warnings: f.warnings.iter().map(warning_to_json).collect(),
        error: f.error.clone(),
    }
}

fn warning_to_json(w: &ParseWarning) -> JsonWarning {
    JsonWarning {
        row: w.location.row,
        col: w.location.col,
        message: w.message.clone(),
        ignored: w.ignored.clone(),
    }
}

/// Paths are reported with forward slashes on every platform.
fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// =============================================================================
// Pretty Format
// =============================================================================

fn write_header(label: &str, target: &str, out_root: &Path) {
    println!();
    print!("  ");
    print!("{}", "ksd".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", format!("{:<10}", label).dimmed());
    println!("{}", target);
    print!("  {}", format!("{:<10}", "Output:").dimmed());
    println!("{}", out_root.display());
    println!();
}

/// Write build results in colored terminal format.
pub fn write_build_pretty(report: &BuildReport) {
    write_header(
        "Building:",
        &report.root.display().to_string(),
        &report.out_root,
    );

    if report.files.is_empty() {
        println!("  {}", "no Kusto source files found".dimmed());
        println!();
    }

    for f in &report.files {
        write_file_line(f);
        for w in &f.warnings {
            write_warning(&f.source, w);
        }
    }
    if !report.files.is_empty() {
        println!();
    }

    if report.is_success() {
        print!("  {}", "✓ PASS".green());
    } else {
        print!("  {}", "✗ FAIL".red());
    }
    print!("  {} built", report.built_count());
    if report.failed_count() > 0 {
        print!(", {}", format!("{} failed", report.failed_count()).red());
    }
    let warnings = report.warning_count();
    if warnings > 0 {
        let plural = if warnings != 1 { "s" } else { "" };
        print!(", {}", format!("{} warning{}", warnings, plural).yellow());
    }
    println!();
    println!();
}

fn write_file_line(f: &FileOutcome) {
    match &f.error {
        None => {
            print!("    {} ", "✓".green());
            print!("{}", display_path(&f.source).blue());
            if let (Some(kind), Some(name)) = (f.kind, &f.name) {
                print!("  {} {}", kind.dimmed(), name);
            }
            println!();
        }
        Some(error) => {
            print!("    {} ", "✗".red());
            println!("{}", display_path(&f.source).blue());
            println!("            {}", error);
        }
    }
}

fn write_warning(source: &Path, w: &ParseWarning) {
    print!("    {} ", "WARN".yellow());
    print!("{}", display_path(source).blue());
    println!("{}", format!(":{}", w.location).dimmed());
    println!("            {}", w.message);
    for line in w.ignored.lines() {
        println!("            {}", format!("| {}", line).dimmed());
    }
}

/// Write sync results in colored terminal format.
pub fn write_sync_pretty(report: &SyncReport, endpoint: &str) {
    write_header("Syncing:", endpoint, &report.out_root);

    for f in &report.files {
        match &f.error {
            None => {
                print!("    {} ", "✓".green());
                print!("Synced {}", display_path(&f.file).blue());
                if f.attempts > 1 {
                    print!("  {}", format!("({} attempts)", f.attempts).dimmed());
                }
                println!();
            }
            Some(error) => {
                print!("    {} ", "✗".red());
                println!("{}", display_path(&f.file).blue());
                println!("            {}", error);
            }
        }
    }
    if !report.files.is_empty() {
        println!();
    }

    if report.is_success() {
        print!("  {}", "✓ PASS".green());
    } else {
        print!("  {}", "✗ FAIL".red());
    }
    print!("  {} synced to {}", report.synced_count(), report.database);
    if report.failed_count() > 0 {
        print!(", {}", format!("{} failed", report.failed_count()).red());
    }
    println!();
    println!();
}
