//! Builds a tree of Kusto source files into management command files.
//!
//! Every source file under the root produces a file at the same relative
//! path under the output directory. The relative directory of the source
//! becomes the declaration's folder.

use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::emit;
use crate::syntax::{self, ParseError, ParseWarning, Parsed};

/// Default name of the build output directory.
pub const OUT_DIR: &str = "kout";

/// File extensions recognized as Kusto source.
pub const SOURCE_EXTENSIONS: &[&str] = &["kql", "csl", "kusto"];

/// Whether `ext` (without the leading dot) names a Kusto source file.
pub fn is_kusto_source_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext)
}

pub fn is_kusto_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_kusto_source_extension)
        .unwrap_or(false)
}

/// Result of building one source file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    /// Source path relative to the root
    pub source: PathBuf,
    /// Output path relative to the output directory
    pub output: PathBuf,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of a build, in source path order.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: PathBuf,
    pub out_root: PathBuf,
    pub files: Vec<FileOutcome>,
}

impl BuildReport {
    pub fn built_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.files.len() - self.built_count()
    }

    pub fn warning_count(&self) -> usize {
        self.files.iter().map(|f| f.warnings.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Kusto source files found under a root, sorted, plus the entries the
/// walk could not read.
#[derive(Debug, Default)]
pub struct Sources {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Collect the Kusto source files under `root`.
///
/// Hidden directories, `out_root` and paths matching the config's
/// `excluded_paths` are skipped. An unreadable entry or a symlink loop is
/// logged and recorded, and the walk continues with its siblings.
pub fn collect_sources(root: &Path, out_root: &Path, config: &ProjectConfig) -> Sources {
    let mut sources = Sources::default();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            if e.file_type().is_dir() {
                let name = e.file_name().to_string_lossy();
                if name.starts_with('.') || e.path() == out_root {
                    return false;
                }
            }
            let rel = e.path().strip_prefix(root).unwrap_or(e.path());
            !config.is_path_excluded(rel)
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                sources.unreadable.push((path, e.to_string()));
                continue;
            }
        };
        if entry.file_type().is_file() && is_kusto_source_file(entry.path()) {
            sources.files.push(entry.into_path());
        }
    }

    sources.files.sort();
    sources
}

/// Parse one declaration from `reader` and write its command to `writer`.
///
/// Nothing is written when parsing fails.
pub fn build_file<R: Read, W: Write + ?Sized>(
    reader: R,
    writer: &mut W,
    folder: &str,
) -> Result<Parsed, ParseError> {
    let parsed = syntax::parse(reader)?;
    emit::write(writer, &parsed.declaration, folder)?;
    Ok(parsed)
}

/// Build every source file under `root` into `out_root`.
///
/// A failing file does not stop the others; check
/// [`BuildReport::is_success`].
pub fn build(root: &Path, out_root: &Path, config: &ProjectConfig) -> anyhow::Result<BuildReport> {
    let sources = collect_sources(root, out_root, config);
    debug!(root = %root.display(), count = sources.files.len(), "collected sources");

    let mut files: Vec<FileOutcome> = sources
        .files
        .par_iter()
        .map(|source| build_one(root, out_root, source))
        .collect();

    files.extend(
        sources
            .unreadable
            .into_iter()
            .map(|(path, error)| unreadable_outcome(root, &path, error)),
    );
    files.sort_by(|a, b| a.source.cmp(&b.source));

    Ok(BuildReport {
        root: root.to_path_buf(),
        out_root: out_root.to_path_buf(),
        files,
    })
}

fn build_one(root: &Path, out_root: &Path, source: &Path) -> FileOutcome {
    let rel = source.strip_prefix(root).unwrap_or(source).to_path_buf();
    let folder = rel
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = emit::normalize_folder(&folder);

    let mut outcome = FileOutcome {
        source: rel.clone(),
        output: rel.clone(),
        folder,
        name: None,
        kind: None,
        warnings: Vec::new(),
        error: None,
    };

    match compile(source, &out_root.join(&rel), &outcome.folder) {
        Ok(parsed) => {
            debug!(
                file = %rel.display(),
                name = parsed.declaration.name(),
                kind = parsed.declaration.kind().as_str(),
                "built"
            );
            for warning in &parsed.warnings {
                warn!(file = %rel.display(), "{}", warning);
            }
            outcome.name = Some(parsed.declaration.name().to_string());
            outcome.kind = Some(parsed.declaration.kind().as_str());
            outcome.warnings = parsed.warnings;
        }
        Err(e) => {
            debug!(file = %rel.display(), error = %format!("{:#}", e), "build failed");
            outcome.error = Some(format!("{:#}", e));
        }
    }

    outcome
}

fn unreadable_outcome(root: &Path, path: &Path, error: String) -> FileOutcome {
    let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    FileOutcome {
        source: rel.clone(),
        output: rel,
        folder: String::new(),
        name: None,
        kind: None,
        warnings: Vec::new(),
        error: Some(error),
    }
}

fn compile(source: &Path, output: &Path, folder: &str) -> anyhow::Result<Parsed> {
    let reader = fs::File::open(source)
        .with_context(|| format!("opening {}", source.display()))?;

    let mut rendered = Vec::new();
    let parsed = build_file(reader, &mut rendered, folder).context("parsing declaration")?;

    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(output, rendered).with_context(|| format!("writing {}", output.display()))?;

    Ok(parsed)
}
