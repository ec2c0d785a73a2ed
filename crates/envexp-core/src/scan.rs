//! Import-surface extraction.
//!
//! Walks a source tree, pulls out every `from <library>...` import (joining
//! parenthesized imports that span several lines) and materializes them as a
//! throwaway Python package: one module per matching source file plus an
//! `__init__.py` that imports each of them. Importing that package inside the
//! experiment environment is the import smoke test.
//!
//! Matching is purely textual: a line-prefix test for the import and
//! line-suffix tests for `(` and `)`. Nothing is parsed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::domain::{ExperimentError, Result};

/// Entry point written into the output package.
pub const AGGREGATOR_FILE: &str = "__init__.py";

const OPENER: char = '(';
const CLOSER: char = ')';

/// Imports extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// File the imports were found in (first one, if several shared a name)
    pub source_file: PathBuf,
    /// Artifact written for it
    pub artifact: PathBuf,
    /// Module name the aggregator imports it by
    pub module: String,
    /// Import statements in source order
    pub extracted_lines: Vec<String>,
}

/// A parenthesized import that was still open at end of file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnterminatedImport {
    pub source_file: PathBuf,
    /// 1-based line of the opening statement
    pub line: usize,
    /// Text accumulated before the file ended
    pub text: String,
}

/// Everything one scan produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedModuleSet {
    pub output_root: PathBuf,
    /// Package name the aggregator lives under (`output_root`'s directory name)
    pub package: String,
    pub aggregator: PathBuf,
    pub records: Vec<ImportRecord>,
    pub unterminated: Vec<UnterminatedImport>,
    pub files_scanned: usize,
}

impl ExtractedModuleSet {
    pub fn total_imports(&self) -> usize {
        self.records.iter().map(|r| r.extracted_lines.len()).sum()
    }

    /// Lines of the aggregator, one per record.
    pub fn aggregator_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| format!("from {} import {}", self.package, r.module))
            .collect()
    }
}

/// Result of scanning a single file's text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileImports {
    pub lines: Vec<String>,
    /// (1-based line, accumulated text) of an import left open at EOF
    pub unterminated: Option<(usize, String)>,
}

/// Line-oriented extractor for one library's imports.
#[derive(Debug, Clone)]
pub struct ImportScanner {
    library: String,
    exclude: Vec<String>,
    top_level_only: bool,
    extension: String,
}

impl ImportScanner {
    pub fn new(library: impl Into<String>) -> Self {
        ImportScanner {
            library: library.into(),
            exclude: Vec::new(),
            top_level_only: false,
            extension: "py".to_string(),
        }
    }

    /// Skip imports whose opening line contains any of these substrings.
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Only match imports starting in column 0 (ignore indented ones).
    pub fn top_level_only(mut self, yes: bool) -> Self {
        self.top_level_only = yes;
        self
    }

    /// Source file extension to scan, without the dot.
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    fn prefix(&self) -> String {
        format!("from {}", self.library)
    }

    fn excluded(&self, line: &str) -> bool {
        self.exclude
            .iter()
            .any(|pattern| !pattern.is_empty() && line.contains(pattern.as_str()))
    }

    /// Extract matching imports from one file's text, in source order.
    ///
    /// # TDD: test_multiline_import_is_reassembled
    pub fn extract(&self, text: &str) -> FileImports {
        let prefix = self.prefix();
        let mut found = FileImports::default();
        let mut open: Option<(usize, String)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let stripped = raw.trim();

            if let Some((_, acc)) = open.as_mut() {
                acc.push_str(stripped);
                if stripped.ends_with(CLOSER) {
                    if let Some((_, complete)) = open.take() {
                        found.lines.push(complete);
                    }
                }
                continue;
            }

            let candidate = if self.top_level_only {
                raw
            } else {
                raw.trim_start()
            };
            if !candidate.starts_with(&prefix) || self.excluded(raw) {
                continue;
            }

            if stripped.ends_with(OPENER) {
                open = Some((idx + 1, stripped.to_string()));
            } else {
                found.lines.push(stripped.to_string());
            }
        }

        found.unterminated = open;
        found
    }

    /// Scan `source_root` and rebuild `output_root` as the extracted package.
    ///
    /// `output_root` is deleted wholesale first so nothing from an earlier
    /// scan survives. Imports left open at end of file are returned in
    /// `unterminated` for the caller to report.
    ///
    /// # TDD: test_scan_writes_artifacts_and_aggregator
    pub fn scan(&self, source_root: &Path, output_root: &Path) -> Result<ExtractedModuleSet> {
        let source_root = source_root
            .canonicalize()
            .map_err(|e| ExperimentError::scan_io(source_root, e))?;
        if !source_root.is_dir() {
            return Err(ExperimentError::scan_io(
                &source_root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let output_root = reset_output_dir(output_root, &source_root)?;
        let package = output_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                ExperimentError::scan_io(
                    &output_root,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "output has no name"),
                )
            })?;

        let sources = self.collect_sources(&source_root, &output_root)?;

        let mut records: Vec<ImportRecord> = Vec::new();
        let mut by_module: HashMap<String, usize> = HashMap::new();
        let mut unterminated = Vec::new();

        for source in &sources {
            let bytes = std::fs::read(source).map_err(|e| ExperimentError::scan_io(source, e))?;
            let found = self.extract(&String::from_utf8_lossy(&bytes));

            if let Some((line, text)) = found.unterminated {
                debug!(
                    file = %source.display(),
                    line = line,
                    "Multi-line import never closed; dropped"
                );
                unterminated.push(UnterminatedImport {
                    source_file: source.clone(),
                    line,
                    text,
                });
            }

            if found.lines.is_empty() {
                continue;
            }

            let module = module_name(source);
            debug!(file = %source.display(), module = %module, imports = found.lines.len(), "Extracted imports");

            match by_module.get(&module) {
                Some(&idx) => records[idx].extracted_lines.extend(found.lines),
                None => {
                    by_module.insert(module.clone(), records.len());
                    records.push(ImportRecord {
                        source_file: source.clone(),
                        artifact: output_root.join(format!("{module}.{}", self.extension)),
                        module,
                        extracted_lines: found.lines,
                    });
                }
            }
        }

        for record in &records {
            let mut body = record.extracted_lines.join("\n");
            body.push('\n');
            std::fs::write(&record.artifact, body)
                .map_err(|e| ExperimentError::scan_io(&record.artifact, e))?;
        }

        let set = ExtractedModuleSet {
            aggregator: output_root.join(AGGREGATOR_FILE),
            output_root,
            package,
            records,
            unterminated,
            files_scanned: sources.len(),
        };

        let mut aggregator = String::new();
        for line in set.aggregator_lines() {
            aggregator.push_str(&line);
            aggregator.push('\n');
        }
        std::fs::write(&set.aggregator, aggregator)
            .map_err(|e| ExperimentError::scan_io(&set.aggregator, e))?;

        info!(
            library = %self.library,
            files_scanned = set.files_scanned,
            modules = set.records.len(),
            imports = set.total_imports(),
            "Import scan complete"
        );
        Ok(set)
    }

    /// Source files under `root` with the configured extension, in a stable
    /// order, skipping the output directory.
    fn collect_sources(&self, root: &Path, output_root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.path() != output_root);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                ExperimentError::scan_io(path, source)
            })?;

            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().map(|e| e == self.extension.as_str()).unwrap_or(false)
            {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }
}

/// Delete and recreate the output directory, refusing to touch the source tree.
fn reset_output_dir(output_root: &Path, source_root: &Path) -> Result<PathBuf> {
    if output_root.exists() {
        let existing = output_root
            .canonicalize()
            .map_err(|e| ExperimentError::scan_io(output_root, e))?;
        if source_root.starts_with(&existing) {
            return Err(ExperimentError::scan_io(
                output_root,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "output directory contains the source tree",
                ),
            ));
        }
        info!(dir = %existing.display(), "Removing previous extracted imports");
        std::fs::remove_dir_all(&existing).map_err(|e| ExperimentError::scan_io(&existing, e))?;
    }

    std::fs::create_dir_all(output_root).map_err(|e| ExperimentError::scan_io(output_root, e))?;
    output_root
        .canonicalize()
        .map_err(|e| ExperimentError::scan_io(output_root, e))
}

/// Module name for a source file's artifact: its stem, except that a source
/// `__init__` is renamed after its directory so it cannot clobber the
/// aggregator.
fn module_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    if stem == "__init__" {
        let parent = source
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());
        format!("{parent}_init")
    } else {
        stem
    }
}
