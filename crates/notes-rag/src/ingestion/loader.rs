//! Notes folder loader
//!
//! Walks the top level of the notes directory and turns every recognized
//! file into one [`Document`] per page. A file that fails to parse is
//! reported and skipped; the remaining files still load.

use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use super::parser::PdfParser;
use crate::config::NotesConfig;
use crate::error::{Error, Result};
use crate::types::Document;

/// One successfully loaded file
#[derive(Debug, Clone, Serialize)]
pub struct LoadedFile {
    /// Filename including extension
    pub filename: String,
    /// Unit identifier derived from the filename
    pub unit: String,
    /// Number of pages read
    pub pages: u32,
    /// SHA-256 of the file bytes
    pub content_hash: String,
}

/// One file that could not be loaded
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    /// Filename including extension
    pub filename: String,
    /// Why the file was skipped
    pub error: String,
}

/// Outcome of loading the notes directory
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// All page documents, grouped by file in filename order
    pub documents: Vec<Document>,
    /// Files that loaded
    pub files: Vec<LoadedFile>,
    /// Files that were skipped
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// True when no pages were loaded
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Distinct units in load order
    pub fn units(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.unit.as_str()).collect()
    }
}

/// Unit identifier for a filename: the name with its final extension removed
pub fn unit_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

/// Loads page documents from a flat notes directory
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    extensions: Vec<String>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new(["pdf"])
    }
}

impl DocumentLoader {
    /// Create a loader recognizing the given extensions (without dots)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Create a loader from the notes configuration
    pub fn from_config(config: &NotesConfig) -> Self {
        Self::new(&config.extensions)
    }

    /// Whether a path carries a recognized extension
    pub fn is_recognized(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let ext = e.to_ascii_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Load every recognized file directly inside `dir`
    ///
    /// Subdirectories are not descended into. Files are visited in filename
    /// order so page documents come out grouped by file.
    pub fn load_dir(&self, dir: &Path) -> Result<LoadReport> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Notes directory not found: {}",
                dir.display()
            )));
        }

        let mut report = LoadReport::default();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_recognized(entry.path()) {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().into_owned();
            match self.load_file(entry.path()) {
                Ok((file, documents)) => {
                    tracing::info!("Loaded {} ({} pages)", file.filename, file.pages);
                    report.documents.extend(documents);
                    report.files.push(file);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", filename, e);
                    report.failures.push(LoadFailure {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Loaded {} pages from {} files ({} skipped) in {}",
            report.documents.len(),
            report.files.len(),
            report.failures.len(),
            dir.display()
        );

        Ok(report)
    }

    /// Load a single file into page documents
    pub fn load_file(&self, path: &Path) -> Result<(LoadedFile, Vec<Document>)> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::file_parse(path.display().to_string(), "Path has no filename"))?;

        let data = std::fs::read(path)
            .map_err(|e| Error::file_parse(&filename, format!("Failed to read file: {}", e)))?;

        let parsed = PdfParser::parse(&filename, &data)?;
        let unit = unit_name(&filename);
        let page_count = parsed.page_count();

        // Page tree numbers are 1-based; documents carry 0-based pages.
        let documents = parsed
            .pages
            .into_iter()
            .enumerate()
            .map(|(idx, page)| Document::new(page.content, &unit, &filename, idx as u32, page_count))
            .collect();

        let file = LoadedFile {
            filename,
            unit,
            pages: page_count,
            content_hash: parsed.content_hash,
        };

        Ok((file, documents))
    }
}
