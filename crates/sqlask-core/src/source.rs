//! Dataset source files and how the store should read them

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk format of an uploaded dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Json,
    Parquet,
}

impl SourceFormat {
    /// Recognized extensions, in lookup order for lazy registration
    pub const EXTENSIONS: &'static [(&'static str, SourceFormat)] = &[
        ("csv", SourceFormat::Csv),
        ("tsv", SourceFormat::Csv),
        ("txt", SourceFormat::Csv),
        ("parquet", SourceFormat::Parquet),
        ("json", SourceFormat::Json),
        ("jsonl", SourceFormat::Json),
        ("ndjson", SourceFormat::Json),
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::EXTENSIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(ext))
            .map(|(_, format)| *format)
    }

    /// Format implied by a path; unknown or missing extensions read as CSV
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .unwrap_or(SourceFormat::Csv)
    }
}

/// A file to ingest together with its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: SourceFormat,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = SourceFormat::from_path(&path);
        Self { path, format }
    }

    /// Find `<dir>/<stem>.<ext>` for the first recognized extension that exists
    pub fn locate(dir: &Path, stem: &str) -> Option<Self> {
        SourceFormat::EXTENSIONS.iter().find_map(|(ext, format)| {
            let candidate = dir.join(format!("{stem}.{ext}"));
            candidate.is_file().then(|| SourceFile {
                path: candidate,
                format: *format,
            })
        })
    }
}
