//! Dataset identifiers
//!
//! A [`DatasetId`] is the only value ever spliced into SQL as an identifier,
//! so its character set is checked at construction and nowhere else.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::source::SourceFormat;

/// Derive a table-safe name from a filename or free-form string.
///
/// Keeps the final path component, drops one recognized dataset extension
/// and removes everything outside `[A-Za-z0-9_]`. Never fails; the result
/// may be empty.
pub fn normalize(raw: &str) -> String {
    let file_name = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let stem = match file_name.rsplit_once('.') {
        Some((stem, ext)) if SourceFormat::from_extension(ext).is_some() => stem,
        _ => file_name,
    };

    stem.chars().filter(|c| is_identifier_char(*c)).collect()
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    /// Accept an already-normalized identifier
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || !s.chars().all(is_identifier_char) {
            return Err(PipelineError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Normalize an uploaded filename into an identifier
    pub fn from_filename(raw: &str) -> Result<Self> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(PipelineError::InvalidIdentifier(raw.to_string()));
        }
        Self::parse(&normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for SQL text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatasetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DatasetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DatasetId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_extension_then_filters() {
        assert_eq!(normalize("Sales Report.csv"), "SalesReport");
        assert_eq!(normalize("orders_2024.PARQUET"), "orders_2024");
        assert_eq!(normalize("events.ndjson"), "events");
        assert_eq!(normalize("q3-results.v2.csv"), "q3resultsv2");
    }

    #[test]
    fn test_normalize_keeps_unknown_extension_characters() {
        assert_eq!(normalize("archive.zip"), "archivezip");
    }

    #[test]
    fn test_normalize_uses_final_path_component() {
        assert_eq!(normalize("../../etc/passwd"), "passwd");
        assert_eq!(normalize(r"C:\Users\me\data.csv"), "data");
    }

    #[test]
    fn test_all_invalid_input_is_rejected() {
        assert_eq!(normalize("!!!.csv"), "");
        let err = DatasetId::from_filename("!!!.csv").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert_eq!(DatasetId::parse("").unwrap_err().kind(), ErrorKind::InvalidIdentifier);
    }

    #[test]
    fn test_parse_rejects_unsafe_characters() {
        assert!(DatasetId::parse("SalesReport").is_ok());
        assert!(DatasetId::parse("Sales Report").is_err());
        assert!(DatasetId::parse("x\"; DROP TABLE y; --").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let id: DatasetId = serde_json::from_str("\"SalesReport\"").unwrap();
        assert_eq!(id.quoted(), "\"SalesReport\"");
        assert!(serde_json::from_str::<DatasetId>("\"a-b\"").is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in ".*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn normalize_emits_only_safe_characters(s in ".*") {
            prop_assert!(normalize(&s).chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        }

        #[test]
        fn non_empty_normalized_names_parse(s in "[ -~]{0,40}") {
            let normalized = normalize(&s);
            prop_assert_eq!(DatasetId::parse(&normalized).is_ok(), !normalized.is_empty());
        }
    }
}
