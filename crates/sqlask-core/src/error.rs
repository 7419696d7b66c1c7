//! Pipeline error taxonomy
//!
//! Every variant is terminal for the request that produced it. Callers
//! should report [`ErrorKind`] and only forward the message for
//! [`ErrorKind::ExecutionFailed`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, transport-facing error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidIdentifier,
    SourceUnreadable,
    StoreUnavailable,
    SchemaEmpty,
    TranslationInvalid,
    TranslationUnavailable,
    ExecutionFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "INVALID_IDENTIFIER",
            ErrorKind::SourceUnreadable => "SOURCE_UNREADABLE",
            ErrorKind::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorKind::SchemaEmpty => "SCHEMA_EMPTY",
            ErrorKind::TranslationInvalid => "TRANSLATION_INVALID",
            ErrorKind::TranslationUnavailable => "TRANSLATION_UNAVAILABLE",
            ErrorKind::ExecutionFailed => "EXECUTION_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid dataset identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Source file unreadable: {0}")]
    SourceUnreadable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Table '{0}' has no columns")]
    SchemaEmpty(String),

    #[error("Invalid translation: {0}")]
    TranslationInvalid(String),

    #[error("Language model unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("Query execution failed: {0}")]
    ExecutionFailed(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            PipelineError::SourceUnreadable(_) => ErrorKind::SourceUnreadable,
            PipelineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PipelineError::SchemaEmpty(_) => ErrorKind::SchemaEmpty,
            PipelineError::TranslationInvalid(_) => ErrorKind::TranslationInvalid,
            PipelineError::TranslationUnavailable(_) => ErrorKind::TranslationUnavailable,
            PipelineError::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
        }
    }

    /// Message that is safe to hand back to a caller, if any
    pub fn public_detail(&self) -> Option<&str> {
        match self {
            PipelineError::ExecutionFailed(msg) => Some(msg),
            _ => None,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
