//! Storage engine boundary
//!
//! The pipeline issues three kinds of store operations: metadata lookups,
//! a bulk load from a file, and arbitrary read queries. Implementations are
//! synchronous; the pipeline moves every call onto the blocking pool.

use thiserror::Error;

use crate::error::{PipelineError, Result};
use crate::identifier::DatasetId;
use crate::schema::ColumnDescriptor;
use crate::source::SourceFile;
use crate::value::Scalar;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The source file is missing or cannot be read by the store
    #[error("Cannot read source: {0}")]
    SourceUnreadable(String),

    /// The store itself could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The statement was rejected or failed while running
    #[error("{0}")]
    Query(String),
}

/// Rows returned by a read query, in store-neutral value kinds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

pub trait Store: Send + Sync {
    /// Does a table with this name exist (case-insensitive)?
    fn table_exists(&self, table: &DatasetId) -> Result<bool, StoreError>;

    /// Create `table` from the contents of `source` in a single statement
    fn create_table_from_file(&self, table: &DatasetId, source: &SourceFile) -> Result<(), StoreError>;

    /// Column names and declared types, in ordinal order
    fn columns(&self, table: &DatasetId) -> Result<Vec<ColumnDescriptor>, StoreError>;

    fn query(&self, sql: &str) -> Result<ResultSet, StoreError>;
}

/// Run a store call on the blocking pool.
///
/// The spawned task is detached from the awaiting future, so a caller that
/// goes away does not interrupt a call already in flight.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::StoreUnavailable(format!("store task failed: {e}")))
}
