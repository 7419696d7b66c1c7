//! Query executor: runs a statement and sanitizes the rows for transport

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::store::{run_blocking, Store, StoreError};
use crate::value::{sanitize_row, Row};

#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn Store>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run `sql` and return every row, fully materialized
    pub async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        let store = self.store.clone();
        let statement = sql.to_string();
        let result_set = run_blocking(move || store.query(&statement))
            .await?
            .map_err(|e| match e {
                StoreError::Unavailable(msg) => PipelineError::StoreUnavailable(msg),
                other => {
                    warn!(error = %other, "Statement failed");
                    PipelineError::ExecutionFailed(other.to_string())
                }
            })?;

        let rows: Vec<Row> = result_set
            .rows
            .into_iter()
            .map(|values| sanitize_row(&result_set.columns, values))
            .collect();

        debug!(rows = rows.len(), columns = result_set.columns.len(), "Query executed");
        Ok(rows)
    }
}
