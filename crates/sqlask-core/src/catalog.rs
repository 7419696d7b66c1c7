//! Table catalog: registers each dataset as a table at most once

use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::identifier::DatasetId;
use crate::source::SourceFile;
use crate::store::{run_blocking, Store, StoreError};

/// Outcome of [`TableCatalog::ensure_table`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub table_name: DatasetId,
    /// False when the table already existed and the source was not read
    pub created: bool,
}

pub struct TableCatalog {
    store: Arc<dyn Store>,
    /// One async lock per table currently being ensured, keyed by the
    /// lowercased identifier since table names resolve case-insensitively
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TableCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create `id` from `source` unless it already exists
    pub async fn ensure_table(&self, id: &DatasetId, source: SourceFile) -> Result<Registration> {
        self.ensure_table_with(id, move || Ok(source)).await
    }

    /// Like [`ensure_table`](Self::ensure_table), but only resolves the
    /// source once the table is known to be absent.
    #[instrument(skip(self, resolve), fields(table = %id))]
    pub async fn ensure_table_with<F>(&self, id: &DatasetId, resolve: F) -> Result<Registration>
    where
        F: FnOnce() -> Result<SourceFile>,
    {
        let lock = self.lock_for(id)?;
        let result = {
            let _guard = lock.lock().await;
            self.ensure_locked(id, resolve).await
        };
        self.release(id, lock);
        result
    }

    async fn ensure_locked<F>(&self, id: &DatasetId, resolve: F) -> Result<Registration>
    where
        F: FnOnce() -> Result<SourceFile>,
    {
        let store = self.store.clone();
        let table = id.clone();
        let exists = run_blocking(move || store.table_exists(&table))
            .await?
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;

        if exists {
            debug!("Table already registered");
            return Ok(Registration {
                table_name: id.clone(),
                created: false,
            });
        }

        let source = resolve()?;
        check_readable(&source)?;

        info!(path = %source.path.display(), format = ?source.format, "Registering table");

        let store = self.store.clone();
        let table = id.clone();
        run_blocking(move || store.create_table_from_file(&table, &source))
            .await?
            .map_err(|e| match e {
                StoreError::SourceUnreadable(msg) => PipelineError::SourceUnreadable(msg),
                other => PipelineError::StoreUnavailable(other.to_string()),
            })?;

        info!("Table registered");
        Ok(Registration {
            table_name: id.clone(),
            created: true,
        })
    }

    fn lock_for(&self, id: &DatasetId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| PipelineError::StoreUnavailable("catalog lock poisoned".to_string()))?;
        Ok(locks.entry(lock_key(id)).or_default().clone())
    }

    /// Drop the map entry once no other task holds or waits on it
    fn release(&self, id: &DatasetId, lock: Arc<tokio::sync::Mutex<()>>) {
        match self.locks.lock() {
            Ok(mut locks) => {
                if Arc::strong_count(&lock) == 2 {
                    locks.remove(&lock_key(id));
                }
            }
            Err(_) => warn!(table = %id, "Catalog lock poisoned while releasing"),
        }
    }
}

fn lock_key(id: &DatasetId) -> String {
    id.as_str().to_ascii_lowercase()
}

fn check_readable(source: &SourceFile) -> Result<()> {
    let path = &source.path;
    if !path.is_file() {
        return Err(PipelineError::SourceUnreadable(format!(
            "{} does not exist or is not a file",
            path.display()
        )));
    }
    File::open(path)
        .map(|_| ())
        .map_err(|e| PipelineError::SourceUnreadable(format!("{}: {}", path.display(), e)))
}
