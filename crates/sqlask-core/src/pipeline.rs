//! The natural-language-to-query pipeline
//!
//! Upload: normalize the name, register the table once.
//! Query: ensure the table, read its schema, build the prompt, translate,
//! guard the statement, execute and sanitize.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::catalog::{Registration, TableCatalog};
use crate::error::{PipelineError, Result};
use crate::exec::QueryExecutor;
use crate::guard::check_statement;
use crate::identifier::DatasetId;
use crate::prompt::build_prompt;
use crate::schema::{ColumnDescriptor, SchemaIntrospector};
use crate::source::SourceFile;
use crate::store::Store;
use crate::translate::{LanguageModel, Translator};
use crate::value::Row;

/// How a query treats datasets that have no table yet
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Directory holding `<id>.<ext>` dataset files
    pub data_dir: Option<PathBuf>,
    /// Ingest `<data_dir>/<id>.<ext>` when a queried table is missing
    pub lazy_registration: bool,
}

/// Successful answer to a question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub result: Vec<Row>,
    pub length: usize,
}

pub struct Pipeline {
    catalog: TableCatalog,
    introspector: SchemaIntrospector,
    translator: Translator,
    executor: QueryExecutor,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, model: Arc<dyn LanguageModel>, options: PipelineOptions) -> Self {
        Self {
            catalog: TableCatalog::new(store.clone()),
            introspector: SchemaIntrospector::new(store.clone()),
            translator: Translator::new(model),
            executor: QueryExecutor::new(store),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Register an uploaded file under the identifier derived from `name`
    #[instrument(skip(self, source), fields(path = %source.path.display()))]
    pub async fn register(&self, name: &str, source: SourceFile) -> Result<Registration> {
        let id = DatasetId::from_filename(name)?;
        self.catalog.ensure_table(&id, source).await
    }

    /// Current columns of a registered dataset
    pub async fn describe(&self, dataset: &str) -> Result<Vec<ColumnDescriptor>> {
        let id = DatasetId::parse(dataset)?;
        self.ensure_registered(&id).await?;
        self.introspector.describe(&id).await
    }

    /// Answer `question` with rows from `dataset`
    #[instrument(skip(self, question))]
    pub async fn ask(&self, dataset: &str, question: &str) -> Result<QueryOutcome> {
        let id = DatasetId::parse(dataset)?;
        self.ensure_registered(&id).await?;

        let columns = self.introspector.describe(&id).await?;
        let prompt = build_prompt(&id, &columns, question);

        let sql = self.translator.translate(&prompt, question).await?;
        info!(sql = %sql, "Generated SQL query");

        check_statement(&sql, &id)?;

        let result = self.executor.execute(&sql).await?;
        info!(rows = result.len(), "Query answered");

        Ok(QueryOutcome {
            query: sql,
            length: result.len(),
            result,
        })
    }

    async fn ensure_registered(&self, id: &DatasetId) -> Result<Registration> {
        let options = &self.options;
        self.catalog
            .ensure_table_with(id, || {
                if !options.lazy_registration {
                    return Err(PipelineError::SourceUnreadable(format!(
                        "dataset '{id}' is not registered"
                    )));
                }
                let dir = options.data_dir.as_ref().ok_or_else(|| {
                    PipelineError::SourceUnreadable("no dataset directory configured".to_string())
                })?;
                SourceFile::locate(dir, id.as_str()).ok_or_else(|| {
                    PipelineError::SourceUnreadable(format!(
                        "no file for dataset '{id}' in {}",
                        dir.display()
                    ))
                })
            })
            .await
    }
}
