//! sqlask - ask questions about uploaded tabular datasets
//!
//! The core pipeline, independent of any particular store or language
//! model. A dataset is registered once as a table; each question is turned
//! into a single guarded SQL query whose rows come back transport-safe.

pub mod catalog;
pub mod error;
pub mod exec;
pub mod guard;
pub mod identifier;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod source;
pub mod store;
pub mod translate;
pub mod value;

pub use error::{ErrorKind, PipelineError};
pub use identifier::{normalize, DatasetId};
pub use pipeline::{Pipeline, PipelineOptions, QueryOutcome};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{Registration, TableCatalog};
    pub use crate::error::{ErrorKind, PipelineError};
    pub use crate::identifier::DatasetId;
    pub use crate::pipeline::{Pipeline, PipelineOptions, QueryOutcome};
    pub use crate::schema::{ColumnDescriptor, ColumnType};
    pub use crate::source::{SourceFile, SourceFormat};
    pub use crate::store::{ResultSet, Store, StoreError};
    pub use crate::translate::{LanguageModel, ProviderError};
    pub use crate::value::{Row, Scalar};
}
