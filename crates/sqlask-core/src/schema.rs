//! Column descriptors and the schema introspector

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::identifier::DatasetId;
use crate::store::{run_blocking, Store};

/// Declared type of a store column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    HugeInt,
    UTinyInt,
    USmallInt,
    UInteger,
    UBigInt,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    Varchar,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Blob,
    Uuid,
    /// Anything else, kept as the store spells it (lists, structs, enums...)
    Other(String),
}

impl ColumnType {
    /// Parse a DuckDB `information_schema` type name
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "TINYINT" | "INT1" => ColumnType::TinyInt,
            "SMALLINT" | "INT2" => ColumnType::SmallInt,
            "INTEGER" | "INT" | "INT4" => ColumnType::Integer,
            "BIGINT" | "INT8" => ColumnType::BigInt,
            "HUGEINT" | "INT128" => ColumnType::HugeInt,
            "UTINYINT" => ColumnType::UTinyInt,
            "USMALLINT" => ColumnType::USmallInt,
            "UINTEGER" => ColumnType::UInteger,
            "UBIGINT" => ColumnType::UBigInt,
            "FLOAT" | "REAL" | "FLOAT4" => ColumnType::Float,
            "DOUBLE" | "FLOAT8" => ColumnType::Double,
            "VARCHAR" | "TEXT" | "STRING" => ColumnType::Varchar,
            "DATE" => ColumnType::Date,
            "TIME" => ColumnType::Time,
            "TIMESTAMP" | "DATETIME" => ColumnType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => ColumnType::TimestampTz,
            "INTERVAL" => ColumnType::Interval,
            "BLOB" | "BYTEA" => ColumnType::Blob,
            "UUID" => ColumnType::Uuid,
            _ => Self::parse_decimal(&upper).unwrap_or_else(|| ColumnType::Other(raw.trim().to_string())),
        }
    }

    fn parse_decimal(upper: &str) -> Option<Self> {
        let args = upper.strip_prefix("DECIMAL(")?.strip_suffix(')')?;
        let (precision, scale) = args.split_once(',')?;
        Some(ColumnType::Decimal {
            precision: precision.trim().parse().ok()?,
            scale: scale.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::TinyInt => f.write_str("TINYINT"),
            ColumnType::SmallInt => f.write_str("SMALLINT"),
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::HugeInt => f.write_str("HUGEINT"),
            ColumnType::UTinyInt => f.write_str("UTINYINT"),
            ColumnType::USmallInt => f.write_str("USMALLINT"),
            ColumnType::UInteger => f.write_str("UINTEGER"),
            ColumnType::UBigInt => f.write_str("UBIGINT"),
            ColumnType::Float => f.write_str("FLOAT"),
            ColumnType::Double => f.write_str("DOUBLE"),
            ColumnType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            ColumnType::Varchar => f.write_str("VARCHAR"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Time => f.write_str("TIME"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
            ColumnType::TimestampTz => f.write_str("TIMESTAMP WITH TIME ZONE"),
            ColumnType::Interval => f.write_str("INTERVAL"),
            ColumnType::Blob => f.write_str("BLOB"),
            ColumnType::Uuid => f.write_str("UUID"),
            ColumnType::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for ColumnType {
    fn from(raw: String) -> Self {
        ColumnType::parse(&raw)
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> Self {
        ty.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            declared_type,
        }
    }
}

/// Reads the current column list of a table. Nothing is cached.
#[derive(Clone)]
pub struct SchemaIntrospector {
    store: Arc<dyn Store>,
}

impl SchemaIntrospector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn describe(&self, id: &DatasetId) -> Result<Vec<ColumnDescriptor>> {
        let store = self.store.clone();
        let table = id.clone();
        let columns = run_blocking(move || store.columns(&table))
            .await?
            .map_err(|e| PipelineError::StoreUnavailable(e.to_string()))?;

        if columns.is_empty() {
            return Err(PipelineError::SchemaEmpty(id.to_string()));
        }

        debug!(table = %id, columns = columns.len(), "Introspected schema");
        Ok(columns)
    }
}
