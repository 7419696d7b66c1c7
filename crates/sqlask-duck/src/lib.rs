//! DuckDB store for the sqlask pipeline

use duckdb::arrow::datatypes::DataType;
use duckdb::types::{TimeUnit, Value, ValueRef};
use duckdb::Connection;
use sqlask_core::prelude::*;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DuckStoreError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
}

/// Markers DuckDB uses when a table function cannot read its input
const UNREADABLE_MARKERS: &[&str] = &[
    "IO Error",
    "No files found",
    "Could not read",
    "Error when sniffing file",
];

/// A single DuckDB connection shared by every request.
///
/// `duckdb::Connection` is not `Sync`, so calls are serialized behind a mutex.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    pub fn open_in_memory() -> Result<Self, DuckStoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DuckStoreError> {
        info!(path = %path.as_ref().display(), "Opening DuckDB database");
        Ok(Self::from_connection(Connection::open(path)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("DuckDB connection lock poisoned".to_string()))
    }
}

fn unavailable(e: duckdb::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn query_error(e: duckdb::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn load_error(e: duckdb::Error) -> StoreError {
    let msg = e.to_string();
    if UNREADABLE_MARKERS.iter().any(|marker| msg.contains(marker)) {
        StoreError::SourceUnreadable(msg)
    } else {
        StoreError::Unavailable(msg)
    }
}

/// `SELECT * FROM <reader>` source expression for a dataset file
fn reader_sql(source: &SourceFile) -> String {
    let path = source.path.to_string_lossy().replace('\'', "''");
    match source.format {
        SourceFormat::Csv => format!("read_csv_auto('{path}', ignore_errors = true)"),
        SourceFormat::Json => format!("read_json_auto('{path}', ignore_errors = true)"),
        SourceFormat::Parquet => format!("read_parquet('{path}')"),
    }
}

impl Store for DuckStore {
    fn table_exists(&self, table: &DatasetId) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = 'main' AND lower(table_name) = lower(?)",
                [table.as_str()],
                |row| row.get(0),
            )
            .map_err(unavailable)?;
        Ok(count > 0)
    }

    fn create_table_from_file(&self, table: &DatasetId, source: &SourceFile) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            table.quoted(),
            reader_sql(source)
        );
        debug!(sql = %sql, "Loading dataset");

        let conn = self.conn()?;
        conn.execute_batch(&sql).map_err(load_error)
    }

    fn columns(&self, table: &DatasetId) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'main' AND lower(table_name) = lower(?) \
                 ORDER BY ordinal_position",
            )
            .map_err(unavailable)?;

        let columns = stmt
            .query_map([table.as_str()], |row| {
                let name: String = row.get(0)?;
                let data_type: String = row.get(1)?;
                Ok(ColumnDescriptor::new(name, ColumnType::parse(&data_type)))
            })
            .map_err(unavailable)?
            .collect::<duckdb::Result<Vec<_>>>()
            .map_err(unavailable)?;

        Ok(columns)
    }

    fn query(&self, sql: &str) -> Result<ResultSet, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_error)?;
        let mut rows = stmt.query([]).map_err(query_error)?;

        let (columns, zoned) = match rows.as_ref() {
            Some(stmt) => {
                let columns = stmt.column_names();
                let zoned = (0..columns.len())
                    .map(|idx| matches!(stmt.column_type(idx), DataType::Timestamp(_, Some(_))))
                    .collect::<Vec<_>>();
                (columns, zoned)
            }
            None => (Vec::new(), Vec::new()),
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, zoned) in zoned.iter().enumerate() {
                let value = match row.get_ref(idx).map_err(query_error)? {
                    ValueRef::Timestamp(unit, v) if *zoned => Scalar::Text(format_timestamptz(unit, v)),
                    other => to_scalar(other),
                };
                values.push(value);
            }
            out.push(values);
        }

        Ok(ResultSet { columns, rows: out })
    }
}

/// Convert a DuckDB cell into a store-neutral scalar.
///
/// Integers keep their width so sanitization can decide how to render them;
/// temporal and decimal values become their text form.
pub fn to_scalar(value: ValueRef<'_>) -> Scalar {
    match value {
        ValueRef::Null => Scalar::Null,
        ValueRef::Boolean(b) => Scalar::Bool(b),
        ValueRef::TinyInt(i) => Scalar::Int(i.into()),
        ValueRef::SmallInt(i) => Scalar::Int(i.into()),
        ValueRef::Int(i) => Scalar::Int(i.into()),
        ValueRef::BigInt(i) => Scalar::Int(i),
        ValueRef::HugeInt(i) => Scalar::HugeInt(i),
        ValueRef::UHugeInt(u) => i128::try_from(u)
            .map(Scalar::HugeInt)
            .unwrap_or_else(|_| Scalar::Text(u.to_string())),
        ValueRef::UTinyInt(i) => Scalar::UInt(i.into()),
        ValueRef::USmallInt(i) => Scalar::UInt(i.into()),
        ValueRef::UInt(i) => Scalar::UInt(i.into()),
        ValueRef::UBigInt(i) => Scalar::UInt(i),
        ValueRef::Float(f) => Scalar::Float(f.into()),
        ValueRef::Double(f) => Scalar::Float(f),
        ValueRef::Decimal(d) => Scalar::Text(d.to_string()),
        ValueRef::Text(s) => Scalar::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Scalar::Text(format!("<blob {} bytes>", b.len())),
        ValueRef::Date32(days) => Scalar::Text(format_date(days)),
        ValueRef::Timestamp(unit, v) => Scalar::Text(format_timestamp(unit, v)),
        ValueRef::Time64(unit, v) => Scalar::Text(format_time(unit, v)),
        ValueRef::Interval { months, days, nanos } => Scalar::Text(format_interval(months, days, nanos)),
        other => Scalar::Text(value_text(&Value::from(other))),
    }
}

/// DuckDB's text form of a value, used for nested and less common types
fn value_text(value: &Value) -> String {
    fn join<'a>(items: impl Iterator<Item = &'a Value>) -> String {
        items.map(value_text).collect::<Vec<_>>().join(", ")
    }

    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::HugeInt(i) => i.to_string(),
        Value::UHugeInt(u) => u.to_string(),
        Value::UTinyInt(u) => u.to_string(),
        Value::USmallInt(u) => u.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::UBigInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Timestamp(unit, v) => format_timestamp(*unit, *v),
        Value::Text(s) | Value::Enum(s) => s.clone(),
        Value::Blob(b) | Value::Geometry(b) => format!("<blob {} bytes>", b.len()),
        Value::Date32(days) => format_date(*days),
        Value::Time64(unit, v) => format_time(*unit, *v),
        Value::Interval { months, days, nanos } => format_interval(*months, *days, *nanos),
        Value::List(items) | Value::Array(items) => format!("[{}]", join(items.iter())),
        Value::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|(name, v)| format!("'{name}': {}", value_text(v)))
                .collect::<Vec<_>>();
            format!("{{{}}}", fields.join(", "))
        }
        Value::Map(entries) => {
            let entries = entries
                .iter()
                .map(|(k, v)| format!("{}={}", value_text(k), value_text(v)))
                .collect::<Vec<_>>();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Union(inner) => value_text(inner),
        // `Value` is non-exhaustive; types added by later releases
        other => format!("{other:?}"),
    }
}

/// `1 year 2 months 3 days 04:05:06.5`, as DuckDB prints intervals
fn format_interval(months: i32, days: i32, nanos: i64) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n.abs() == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (i64::from(months) / 12, i64::from(months) % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "month"));
    }
    if days != 0 {
        parts.push(unit(days.into(), "day"));
    }

    if nanos != 0 || parts.is_empty() {
        let sign = if nanos < 0 { "-" } else { "" };
        let micros = (nanos / 1_000).unsigned_abs();
        let (secs, frac) = (micros / 1_000_000, micros % 1_000_000);
        let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

/// Days since the Unix epoch
fn format_date(days: i32) -> String {
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| days.to_string())
}

fn format_timestamp(unit: TimeUnit, v: i64) -> String {
    let micros = to_micros(unit, v);
    chrono::DateTime::from_timestamp_micros(micros)
        .map(|ts| ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
        .unwrap_or_else(|| micros.to_string())
}

/// Zoned timestamps arrive as UTC instants
fn format_timestamptz(unit: TimeUnit, v: i64) -> String {
    format!("{}+00", format_timestamp(unit, v))
}

fn format_time(unit: TimeUnit, v: i64) -> String {
    let micros = to_micros(unit, v);
    let secs = micros.div_euclid(1_000_000);
    let nanos = micros.rem_euclid(1_000_000) * 1_000;
    u32::try_from(secs)
        .ok()
        .and_then(|secs| chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos as u32))
        .map(|t| t.format("%H:%M:%S%.f").to_string())
        .unwrap_or_else(|| micros.to_string())
}
