//! Test doubles for the store and the language model

#![allow(dead_code)]

use async_trait::async_trait;
use sqlask_core::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Scalar>>,
}

/// In-memory store that reads CSV headers and counts every file load
#[derive(Default)]
pub struct MemoryStore {
    pub tables: Mutex<HashMap<String, MemoryTable>>,
    pub canned: Mutex<HashMap<String, Result<ResultSet, String>>>,
    pub loads: AtomicUsize,
    pub load_delay: Option<Duration>,
    pub unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, table: MemoryTable) -> Self {
        self.tables.lock().unwrap().insert(name.to_ascii_lowercase(), table);
        self
    }

    pub fn answer(self, sql: &str, result: Result<ResultSet, String>) -> Self {
        self.canned.lock().unwrap().insert(sql.to_string(), result);
        self
    }

    pub fn table_count(&self) -> usize {
        self.tables.lock().unwrap().len()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn table_exists(&self, table: &DatasetId) -> Result<bool, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store is down".to_string()));
        }
        Ok(self.tables.lock().unwrap().contains_key(&table.as_str().to_ascii_lowercase()))
    }

    fn create_table_from_file(&self, table: &DatasetId, source: &SourceFile) -> Result<(), StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }

        let text = std::fs::read_to_string(&source.path)
            .map_err(|e| StoreError::SourceUnreadable(e.to_string()))?;
        let mut lines = text.lines();
        let columns = lines
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|c| !c.is_empty())
            .map(|c| ColumnDescriptor::new(c.trim(), ColumnType::Varchar))
            .collect::<Vec<_>>();
        let rows = lines
            .map(|line| line.split(',').map(|v| Scalar::Text(v.trim().to_string())).collect())
            .collect();

        let mut tables = self.tables.lock().unwrap();
        let key = table.as_str().to_ascii_lowercase();
        if tables.contains_key(&key) {
            return Err(StoreError::Query(format!("Catalog Error: Table {table} already exists")));
        }
        tables.insert(key, MemoryTable { columns, rows });
        Ok(())
    }

    fn columns(&self, table: &DatasetId) -> Result<Vec<ColumnDescriptor>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&table.as_str().to_ascii_lowercase())
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    fn query(&self, sql: &str) -> Result<ResultSet, StoreError> {
        match self.canned.lock().unwrap().get(sql) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(msg)) => Err(StoreError::Query(msg.clone())),
            None => Err(StoreError::Query(format!("Parser Error: no canned result for {sql}"))),
        }
    }
}

/// Replies with a fixed text, or fails like a transport error
pub struct ScriptedModel {
    reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub last_instruction: Mutex<Option<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_instruction: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_instruction: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, instruction: &str, _question: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_instruction.lock().unwrap() = Some(instruction.to_string());
        self.reply.clone().map_err(ProviderError::Transport)
    }
}

pub fn sql_reply(sql: &str) -> String {
    format!("```json\n{}\n```", serde_json::json!({ "sql": sql }))
}

pub fn write_csv(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
