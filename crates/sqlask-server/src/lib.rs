//! sqlask HTTP server
//!
//! Thin adapter over [`sqlask_core::Pipeline`] backed by DuckDB and an
//! OpenAI-compatible chat model.

pub mod api;
pub mod config;
pub mod llm;
pub mod logging;
pub mod metrics;

pub use api::{router, AppState};
pub use config::Config;
