//! Natural language to SQL translation through a language model
//!
//! The model's reply is untrusted text. It is accepted only when it is a
//! single JSON object `{"sql": "<statement>"}`, optionally wrapped in one
//! Markdown code fence. Anything else is a [`PipelineError::TranslationInvalid`];
//! the model is never asked again.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider returned no content")]
    EmptyResponse,
}

/// A chat-style language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the instruction and the user's question, return the raw reply
    async fn complete(&self, instruction: &str, question: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SqlReply {
    sql: String,
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?[ \t]*```$")
            .expect("fence pattern is valid")
    })
}

/// Return the payload of a reply that is entirely one fenced block,
/// otherwise the trimmed reply itself.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    match fence_pattern().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Extract the SQL statement from a raw model reply
pub fn parse_reply(reply: &str) -> Result<String> {
    let payload = strip_code_fence(reply);

    let parsed: SqlReply = serde_json::from_str(payload)
        .map_err(|e| PipelineError::TranslationInvalid(format!("reply is not a {{\"sql\": string}} object: {e}")))?;

    let sql = parsed.sql.trim();
    let sql = sql.strip_suffix(';').unwrap_or(sql).trim_end();
    if sql.is_empty() {
        return Err(PipelineError::TranslationInvalid("reply contains an empty statement".to_string()));
    }

    Ok(sql.to_string())
}

#[derive(Clone)]
pub struct Translator {
    model: Arc<dyn LanguageModel>,
}

impl Translator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Ask the model once and return the statement it produced
    pub async fn translate(&self, prompt: &str, question: &str) -> Result<String> {
        let reply = self.model.complete(prompt, question).await.map_err(|e| {
            warn!(error = %e, "Language model call failed");
            PipelineError::TranslationUnavailable(e.to_string())
        })?;

        debug!(reply = %reply, "Language model reply");

        parse_reply(&reply).map_err(|e| {
            warn!(error = %e, "Rejected language model reply");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_fenced_json_reply() {
        let sql = parse_reply("```json\n{\"sql\": \"SELECT 1\"}\n```").unwrap();
        assert_eq!(sql, "SELECT 1");
    }

    #[test]
    fn test_bare_fence_and_surrounding_whitespace() {
        assert_eq!(parse_reply("  ```\n{\"sql\": \"SELECT 2\"}\n```  \n").unwrap(), "SELECT 2");
        assert_eq!(parse_reply("```{\"sql\": \"SELECT 3\"}```").unwrap(), "SELECT 3");
    }

    #[test]
    fn test_unfenced_json_reply() {
        assert_eq!(
            parse_reply(r#"{"sql": "SELECT * FROM t LIMIT 10;"}"#).unwrap(),
            "SELECT * FROM t LIMIT 10"
        );
    }

    #[test]
    fn test_not_json_is_invalid() {
        let err = parse_reply("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranslationInvalid);
    }

    #[test]
    fn test_empty_sql_is_invalid() {
        assert_eq!(parse_reply(r#"{"sql": ""}"#).unwrap_err().kind(), ErrorKind::TranslationInvalid);
        assert_eq!(parse_reply(r#"{"sql": "  ; "}"#).unwrap_err().kind(), ErrorKind::TranslationInvalid);
    }

    #[test]
    fn test_wrong_shapes_are_invalid() {
        for reply in [
            r#"{"query": "SELECT 1"}"#,
            r#"{"sql": 1}"#,
            r#"{"sql": "SELECT 1", "explanation": "counts"}"#,
            r#"[{"sql": "SELECT 1"}]"#,
            r#"Here you go: {"sql": "SELECT 1"}"#,
            "```sql\nSELECT 1\n```",
            "",
        ] {
            assert_eq!(
                parse_reply(reply).unwrap_err().kind(),
                ErrorKind::TranslationInvalid,
                "reply {reply:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_text_around_a_fence_is_not_stripped() {
        let reply = "Sure!\n```json\n{\"sql\": \"SELECT 1\"}\n```";
        assert_eq!(strip_code_fence(reply), reply.trim());
    }
}
