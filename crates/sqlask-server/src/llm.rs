//! OpenAI chat completions as a [`LanguageModel`]
//!
//! One request per question. There is no retry loop here; the whole call,
//! including any transport backoff inside the client, is bounded by the
//! configured timeout.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use sqlask_core::prelude::{LanguageModel, ProviderError};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LlmConfig;

pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiModel {
    pub fn new(api_key: String, config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.base_url {
            openai_config = openai_config.with_api_base(base);
        }

        info!(model = %config.model, timeout_secs = config.timeout_secs, "Using OpenAI model");

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn request(&self, instruction: &str, question: &str) -> Result<String, ProviderError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instruction)
                    .build()
                    .map_err(transport)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(question)
                    .build()
                    .map_err(transport)?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(transport)?;

        let response = self.client.chat().create(request).await.map_err(transport)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        debug!(content = %content, "LLM response");
        Ok(content.to_string())
    }
}

fn transport(e: OpenAIError) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, instruction: &str, question: &str) -> Result<String, ProviderError> {
        tokio::time::timeout(self.timeout, self.request(instruction, question))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }
}
