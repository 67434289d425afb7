mod client;
pub(crate) mod types;

use std::time::Duration;

use crate::error::AiError;
use client::OpenRouterClient;
use types::*;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible chat completions through OpenRouter.
#[derive(Debug, Clone)]
pub struct OpenRouter {
    api_key: String,
    model: String,
    base_url: String,
    app_name: Option<String>,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENROUTER_API_URL.to_string(),
            app_name: None,
            max_tokens: 4000,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String, AiError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            max_tokens: self.max_tokens,
        };

        let response = OpenRouterClient::new(&self.api_key, &self.base_url, self.timeout)?
            .with_app_name(self.app_name.as_deref())
            .chat(&request)
            .await?;

        response.text().ok_or(AiError::EmptyResponse("openrouter"))
    }
}
