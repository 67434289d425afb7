use async_trait::async_trait;
use tracing::warn;

use crate::claude::Claude;
use crate::error::AiError;
use crate::openrouter::OpenRouter;

/// A single-turn chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String, AiError>;
}

#[async_trait]
impl ChatProvider for Claude {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String, AiError> {
        Claude::chat_completion(self, system, user).await
    }
}

#[async_trait]
impl ChatProvider for OpenRouter {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn chat_completion(&self, system: &str, user: &str) -> Result<String, AiError> {
        OpenRouter::chat_completion(self, system, user).await
    }
}

/// Providers tried in order; the first success wins.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn ChatProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl ChatProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn chat_completion(&self, system: &str, user: &str) -> Result<String, AiError> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.chat_completion(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Chat provider failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AiError::Config("no chat provider configured; set ANTHROPIC_API_KEY or OPENROUTER_API_KEY".into())
        }))
    }
}
