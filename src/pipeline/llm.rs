//! Model interaction: send the extraction prompt and return raw text.
//!
//! The pipeline talks to a [`ModelClient`], not to a provider directly, so
//! tests can substitute a canned client. [`LlmModelClient`] is the real one,
//! backed by any `edgequake_llm` provider.
//!
//! ## Retry Strategy
//!
//! Transient failures (HTTP 429 / 503, dropped connections, timeouts) are
//! retried with exponential backoff, `retry_backoff_ms * 2^(attempt-1)`:
//! with 500 ms base and 2 retries the waits are 500 ms then 1 s. Each
//! attempt is bounded by `api_timeout_secs`.

use crate::config::{ConversionConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::Pdf2XlsxError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Raw model output for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Failed attempts before this one succeeded.
    pub retries: u32,
}

impl ModelResponse {
    /// A response carrying only text, with unknown token usage.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One call to a text-generation model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, Pdf2XlsxError>;
}

/// [`ModelClient`] backed by an `edgequake_llm` provider.
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl LlmModelClient {
    /// Resolve the provider from the config (or the environment) and capture
    /// the sampling and retry settings.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2XlsxError> {
        let provider = resolve_provider(config)?;
        Ok(Self::with_provider(provider, config))
    }

    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, Pdf2XlsxError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];

        let mut last_err: Option<String> = None;
        let mut timed_out = false;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Model call: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Model call: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(ModelResponse {
                        text: response.content,
                        input_tokens: response.prompt_tokens as u64,
                        output_tokens: response.completion_tokens as u64,
                        retries: attempt,
                    });
                }
                Ok(Err(e)) => {
                    warn!("Model call: attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.to_string());
                    timed_out = false;
                }
                Err(_) => {
                    warn!(
                        "Model call: attempt {} timed out after {}s",
                        attempt + 1,
                        self.timeout.as_secs()
                    );
                    timed_out = true;
                }
            }
        }

        let attempts = self.max_retries.saturating_add(1);
        if timed_out {
            return Err(Pdf2XlsxError::ModelTimeout {
                attempts,
                secs: self.timeout.as_secs(),
            });
        }
        Err(Pdf2XlsxError::ModelInvocation {
            attempts,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Resolve the LLM provider.
///
/// Priority:
/// 1. `config.provider` (a pre-built provider)
/// 2. `config.provider_name` with `config.model` (or the default model)
/// 3. `EDGEQUAKE_LLM_PROVIDER` with `EDGEQUAKE_MODEL`
/// 4. [`DEFAULT_PROVIDER`] / [`DEFAULT_MODEL`]
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2XlsxError> {
    if let Some(ref p) = config.provider {
        return Ok(Arc::clone(p));
    }

    let env_provider = std::env::var("EDGEQUAKE_LLM_PROVIDER").ok();
    let env_model = std::env::var("EDGEQUAKE_MODEL").ok();

    let provider_name = config
        .provider_name
        .clone()
        .or(env_provider)
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let model = config
        .model
        .clone()
        .or(env_model)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let provider = ProviderFactory::create_llm_provider(&provider_name, &model).map_err(|e| {
        Pdf2XlsxError::ProviderNotConfigured {
            provider: provider_name.clone(),
            hint: format!(
                "{}\nSet API_KEY (or the provider's own key variable) and check the provider name.",
                e
            ),
        }
    })?;
    info!("Using LLM provider {} / {}", provider_name, model);
    Ok(provider)
}

/// Delay before retry number `attempt` (1-based), saturating instead of
/// overflowing for large retry counts.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 64), u64::MAX);
        assert_eq!(backoff_ms(500, u32::MAX), u64::MAX);
    }

    #[test]
    fn text_only_response() {
        let r = ModelResponse::text("[]");
        assert_eq!(r.text, "[]");
        assert_eq!(r.input_tokens, 0);
        assert_eq!(r.retries, 0);
    }
}
