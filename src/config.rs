//! Configuration types for PDF-to-spreadsheet conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One config is built at startup and
//! shared read-only by every request afterwards; nothing here is mutated per
//! request.

use crate::error::Pdf2XlsxError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Upper bound for `max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Excel's default worksheet name.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Configuration for a PDF-to-spreadsheet conversion.
///
/// # Example
/// ```rust
/// use edgequake_pdf2xlsx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .provider_name("gemini")
///     .model("gemini-2.5-flash")
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_timeout_secs, 90);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, uses [`DEFAULT_MODEL`] (or `EDGEQUAKE_MODEL`).
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, falls back to `EDGEQUAKE_LLM_PROVIDER`,
    /// then [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the extraction call. Default: 0.0.
    ///
    /// Extraction should be faithful to the document, so the default is fully
    /// deterministic sampling.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// The response holds one JSON object per fact in the document; a dense
    /// form easily produces several thousand tokens. Too low a limit
    /// truncates the array, which the parser then rejects as malformed.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed model call. Default: 2, at most
    /// [`MAX_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Name of the worksheet written to the workbook. Default: "Sheet1".
    pub sheet_name: String,

    /// Optional stage-level progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            password: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sheet_name", &self.sheet_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn sheet_name(mut self, name: impl Into<String>) -> Self {
        self.config.sheet_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2XlsxError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        validate_sheet_name(&c.sheet_name)?;
        Ok(self.config)
    }
}

/// Excel rejects sheet names that are empty, longer than 31 characters,
/// contain any of `[]:*?/\`, or start/end with an apostrophe.
fn validate_sheet_name(name: &str) -> Result<(), Pdf2XlsxError> {
    const FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

    if name.is_empty() || name.chars().count() > 31 {
        return Err(Pdf2XlsxError::InvalidConfig(format!(
            "sheet name must be 1–31 characters, got {:?}",
            name
        )));
    }
    if name.contains(FORBIDDEN) || name.starts_with('\'') || name.ends_with('\'') {
        return Err(Pdf2XlsxError::InvalidConfig(format!(
            "sheet name {:?} contains characters Excel does not allow",
            name
        )));
    }
    Ok(())
}

/// Environment variable the given provider reads its API key from.
///
/// The service takes a single `API_KEY`; the binary copies it into the
/// provider-specific variable at startup so [`edgequake_llm::ProviderFactory`]
/// can find it.
pub fn provider_credential_var(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "xai" => Some("XAI_API_KEY"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_tokens, 8192);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.sheet_name, "Sheet1");
        assert!(c.provider.is_none());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ConversionConfig::builder().temperature(7.5).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_caps_retries() {
        let c = ConversionConfig::builder().max_retries(1000).build().unwrap();
        assert_eq!(c.max_retries, MAX_RETRIES);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ConversionConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2XlsxError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_sheet_names() {
        for name in ["", "a/b", "[x]", "'quoted'", "this sheet name is far too long!"] {
            let res = ConversionConfig::builder().sheet_name(name).build();
            assert!(res.is_err(), "{name:?} should be rejected");
        }
        assert!(ConversionConfig::builder()
            .sheet_name("Extracted facts")
            .build()
            .is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let c = ConversionConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn credential_vars() {
        assert_eq!(provider_credential_var("gemini"), Some("GEMINI_API_KEY"));
        assert_eq!(provider_credential_var("OpenAI"), Some("OPENAI_API_KEY"));
        assert_eq!(provider_credential_var("ollama"), None);
    }
}
