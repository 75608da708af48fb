//! Configuration for OCR tasks.
//!
//! Everything a run needs to know about its environment lives in
//! [`OcrConfig`]: endpoint credentials, model id, rendering resolution,
//! workspace location. It is built once at startup with
//! [`OcrConfigBuilder`], validated, and handed to
//! [`crate::task::TaskRunner::new`] by reference. The library never reads
//! environment variables itself, so tests can build any configuration they
//! like without process-wide side effects.

use crate::error::OcrTaskError;
use crate::prompts::DEFAULT_PROMPT;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint serving DeepSeek-OCR.
pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-OCR";

/// Configuration for OCR task runs.
///
/// # Example
/// ```rust
/// use pageocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .api_key("sk-test")
///     .workspace_dir("/tmp/ocr-workspace")
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Bearer token for the chat-completions endpoint.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API; `/chat/completions` is appended.
    pub base_url: String,

    /// Model identifier sent with every request and recorded in `metadata.json`.
    pub model: String,

    /// edgequake-llm provider name (e.g. "openai", "ollama"). When set, pages
    /// are recognised through that provider instead of the raw HTTP client.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Upper bound on tasks a caller runs at once. Default: 5.
    ///
    /// A single task is always sequential; this knob is for callers that run
    /// several tasks side by side (the CLI does).
    pub max_concurrency: usize,

    /// Root of the workspace holding `uploads/`, `results/` and `logs/`.
    pub workspace_dir: PathBuf,

    /// Rendering DPI for PDF pages. Range: 72–400. Default: 144.
    ///
    /// PDF user space is 72 units per inch, so pages are scaled by `dpi / 72`.
    pub dpi: u32,

    /// Cap on either dimension of a rendered page, in pixels. Default: 4096.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory containing the pdfium shared library. If None, `./` and then
    /// the system library search path are tried. pdfium is bound once per
    /// process, so only the value in effect at the first successful binding
    /// is used.
    pub pdfium_library_path: Option<PathBuf>,

    /// Prompt used when a run does not supply one.
    pub default_prompt: String,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Completion token limit; omitted from requests when None.
    pub max_tokens: Option<usize>,

    /// Sampling temperature; omitted from requests when None.
    pub temperature: Option<f32>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            max_concurrency: 5,
            workspace_dir: PathBuf::from("workspace"),
            dpi: 144,
            max_rendered_pixels: 4096,
            password: None,
            pdfium_library_path: None,
            default_prompt: DEFAULT_PROMPT.to_string(),
            api_timeout_secs: 120,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_concurrency", &self.max_concurrency)
            .field("workspace_dir", &self.workspace_dir)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("default_prompt", &self.default_prompt)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Page scale factor applied to the PDF's native 72-unit-per-inch space.
    pub fn render_scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
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

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    pub fn workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_dir = dir.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    pub fn default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrTaskError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(OcrTaskError::InvalidConfig("model must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(OcrTaskError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.max_concurrency == 0 {
            return Err(OcrTaskError::InvalidConfig(
                "max concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(OcrTaskError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.default_prompt.trim().is_empty() {
            return Err(OcrTaskError::InvalidConfig(
                "default prompt must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deepseek_setup() {
        let c = OcrConfig::default();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.dpi, 144);
        assert_eq!(c.max_concurrency, 5);
        assert_eq!(c.api_timeout_secs, 120);
        assert_eq!(c.default_prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn render_scale_is_dpi_over_72() {
        let c = OcrConfig::default();
        assert!((c.render_scale() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_clamps_dpi_and_temperature() {
        let c = OcrConfig::builder().dpi(10).temperature(9.0).build().unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.temperature, Some(2.0));
    }

    #[test]
    fn build_rejects_bad_base_url() {
        let err = OcrConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, OcrTaskError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_zero_concurrency_and_timeout() {
        assert!(OcrConfig::builder().max_concurrency(0).build().is_err());
        assert!(OcrConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn build_rejects_blank_model_and_prompt() {
        assert!(OcrConfig::builder().model("  ").build().is_err());
        assert!(OcrConfig::builder().default_prompt("").build().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = OcrConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
