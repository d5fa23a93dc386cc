//! Configuration types for the document pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`] or read from the environment with
//! [`PipelineConfig::from_env`]. Sub-structs group the knobs of each stage so
//! that a stage only ever sees the options it owns.

use crate::error::PipelineError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Storage account holding the invoice container(s). Required.
pub const STORAGE_ACCOUNT_ENV: &str = "INVOICES_STORAGE_ACCOUNT_NAME";
/// Root directory of the filesystem blob store.
pub const STORAGE_ROOT_ENV: &str = "DOCPIPE_STORAGE_ROOT";
/// Document Intelligence endpoint used by the markdown converter.
pub const LAYOUT_ENDPOINT_ENV: &str = "DOCUMENT_INTELLIGENCE_ENDPOINT";
/// Document Intelligence API key.
pub const LAYOUT_KEY_ENV: &str = "DOCUMENT_INTELLIGENCE_KEY";
/// Chat model / deployment for text extraction.
pub const COMPLETION_MODEL_ENV: &str = "OPENAI_COMPLETION_DEPLOYMENT";
/// Chat model / deployment for vision extraction.
pub const VISION_MODEL_ENV: &str = "OPENAI_VISION_COMPLETION_DEPLOYMENT";
/// Provider name understood by `edgequake_llm::ProviderFactory`.
pub const PROVIDER_ENV: &str = "EDGEQUAKE_LLM_PROVIDER";
/// Extraction strategy: `direct`, `markdown` or `vision`.
pub const EXTRACTOR_ENV: &str = "DOCPIPE_EXTRACTOR";
/// Number of documents processed concurrently within a batch.
pub const CONCURRENCY_ENV: &str = "DOCPIPE_CONCURRENCY";
/// Convert every document to Markdown before extraction (`true`/`false`).
pub const MARKDOWN_STEP_ENV: &str = "DOCPIPE_MARKDOWN_STEP";

/// Hard upper bound on images per vision request.
pub const MAX_TILES: usize = 10;

/// Which extraction strategy the pipeline is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Document text goes straight to the chat model.
    Direct,
    /// Layout service converts to Markdown first, then the direct path.
    Markdown,
    /// Pages are rendered, tiled and sent as images. (default)
    #[default]
    Vision,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Direct => "direct",
            ExtractorKind::Markdown => "markdown",
            ExtractorKind::Vision => "vision",
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractorKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "text" => Ok(ExtractorKind::Direct),
            "markdown" | "md" => Ok(ExtractorKind::Markdown),
            "vision" | "image" => Ok(ExtractorKind::Vision),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown extractor '{other}' (expected direct, markdown or vision)"
            ))),
        }
    }
}

/// Sampling parameters and prompts for every chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,
    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,
    /// Nucleus sampling value. Default: 0.1.
    pub top_p: f32,
    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.1,
            top_p: 0.1,
            system_prompt: None,
        }
    }
}

/// Rendering and tiling knobs for the vision strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilingOptions {
    /// Maximum composite images per request (1–10). Default: 10.
    pub max_tiles: usize,
    /// JPEG quality of each composite (1–100). Default: 85.
    ///
    /// Tiles are stitched from several pages and can get tall; JPEG keeps the
    /// upload small while 85 still leaves small print legible.
    pub jpeg_quality: u8,
    /// Maximum rendered page edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,
    /// PDF user password for encrypted documents.
    pub password: Option<String>,
}

impl Default for TilingOptions {
    fn default() -> Self {
        Self {
            max_tiles: MAX_TILES,
            jpeg_quality: 85,
            max_rendered_pixels: 2000,
            password: None,
        }
    }
}

/// Connection settings for the layout-analysis (markdown) service.
#[derive(Clone, Serialize, Deserialize)]
pub struct LayoutServiceOptions {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// REST API version. Default: `2024-11-30`.
    pub api_version: String,
    /// Delay between operation polls in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,
    /// Polls before the analysis is abandoned. Default: 120.
    pub max_polls: u32,
}

impl Default for LayoutServiceOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2024-11-30".to_string(),
            poll_interval_ms: 1000,
            max_polls: 120,
        }
    }
}

impl fmt::Debug for LayoutServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutServiceOptions")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}

/// Batch orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOptions {
    /// Documents processed concurrently within a batch. Default: 4.
    pub concurrency: usize,
    /// Per-activity timeout enforced by the host, in seconds. Default: 300.
    pub activity_timeout_secs: u64,
    /// Convert every document to Markdown and store it before extraction. Default: false.
    pub markdown_step: bool,
    /// Lifetime of read URIs handed to the layout service, in seconds. Default: 3600.
    pub read_uri_ttl_secs: u64,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            activity_timeout_secs: 300,
            markdown_step: false,
            read_uri_ttl_secs: 3600,
        }
    }
}

/// Configuration for the whole pipeline.
///
/// # Example
/// ```rust
/// use ai_document_pipeline::{ExtractorKind, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .storage_account("invoices")
///     .extractor(ExtractorKind::Vision)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.tiling.max_tiles, 10);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Storage account name passed to every storage call.
    pub storage_account: String,
    /// Root directory of the filesystem blob store. Default: `./storage`.
    pub storage_root: PathBuf,
    /// Extraction strategy selected at startup. Default: vision.
    pub extractor: ExtractorKind,
    /// LLM provider name (e.g. "openai", "azure", "anthropic").
    pub provider_name: Option<String>,
    /// Model / deployment for text extraction.
    pub model: Option<String>,
    /// Model / deployment for vision extraction. Falls back to `model`.
    pub vision_model: Option<String>,
    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,
    pub extraction: ExtractionOptions,
    pub tiling: TilingOptions,
    pub layout: LayoutServiceOptions,
    pub workflow: WorkflowOptions,
    /// Download timeout for URL sources in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_account: String::new(),
            storage_root: PathBuf::from("storage"),
            extractor: ExtractorKind::default(),
            provider_name: None,
            model: None,
            vision_model: None,
            provider: None,
            extraction: ExtractionOptions::default(),
            tiling: TilingOptions::default(),
            layout: LayoutServiceOptions::default(),
            workflow: WorkflowOptions::default(),
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("storage_account", &self.storage_account)
            .field("storage_root", &self.storage_root)
            .field("extractor", &self.extractor)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("extraction", &self.extraction)
            .field("tiling", &self.tiling)
            .field("layout", &self.layout)
            .field("workflow", &self.workflow)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// `INVOICES_STORAGE_ACCOUNT_NAME` is required; everything else falls
    /// back to the defaults.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let account = get(STORAGE_ACCOUNT_ENV).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("{STORAGE_ACCOUNT_ENV} is not configured."))
        })?;

        let mut builder = Self::builder().storage_account(account);

        if let Some(root) = get(STORAGE_ROOT_ENV) {
            builder = builder.storage_root(root);
        }
        if let Some(endpoint) = get(LAYOUT_ENDPOINT_ENV) {
            builder = builder.layout_endpoint(endpoint);
        }
        if let Some(key) = get(LAYOUT_KEY_ENV) {
            builder = builder.layout_api_key(key);
        }
        if let Some(provider) = get(PROVIDER_ENV) {
            builder = builder.provider_name(provider);
        }
        if let Some(model) = get(COMPLETION_MODEL_ENV) {
            builder = builder.model(model);
        }
        if let Some(model) = get(VISION_MODEL_ENV) {
            builder = builder.vision_model(model);
        }
        if let Some(kind) = get(EXTRACTOR_ENV) {
            builder = builder.extractor(kind.parse()?);
        }
        if let Some(n) = get(CONCURRENCY_ENV) {
            let n: usize = n.trim().parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("{CONCURRENCY_ENV} must be a number, got '{n}'"))
            })?;
            builder = builder.concurrency(n);
        }
        if let Some(flag) = get(MARKDOWN_STEP_ENV) {
            builder = builder.markdown_step(parse_flag(MARKDOWN_STEP_ENV, &flag)?);
        }

        builder.build()
    }

    /// Model used for vision requests.
    pub fn vision_model(&self) -> Option<&str> {
        self.vision_model.as_deref().or(self.model.as_deref())
    }

    /// `true` when any configured stage needs the layout service.
    pub fn needs_layout_service(&self) -> bool {
        self.extractor == ExtractorKind::Markdown || self.workflow.markdown_step
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, PipelineError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::InvalidConfig(format!(
            "{key} must be true or false, got '{other}'"
        ))),
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn storage_account(mut self, name: impl Into<String>) -> Self {
        self.config.storage_account = name.into();
        self
    }

    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn extractor(mut self, kind: ExtractorKind) -> Self {
        self.config.extractor = kind;
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

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.extraction.max_tokens = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.extraction.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.extraction.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_tiles(mut self, n: usize) -> Self {
        self.config.tiling.max_tiles = n.clamp(1, MAX_TILES);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.tiling.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.tiling.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.tiling.password = Some(pwd.into());
        self
    }

    pub fn layout_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.layout.endpoint = Some(endpoint.into());
        self
    }

    pub fn layout_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.layout.api_key = Some(key.into());
        self
    }

    pub fn layout_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.layout.poll_interval_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.workflow.concurrency = n.max(1);
        self
    }

    pub fn activity_timeout_secs(mut self, secs: u64) -> Self {
        self.config.workflow.activity_timeout_secs = secs.max(1);
        self
    }

    pub fn markdown_step(mut self, v: bool) -> Self {
        self.config.workflow.markdown_step = v;
        self
    }

    pub fn read_uri_ttl_secs(mut self, secs: u64) -> Self {
        self.config.workflow.read_uri_ttl_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.storage_account.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "storage account name is required".into(),
            ));
        }
        if c.tiling.max_tiles == 0 || c.tiling.max_tiles > MAX_TILES {
            return Err(PipelineError::InvalidConfig(format!(
                "max tiles must be 1–{MAX_TILES}, got {}",
                c.tiling.max_tiles
            )));
        }
        if c.workflow.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.extractor == ExtractorKind::Direct && !c.workflow.markdown_step {
            return Err(PipelineError::InvalidConfig(format!(
                "the direct extractor only reads text; enable the markdown step ({MARKDOWN_STEP_ENV}=true)"
            )));
        }
        if c.needs_layout_service() && c.layout.endpoint.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "{LAYOUT_ENDPOINT_ENV} is required for the markdown extractor and the markdown step"
            )));
        }
        Ok(self.config)
    }
}
