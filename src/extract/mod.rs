//! Extraction strategies: document → JSON matching a template.
//!
//! Every strategy implements [`DocumentDataExtractor`]. The concrete one is
//! chosen once at startup from [`ExtractorKind`] by [`build_extractor`] and
//! shared as `Arc<dyn DocumentDataExtractor>`; the batch workflow never
//! knows which backend it is talking to.
//!
//! | Strategy | Accepts | Route |
//! |----------|---------|-------|
//! | [`DirectExtractor`]   | text, UTF-8 bytes | chat model |
//! | [`MarkdownExtractor`] | text (markdown), bytes, URI | layout service → chat model |
//! | [`VisionExtractor`]   | bytes, URI | render → tile → chat model with images |
//!
//! "Nothing extracted" is `Ok(None)`. A model answer that is not JSON is
//! [`PipelineError::MalformedOutput`].

mod direct;
mod markdown;
mod response;
mod vision;

pub use direct::DirectExtractor;
pub use markdown::MarkdownExtractor;
pub use response::interpret_completion;
pub use vision::VisionExtractor;

use crate::config::{ExtractorKind, PipelineConfig};
use crate::error::PipelineError;
use crate::pipeline::llm::{ChatCompletionService, ProviderChatService};
use crate::pipeline::markdown::DocumentIntelligenceConverter;
use crate::pipeline::render::PdfiumRenderer;
use crate::provider::{resolve_provider, DEFAULT_MODEL};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// The document handed to an extractor.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Already-extracted text (plain or Markdown).
    Text(String),
    /// Raw document bytes (PDF, image, or UTF-8 text).
    Bytes(Vec<u8>),
    /// A fetchable location: `http(s)://`, `file://` or a local path.
    Uri(String),
}

impl DocumentSource {
    /// Short label used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentSource::Text(_) => "text",
            DocumentSource::Bytes(_) => "bytes",
            DocumentSource::Uri(_) => "uri",
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Text(t) => write!(f, "Text({} chars)", t.len()),
            DocumentSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            DocumentSource::Uri(u) => f.debug_tuple("Uri").field(u).finish(),
        }
    }
}

/// Target shape of an extraction: a JSON template, serialised once.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    template: Value,
    json: String,
    instruction: Option<String>,
}

impl ExtractionSchema {
    /// Build a schema from an empty instance of the target type.
    pub fn from_template<T: Serialize>(template: &T) -> Result<Self, PipelineError> {
        Self::from_value(serde_json::to_value(template)?)
    }

    /// Build a schema from a raw JSON template.
    pub fn from_value(template: Value) -> Result<Self, PipelineError> {
        let json = serde_json::to_string(&template)?;
        Ok(Self {
            template,
            json,
            instruction: None,
        })
    }

    /// Caller-supplied instruction for the markdown and vision strategies.
    /// `{schema}` is replaced with the serialised template.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn template(&self) -> &Value {
        &self.template
    }

    pub fn as_json(&self) -> &str {
        &self.json
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }
}

/// One extraction strategy.
#[async_trait]
pub trait DocumentDataExtractor: Send + Sync {
    /// Strategy name for logs and errors.
    fn name(&self) -> &'static str;

    /// Whether this strategy can consume `source` as-is.
    fn accepts(&self, source: &DocumentSource) -> bool;

    /// Extract data shaped like `schema` from `source`.
    async fn extract(
        &self,
        source: DocumentSource,
        schema: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError>;
}

/// Typed extraction: serialise `template`, extract, deserialise into `T`.
///
/// A JSON answer that does not fit `T` is [`PipelineError::MalformedOutput`].
pub async fn extract_as<T>(
    extractor: &dyn DocumentDataExtractor,
    source: DocumentSource,
    template: &T,
    instruction: Option<&str>,
) -> Result<Option<T>, PipelineError>
where
    T: Serialize + DeserializeOwned,
{
    let mut schema = ExtractionSchema::from_template(template)?;
    if let Some(instruction) = instruction {
        schema = schema.with_instruction(instruction);
    }

    match extractor.extract(source, &schema).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| PipelineError::MalformedOutput { source }),
    }
}

/// Build the strategy selected by `config.extractor`.
///
/// `chat` overrides the provider-backed chat service; pass `None` in
/// production.
pub fn build_extractor(
    config: &PipelineConfig,
    chat: Option<Arc<dyn ChatCompletionService>>,
) -> Result<Arc<dyn DocumentDataExtractor>, PipelineError> {
    build_extractor_as(config, config.extractor, chat)
}

/// Build `kind` with the rest of `config`, whatever `config.extractor` says.
///
/// Single-document callers use this to pick a strategy per call; the
/// batch-level checks of [`PipelineConfig`] do not apply to them.
pub fn build_extractor_as(
    config: &PipelineConfig,
    kind: ExtractorKind,
    chat: Option<Arc<dyn ChatCompletionService>>,
) -> Result<Arc<dyn DocumentDataExtractor>, PipelineError> {
    let chat = match chat {
        Some(chat) => chat,
        None => {
            let model = match kind {
                ExtractorKind::Vision => config.vision_model(),
                _ => config.model.as_deref(),
            };
            let provider = resolve_provider(config, model)?;
            Arc::new(ProviderChatService::new(
                provider,
                model.unwrap_or(DEFAULT_MODEL),
            ))
        }
    };

    let direct = DirectExtractor::new(Arc::clone(&chat), config.extraction.clone());

    let extractor: Arc<dyn DocumentDataExtractor> = match kind {
        ExtractorKind::Direct => Arc::new(direct),
        ExtractorKind::Markdown => {
            let converter = DocumentIntelligenceConverter::new(&config.layout).ok_or_else(|| {
                PipelineError::InvalidConfig("markdown extractor needs a layout endpoint".into())
            })?;
            Arc::new(MarkdownExtractor::new(Arc::new(converter), direct))
        }
        ExtractorKind::Vision => Arc::new(VisionExtractor::new(
            chat,
            Arc::new(PdfiumRenderer::new(&config.tiling)),
            config.extraction.clone(),
            config.tiling.clone(),
            config.download_timeout_secs,
        )),
    };

    info!("Extraction strategy: {}", extractor.name());
    Ok(extractor)
}
