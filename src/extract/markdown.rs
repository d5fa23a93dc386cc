//! Markdown-mediated strategy: layout service first, then the direct path.

use super::direct::DirectExtractor;
use super::{DocumentDataExtractor, DocumentSource, ExtractionSchema};
use crate::error::PipelineError;
use crate::pipeline::markdown::MarkdownConverter;
use crate::prompts::DEFAULT_PAGES_PROMPT;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

const NAME: &str = "markdown";

/// Converts the document to Markdown, then asks the chat model.
///
/// A [`DocumentSource::Text`] is taken to be Markdown already, which is how
/// the batch workflow hands over the output of its own conversion step.
#[derive(Clone)]
pub struct MarkdownExtractor {
    converter: Arc<dyn MarkdownConverter>,
    direct: DirectExtractor,
}

impl MarkdownExtractor {
    pub fn new(converter: Arc<dyn MarkdownConverter>, direct: DirectExtractor) -> Self {
        Self { converter, direct }
    }
}

#[async_trait]
impl DocumentDataExtractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts(&self, _source: &DocumentSource) -> bool {
        true
    }

    async fn extract(
        &self,
        source: DocumentSource,
        schema: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        let markdown = match source {
            DocumentSource::Text(text) => text,
            DocumentSource::Bytes(bytes) => match self.converter.from_bytes(&bytes).await {
                Some(md) => String::from_utf8_lossy(&md).into_owned(),
                None => {
                    warn!("No Markdown content was returned from the document.");
                    return Ok(None);
                }
            },
            DocumentSource::Uri(uri) => match self.converter.from_uri(&uri).await {
                Some(md) => String::from_utf8_lossy(&md).into_owned(),
                None => {
                    warn!("No Markdown content was returned from {}.", uri);
                    return Ok(None);
                }
            },
        };

        let instruction = schema.instruction().unwrap_or(DEFAULT_PAGES_PROMPT);
        self.direct.extract_text(&markdown, instruction, schema).await
    }
}
