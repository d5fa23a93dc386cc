//! Direct-content strategy: document text straight to the chat model.

use super::response::interpret_completion;
use super::{DocumentDataExtractor, DocumentSource, ExtractionSchema};
use crate::config::ExtractionOptions;
use crate::error::PipelineError;
use crate::pipeline::llm::{ChatCompletionService, ChatPrompt, ChatRequest, SamplingParameters};
use crate::prompts::{render_instruction, DEFAULT_SYSTEM_PROMPT, DIRECT_EXTRACTION_PROMPT};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NAME: &str = "direct";

/// Sends the document text to the chat model with the extraction prompt.
///
/// Message layout:
/// 1. system prompt
/// 2. user: extraction instruction with the serialised schema
/// 3. user: the document text
///
/// Empty messages are omitted.
#[derive(Clone)]
pub struct DirectExtractor {
    chat: Arc<dyn ChatCompletionService>,
    options: ExtractionOptions,
}

impl DirectExtractor {
    pub fn new(chat: Arc<dyn ChatCompletionService>, options: ExtractionOptions) -> Self {
        Self { chat, options }
    }

    /// Run one request with an explicit instruction template.
    pub(crate) async fn extract_text(
        &self,
        text: &str,
        instruction: &str,
        schema: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        let request = self.build_request(text, &render_instruction(instruction, schema.as_json()));
        interpret_completion(NAME, self.chat.complete(request).await)
    }

    fn build_request(&self, text: &str, instruction: &str) -> ChatRequest {
        let system = self
            .options
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut messages = Vec::with_capacity(3);
        if !system.is_empty() {
            messages.push(ChatPrompt::system(system));
        }
        if !instruction.is_empty() {
            messages.push(ChatPrompt::user(instruction));
        }
        if !text.is_empty() {
            messages.push(ChatPrompt::user(text));
        }

        ChatRequest {
            messages,
            sampling: SamplingParameters::from(&self.options),
        }
    }
}

#[async_trait]
impl DocumentDataExtractor for DirectExtractor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        match source {
            DocumentSource::Text(_) => true,
            DocumentSource::Bytes(b) => std::str::from_utf8(b).is_ok(),
            DocumentSource::Uri(_) => false,
        }
    }

    async fn extract(
        &self,
        source: DocumentSource,
        schema: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        let text = match source {
            DocumentSource::Text(text) => text,
            DocumentSource::Bytes(bytes) => {
                String::from_utf8(bytes).map_err(|_| PipelineError::UnsupportedSource {
                    extractor: NAME,
                    kind: "binary",
                })?
            }
            DocumentSource::Uri(_) => {
                return Err(PipelineError::UnsupportedSource {
                    extractor: NAME,
                    kind: "uri",
                })
            }
        };

        self.extract_text(&text, DIRECT_EXTRACTION_PROMPT, schema).await
    }
}
