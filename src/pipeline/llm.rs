//! Chat completion seam: request/response types and the provider adapter.
//!
//! Extractors build a [`ChatRequest`] and hand it to a
//! [`ChatCompletionService`]. The production implementation,
//! [`ProviderChatService`], forwards to an `edgequake_llm` provider; tests
//! substitute a scripted service. Nothing here retries: a failed call is
//! logged by the caller and surfaced as [`PipelineError::LlmApiError`].

use crate::config::ExtractionOptions;
use crate::error::PipelineError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

/// One message in a chat request. User messages may carry images.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub role: ChatRole,
    pub text: String,
    pub images: Vec<ImageData>,
}

impl ChatPrompt {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageData>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            images,
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParameters {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&ExtractionOptions> for SamplingParameters {
    fn from(options: &ExtractionOptions) -> Self {
        Self {
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        }
    }
}

/// An ordered list of messages plus sampling parameters.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatPrompt>,
    pub sampling: SamplingParameters,
}

/// One candidate answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChoice {
    pub text: String,
}

/// The service's answer: zero or more choices plus token usage.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ChatCompletion {
    /// Completion with a single choice.
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice { text: text.into() }],
            ..Default::default()
        }
    }
}

/// A chat completion backend.
#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError>;
}

/// [`ChatCompletionService`] backed by an `edgequake_llm` provider.
///
/// The model/deployment is fixed when the provider is created; `deployment`
/// is only carried for log lines.
#[derive(Clone)]
pub struct ProviderChatService {
    provider: Arc<dyn LLMProvider>,
    deployment: String,
}

impl ProviderChatService {
    pub fn new(provider: Arc<dyn LLMProvider>, deployment: impl Into<String>) -> Self {
        Self {
            provider,
            deployment: deployment.into(),
        }
    }
}

impl std::fmt::Debug for ProviderChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChatService")
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatCompletionService for ProviderChatService {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
        let start = Instant::now();
        let messages = to_provider_messages(request.messages);
        let options = build_options(&request.sampling);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| PipelineError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.deployment,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(ChatCompletion {
            choices: vec![ChatChoice {
                text: response.content,
            }],
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Map prompts onto provider messages, preserving order.
fn to_provider_messages(prompts: Vec<ChatPrompt>) -> Vec<ChatMessage> {
    prompts
        .into_iter()
        .map(|p| match p.role {
            ChatRole::System => ChatMessage::system(p.text),
            ChatRole::User if p.images.is_empty() => ChatMessage::user(p.text),
            ChatRole::User => ChatMessage::user_with_images(p.text, p.images),
        })
        .collect()
}

/// Build `CompletionOptions` from the sampling parameters.
fn build_options(sampling: &SamplingParameters) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(sampling.temperature),
        max_tokens: Some(sampling.max_tokens),
        top_p: Some(sampling.top_p),
        ..Default::default()
    }
}
