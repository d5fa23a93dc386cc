//! Vision-tiled strategy: pages as images in a single request.
//!
//! ```text
//! bytes ──▶ render (N pages) ──▶ tile (≤ K composites) ──▶ JPEG ──▶ one chat request
//! ```
//!
//! One request per document keeps the whole invoice in the model's view so
//! totals on the last page can be checked against line items on the first.

use super::response::interpret_completion;
use super::{DocumentDataExtractor, DocumentSource, ExtractionSchema};
use crate::config::{ExtractionOptions, TilingOptions};
use crate::error::PipelineError;
use crate::pipeline::encode::encode_tile;
use crate::pipeline::input::fetch_bytes;
use crate::pipeline::llm::{ChatCompletionService, ChatPrompt, ChatRequest, SamplingParameters};
use crate::pipeline::render::PageRenderer;
use crate::pipeline::tiling::tile_pages;
use crate::prompts::{render_instruction, DEFAULT_PAGES_PROMPT, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const NAME: &str = "vision";

#[derive(Clone)]
pub struct VisionExtractor {
    chat: Arc<dyn ChatCompletionService>,
    renderer: Arc<dyn PageRenderer>,
    options: ExtractionOptions,
    tiling: TilingOptions,
    download_timeout_secs: u64,
}

impl VisionExtractor {
    pub fn new(
        chat: Arc<dyn ChatCompletionService>,
        renderer: Arc<dyn PageRenderer>,
        options: ExtractionOptions,
        tiling: TilingOptions,
        download_timeout_secs: u64,
    ) -> Self {
        Self {
            chat,
            renderer,
            options,
            tiling,
            download_timeout_secs,
        }
    }
}

#[async_trait]
impl DocumentDataExtractor for VisionExtractor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        !matches!(source, DocumentSource::Text(_))
    }

    async fn extract(
        &self,
        source: DocumentSource,
        schema: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        let bytes = match source {
            DocumentSource::Bytes(bytes) => bytes,
            DocumentSource::Uri(uri) => fetch_bytes(&uri, self.download_timeout_secs).await?,
            DocumentSource::Text(_) => {
                return Err(PipelineError::UnsupportedSource {
                    extractor: NAME,
                    kind: "text",
                })
            }
        };

        let pages = self.renderer.render(bytes).await?;
        let page_count = pages.len();
        let tiles = tile_pages(pages, self.tiling.max_tiles);
        if tiles.is_empty() {
            warn!("No pages could be rendered from the document.");
            return Ok(None);
        }

        let images = tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| encode_tile(tile, self.tiling.jpeg_quality, i))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("{} pages → {} tiles", page_count, images.len());

        let system = self
            .options
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let instruction = render_instruction(
            schema.instruction().unwrap_or(DEFAULT_PAGES_PROMPT),
            schema.as_json(),
        );

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatPrompt::system(system));
        }
        messages.push(ChatPrompt::user_with_images(instruction, images));

        let request = ChatRequest {
            messages,
            sampling: SamplingParameters::from(&self.options),
        };
        interpret_completion(NAME, self.chat.complete(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::ChatCompletion;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;
    use std::sync::Mutex;

    /// Yields `n` synthetic pages regardless of input.
    struct SyntheticPages(usize);

    #[async_trait]
    impl PageRenderer for SyntheticPages {
        async fn render(&self, _bytes: Vec<u8>) -> Result<Vec<DynamicImage>, PipelineError> {
            Ok((0..self.0)
                .map(|_| DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))))
                .collect())
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<ChatRequest>>);

    #[async_trait]
    impl ChatCompletionService for Recording {
        async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
            self.0.lock().unwrap().push(request);
            Ok(ChatCompletion::single(r#"{"TotalPrice": 12.5}"#))
        }
    }

    fn extractor(pages: usize, chat: Arc<Recording>) -> VisionExtractor {
        VisionExtractor::new(
            chat,
            Arc::new(SyntheticPages(pages)),
            ExtractionOptions::default(),
            TilingOptions::default(),
            5,
        )
    }

    #[tokio::test]
    async fn long_document_fits_one_request() {
        let chat = Arc::new(Recording::default());
        let schema = ExtractionSchema::from_value(json!({"TotalPrice": null})).unwrap();
        let got = extractor(25, chat.clone())
            .extract(DocumentSource::Bytes(vec![1]), &schema)
            .await
            .unwrap();
        assert_eq!(got, Some(json!({"TotalPrice": 12.5})));

        let seen = chat.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let msgs = &seen[0].messages;
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].images.len(), 9);
        assert!(msgs[1].images.iter().all(|i| i.mime_type == "image/jpeg"));
        assert!(msgs[1].text.ends_with(r#"{"TotalPrice":null}"#));
    }

    #[tokio::test]
    async fn no_pages_skips_the_model() {
        let chat = Arc::new(Recording::default());
        let schema = ExtractionSchema::from_value(json!({})).unwrap();
        let got = extractor(0, chat.clone())
            .extract(DocumentSource::Bytes(vec![1]), &schema)
            .await
            .unwrap();
        assert!(got.is_none());
        assert!(chat.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_is_rejected() {
        let ex = extractor(1, Arc::new(Recording::default()));
        assert!(!ex.accepts(&DocumentSource::Text("x".into())));
        let schema = ExtractionSchema::from_value(json!({})).unwrap();
        let err = ex
            .extract(DocumentSource::Text("x".into()), &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedSource { kind: "text", .. }));
    }
}
