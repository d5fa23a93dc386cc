//! # ai-document-pipeline
//!
//! Extract structured invoice data from scanned documents with an LLM,
//! validate it, and store it next to the source document.
//!
//! ## Why this crate?
//!
//! Invoices arrive as PDFs and photos in every layout imaginable. Template
//! or OCR-rule based extraction breaks on the first unfamiliar supplier.
//! Here a model reads the document and fills a JSON template, and a
//! deterministic rule set decides whether the answer can be trusted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! container
//!  │
//!  ├─ 1. Discover  group blobs by top-level folder, skip earlier outputs
//!  ├─ 2. Convert   (optional) layout service → Markdown
//!  ├─ 3. Extract   direct text │ markdown-mediated │ vision tiles (≤ 10 images)
//!  ├─ 4. Store     {document}.Data.json
//!  ├─ 5. Validate  signatures, customer, quantity and price totals
//!  ├─ 6. Store     {document}.Validation.json
//!  └─ 7. Aggregate one result tree per batch, one child per document
//! ```
//!
//! Every step runs as a journaled activity, so replaying a batch only
//! repeats the work that never completed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_document_pipeline::workflow::{InvoiceBatchRequest, InvoiceBatchService, MemoryCheckpointStore};
//! use ai_document_pipeline::{FsBlobStore, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // INVOICES_STORAGE_ACCOUNT_NAME, DOCPIPE_EXTRACTOR, OPENAI_API_KEY, ...
//!     let config = PipelineConfig::from_env()?;
//!     let store = Arc::new(FsBlobStore::new(&config.storage_root));
//!     let service = InvoiceBatchService::from_config(&config, store, Arc::new(MemoryCheckpointStore::new()))?;
//!
//!     let batch = service.run_to_completion(InvoiceBatchRequest::new("invoices")).await?;
//!     print!("{}", batch.result.render_tree());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpipe` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod invoice;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod storage;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionOptions, ExtractorKind, LayoutServiceOptions, PipelineConfig, PipelineConfigBuilder,
    TilingOptions, WorkflowOptions,
};
pub use error::{InstanceError, PipelineError};
pub use extract::{
    build_extractor, build_extractor_as, extract_as, DocumentDataExtractor, DocumentSource, ExtractionSchema,
};
pub use invoice::{validate_invoice, InvoiceData, InvoiceValidation, ValidationStatus};
pub use progress::{BatchProgressCallback, DocumentStep, NoopProgressCallback, ProgressCallback};
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use workflow::{InvoiceBatchRequest, InvoiceBatchService, WorkflowResult};
