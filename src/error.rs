//! Error types for the document pipeline.
//!
//! Two error types reflect two distinct failure surfaces:
//!
//! * [`PipelineError`] — a single pipeline call failed (bad configuration,
//!   unreachable service, malformed model output, storage fault). Inside a
//!   batch these are caught at the per-document boundary and recorded in the
//!   [`crate::workflow::WorkflowResult`] tree, so one bad document never
//!   aborts the batch.
//!
//! * [`InstanceError`] — a status-surface operation (pause, resume,
//!   terminate, purge, replay, rerun) was rejected by the instance registry,
//!   or an instance input could not be recorded or read back.
//!
//! "No data" is deliberately *not* an error: converters and extractors
//! return `Ok(None)` / `None` for expected absence.

use std::path::PathBuf;
use thiserror::Error;

use crate::workflow::RuntimeStatus;

/// All errors returned by pipeline components.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The URI is neither a readable `file://` URI nor an HTTP/HTTPS URL.
    #[error("Invalid document source '{input}': not a file path, file:// URI or HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The chosen extraction strategy cannot consume this kind of source.
    #[error("Extractor '{extractor}' does not accept {kind} sources")]
    UnsupportedSource {
        extractor: &'static str,
        kind: &'static str,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document is not a readable PDF or image: {detail}")]
    CorruptDocument { detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// A composite tile could not be encoded.
    #[error("Failed to encode tile {tile}: {detail}")]
    EncodeFailed { tile: usize, detail: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The chat completion service call itself failed.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The layout-analysis service call failed.
    #[error("Layout service error: {message}")]
    LayoutServiceError { message: String },

    /// The model answered, but the answer is not the expected JSON shape.
    #[error("Model output is not valid JSON for the requested schema: {source}")]
    MalformedOutput {
        #[source]
        source: serde_json::Error,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The blob does not exist.
    #[error("Blob '{blob}' not found in container '{container}'")]
    BlobNotFound { container: String, blob: String },

    /// A blob already exists and overwrite was not requested.
    #[error("Blob '{blob}' already exists in container '{container}'")]
    BlobExists { container: String, blob: String },

    /// Underlying storage I/O failed.
    #[error("Storage error for '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialised for storage or checkpointing.
    #[error("Serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Workflow host errors ──────────────────────────────────────────────
    /// The instance was terminated while the activity was outstanding.
    #[error("Activity '{activity}' cancelled")]
    Cancelled { activity: String },

    /// The activity exceeded the host's per-activity timeout.
    #[error("Activity '{activity}' timed out after {secs}s")]
    ActivityTimeout { activity: String, secs: u64 },

    /// The instance registry refused the request.
    #[error(transparent)]
    Instance(#[from] InstanceError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` when the model produced output that could not be parsed.
    pub fn is_malformed_output(&self) -> bool {
        matches!(self, PipelineError::MalformedOutput { .. })
    }
}

/// Errors from the workflow status surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Instance {0} not found")]
    NotFound(String),

    /// The requested transition is not allowed from the current state.
    #[error("Instance {instance_id} is not in a valid state to {action}. Current state: {current:?}")]
    InvalidState {
        instance_id: String,
        action: &'static str,
        current: RuntimeStatus,
    },

    #[error("Invalid continuation token '{0}'")]
    InvalidContinuationToken(String),

    /// The journal of a purged instance could not be removed.
    #[error("Failed to purge instance {instance_id}: {message}")]
    PurgeFailed { instance_id: String, message: String },

    /// Instance ids name journal files, so only `[A-Za-z0-9_-]` is allowed.
    #[error("Invalid instance id '{0}'")]
    InvalidInstanceId(String),

    /// A workflow request could not be recorded as instance input.
    #[error("Workflow input cannot be recorded: {0}")]
    UnrecordableInput(String),

    /// The recorded input of an instance no longer reads as its request.
    #[error("Instance {instance_id} has an unreadable input: {message}")]
    CorruptInput { instance_id: String, message: String },
}
