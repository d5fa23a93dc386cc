//! Durable, replay-safe batch orchestration.
//!
//! ```text
//! InvoiceBatchService ──▶ InstanceRegistry (status surface)
//!        │
//!        ▼
//! InvoiceBatchWorkflow ──▶ OrchestrationContext::call_activity ──▶ CheckpointStore
//!                                        │
//!                                        ▼
//!                                InvoiceActivities ──▶ BlobStore / extractor / converter
//! ```

pub mod activities;
pub mod batch;
pub mod checkpoint;
pub mod host;
pub mod instances;
pub mod log;
pub mod requests;
pub mod result;

pub use activities::{is_artefact, InvoiceActivities};
pub use batch::{
    status_path, BatchState, CompletedBatch, InvoiceBatchService, InvoiceBatchWorkflow,
    StartedBatch,
};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use host::OrchestrationContext;
pub use instances::{InstanceMetadata, InstanceRegistry, Page, PurgeResult, RuntimeStatus};
pub use log::ReplaySafeLog;
pub use requests::{
    ExtractInvoiceDataRequest, GetInvoiceMarkdownRequest, InvoiceBatchRequest, InvoiceFolder,
    ValidateInvoiceDataRequest, WorkflowRequest, WriteBytesToBlobRequest,
};
pub use result::{ValidationResult, WorkflowResult};
