//! The invoice batch workflow and the service that hosts it.
//!
//! ```text
//! Received ─▶ Validated ─▶ FoldersDiscovered ─▶ Processing ─▶ Aggregated ─▶ Done
//!    │                                            │
//!    └──▶ Rejected (invalid input, no activity)   └─ per document:
//!                                                    [Converted] ─▶ Extracted ─▶ Stored ─▶ Validated
//! ```
//!
//! Documents fan out up to the configured concurrency and are joined before
//! aggregation. A failing document is recorded in its own child result and
//! never stops the others; the batch always returns a result tree.

use super::activities::{
    InvoiceActivities, EXTRACT_INVOICE_DATA, GET_INVOICE_FOLDERS, GET_INVOICE_MARKDOWN,
    VALIDATE_INVOICE_DATA, WRITE_BYTES_TO_BLOB,
};
use super::checkpoint::CheckpointStore;
use super::host::{InstanceSignals, OrchestrationContext};
use super::instances::{InstanceMetadata, InstanceRegistry, Page, PurgeResult};
use super::log::ReplaySafeLog;
use super::requests::{
    ExtractInvoiceDataRequest, GetInvoiceMarkdownRequest, InvoiceBatchRequest,
    ValidateInvoiceDataRequest, WorkflowRequest, WriteBytesToBlobRequest,
};
use super::result::WorkflowResult;
use crate::config::{PipelineConfig, WorkflowOptions};
use crate::error::{InstanceError, PipelineError};
use crate::extract::build_extractor;
use crate::pipeline::markdown::DocumentIntelligenceConverter;
use crate::progress::{DocumentStep, NoopProgressCallback, ProgressCallback};
use crate::storage::BlobStore;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};

/// Name of the batch workflow and of its result root.
pub const WORKFLOW_NAME: &str = "ProcessInvoiceBatchWorkflow";
/// Action under which per-document results are attached to the root.
pub const DOCUMENT_WORKFLOW_NAME: &str = "ExtractInvoiceDataWorkflow";
/// Journal scope of the batch-level activities.
const BATCH_SCOPE: &str = "batch";

/// Where a batch is in its lifecycle. Published as the instance's custom status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Received,
    Validated,
    FoldersDiscovered,
    Processing,
    Aggregated,
    Done,
    Rejected,
}

/// Status URL of an instance.
pub fn status_path(instance_id: &str) -> String {
    format!("/workflow/{instance_id}/status")
}

/// Orchestration logic of one batch. Holds no per-run state.
#[derive(Clone)]
pub struct InvoiceBatchWorkflow {
    activities: Arc<InvoiceActivities>,
    concurrency: usize,
    markdown_step: bool,
    progress: ProgressCallback,
}

impl InvoiceBatchWorkflow {
    pub fn new(activities: InvoiceActivities, options: &WorkflowOptions) -> Self {
        Self {
            activities: Arc::new(activities),
            concurrency: options.concurrency.max(1),
            markdown_step: options.markdown_step,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    fn publish(&self, ctx: &OrchestrationContext, state: BatchState, documents: usize, done: usize) {
        ctx.set_custom_status(json!({
            "state": state,
            "documents": documents,
            "processed": done,
        }));
    }

    /// Run a batch to the end and return its result tree.
    pub async fn run(&self, ctx: &OrchestrationContext, request: &InvoiceBatchRequest) -> WorkflowResult {
        let log = ctx.log().clone();
        let mut result = WorkflowResult::new(WORKFLOW_NAME);
        self.publish(ctx, BatchState::Received, 0, 0);

        let validation = request.validate();
        if !validation.is_valid {
            log.error(format_args!(
                "{}::Validate - input is invalid: {}",
                WORKFLOW_NAME, validation
            ));
            result.merge(&validation);
            self.publish(ctx, BatchState::Rejected, 0, 0);
            return result;
        }
        result.add_message("Validate", "input is valid.", &log);
        self.publish(ctx, BatchState::Validated, 0, 0);

        let container = request.container.clone().unwrap_or_default();
        let activities = &self.activities;

        let folders = match ctx
            .call_activity(GET_INVOICE_FOLDERS, || activities.get_invoice_folders(request))
            .await
        {
            Ok(folders) => folders,
            Err(e) => {
                result.add_error(
                    GET_INVOICE_FOLDERS,
                    &format!("Failed to retrieve invoice folders: {e}"),
                    &log,
                    Level::ERROR,
                );
                self.publish(ctx, BatchState::Done, 0, 0);
                return result;
            }
        };
        result.add_message(
            GET_INVOICE_FOLDERS,
            &format!("Retrieved {} invoice folders.", folders.len()),
            &log,
        );

        let mut documents = Vec::new();
        for folder in folders {
            let check = folder.validate();
            if !check.is_valid {
                result.add_error(
                    "InvoiceFolder.Validate",
                    &format!("folder '{}' is invalid: {}", folder.name, check),
                    &log,
                    Level::ERROR,
                );
                continue;
            }
            documents.extend(folder.invoice_file_names);
        }
        let total = documents.len();
        self.publish(ctx, BatchState::FoldersDiscovered, total, 0);

        self.progress.on_batch_start(total);
        self.publish(ctx, BatchState::Processing, total, 0);

        let container = container.as_str();
        let children: Vec<WorkflowResult> = stream::iter(documents.into_iter().enumerate().map(
            |(i, document)| self.process_document(ctx.scoped(&document), container, document, i + 1, total),
        ))
        .buffered(self.concurrency)
        .collect()
        .await;

        let valid = children.iter().filter(|c| c.is_valid).count();
        for child in children {
            result.add_child(DOCUMENT_WORKFLOW_NAME, "Processed invoice.", child, &log);
        }
        self.publish(ctx, BatchState::Aggregated, total, total);
        self.progress.on_batch_complete(total, valid);

        info!(
            "{}: {}/{} documents valid in '{}'",
            WORKFLOW_NAME, valid, total, container
        );
        self.publish(ctx, BatchState::Done, total, total);
        result
    }

    async fn process_document(
        &self,
        ctx: OrchestrationContext,
        container: &str,
        document: String,
        index: usize,
        total: usize,
    ) -> WorkflowResult {
        self.progress.on_document_start(index, total, &document);
        let mut result = WorkflowResult::new(document.as_str());
        self.run_document(&ctx, container, &document, &mut result).await;
        self.progress
            .on_document_complete(index, total, &document, result.is_valid);
        result
    }

    fn step(&self, log: &ReplaySafeLog, document: &str, step: DocumentStep) {
        if !log.is_replaying() {
            self.progress.on_document_step(document, step);
        }
    }

    async fn run_document(
        &self,
        ctx: &OrchestrationContext,
        container: &str,
        document: &str,
        result: &mut WorkflowResult,
    ) {
        let log = ctx.log();
        let activities = &self.activities;

        let mut markdown = None;
        if self.markdown_step {
            let request = GetInvoiceMarkdownRequest {
                container: Some(container.to_string()),
                file_name: Some(document.to_string()),
            };
            match ctx
                .call_activity(GET_INVOICE_MARKDOWN, || activities.get_invoice_markdown(&request))
                .await
            {
                Ok(Some(md)) => {
                    let blob = format!("{document}.Markdown.md");
                    if !self
                        .store(ctx, container, &blob, "Markdown", md.clone().into_bytes(), result)
                        .await
                    {
                        return;
                    }
                    self.step(log, document, DocumentStep::Converted);
                    markdown = Some(md);
                }
                Ok(None) => {
                    result.add_error(
                        GET_INVOICE_MARKDOWN,
                        &format!("Failed to convert {document} to markdown."),
                        log,
                        Level::WARN,
                    );
                    return;
                }
                Err(e) => {
                    result.add_error(
                        GET_INVOICE_MARKDOWN,
                        &format!("Failed to convert {document} to markdown: {e}"),
                        log,
                        Level::ERROR,
                    );
                    return;
                }
            }
        }

        let request = ExtractInvoiceDataRequest {
            container: Some(container.to_string()),
            file_name: Some(document.to_string()),
            markdown,
        };
        let data = match ctx
            .call_activity(EXTRACT_INVOICE_DATA, || activities.extract_invoice_data(&request))
            .await
        {
            Ok(Some(data)) => data,
            Ok(None) => {
                result.add_error(
                    EXTRACT_INVOICE_DATA,
                    &format!("Failed to extract data from {document}."),
                    log,
                    Level::WARN,
                );
                return;
            }
            Err(e) => {
                result.add_error(
                    EXTRACT_INVOICE_DATA,
                    &format!("Failed to extract data from {document}: {e}"),
                    log,
                    Level::ERROR,
                );
                return;
            }
        };
        self.step(log, document, DocumentStep::Extracted);

        let content = match serde_json::to_vec(&data) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.add_error(
                    EXTRACT_INVOICE_DATA,
                    &format!("Failed to serialise the data of {document}: {e}"),
                    log,
                    Level::ERROR,
                );
                return;
            }
        };
        if !self
            .store(ctx, container, &format!("{document}.Data.json"), "Data", content, result)
            .await
        {
            return;
        }
        self.step(log, document, DocumentStep::Stored);

        let request = ValidateInvoiceDataRequest {
            invoice_name: document.to_string(),
            data: Some(data),
        };
        let validation = match ctx
            .call_activity(VALIDATE_INVOICE_DATA, || async {
                Ok::<_, PipelineError>(activities.validate_invoice_data(&request))
            })
            .await
        {
            Ok(validation) => validation,
            Err(e) => {
                result.add_error(
                    VALIDATE_INVOICE_DATA,
                    &format!("Failed to validate {document}: {e}"),
                    log,
                    Level::ERROR,
                );
                return;
            }
        };
        result.merge_validation(&validation);
        self.step(log, document, DocumentStep::Validated);

        match serde_json::to_vec(&validation) {
            Ok(content) => {
                self.store(
                    ctx,
                    container,
                    &format!("{document}.Validation.json"),
                    "Validation",
                    content,
                    result,
                )
                .await;
            }
            Err(e) => result.add_error(
                VALIDATE_INVOICE_DATA,
                &format!("Failed to serialise the validation of {document}: {e}"),
                log,
                Level::ERROR,
            ),
        }
    }

    /// Write one artefact. Records the failure and returns `false` on error.
    async fn store(
        &self,
        ctx: &OrchestrationContext,
        container: &str,
        blob: &str,
        label: &str,
        content: Vec<u8>,
        result: &mut WorkflowResult,
    ) -> bool {
        let activity = format!("{WRITE_BYTES_TO_BLOB}.{label}");
        let request =
            WriteBytesToBlobRequest::new(self.activities.account(), container, blob, content);
        let activities = &self.activities;
        match ctx
            .call_activity(&activity, || activities.write_bytes_to_blob(&request))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                result.add_error(
                    WRITE_BYTES_TO_BLOB,
                    &format!("Failed to store {blob}."),
                    ctx.log(),
                    Level::ERROR,
                );
                false
            }
            Err(e) => {
                result.add_error(
                    WRITE_BYTES_TO_BLOB,
                    &format!("Failed to store {blob}: {e}"),
                    ctx.log(),
                    Level::ERROR,
                );
                false
            }
        }
    }
}

/// Returned by [`InvoiceBatchService::start_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedBatch {
    pub instance_id: String,
    pub status_path: String,
}

/// A batch that ran inline.
#[derive(Debug, Clone)]
pub struct CompletedBatch {
    pub instance_id: String,
    pub result: WorkflowResult,
}

#[derive(Clone)]
struct Runner {
    workflow: InvoiceBatchWorkflow,
    registry: Arc<InstanceRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    activity_timeout: Duration,
}

impl Runner {
    async fn execute(
        &self,
        instance_id: &str,
        request: InvoiceBatchRequest,
        signals: InstanceSignals,
        replaying: bool,
    ) -> WorkflowResult {
        self.registry.mark_running(instance_id);
        let ctx = OrchestrationContext::new(
            instance_id,
            BATCH_SCOPE,
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.registry),
            signals,
            self.activity_timeout,
            replaying,
        );
        let result = self.workflow.run(&ctx, &request).await;
        match serde_json::to_value(&result) {
            Ok(output) => self.registry.complete(instance_id, output),
            Err(e) => self.registry.fail(instance_id, e.to_string()),
        }
        result
    }

    fn spawn(&self, instance_id: String, request: InvoiceBatchRequest, signals: InstanceSignals) {
        let runner = self.clone();
        tokio::spawn(async move {
            let registry = Arc::clone(&runner.registry);
            let id = instance_id.clone();
            let task = tokio::spawn(async move {
                runner.execute(&instance_id, request, signals, false).await;
            });
            if let Err(e) = task.await {
                error!("Instance {} failed: {}", id, e);
                registry.fail(&id, format!("Workflow task failed: {e}"));
            }
        });
    }
}

fn record_input(request: &InvoiceBatchRequest) -> Result<serde_json::Value, InstanceError> {
    serde_json::to_value(request).map_err(|e| InstanceError::UnrecordableInput(e.to_string()))
}

/// Entry point for starting and managing invoice batches.
///
/// # Example
/// ```rust,no_run
/// use ai_document_pipeline::workflow::{InvoiceBatchRequest, InvoiceBatchService, MemoryCheckpointStore};
/// use ai_document_pipeline::{FsBlobStore, PipelineConfig};
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::from_env()?;
/// let store = Arc::new(FsBlobStore::new(&config.storage_root));
/// let service = InvoiceBatchService::from_config(&config, store, Arc::new(MemoryCheckpointStore::new()))?;
///
/// let batch = service.run_to_completion(InvoiceBatchRequest::new("invoices")).await?;
/// println!("{}", batch.result.render_tree());
/// # Ok(())
/// # }
/// ```
pub struct InvoiceBatchService {
    runner: Runner,
}

impl InvoiceBatchService {
    pub fn new(
        activities: InvoiceActivities,
        checkpoints: Arc<dyn CheckpointStore>,
        options: &WorkflowOptions,
    ) -> Self {
        Self {
            runner: Runner {
                workflow: InvoiceBatchWorkflow::new(activities, options),
                registry: Arc::new(InstanceRegistry::new(Arc::clone(&checkpoints))),
                checkpoints,
                activity_timeout: Duration::from_secs(options.activity_timeout_secs.max(1)),
            },
        }
    }

    /// Wire the configured extractor, layout service and storage.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn BlobStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, PipelineError> {
        let extractor = build_extractor(config, None)?;
        let mut activities = InvoiceActivities::new(store, extractor, config.storage_account.as_str())
            .with_read_uri_ttl(Duration::from_secs(config.workflow.read_uri_ttl_secs));
        if let Some(converter) = DocumentIntelligenceConverter::new(&config.layout) {
            activities = activities.with_converter(Arc::new(converter));
        }
        Ok(Self::new(activities, checkpoints, &config.workflow))
    }

    /// Receive per-document progress events.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.runner.workflow.progress = progress;
        self
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.runner.registry
    }

    fn create(&self, request: &InvoiceBatchRequest) -> Result<(String, InstanceSignals), InstanceError> {
        let input = record_input(request)?;
        Ok(self.runner.registry.create(WORKFLOW_NAME, input))
    }

    /// Start a batch in the background.
    pub fn start_batch(&self, request: InvoiceBatchRequest) -> Result<StartedBatch, InstanceError> {
        let (instance_id, signals) = self.create(&request)?;
        info!("Started workflow with instance ID: {}", instance_id);
        self.runner.spawn(instance_id.clone(), request, signals);
        Ok(StartedBatch {
            status_path: status_path(&instance_id),
            instance_id,
        })
    }

    /// Start a batch from a queue message body (`{"container": "..."}`).
    pub fn enqueue(&self, message: &[u8]) -> Result<String, PipelineError> {
        if message.iter().all(u8::is_ascii_whitespace) {
            return Err(PipelineError::InvalidInput {
                input: "empty batch message".into(),
            });
        }
        let request: InvoiceBatchRequest = serde_json::from_slice(message)?;
        Ok(self.start_batch(request)?.instance_id)
    }

    /// Run a batch on the current task and wait for its result.
    pub async fn run_to_completion(
        &self,
        request: InvoiceBatchRequest,
    ) -> Result<CompletedBatch, InstanceError> {
        let (instance_id, signals) = self.create(&request)?;
        let result = self.runner.execute(&instance_id, request, signals, false).await;
        Ok(CompletedBatch {
            instance_id,
            result,
        })
    }

    /// Run `request` under a known instance id, e.g. one whose run was cut
    /// short in an earlier process sharing this checkpoint store. Activities
    /// journaled under that id return their recorded output; only the rest
    /// execute.
    pub async fn rerun(
        &self,
        instance_id: &str,
        request: InvoiceBatchRequest,
    ) -> Result<CompletedBatch, InstanceError> {
        let input = record_input(&request)?;
        let signals = self.runner.registry.adopt(instance_id, WORKFLOW_NAME, input)?;
        info!("Rerunning workflow instance {}", instance_id);
        let result = self.runner.execute(instance_id, request, signals, true).await;
        Ok(CompletedBatch {
            instance_id: instance_id.to_string(),
            result,
        })
    }

    /// Wait until a started instance has finished running.
    pub async fn wait_for_completion(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        let mut finished = self
            .runner
            .registry
            .subscribe(instance_id)
            .ok_or_else(|| InstanceError::NotFound(instance_id.to_string()))?;
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                break;
            }
        }
        self.runner
            .registry
            .get(instance_id)
            .ok_or_else(|| InstanceError::NotFound(instance_id.to_string()))
    }

    /// Re-run a finished instance. Activities that completed before return
    /// their journaled output; only the rest execute.
    pub async fn replay(&self, instance_id: &str) -> Result<WorkflowResult, InstanceError> {
        let (input, signals) = self.runner.registry.reopen(instance_id)?;
        let request: InvoiceBatchRequest = match serde_json::from_value(input) {
            Ok(request) => request,
            Err(e) => {
                let message = e.to_string();
                self.runner
                    .registry
                    .fail(instance_id, format!("Unreadable input: {message}"));
                return Err(InstanceError::CorruptInput {
                    instance_id: instance_id.to_string(),
                    message,
                });
            }
        };
        Ok(self.runner.execute(instance_id, request, signals, true).await)
    }

    pub fn get(&self, instance_id: &str) -> Option<InstanceMetadata> {
        self.runner.registry.get(instance_id)
    }

    pub fn list(
        &self,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<InstanceMetadata>, InstanceError> {
        self.runner.registry.list(continuation_token, page_size)
    }

    pub fn pause(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.runner.registry.pause(instance_id)
    }

    pub fn resume(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.runner.registry.resume(instance_id)
    }

    pub fn terminate(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.runner.registry.terminate(instance_id)
    }

    pub async fn purge(&self, instance_id: &str) -> Result<PurgeResult, InstanceError> {
        self.runner.registry.purge(instance_id).await
    }

    pub async fn purge_all(&self) -> Result<PurgeResult, InstanceError> {
        self.runner.registry.purge_all().await
    }
}

impl std::fmt::Debug for InvoiceBatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceBatchService")
            .field("activities", &self.runner.workflow.activities)
            .field("concurrency", &self.runner.workflow.concurrency)
            .field("markdown_step", &self.runner.workflow.markdown_step)
            .field("activity_timeout", &self.runner.activity_timeout)
            .finish()
    }
}
