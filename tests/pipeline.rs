//! Offline integration tests for the invoice pipeline.
//!
//! The chat service and the extractor are replaced by in-process fakes, so
//! these run without network access, credentials or a pdfium library.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use ai_document_pipeline::extract::{DirectExtractor, ExtractionSchema};
use ai_document_pipeline::pipeline::llm::{ChatCompletion, ChatCompletionService, ChatRequest};
use ai_document_pipeline::pipeline::tiling::tile_pages;
use ai_document_pipeline::workflow::{
    CheckpointStore, FileCheckpointStore, InvoiceActivities, InvoiceBatchRequest, InvoiceBatchService,
    MemoryCheckpointStore, RuntimeStatus,
};
use ai_document_pipeline::{
    build_extractor, build_extractor_as, extract_as, validate_invoice, BlobStore,
    DocumentDataExtractor, DocumentSource, ExtractionOptions, ExtractorKind, InvoiceData,
    MemoryBlobStore, PipelineConfig, PipelineError, ValidationStatus, WorkflowOptions,
};
use ai_document_pipeline::storage::{BlobGroup, BlobPermissions};
use ai_document_pipeline::WorkflowResult;
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ── Test helpers ─────────────────────────────────────────────────────────────

const ACCOUNT: &str = "acct";
const CONTAINER: &str = "invoices";

fn valid_invoice() -> Value {
    json!({
        "CustomerName": "Contoso",
        "InvoiceDate": "2024-03-01T00:00:00Z",
        "Products": [
            { "Id": "A-1", "UnitPrice": 2.5, "Quantity": 2, "Total": 5.0 },
            { "Id": "B-7", "UnitPrice": 1.0, "Quantity": 3, "Total": 3.0 }
        ],
        "TotalQuantity": 5,
        "TotalPrice": 8.0,
        "Signatures": [
            { "Type": "Distributor", "Name": "D. Ray", "SignedOn": "2024-03-01T00:00:00Z" },
            { "Type": "Customer", "Name": "C. Lee", "SignedOn": "2024-03-02T00:00:00Z" }
        ]
    })
}

/// Answers by document content: `"empty"` extracts nothing, `"garbled"` is
/// unparseable model output, `"offline"` is a provider fault, anything else
/// yields [`valid_invoice`]. Counts every call.
#[derive(Default)]
struct ContentExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentDataExtractor for ContentExtractor {
    fn name(&self) -> &'static str {
        "content"
    }

    fn accepts(&self, source: &DocumentSource) -> bool {
        matches!(source, DocumentSource::Bytes(_))
    }

    async fn extract(
        &self,
        source: DocumentSource,
        _: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match source {
            DocumentSource::Bytes(b) if b == b"empty" => Ok(None),
            DocumentSource::Bytes(b) if b == b"garbled" => Err(PipelineError::MalformedOutput {
                source: serde_json::from_str::<Value>("{\"CustomerName\":").unwrap_err(),
            }),
            DocumentSource::Bytes(b) if b == b"offline" => Err(PipelineError::LlmApiError {
                message: "503 Service Unavailable".into(),
            }),
            _ => Ok(Some(valid_invoice())),
        }
    }
}

/// Never finishes an extraction; wakes `started` on each call.
#[derive(Default)]
struct StallingExtractor {
    started: Notify,
}

#[async_trait]
impl DocumentDataExtractor for StallingExtractor {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn accepts(&self, _: &DocumentSource) -> bool {
        true
    }

    async fn extract(
        &self,
        _: DocumentSource,
        _: &ExtractionSchema,
    ) -> Result<Option<Value>, PipelineError> {
        self.started.notify_one();
        std::future::pending().await
    }
}

/// Memory store that refuses to write JSON artefacts under one folder.
struct ReadOnlyFolder {
    inner: MemoryBlobStore,
    folder: &'static str,
}

#[async_trait]
impl BlobStore for ReadOnlyFolder {
    async fn write(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), PipelineError> {
        if blob.starts_with(self.folder) && blob.ends_with(".json") {
            return Err(PipelineError::Storage {
                path: PathBuf::from(blob),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only folder"),
            });
        }
        self.inner.write(account, container, blob, bytes, overwrite).await
    }

    async fn read_all(
        &self,
        account: &str,
        container: &str,
        blob: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        self.inner.read_all(account, container, blob).await
    }

    async fn list_grouped_by_top_folder(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<BlobGroup>, PipelineError> {
        self.inner.list_grouped_by_top_folder(account, container).await
    }

    async fn generate_timed_read_uri(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        permissions: BlobPermissions,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        self.inner
            .generate_timed_read_uri(account, container, blob, permissions, ttl)
            .await
    }
}

/// Chat service that answers with a fixed text and records the requests.
struct ScriptedChat {
    answer: String,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    fn new(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.into(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatCompletionService for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
        self.requests.lock().unwrap().push(request);
        Ok(ChatCompletion::single(self.answer.clone()))
    }
}

async fn seed(store: &MemoryBlobStore, blobs: &[(&str, &str)]) {
    for (name, content) in blobs {
        store
            .write(ACCOUNT, CONTAINER, name, content.as_bytes().to_vec(), true)
            .await
            .unwrap();
    }
}

fn service(
    store: Arc<MemoryBlobStore>,
    extractor: Arc<ContentExtractor>,
    checkpoints: Arc<MemoryCheckpointStore>,
) -> InvoiceBatchService {
    let options = WorkflowOptions {
        concurrency: 2,
        ..WorkflowOptions::default()
    };
    InvoiceBatchService::new(
        InvoiceActivities::new(store, extractor, ACCOUNT),
        checkpoints,
        &options,
    )
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_bad_document_does_not_stop_the_batch() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(
        &store,
        &[
            ("march/one.pdf", "one"),
            ("march/two.pdf", "empty"),
            ("march/three.pdf", "three"),
        ],
    )
    .await;
    let extractor = Arc::new(ContentExtractor::default());
    let svc = service(store.clone(), extractor.clone(), Arc::new(MemoryCheckpointStore::new()));

    let batch = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();

    assert!(!batch.result.is_valid);
    assert_eq!(batch.result.children.len(), 3);
    let failed: Vec<_> = batch
        .result
        .failed_children()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(failed, ["march/two.pdf"]);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);

    let names = store.names(ACCOUNT, CONTAINER);
    for stored in [
        "march/one.pdf.Data.json",
        "march/one.pdf.Validation.json",
        "march/three.pdf.Data.json",
        "march/three.pdf.Validation.json",
    ] {
        assert!(names.iter().any(|n| n == stored), "missing {stored}");
    }
    assert!(!names.iter().any(|n| n.starts_with("march/two.pdf.")));

    let meta = svc.get(&batch.instance_id).unwrap();
    assert_eq!(meta.runtime_status, RuntimeStatus::Completed);
    assert_eq!(meta.output.unwrap()["IsValid"], false);
}

#[tokio::test]
async fn extractor_faults_stay_with_their_document() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(
        &store,
        &[
            ("jan/a.pdf", "a"),
            ("jan/b.pdf", "garbled"),
            ("jan/c.pdf", "offline"),
            ("jan/d.pdf", "d"),
        ],
    )
    .await;
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let svc = service(store.clone(), Arc::new(ContentExtractor::default()), checkpoints.clone());

    let batch = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();

    let failed: Vec<_> = batch.result.failed_children().collect();
    assert_eq!(failed.len(), 2, "{}", batch.result.render_tree());
    assert_eq!(failed[0].name, "jan/b.pdf");
    assert!(failed[0].messages.iter().any(|m| m.contains("not valid JSON")));
    assert_eq!(failed[1].name, "jan/c.pdf");
    assert!(failed[1]
        .messages
        .iter()
        .any(|m| m.contains("Failed to extract data from jan/c.pdf: LLM API error: 503")));

    let names = store.names(ACCOUNT, CONTAINER);
    for doc in ["jan/a.pdf", "jan/d.pdf"] {
        assert!(names.contains(&format!("{doc}.Data.json")), "missing data of {doc}");
        assert!(names.contains(&format!("{doc}.Validation.json")), "missing validation of {doc}");
    }
    assert!(!names.iter().any(|n| n.starts_with("jan/b.pdf.") || n.starts_with("jan/c.pdf.")));

    // Faults are not journaled, so a replay asks the extractor again.
    let keys = checkpoints.keys();
    let id = &batch.instance_id;
    assert!(keys.contains(&format!("{id}/jan/a.pdf/ExtractInvoiceData")));
    assert!(!keys.contains(&format!("{id}/jan/b.pdf/ExtractInvoiceData")));
    assert!(!keys.contains(&format!("{id}/jan/c.pdf/ExtractInvoiceData")));
}

#[tokio::test]
async fn failed_write_marks_only_its_document() {
    let store = ReadOnlyFolder {
        inner: MemoryBlobStore::new(),
        folder: "locked/",
    };
    seed(&store.inner, &[("dec/a.pdf", "a"), ("locked/b.pdf", "b")]).await;
    let store = Arc::new(store);
    let extractor = Arc::new(ContentExtractor::default());
    let svc = InvoiceBatchService::new(
        InvoiceActivities::new(store.clone(), extractor.clone(), ACCOUNT),
        Arc::new(MemoryCheckpointStore::new()),
        &WorkflowOptions::default(),
    );

    let batch = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();

    assert!(!batch.result.is_valid);
    assert_eq!(batch.result.children.len(), 2);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    let failed: Vec<_> = batch.result.failed_children().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "locked/b.pdf");
    assert!(
        failed[0].messages.iter().any(|m| m
            .contains("Failed to store locked/b.pdf.Data.json")
            && m.contains("read-only folder")),
        "{}",
        batch.result.render_tree()
    );

    let names = store.inner.names(ACCOUNT, CONTAINER);
    assert!(names.iter().any(|n| n == "dec/a.pdf.Validation.json"));
    assert!(!names.iter().any(|n| n.starts_with("locked/b.pdf.")));
}

#[tokio::test]
async fn terminate_cancels_outstanding_documents() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(
        &store,
        &[("nov/a.pdf", "a"), ("nov/b.pdf", "b"), ("nov/c.pdf", "c")],
    )
    .await;
    let extractor = Arc::new(StallingExtractor::default());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let options = WorkflowOptions {
        concurrency: 2,
        ..WorkflowOptions::default()
    };
    let svc = InvoiceBatchService::new(
        InvoiceActivities::new(store.clone(), extractor.clone(), ACCOUNT),
        checkpoints.clone(),
        &options,
    );

    let started = svc.start_batch(InvoiceBatchRequest::new(CONTAINER)).unwrap();
    extractor.started.notified().await;
    svc.terminate(&started.instance_id).unwrap();

    let meta = svc.wait_for_completion(&started.instance_id).await.unwrap();
    assert_eq!(meta.runtime_status, RuntimeStatus::Terminated);
    let output: WorkflowResult = serde_json::from_value(meta.output.unwrap()).unwrap();
    assert!(!output.is_valid);
    assert_eq!(output.children.len(), 3);
    for child in &output.children {
        assert!(!child.is_valid);
        assert!(
            child.messages.iter().any(|m| m.contains("'ExtractInvoiceData' cancelled")),
            "{}",
            output.render_tree()
        );
    }

    assert!(!store.names(ACCOUNT, CONTAINER).iter().any(|n| n.ends_with(".Data.json")));
    assert!(!checkpoints.keys().iter().any(|k| k.ends_with("/ExtractInvoiceData")));
    assert_eq!(
        svc.get(&started.instance_id).unwrap().runtime_status,
        RuntimeStatus::Terminated
    );
}

#[tokio::test]
async fn stored_record_round_trips_through_validation() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("april/a.pdf", "a")]).await;
    let svc = service(
        store.clone(),
        Arc::new(ContentExtractor::default()),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let batch = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();
    assert!(batch.result.is_valid, "{}", batch.result.render_tree());

    let data = store
        .read_all(ACCOUNT, CONTAINER, "april/a.pdf.Data.json")
        .await
        .unwrap();
    let record: InvoiceData = serde_json::from_slice(&data).unwrap();
    assert_eq!(record.customer_name.as_deref(), Some("Contoso"));
    assert!(validate_invoice("april/a.pdf", Some(&record)).is_valid);

    let stored: Value = serde_json::from_slice(
        &store
            .read_all(ACCOUNT, CONTAINER, "april/a.pdf.Validation.json")
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(stored["IsValid"], true);
}

#[tokio::test]
async fn second_run_skips_earlier_outputs() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("may/a.pdf", "a")]).await;
    let extractor = Arc::new(ContentExtractor::default());
    let svc = service(store.clone(), extractor.clone(), Arc::new(MemoryCheckpointStore::new()));

    svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();
    let again = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();

    assert_eq!(again.result.children.len(), 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn replay_executes_nothing_twice() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(
        &store,
        &[("june/a.pdf", "a"), ("june/b.pdf", "empty"), ("c.pdf", "c")],
    )
    .await;
    let extractor = Arc::new(ContentExtractor::default());
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let svc = service(store.clone(), extractor.clone(), checkpoints.clone());

    let first = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();
    let journaled = checkpoints.len();
    let blobs = store.len();

    let replayed = svc.replay(&first.instance_id).await.unwrap();

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
    assert_eq!(checkpoints.len(), journaled);
    assert_eq!(store.len(), blobs);
    assert_eq!(replayed.is_valid, first.result.is_valid);
    assert_eq!(replayed.status, first.result.status);
    let names = |r: &WorkflowResult| {
        r.children.iter().map(|c| c.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&replayed), names(&first.result));
}

#[tokio::test]
async fn file_journal_is_readable_and_purged() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("july/a.pdf", "a")]).await;
    let extractor = Arc::new(ContentExtractor::default());

    let make = || {
        InvoiceBatchService::new(
            InvoiceActivities::new(store.clone(), extractor.clone(), ACCOUNT),
            Arc::new(FileCheckpointStore::new(dir.path())),
            &WorkflowOptions::default(),
        )
    };

    let svc = make();
    let first = svc.run_to_completion(InvoiceBatchRequest::new(CONTAINER)).await.unwrap();
    assert!(first.result.is_valid);
    let journal = dir.path().join(format!("{}.json", first.instance_id));
    assert!(journal.exists());

    // A fresh store over the same directory replays from disk.
    let reader = FileCheckpointStore::new(dir.path());
    let key = format!("{}/july/a.pdf/ExtractInvoiceData", first.instance_id);
    let recorded = reader.load(&key).await.unwrap().unwrap();
    assert_eq!(recorded["CustomerName"], "Contoso");

    svc.purge(&first.instance_id).await.unwrap();
    assert!(!journal.exists());
}

#[tokio::test]
async fn rerun_in_a_fresh_service_continues_from_the_file_journal() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("oct/a.pdf", "a"), ("oct/b.pdf", "offline")]).await;
    let extractor = Arc::new(ContentExtractor::default());

    let make = || {
        InvoiceBatchService::new(
            InvoiceActivities::new(store.clone(), extractor.clone(), ACCOUNT),
            Arc::new(FileCheckpointStore::new(dir.path())),
            &WorkflowOptions::default(),
        )
    };

    let first = make()
        .run_to_completion(InvoiceBatchRequest::new(CONTAINER))
        .await
        .unwrap();
    assert!(!first.result.is_valid);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);

    // The provider is back; a new process picks the instance up by id.
    seed(&store, &[("oct/b.pdf", "b")]).await;
    let svc = make();
    assert!(svc.get(&first.instance_id).is_none());
    let resumed = svc
        .rerun(&first.instance_id, InvoiceBatchRequest::new(CONTAINER))
        .await
        .unwrap();

    assert_eq!(resumed.instance_id, first.instance_id);
    assert!(resumed.result.is_valid, "{}", resumed.result.render_tree());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 3, "only oct/b.pdf is extracted again");
    let names = store.names(ACCOUNT, CONTAINER);
    assert!(names.iter().any(|n| n == "oct/b.pdf.Validation.json"));

    let meta = svc.get(&first.instance_id).unwrap();
    assert_eq!(meta.runtime_status, RuntimeStatus::Completed);
    assert_eq!(meta.input, json!({ "container": CONTAINER }));
}

#[tokio::test]
async fn rejected_batch_touches_nothing() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("aug/a.pdf", "a")]).await;
    let extractor = Arc::new(ContentExtractor::default());
    let svc = service(store.clone(), extractor.clone(), Arc::new(MemoryCheckpointStore::new()));

    let batch = svc.run_to_completion(InvoiceBatchRequest::new("  ")).await.unwrap();

    assert!(!batch.result.is_valid);
    assert!(batch.result.children.is_empty());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn queued_batch_reports_through_the_registry() {
    let store = Arc::new(MemoryBlobStore::new());
    seed(&store, &[("sep/a.pdf", "a")]).await;
    let svc = service(
        store,
        Arc::new(ContentExtractor::default()),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let id = svc.enqueue(br#"{"container":"invoices"}"#).unwrap();
    let meta = svc.wait_for_completion(&id).await.unwrap();

    assert_eq!(meta.runtime_status, RuntimeStatus::Completed);
    assert_eq!(meta.output.unwrap()["IsValid"], true);
    assert_eq!(svc.purge(&id).await.unwrap().purged_instance_count, 1);
    assert!(svc.get(&id).is_none());
}

#[test]
fn blank_queue_message_is_refused() {
    let rt = tokio_test::block_on(async {
        let svc = service(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(ContentExtractor::default()),
            Arc::new(MemoryCheckpointStore::new()),
        );
        svc.enqueue(b"  \n").map(|_| ())
    });
    assert!(matches!(rt, Err(PipelineError::InvalidInput { .. })));
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_extraction_reads_a_fenced_answer() {
    let answer = format!("```json\n{}\n```", valid_invoice());
    let chat = ScriptedChat::new(answer);
    let extractor = DirectExtractor::new(chat.clone(), ExtractionOptions::default());

    let data: InvoiceData = extract_as(
        &extractor,
        DocumentSource::Text("INVOICE Contoso ...".into()),
        &InvoiceData::template(),
        None,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(data.total_quantity, Some(5.0));
    assert_eq!(data.products.as_ref().map(Vec::len), Some(2));

    let requests = chat.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].messages;
    assert!(prompt.iter().any(|m| m.text.contains("CustomerName")));
    assert_eq!(prompt.last().unwrap().text, "INVOICE Contoso ...");
}

#[tokio::test]
async fn configured_direct_extractor_uses_the_injected_chat() {
    let config = PipelineConfig::builder()
        .storage_account(ACCOUNT)
        .extractor(ExtractorKind::Direct)
        .markdown_step(true)
        .layout_endpoint("https://layout.example.com")
        .build()
        .unwrap();
    let extractor = build_extractor(&config, Some(ScriptedChat::new("null"))).unwrap();

    assert_eq!(extractor.name(), "direct");
    let none: Option<InvoiceData> = extract_as(
        extractor.as_ref(),
        DocumentSource::Text("blank page".into()),
        &InvoiceData::template(),
        None,
    )
    .await
    .unwrap();
    assert!(none.is_none());
}

#[test]
fn direct_batch_without_markdown_step_is_refused() {
    let err = PipelineConfig::builder()
        .storage_account(ACCOUNT)
        .extractor(ExtractorKind::Direct)
        .build()
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));

    // A single text document can still use the direct strategy.
    let config = PipelineConfig::builder()
        .storage_account(ACCOUNT)
        .build()
        .unwrap();
    let extractor =
        build_extractor_as(&config, ExtractorKind::Direct, Some(ScriptedChat::new("null"))).unwrap();
    assert_eq!(extractor.name(), "direct");
    assert!(!extractor.accepts(&DocumentSource::Bytes(b"%PDF-1.7\n\xff\xfe".to_vec())));
}

#[tokio::test]
async fn prose_answer_is_malformed() {
    let extractor = DirectExtractor::new(
        ScriptedChat::new("I could not read this invoice."),
        ExtractionOptions::default(),
    );
    let err = extract_as(
        &extractor,
        DocumentSource::Text("???".into()),
        &InvoiceData::template(),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedOutput { .. }));
}

// ── Tiling and validation ────────────────────────────────────────────────────

#[test]
fn long_documents_fit_the_tile_budget() {
    let pages: Vec<DynamicImage> = (0..23).map(|_| DynamicImage::new_rgb8(40, 60)).collect();
    let tiles = tile_pages(pages, 10);

    // ceil(23 / 10) = 3 pages per tile, so 8 tiles; the last holds 2 pages.
    assert_eq!(tiles.len(), 8);
    assert_eq!(tiles[0].dimensions(), (40, 180));
    assert_eq!(tiles[7].dimensions(), (40, 120));
}

#[test]
fn missing_signatures_fail_both_flags() {
    let mut record: InvoiceData = serde_json::from_value(valid_invoice()).unwrap();
    record.signatures = None;

    let outcome = validate_invoice("x.pdf", Some(&record));
    assert!(!outcome.is_valid);
    assert!(outcome
        .status
        .contains(ValidationStatus::DISTRIBUTOR_SIGNATURE_MISSING));
    assert!(outcome
        .status
        .contains(ValidationStatus::CUSTOMER_SIGNATURE_MISSING));
}
