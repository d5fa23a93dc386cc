//! End-to-end tests against a live LLM provider.
//!
//! These read invoices from `./test_cases/` and make real API calls. They
//! are gated behind the `E2E_ENABLED` environment variable so they do not
//! run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! The vision tests also need pdfium (`PDFIUM_LIB_PATH` or a system copy).

use ai_document_pipeline::workflow::{
    InvoiceBatchRequest, InvoiceBatchService, MemoryCheckpointStore,
};
use ai_document_pipeline::{
    build_extractor, build_extractor_as, extract_as, validate_invoice, BlobStore, DocumentSource,
    ExtractorKind, InvoiceData, MemoryBlobStore, PipelineConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn config(kind: ExtractorKind) -> PipelineConfig {
    PipelineConfig::builder()
        .storage_account("e2e")
        .extractor(kind)
        .build()
        .expect("valid config")
}

/// Light sanity checks on a live extraction.
fn assert_plausible(data: &InvoiceData, context: &str) {
    assert!(
        data.customer_name.as_deref().is_some_and(|n| !n.trim().is_empty()),
        "[{context}] CustomerName should be read"
    );
    assert!(
        data.products.as_ref().is_some_and(|p| !p.is_empty()),
        "[{context}] at least one product line expected"
    );
    let outcome = validate_invoice(context, Some(data));
    println!("[{context}] {} {:?}", outcome.status, outcome.messages);
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vision_extracts_scanned_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let extractor = build_extractor(&config(ExtractorKind::Vision), None).expect("extractor");

    let bytes = std::fs::read(&path).expect("readable");
    let data = extract_as(
        extractor.as_ref(),
        DocumentSource::Bytes(bytes),
        &InvoiceData::template(),
        None,
    )
    .await
    .expect("extraction should succeed")
    .expect("model should return data");

    assert_plausible(&data, "vision");
}

#[tokio::test]
async fn test_direct_extracts_text_invoice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.txt"));
    let extractor = build_extractor_as(&config(ExtractorKind::Vision), ExtractorKind::Direct, None)
        .expect("extractor");

    let text = std::fs::read_to_string(&path).expect("readable");
    let data = extract_as(
        extractor.as_ref(),
        DocumentSource::Text(text),
        &InvoiceData::template(),
        None,
    )
    .await
    .expect("extraction should succeed")
    .expect("model should return data");

    assert_plausible(&data, "direct");
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_over_test_cases() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let config = config(ExtractorKind::Vision);

    let store = Arc::new(MemoryBlobStore::new());
    store
        .write(
            "e2e",
            "invoices",
            "e2e/invoice.pdf",
            std::fs::read(&path).expect("readable"),
            true,
        )
        .await
        .expect("seeded");

    let service =
        InvoiceBatchService::from_config(&config, store.clone(), Arc::new(MemoryCheckpointStore::new()))
            .expect("service");
    let batch = service
        .run_to_completion(InvoiceBatchRequest::new("invoices"))
        .await
        .expect("batch ran");

    println!("{}", batch.result.render_tree());
    assert_eq!(batch.result.children.len(), 1);
    assert!(store
        .names("e2e", "invoices")
        .iter()
        .any(|n| n == "e2e/invoice.pdf.Data.json"));
}
