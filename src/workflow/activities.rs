//! Leaf activities of the invoice workflow.
//!
//! Activities are the only code that touches storage, the layout service or
//! the model. Each validates its request first; an invalid request is
//! logged and answered with an empty result instead of an error, matching
//! how the orchestrator treats expected absence.

use super::requests::{
    ExtractInvoiceDataRequest, GetInvoiceMarkdownRequest, InvoiceBatchRequest, InvoiceFolder,
    ValidateInvoiceDataRequest, WorkflowRequest, WriteBytesToBlobRequest,
};
use crate::error::PipelineError;
use crate::extract::{extract_as, DocumentDataExtractor, DocumentSource};
use crate::invoice::{validate_invoice, InvoiceData, InvoiceValidation};
use crate::pipeline::markdown::MarkdownConverter;
use crate::prompts::DEFAULT_PAGES_PROMPT;
use crate::storage::{BlobPermissions, BlobStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const GET_INVOICE_FOLDERS: &str = "GetInvoiceFolders";
pub const GET_INVOICE_MARKDOWN: &str = "GetInvoiceMarkdown";
pub const EXTRACT_INVOICE_DATA: &str = "ExtractInvoiceData";
pub const WRITE_BYTES_TO_BLOB: &str = "WriteBytesToBlob";
pub const VALIDATE_INVOICE_DATA: &str = "ValidateInvoiceData";

/// Suffixes of blobs the pipeline writes next to each document.
pub const ARTEFACT_SUFFIXES: [&str; 3] = [".Data.json", ".Validation.json", ".Markdown.md"];

/// `true` for blobs produced by an earlier run.
pub fn is_artefact(blob: &str) -> bool {
    ARTEFACT_SUFFIXES.iter().any(|s| blob.ends_with(s))
}

#[derive(Clone)]
pub struct InvoiceActivities {
    store: Arc<dyn BlobStore>,
    extractor: Arc<dyn DocumentDataExtractor>,
    converter: Option<Arc<dyn MarkdownConverter>>,
    account: String,
    read_uri_ttl: Duration,
}

impl InvoiceActivities {
    pub fn new(
        store: Arc<dyn BlobStore>,
        extractor: Arc<dyn DocumentDataExtractor>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            store,
            extractor,
            converter: None,
            account: account.into(),
            read_uri_ttl: Duration::from_secs(3600),
        }
    }

    /// Converter used by the markdown step.
    pub fn with_converter(mut self, converter: Arc<dyn MarkdownConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_read_uri_ttl(mut self, ttl: Duration) -> Self {
        self.read_uri_ttl = ttl;
        self
    }

    /// Storage account every activity works against.
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn extractor(&self) -> &Arc<dyn DocumentDataExtractor> {
        &self.extractor
    }

    /// Discover the documents of a container, grouped by top-level folder.
    pub async fn get_invoice_folders(
        &self,
        request: &InvoiceBatchRequest,
    ) -> Result<Vec<InvoiceFolder>, PipelineError> {
        let validation = request.validate();
        let container = match request.container.as_deref() {
            Some(c) if validation.is_valid => c,
            _ => {
                return Err(PipelineError::InvalidInput {
                    input: validation.to_string(),
                })
            }
        };

        let groups = self
            .store
            .list_grouped_by_top_folder(&self.account, container)
            .await?;

        let folders: Vec<InvoiceFolder> = groups
            .into_iter()
            .filter_map(|group| {
                let invoice_file_names: Vec<String> =
                    group.blobs.into_iter().filter(|b| !is_artefact(b)).collect();
                (!invoice_file_names.is_empty()).then(|| InvoiceFolder {
                    container: Some(container.to_string()),
                    name: group.name,
                    invoice_file_names,
                })
            })
            .collect();

        info!(
            "Found {} invoice folders in container '{}'",
            folders.len(),
            container
        );
        Ok(folders)
    }

    /// Convert one document to Markdown through the layout service.
    pub async fn get_invoice_markdown(
        &self,
        request: &GetInvoiceMarkdownRequest,
    ) -> Result<Option<String>, PipelineError> {
        let validation = request.validate();
        let (Some(container), Some(file_name), true) = (
            request.container.as_deref(),
            request.file_name.as_deref(),
            validation.is_valid,
        ) else {
            error!("{}: invalid input: {}", GET_INVOICE_MARKDOWN, validation);
            return Ok(None);
        };

        let converter = self.converter.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("the markdown step needs a layout endpoint".into())
        })?;

        let uri = self
            .store
            .generate_timed_read_uri(
                &self.account,
                container,
                file_name,
                BlobPermissions::READ,
                self.read_uri_ttl,
            )
            .await?;

        Ok(converter
            .from_uri(&uri)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Extract the invoice record of one document.
    ///
    /// Uses the request's Markdown when the configured strategy reads text,
    /// otherwise the raw blob.
    pub async fn extract_invoice_data(
        &self,
        request: &ExtractInvoiceDataRequest,
    ) -> Result<Option<InvoiceData>, PipelineError> {
        let validation = request.validate();
        let (Some(container), Some(file_name), true) = (
            request.container.as_deref(),
            request.file_name.as_deref(),
            validation.is_valid,
        ) else {
            error!("{}: invalid input: {}", EXTRACT_INVOICE_DATA, validation);
            return Ok(None);
        };

        let source = match &request.markdown {
            Some(md) if self.extractor.accepts(&DocumentSource::Text(String::new())) => {
                DocumentSource::Text(md.clone())
            }
            _ => {
                let bytes = self.store.read_all(&self.account, container, file_name).await?;
                DocumentSource::Bytes(bytes)
            }
        };

        debug!(
            "Extracting {} with the {} extractor",
            file_name,
            self.extractor.name()
        );
        extract_as(
            self.extractor.as_ref(),
            source,
            &InvoiceData::template(),
            Some(DEFAULT_PAGES_PROMPT),
        )
        .await
    }

    /// Write a blob. `false` when the request is invalid.
    pub async fn write_bytes_to_blob(
        &self,
        request: &WriteBytesToBlobRequest,
    ) -> Result<bool, PipelineError> {
        let validation = request.validate();
        if !validation.is_valid {
            error!("{}: invalid input: {}", WRITE_BYTES_TO_BLOB, validation);
            return Ok(false);
        }

        self.store
            .write(
                &request.storage_account_name,
                &request.container_name,
                &request.blob_name,
                request.content.clone(),
                request.overwrite,
            )
            .await?;
        Ok(true)
    }

    /// Run the invoice rules. A missing record is reported, not raised.
    pub fn validate_invoice_data(&self, request: &ValidateInvoiceDataRequest) -> InvoiceValidation {
        let outcome = validate_invoice(&request.invoice_name, request.data.as_ref());
        if !request.validate().is_valid {
            error!("{}: invalid input: {}", VALIDATE_INVOICE_DATA, outcome.messages.join("; "));
        }
        outcome
    }
}

impl std::fmt::Debug for InvoiceActivities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceActivities")
            .field("extractor", &self.extractor.name())
            .field("converter", &self.converter.is_some())
            .field("account", &self.account)
            .field("read_uri_ttl", &self.read_uri_ttl)
            .finish()
    }
}
