//! Inputs of the batch workflow and its activities.
//!
//! Every request validates itself before any side effect happens. A failed
//! check produces an invalid [`ValidationResult`] whose messages name the
//! offending field.

use super::result::ValidationResult;
use crate::invoice::InvoiceData;
use serde::{Deserialize, Serialize};

/// Anything an activity or workflow accepts as input.
pub trait WorkflowRequest {
    fn validate(&self) -> ValidationResult;
}

fn require(result: &mut ValidationResult, field: &str, value: Option<&str>) {
    if value.is_none_or(|v| v.trim().is_empty()) {
        result.add_error(format!("{field} is required."));
    }
}

/// Trigger payload: `{ "container": "invoices" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBatchRequest {
    #[serde(default, alias = "Container")]
    pub container: Option<String>,
}

impl InvoiceBatchRequest {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
        }
    }
}

impl WorkflowRequest for InvoiceBatchRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        require(&mut result, "Container", self.container.as_deref());
        result
    }
}

/// Documents sharing a top-level folder of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceFolder {
    pub container: Option<String>,
    pub name: String,
    pub invoice_file_names: Vec<String>,
}

impl WorkflowRequest for InvoiceFolder {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        require(&mut result, "Container", self.container.as_deref());
        require(&mut result, "Name", Some(&self.name));
        if self.invoice_file_names.is_empty() {
            result.add_error("InvoiceFileNames are required.");
        }
        result
    }
}

/// Extract one document. With `markdown` set, the stored conversion is
/// used instead of the raw blob when the strategy accepts text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractInvoiceDataRequest {
    pub container: Option<String>,
    pub file_name: Option<String>,
    pub markdown: Option<String>,
}

impl WorkflowRequest for ExtractInvoiceDataRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        require(&mut result, "Container", self.container.as_deref());
        require(&mut result, "FileName", self.file_name.as_deref());
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetInvoiceMarkdownRequest {
    pub container: Option<String>,
    pub file_name: Option<String>,
}

impl WorkflowRequest for GetInvoiceMarkdownRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        require(&mut result, "Container", self.container.as_deref());
        require(&mut result, "FileName", self.file_name.as_deref());
        result
    }
}

/// Write `content` to `container/blob_name`, creating the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBytesToBlobRequest {
    pub storage_account_name: String,
    pub container_name: String,
    pub blob_name: String,
    pub content: Vec<u8>,
    pub overwrite: bool,
}

impl WriteBytesToBlobRequest {
    /// Overwriting write, the default for pipeline artefacts.
    pub fn new(
        storage_account_name: impl Into<String>,
        container_name: impl Into<String>,
        blob_name: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            storage_account_name: storage_account_name.into(),
            container_name: container_name.into(),
            blob_name: blob_name.into(),
            content,
            overwrite: true,
        }
    }
}

impl WorkflowRequest for WriteBytesToBlobRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        require(&mut result, "StorageAccountName", Some(&self.storage_account_name));
        require(&mut result, "ContainerName", Some(&self.container_name));
        require(&mut result, "BlobName", Some(&self.blob_name));
        if self.content.is_empty() {
            result.add_error("Content is required.");
        }
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateInvoiceDataRequest {
    pub invoice_name: String,
    pub data: Option<InvoiceData>,
}

impl WorkflowRequest for ValidateInvoiceDataRequest {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();
        if self.data.is_none() {
            result.add_error("Data is required.");
        }
        result
    }
}
