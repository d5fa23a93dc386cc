//! Blob storage seam.
//!
//! Blobs live in `account / container / name`, where `name` may contain `/`
//! to form virtual folders. Two implementations ship with the crate:
//! [`FsBlobStore`] (a directory tree, `file://` read URIs) and
//! [`MemoryBlobStore`] (tests and dry runs).

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Blobs sharing a top-level folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobGroup {
    /// Top-level folder, or the container name for root-level blobs.
    pub name: String,
    /// Full blob names, in listing order.
    pub blobs: Vec<String>,
}

/// Permissions granted by a timed read URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobPermissions {
    pub read: bool,
    pub write: bool,
}

impl BlobPermissions {
    pub const READ: Self = Self {
        read: true,
        write: false,
    };

    /// Compact form used in URI query strings (`r`, `w`, `rw`).
    pub fn as_query(&self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        s
    }
}

/// Blob storage as seen by the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob, creating the container when missing.
    ///
    /// With `overwrite = false` an existing blob is [`PipelineError::BlobExists`].
    async fn write(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), PipelineError>;

    /// Read a whole blob.
    async fn read_all(&self, account: &str, container: &str, blob: &str)
        -> Result<Vec<u8>, PipelineError>;

    /// List every blob in the container, grouped by top-level folder.
    async fn list_grouped_by_top_folder(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<BlobGroup>, PipelineError>;

    /// A URI an external service can read the blob from until `ttl` elapses.
    async fn generate_timed_read_uri(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        permissions: BlobPermissions,
        ttl: Duration,
    ) -> Result<String, PipelineError>;
}

/// Group blob names by their first path segment.
///
/// Groups come out sorted by name and keep the relative order of their
/// blobs. Root-level blobs form a group named after the container.
pub fn group_by_top_folder<I>(container: &str, names: I) -> Vec<BlobGroup>
where
    I: IntoIterator<Item = String>,
{
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let key = match name.split_once('/') {
            Some((folder, _)) if !folder.is_empty() => folder.to_string(),
            _ => container.to_string(),
        };
        groups.entry(key).or_default().push(name);
    }
    groups
        .into_iter()
        .map(|(name, blobs)| BlobGroup { name, blobs })
        .collect()
}

/// Reject names that could escape the container on a filesystem backend.
pub(crate) fn check_name(kind: &str, name: &str) -> Result<(), PipelineError> {
    let bad = name.trim().is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(PipelineError::InvalidInput {
            input: format!("{kind} '{name}'"),
        });
    }
    Ok(())
}
