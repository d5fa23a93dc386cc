use super::{check_name, group_by_top_folder, BlobGroup, BlobPermissions, BlobStore};
use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

type Key = (String, String, String);

/// In-process blob store. Read URIs use the `memory://` scheme and are only
/// meaningful to code that holds the same store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<Key, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs across every account and container.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blob names in one container, sorted.
    pub fn names(&self, account: &str, container: &str) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(a, c, _)| a == account && c == container)
            .map(|(_, _, b)| b.clone())
            .collect()
    }
}

fn key(account: &str, container: &str, blob: &str) -> Key {
    (account.to_string(), container.to_string(), blob.to_string())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), PipelineError> {
        check_name("container", container)?;
        check_name("blob", blob)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let k = key(account, container, blob);
        if !overwrite && blobs.contains_key(&k) {
            return Err(PipelineError::BlobExists {
                container: container.to_string(),
                blob: blob.to_string(),
            });
        }
        blobs.insert(k, bytes);
        Ok(())
    }

    async fn read_all(
        &self,
        account: &str,
        container: &str,
        blob: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(account, container, blob))
            .cloned()
            .ok_or_else(|| PipelineError::BlobNotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            })
    }

    async fn list_grouped_by_top_folder(
        &self,
        account: &str,
        container: &str,
    ) -> Result<Vec<BlobGroup>, PipelineError> {
        Ok(group_by_top_folder(container, self.names(account, container)))
    }

    async fn generate_timed_read_uri(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        permissions: BlobPermissions,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        if !self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key(account, container, blob))
        {
            return Err(PipelineError::BlobNotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            });
        }
        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| PipelineError::Internal(format!("TTL out of range: {e}")))?;
        Ok(format!(
            "memory://{account}/{container}/{blob}?sp={}&se={}",
            permissions.as_query(),
            expiry.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }
}
