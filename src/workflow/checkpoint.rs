//! Activity journal.
//!
//! The host records the output of every successful activity under a key of
//! the form `{instance}/{scope}/{activity}`. On replay a recorded output is
//! returned instead of running the activity again. Failures are never
//! recorded, so a replay retries them.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, PipelineError>;

    async fn save(&self, key: &str, value: Value) -> Result<(), PipelineError>;

    /// Drop every entry whose key starts with `prefix`. Returns the count.
    async fn purge_prefix(&self, prefix: &str) -> Result<usize, PipelineError>;
}

/// Journal held in memory; lost with the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), PipelineError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn purge_prefix(&self, prefix: &str) -> Result<usize, PipelineError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

type Journal = BTreeMap<String, Value>;

/// Journal persisted as one JSON file per instance: `{root}/{instance}.json`.
///
/// Each save rewrites the instance file through a temp file and a rename.
/// Journals are cached after the first read; a single process is assumed
/// to own the directory.
#[derive(Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
    cache: tokio::sync::Mutex<HashMap<String, Journal>>,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn journal_path(&self, instance: &str) -> PathBuf {
        self.root.join(format!("{instance}.json"))
    }
}

fn instance_of(key: &str) -> Result<&str, PipelineError> {
    let instance = key.split('/').next().unwrap_or_default();
    if instance.is_empty()
        || instance == "."
        || instance == ".."
        || instance.contains('\\')
        || instance.contains(':')
    {
        return Err(PipelineError::InvalidInput {
            input: format!("checkpoint key '{key}'"),
        });
    }
    Ok(instance)
}

fn storage_err(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

async fn read_journal(path: &Path) -> Result<Journal, PipelineError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Journal::new()),
        Err(e) => Err(storage_err(path)(e)),
    }
}

async fn write_journal(path: &Path, journal: &Journal) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(storage_err(parent))?;
    }

    if journal.is_empty() {
        return match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(storage_err(path)(e)),
            _ => Ok(()),
        };
    }

    let bytes = serde_json::to_vec(journal)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(storage_err(path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(storage_err(path))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        let instance = instance_of(key)?;
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(instance) {
            let journal = read_journal(&self.journal_path(instance)).await?;
            cache.insert(instance.to_string(), journal);
        }
        Ok(cache.get(instance).and_then(|j| j.get(key)).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), PipelineError> {
        let instance = instance_of(key)?;
        let path = self.journal_path(instance);
        let mut cache = self.cache.lock().await;
        let journal = match cache.entry(instance.to_string()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(read_journal(&path).await?),
        };
        journal.insert(key.to_string(), value);
        write_journal(&path, journal).await?;
        debug!("Checkpointed {}", key);
        Ok(())
    }

    async fn purge_prefix(&self, prefix: &str) -> Result<usize, PipelineError> {
        let instance = instance_of(prefix)?;
        let path = self.journal_path(instance);
        let mut cache = self.cache.lock().await;
        let mut journal = match cache.remove(instance) {
            Some(j) => j,
            None => read_journal(&path).await?,
        };
        let before = journal.len();
        journal.retain(|k, _| !k.starts_with(prefix));
        let purged = before - journal.len();
        write_journal(&path, &journal).await?;
        if !journal.is_empty() {
            cache.insert(instance.to_string(), journal);
        }
        Ok(purged)
    }
}
