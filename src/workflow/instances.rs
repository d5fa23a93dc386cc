//! Instance registry: the workflow status surface.
//!
//! Lifecycle of an instance:
//!
//! ```text
//! Pending ──▶ Running ──▶ Completed
//!               │  ▲  └──▶ Failed
//!         pause ▼  │ resume
//!             Suspended
//!
//! Pending | Running | Suspended ──terminate──▶ Terminated
//! ```
//!
//! Purging is only allowed for finished instances (Completed, Failed,
//! Terminated) and also drops the instance's activity journal.

use super::checkpoint::CheckpointStore;
use super::host::{InstanceControl, InstanceSignals};
use crate::error::InstanceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

/// Default page size of [`InstanceRegistry::list`].
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Terminated,
}

impl RuntimeStatus {
    /// No further transitions except purge.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RuntimeStatus::Completed | RuntimeStatus::Failed | RuntimeStatus::Terminated
        )
    }
}

/// Snapshot of one instance as reported by the status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    pub instance_id: String,
    pub name: String,
    pub runtime_status: RuntimeStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// One page of a listing. Pass `continuation_token` back to get the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResult {
    pub purged_instance_count: usize,
}

struct Entry {
    metadata: InstanceMetadata,
    control: InstanceControl,
    finished: watch::Sender<bool>,
}

impl Entry {
    fn pending(instance_id: &str, name: &str, input: Value) -> (Self, InstanceSignals) {
        let (control, signals) = InstanceControl::new();
        let (finished, _) = watch::channel(false);
        let now = Utc::now();
        let metadata = InstanceMetadata {
            instance_id: instance_id.to_string(),
            name: name.to_string(),
            runtime_status: RuntimeStatus::Pending,
            created_at: now,
            last_updated_at: now,
            input,
            output: None,
            custom_status: None,
            failure: None,
        };
        let entry = Self {
            metadata,
            control,
            finished,
        };
        (entry, signals)
    }

    fn set_status(&mut self, status: RuntimeStatus) {
        self.metadata.runtime_status = status;
        self.metadata.last_updated_at = Utc::now();
    }
}

/// Tracks every instance started in this process.
pub struct InstanceRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl InstanceRegistry {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            checkpoints,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new Pending instance.
    pub(crate) fn create(&self, name: &str, input: Value) -> (String, InstanceSignals) {
        let instance_id = uuid::Uuid::new_v4().simple().to_string();
        let (entry, signals) = Entry::pending(&instance_id, name, input);
        self.lock().insert(instance_id.clone(), entry);
        (instance_id, signals)
    }

    /// Register `instance_id` as Pending so it can run again against its
    /// journal, e.g. one left behind by an earlier process. A finished
    /// instance of that id is replaced; a live one is refused.
    pub(crate) fn adopt(
        &self,
        instance_id: &str,
        name: &str,
        input: Value,
    ) -> Result<InstanceSignals, InstanceError> {
        let valid = !instance_id.is_empty()
            && instance_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(InstanceError::InvalidInstanceId(instance_id.to_string()));
        }
        let mut entries = self.lock();
        if let Some(current) = entries.get(instance_id).map(|e| e.metadata.runtime_status) {
            if !current.is_terminal() {
                return Err(InstanceError::InvalidState {
                    instance_id: instance_id.to_string(),
                    action: "rerun",
                    current,
                });
            }
        }
        let (entry, signals) = Entry::pending(instance_id, name, input);
        entries.insert(instance_id.to_string(), entry);
        info!("Adopted instance {}", instance_id);
        Ok(signals)
    }

    /// Pending → Running. Leaves any other state alone.
    pub(crate) fn mark_running(&self, instance_id: &str) {
        if let Some(entry) = self.lock().get_mut(instance_id) {
            if entry.metadata.runtime_status == RuntimeStatus::Pending {
                entry.set_status(RuntimeStatus::Running);
            }
        }
    }

    /// Reopen a finished instance for replay with fresh control signals.
    pub(crate) fn reopen(
        &self,
        instance_id: &str,
    ) -> Result<(Value, InstanceSignals), InstanceError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(instance_id)
            .ok_or_else(|| InstanceError::NotFound(instance_id.to_string()))?;
        let current = entry.metadata.runtime_status;
        if !current.is_terminal() {
            return Err(InstanceError::InvalidState {
                instance_id: instance_id.to_string(),
                action: "replay",
                current,
            });
        }
        entry.control.reset();
        entry.metadata.output = None;
        entry.metadata.failure = None;
        entry.finished.send_replace(false);
        entry.set_status(RuntimeStatus::Running);
        Ok((entry.metadata.input.clone(), entry.control.signals()))
    }

    pub(crate) fn set_custom_status(&self, instance_id: &str, status: Value) {
        if let Some(entry) = self.lock().get_mut(instance_id) {
            entry.metadata.custom_status = Some(status);
            entry.metadata.last_updated_at = Utc::now();
        }
    }

    /// Record the output. A terminated instance keeps its status.
    pub(crate) fn complete(&self, instance_id: &str, output: Value) {
        if let Some(entry) = self.lock().get_mut(instance_id) {
            entry.metadata.output = Some(output);
            if entry.metadata.runtime_status == RuntimeStatus::Terminated {
                entry.metadata.last_updated_at = Utc::now();
            } else {
                entry.set_status(RuntimeStatus::Completed);
            }
            entry.finished.send_replace(true);
        }
    }

    pub(crate) fn fail(&self, instance_id: &str, failure: String) {
        if let Some(entry) = self.lock().get_mut(instance_id) {
            entry.metadata.failure = Some(failure);
            entry.set_status(RuntimeStatus::Failed);
            entry.finished.send_replace(true);
        }
    }

    /// Turns `true` once the instance's run has returned, or `None` when
    /// the instance is unknown.
    pub fn subscribe(&self, instance_id: &str) -> Option<watch::Receiver<bool>> {
        self.lock().get(instance_id).map(|e| e.finished.subscribe())
    }

    pub fn get(&self, instance_id: &str) -> Option<InstanceMetadata> {
        self.lock().get(instance_id).map(|e| e.metadata.clone())
    }

    /// List instances oldest first, `page_size` at a time.
    pub fn list(
        &self,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<Page<InstanceMetadata>, InstanceError> {
        let offset = match continuation_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| InstanceError::InvalidContinuationToken(token.to_string()))?,
        };
        let page_size = page_size.max(1);

        let mut all: Vec<InstanceMetadata> =
            self.lock().values().map(|e| e.metadata.clone()).collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });

        let total = all.len();
        let items: Vec<_> = all.into_iter().skip(offset).take(page_size).collect();
        let next = offset + items.len();
        Ok(Page {
            continuation_token: (next < total).then(|| next.to_string()),
            items,
        })
    }

    fn transition<F>(
        &self,
        instance_id: &str,
        action: &'static str,
        allowed: &[RuntimeStatus],
        apply: F,
    ) -> Result<InstanceMetadata, InstanceError>
    where
        F: FnOnce(&mut Entry),
    {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(instance_id)
            .ok_or_else(|| InstanceError::NotFound(instance_id.to_string()))?;
        let current = entry.metadata.runtime_status;
        if !allowed.contains(&current) {
            return Err(InstanceError::InvalidState {
                instance_id: instance_id.to_string(),
                action,
                current,
            });
        }
        apply(&mut *entry);
        info!("Instance {} {}: {:?} -> {:?}", instance_id, action, current, entry.metadata.runtime_status);
        Ok(entry.metadata.clone())
    }

    /// Running → Suspended. Outstanding activities finish; no new one starts.
    pub fn pause(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.transition(instance_id, "pause", &[RuntimeStatus::Running], |e| {
            e.control.suspend();
            e.set_status(RuntimeStatus::Suspended);
        })
    }

    /// Suspended → Running.
    pub fn resume(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.transition(instance_id, "resume", &[RuntimeStatus::Suspended], |e| {
            e.control.resume();
            e.set_status(RuntimeStatus::Running);
        })
    }

    /// Pending | Running | Suspended → Terminated; cancels outstanding activities.
    pub fn terminate(&self, instance_id: &str) -> Result<InstanceMetadata, InstanceError> {
        self.transition(
            instance_id,
            "terminate",
            &[
                RuntimeStatus::Pending,
                RuntimeStatus::Running,
                RuntimeStatus::Suspended,
            ],
            |e| {
                e.control.cancel();
                e.set_status(RuntimeStatus::Terminated);
            },
        )
    }

    /// Remove one finished instance and its journal.
    pub async fn purge(&self, instance_id: &str) -> Result<PurgeResult, InstanceError> {
        {
            let mut entries = self.lock();
            let entry = entries
                .get(instance_id)
                .ok_or_else(|| InstanceError::NotFound(instance_id.to_string()))?;
            let current = entry.metadata.runtime_status;
            if !current.is_terminal() {
                return Err(InstanceError::InvalidState {
                    instance_id: instance_id.to_string(),
                    action: "purge",
                    current,
                });
            }
            entries.remove(instance_id);
        }
        self.purge_journal(instance_id).await?;
        Ok(PurgeResult {
            purged_instance_count: 1,
        })
    }

    /// Remove every Completed, Failed or Terminated instance.
    pub async fn purge_all(&self) -> Result<PurgeResult, InstanceError> {
        let finished: Vec<String> = {
            let mut entries = self.lock();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.metadata.runtime_status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                entries.remove(id);
            }
            ids
        };
        for id in &finished {
            self.purge_journal(id).await?;
        }
        Ok(PurgeResult {
            purged_instance_count: finished.len(),
        })
    }

    async fn purge_journal(&self, instance_id: &str) -> Result<(), InstanceError> {
        match self.checkpoints.purge_prefix(&format!("{instance_id}/")).await {
            Ok(n) => {
                info!("Purged instance {} ({} journal entries)", instance_id, n);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to purge journal of {}: {}", instance_id, e);
                Err(InstanceError::PurgeFailed {
                    instance_id: instance_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("instances", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::checkpoint::MemoryCheckpointStore;
    use serde_json::json;

    fn registry() -> (InstanceRegistry, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        (InstanceRegistry::new(store.clone()), store)
    }

    #[test]
    fn pause_resume_cycle() {
        let (reg, _) = registry();
        let (id, signals) = reg.create("batch", json!({"container": "c"}));
        reg.mark_running(&id);

        assert_eq!(reg.pause(&id).unwrap().runtime_status, RuntimeStatus::Suspended);
        assert!(*signals.suspend.borrow());
        assert_eq!(reg.resume(&id).unwrap().runtime_status, RuntimeStatus::Running);
        assert!(!*signals.suspend.borrow());
    }

    #[test]
    fn invalid_transitions_name_current_state() {
        let (reg, _) = registry();
        let (id, _) = reg.create("batch", json!({}));

        let err = reg.pause(&id).unwrap_err();
        assert_eq!(
            err,
            InstanceError::InvalidState {
                instance_id: id.clone(),
                action: "pause",
                current: RuntimeStatus::Pending,
            }
        );
        assert!(matches!(reg.resume(&id), Err(InstanceError::InvalidState { .. })));

        reg.mark_running(&id);
        reg.complete(&id, json!(null));
        let err = reg.terminate(&id).unwrap_err();
        assert!(err.to_string().contains("Completed"));
    }

    #[test]
    fn terminate_cancels_and_is_sticky() {
        let (reg, _) = registry();
        let (id, signals) = reg.create("batch", json!({}));
        let finished = reg.subscribe(&id).unwrap();
        reg.mark_running(&id);
        reg.pause(&id).unwrap();
        reg.terminate(&id).unwrap();
        assert!(!*finished.borrow(), "terminated but still unwinding");
        assert!(*signals.cancel.borrow());
        assert!(!*signals.suspend.borrow());

        reg.complete(&id, json!({"IsValid": false}));
        let meta = reg.get(&id).unwrap();
        assert_eq!(meta.runtime_status, RuntimeStatus::Terminated);
        assert!(meta.output.is_some());
        assert!(*finished.borrow());
    }

    #[test]
    fn unknown_instance() {
        let (reg, _) = registry();
        assert_eq!(
            reg.pause("nope").unwrap_err(),
            InstanceError::NotFound("nope".into())
        );
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn list_pages_with_offset_token() {
        let (reg, _) = registry();
        let ids: Vec<String> = (0..5).map(|_| reg.create("batch", json!({})).0).collect();

        let first = reg.list(None, 2).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.continuation_token.as_deref(), Some("2"));

        let second = reg.list(first.continuation_token.as_deref(), 2).unwrap();
        let last = reg.list(second.continuation_token.as_deref(), 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(last.continuation_token.is_none());

        let mut seen: Vec<String> = first
            .items
            .into_iter()
            .chain(second.items)
            .chain(last.items)
            .map(|m| m.instance_id)
            .collect();
        seen.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(seen, expected);

        assert!(matches!(
            reg.list(Some("abc"), 2),
            Err(InstanceError::InvalidContinuationToken(_))
        ));
    }

    #[tokio::test]
    async fn purge_requires_finished_and_drops_journal() {
        let (reg, store) = registry();
        let (id, _) = reg.create("batch", json!({}));
        reg.mark_running(&id);
        store.save(&format!("{id}/doc/Extract"), json!(1)).await.unwrap();
        store.save("other/doc/Extract", json!(1)).await.unwrap();

        assert!(matches!(
            reg.purge(&id).await,
            Err(InstanceError::InvalidState { action: "purge", .. })
        ));

        reg.complete(&id, json!(null));
        assert_eq!(reg.purge(&id).await.unwrap().purged_instance_count, 1);
        assert!(reg.get(&id).is_none());
        assert_eq!(store.keys(), vec!["other/doc/Extract".to_string()]);
    }

    #[tokio::test]
    async fn purge_all_keeps_running_instances() {
        let (reg, _) = registry();
        let (done, _) = reg.create("batch", json!({}));
        reg.mark_running(&done);
        reg.complete(&done, json!(null));
        let (failed, _) = reg.create("batch", json!({}));
        reg.fail(&failed, "panicked".into());
        let (running, _) = reg.create("batch", json!({}));
        reg.mark_running(&running);

        assert_eq!(reg.purge_all().await.unwrap().purged_instance_count, 2);
        assert!(reg.get(&running).is_some());
    }

    #[test]
    fn adopt_registers_known_id_once_live() {
        let (reg, _) = registry();
        let signals = reg.adopt("batch-7", "batch", json!({"container": "c"})).unwrap();
        assert!(!*signals.cancel.borrow());
        let meta = reg.get("batch-7").unwrap();
        assert_eq!(meta.runtime_status, RuntimeStatus::Pending);
        assert_eq!(meta.input, json!({"container": "c"}));

        reg.mark_running("batch-7");
        assert!(matches!(
            reg.adopt("batch-7", "batch", json!({})),
            Err(InstanceError::InvalidState { action: "rerun", current: RuntimeStatus::Running, .. })
        ));
        reg.complete("batch-7", json!(null));
        reg.adopt("batch-7", "batch", json!({"container": "d"})).unwrap();
        let meta = reg.get("batch-7").unwrap();
        assert_eq!(meta.runtime_status, RuntimeStatus::Pending);
        assert!(meta.output.is_none());

        for bad in ["", "../x", "a/b", "a.json"] {
            assert_eq!(
                reg.adopt(bad, "batch", json!({})).unwrap_err(),
                InstanceError::InvalidInstanceId(bad.to_string())
            );
        }
    }

    #[test]
    fn reopen_only_finished() {
        let (reg, _) = registry();
        let (id, _) = reg.create("batch", json!({"container": "c"}));
        reg.mark_running(&id);
        assert!(reg.reopen(&id).is_err());
        reg.terminate(&id).unwrap();
        let (input, signals) = reg.reopen(&id).unwrap();
        assert_eq!(input, json!({"container": "c"}));
        assert!(!*signals.cancel.borrow());
        assert_eq!(reg.get(&id).unwrap().runtime_status, RuntimeStatus::Running);
    }
}
