//! In-process durable-execution host.
//!
//! Orchestration code never touches storage, models or the clock directly.
//! It calls [`OrchestrationContext::call_activity`], which
//!
//! 1. returns the journaled output when the activity already ran,
//! 2. otherwise waits while the instance is suspended,
//! 3. runs the activity under the per-activity timeout, racing the
//!    instance's cancellation signal,
//! 4. journals the output on success.
//!
//! A replay of the same instance therefore re-executes only the activities
//! that never completed.

use super::checkpoint::CheckpointStore;
use super::instances::InstanceRegistry;
use super::log::ReplaySafeLog;
use crate::error::PipelineError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Receiving side of an instance's control channels.
#[derive(Debug, Clone)]
pub(crate) struct InstanceSignals {
    pub cancel: watch::Receiver<bool>,
    pub suspend: watch::Receiver<bool>,
}

/// Sending side, held by the registry.
#[derive(Debug)]
pub(crate) struct InstanceControl {
    cancel: watch::Sender<bool>,
    suspend: watch::Sender<bool>,
}

impl InstanceControl {
    pub fn new() -> (Self, InstanceSignals) {
        let (cancel, cancel_rx) = watch::channel(false);
        let (suspend, suspend_rx) = watch::channel(false);
        (
            Self { cancel, suspend },
            InstanceSignals {
                cancel: cancel_rx,
                suspend: suspend_rx,
            },
        )
    }

    pub fn signals(&self) -> InstanceSignals {
        InstanceSignals {
            cancel: self.cancel.subscribe(),
            suspend: self.suspend.subscribe(),
        }
    }

    pub fn suspend(&self) {
        self.suspend.send_replace(true);
    }

    pub fn resume(&self) {
        self.suspend.send_replace(false);
    }

    /// Cancel outstanding and future activities. Also releases a suspended
    /// instance so it can observe the cancellation.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
        self.suspend.send_replace(false);
    }

    pub fn reset(&self) {
        self.cancel.send_replace(false);
        self.suspend.send_replace(false);
    }
}

/// Resolves once `rx` reads `true`. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Handle given to orchestration code for one instance and scope.
///
/// Scopes partition the journal: the batch runs in one scope and every
/// document gets its own, so keys read `{instance}/{scope}/{activity}`.
#[derive(Clone)]
pub struct OrchestrationContext {
    instance_id: Arc<str>,
    scope: Arc<str>,
    checkpoints: Arc<dyn CheckpointStore>,
    registry: Arc<InstanceRegistry>,
    signals: InstanceSignals,
    activity_timeout: Duration,
    replaying: bool,
    log: ReplaySafeLog,
}

impl OrchestrationContext {
    pub(crate) fn new(
        instance_id: &str,
        scope: &str,
        checkpoints: Arc<dyn CheckpointStore>,
        registry: Arc<InstanceRegistry>,
        signals: InstanceSignals,
        activity_timeout: Duration,
        replaying: bool,
    ) -> Self {
        Self {
            instance_id: Arc::from(instance_id),
            scope: Arc::from(scope),
            checkpoints,
            registry,
            signals,
            activity_timeout,
            replaying,
            log: ReplaySafeLog::new(scope, replaying),
        }
    }

    /// Same instance, separate journal scope and logger.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
            log: ReplaySafeLog::new(scope, self.replaying),
            ..self.clone()
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn log(&self) -> &ReplaySafeLog {
        &self.log
    }

    /// `true` once termination was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.signals.cancel.borrow()
    }

    /// Publish progress on the instance's status record.
    pub fn set_custom_status(&self, status: Value) {
        self.registry.set_custom_status(&self.instance_id, status);
    }

    fn key(&self, activity: &str) -> String {
        format!("{}/{}/{}", self.instance_id, self.scope, activity)
    }

    async fn wait_while_suspended(&self, activity: &str) -> Result<(), PipelineError> {
        let mut suspend = self.signals.suspend.clone();
        let mut cancel = self.signals.cancel.clone();
        loop {
            if *cancel.borrow_and_update() {
                return Err(PipelineError::Cancelled {
                    activity: activity.to_string(),
                });
            }
            if !*suspend.borrow_and_update() {
                return Ok(());
            }
            debug!("{} waiting for resume before {}", self.instance_id, activity);
            tokio::select! {
                r = suspend.changed() => {
                    if r.is_err() {
                        return Ok(());
                    }
                }
                _ = cancelled(&mut cancel) => {}
            }
        }
    }

    /// Run `activity` once per instance and scope.
    ///
    /// `activity` must be unique within the scope; it is part of the
    /// journal key.
    pub async fn call_activity<T, F, Fut>(&self, activity: &str, run: F) -> Result<T, PipelineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let key = self.key(activity);
        if let Some(recorded) = self.checkpoints.load(&key).await? {
            debug!("Replaying {}", key);
            return Ok(serde_json::from_value(recorded)?);
        }

        self.log.mark_live();
        self.wait_while_suspended(activity).await?;

        let mut cancel = self.signals.cancel.clone();
        let output = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                return Err(PipelineError::Cancelled {
                    activity: activity.to_string(),
                });
            }
            r = tokio::time::timeout(self.activity_timeout, run()) => match r {
                Ok(r) => r?,
                Err(_) => {
                    return Err(PipelineError::ActivityTimeout {
                        activity: activity.to_string(),
                        secs: self.activity_timeout.as_secs(),
                    });
                }
            },
        };

        self.checkpoints.save(&key, serde_json::to_value(&output)?).await?;
        Ok(output)
    }
}

impl std::fmt::Debug for OrchestrationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationContext")
            .field("instance_id", &self.instance_id)
            .field("scope", &self.scope)
            .field("activity_timeout", &self.activity_timeout)
            .field("replaying", &self.replaying)
            .finish()
    }
}
