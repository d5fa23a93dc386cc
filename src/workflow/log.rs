//! Replay-safe logging for orchestration code.
//!
//! While a workflow is being replayed from its checkpoints every line it
//! logged the first time would be logged again. A [`ReplaySafeLog`] starts
//! out silent when the scope is replaying and turns live the moment the
//! host executes the first activity that has no checkpoint.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

#[derive(Clone)]
pub struct ReplaySafeLog {
    name: Arc<str>,
    replaying: Arc<AtomicBool>,
}

impl ReplaySafeLog {
    /// A logger for `name`, silent until [`mark_live`](Self::mark_live)
    /// when `replaying` is set.
    pub fn new(name: &str, replaying: bool) -> Self {
        Self {
            name: Arc::from(name),
            replaying: Arc::new(AtomicBool::new(replaying)),
        }
    }

    /// A logger that is never silenced.
    pub fn live(name: &str) -> Self {
        Self::new(name, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::SeqCst)
    }

    /// Called by the host once it runs new work in this scope.
    pub fn mark_live(&self) {
        self.replaying.store(false, Ordering::SeqCst);
    }

    /// Emit `message` at `level` unless replaying.
    pub fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        if self.is_replaying() {
            return;
        }
        let scope = &*self.name;
        if level == Level::ERROR {
            tracing::error!(scope, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(scope, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(scope, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(scope, "{}", message);
        } else {
            tracing::trace!(scope, "{}", message);
        }
    }

    pub fn info(&self, message: fmt::Arguments<'_>) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: fmt::Arguments<'_>) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: fmt::Arguments<'_>) {
        self.log(Level::ERROR, message);
    }
}

impl fmt::Debug for ReplaySafeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplaySafeLog")
            .field("name", &self.name)
            .field("replaying", &self.is_replaying())
            .finish()
    }
}
