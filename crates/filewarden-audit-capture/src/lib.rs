//! Filesystem change capture for Filewarden.
//!
//! This crate turns native notifications into queued [`AuditEvent`]s:
//!
//! - [`DirectoryWatcher`] owns one OS subscription and pushes raw changes
//!   across a bounded channel to a normalization task
//! - [`normalize`] holds the pure suppression rules
//! - [`WatcherGroup`] fans several watchers into one sink
//! - [`EventQueue`] is the unbounded hand-off to the attribution stage

mod group;
pub mod normalize;
mod queue;
mod watcher;

use filewarden_common_core::AuditError;
use std::sync::Arc;

pub use group::WatcherGroup;
pub use normalize::{raw_changes, ChangeMapper, FileFilter, Normalizer};
pub use queue::{EventQueue, EventReceiver};
pub use watcher::{DirectoryWatcher, WatchOptions};

// Re-export types for convenience
pub use filewarden_audit_types::{AuditEvent, ChangeKind, RawChange};

/// Callback receiving errors raised after a subscription is live.
pub type ErrorCallback = Arc<dyn Fn(AuditError) + Send + Sync>;

/// Downstream consumer of normalized events.
pub trait EventSink: Send + Sync + 'static {
    /// Accept one event without blocking.
    fn deliver(&self, event: AuditEvent);
}

impl EventSink for EventQueue {
    fn deliver(&self, event: AuditEvent) {
        self.enqueue(event);
    }
}
