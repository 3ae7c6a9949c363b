//! Several watchers started and stopped as a unit.

use crate::watcher::{DirectoryWatcher, WatchOptions};
use crate::{ErrorCallback, EventSink};
use filewarden_common_core::AuditError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// One [`DirectoryWatcher`] per input directory, all feeding the same sink.
pub struct WatcherGroup {
    watchers: Vec<DirectoryWatcher>,
}

impl WatcherGroup {
    /// Build one watcher per directory. Fails on the first directory that
    /// cannot be watched.
    pub fn new(
        directories: impl IntoIterator<Item = PathBuf>,
        options: &WatchOptions,
        sink: Arc<dyn EventSink>,
        on_error: ErrorCallback,
    ) -> Result<Self, AuditError> {
        let watchers = directories
            .into_iter()
            .map(|dir| DirectoryWatcher::new(dir, options.clone(), sink.clone(), on_error.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { watchers })
    }

    /// Start every watcher in order. On the first failure the watchers
    /// already started are stopped again and the error is returned.
    pub fn start(&mut self) -> Result<(), AuditError> {
        for index in 0..self.watchers.len() {
            if let Err(e) = self.watchers[index].start() {
                error!(
                    root = %self.watchers[index].root().display(),
                    error = %e,
                    "Failed to start watcher, rolling back group"
                );
                for started in &mut self.watchers[..index] {
                    started.stop();
                }
                return Err(e);
            }
        }
        info!(count = self.watchers.len(), "All watchers started");
        Ok(())
    }

    /// Stop every watcher.
    pub fn stop(&mut self) {
        for watcher in &mut self.watchers {
            watcher.stop();
        }
    }

    /// Number of watchers in the group.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether the group has no watchers.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Number of watchers with a live subscription.
    pub fn active_count(&self) -> usize {
        self.watchers.iter().filter(|w| w.is_active()).count()
    }
}
