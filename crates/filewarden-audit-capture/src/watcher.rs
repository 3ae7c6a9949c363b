//! One native subscription for one directory tree.

use crate::normalize::{ChangeMapper, FileFilter, Normalizer};
use crate::{ErrorCallback, EventSink};
use chrono::{DateTime, Local};
use filewarden_audit_types::RawChange;
use filewarden_common_core::AuditError;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-watcher settings.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// File name glob.
    pub filter: String,
    /// Watch subdirectories.
    pub recursive: bool,
    /// Raw changes buffered between the OS callback and normalization.
    /// Changes arriving while the buffer is full are dropped and reported.
    pub buffer_size: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            filter: "*.*".to_string(),
            recursive: true,
            buffer_size: 8192,
        }
    }
}

struct Captured {
    at: DateTime<Local>,
    raw: RawChange,
}

struct ActiveWatch {
    watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
}

/// Watches one root directory and delivers normalized events to a sink.
pub struct DirectoryWatcher {
    root: PathBuf,
    options: WatchOptions,
    normalizer: Arc<Normalizer>,
    sink: Arc<dyn EventSink>,
    on_error: ErrorCallback,
    active: Option<ActiveWatch>,
}

impl DirectoryWatcher {
    /// Create a watcher. Fails if `root` is not an existing directory or the
    /// filter is not a valid glob.
    pub fn new(
        root: impl Into<PathBuf>,
        options: WatchOptions,
        sink: Arc<dyn EventSink>,
        on_error: ErrorCallback,
    ) -> Result<Self, AuditError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AuditError::configuration(format!(
                "monitored directory does not exist: {}",
                root.display()
            )));
        }
        if options.buffer_size == 0 {
            return Err(AuditError::configuration("notification buffer size must be greater than 0"));
        }

        let normalizer = Arc::new(Normalizer::new(FileFilter::new(&options.filter)?));

        Ok(Self {
            root,
            options,
            normalizer,
            sink,
            on_error,
            active: None,
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a subscription is live.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Subscribe and begin delivering events. Calling it on an active
    /// watcher does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), AuditError> {
        if self.active.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AuditError::configuration_with("watcher started outside a Tokio runtime", e))?;

        let (tx, rx) = mpsc::channel::<Captured>(self.options.buffer_size);
        let callback_root = self.root.clone();
        let callback_error = self.on_error.clone();

        let mut mapper = ChangeMapper::new();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            handle_notification(res, &mut mapper, &tx, &callback_root, &callback_error);
        })
        .map_err(|e| AuditError::watch_subscription(&self.root, e))?;

        let mode = if self.options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&self.root, mode)
            .map_err(|e| AuditError::watch_subscription(&self.root, e))?;

        let pump = runtime.spawn(pump(rx, self.normalizer.clone(), self.sink.clone()));

        info!(
            root = %self.root.display(),
            filter = %self.options.filter,
            recursive = self.options.recursive,
            buffer_size = self.options.buffer_size,
            "Monitoring directory"
        );
        self.active = Some(ActiveWatch { watcher, pump });
        Ok(())
    }

    /// Unsubscribe. Changes already buffered are still delivered. Calling
    /// it on an inactive watcher does nothing.
    pub fn stop(&mut self) {
        let Some(ActiveWatch { mut watcher, pump }) = self.active.take() else {
            return;
        };

        if let Err(e) = watcher.unwatch(&self.root) {
            (self.on_error)(AuditError::notification_delivery_with(
                &self.root,
                "failed to unsubscribe",
                e,
            ));
        }
        // Dropping the watcher drops the channel sender; the pump drains
        // what is buffered and exits on its own.
        drop(watcher);
        drop(pump);

        info!(root = %self.root.display(), "Stopped monitoring directory");
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_notification(
    res: notify::Result<Event>,
    mapper: &mut ChangeMapper,
    tx: &mpsc::Sender<Captured>,
    root: &Path,
    on_error: &ErrorCallback,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            on_error(AuditError::notification_delivery_with(root, "watcher error", e));
            return;
        }
    };

    if event.need_rescan() {
        on_error(AuditError::notification_delivery(
            root,
            "OS notification buffer overflowed; changes were lost",
        ));
    }

    let at = Local::now();
    for raw in mapper.map(&event) {
        match tx.try_send(Captured { at, raw }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                on_error(AuditError::notification_delivery(
                    root,
                    format!(
                        "notification buffer full, dropped change for {}",
                        dropped.raw.path.display()
                    ),
                ));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(root = %root.display(), "Change arrived after watcher stopped");
            }
        }
    }
}

async fn pump(
    mut rx: mpsc::Receiver<Captured>,
    normalizer: Arc<Normalizer>,
    sink: Arc<dyn EventSink>,
) {
    while let Some(Captured { at, raw }) = rx.recv().await {
        let path = raw.path.clone();
        match normalizer.normalize(raw, at, Path::is_file) {
            Some(event) => sink.deliver(event),
            None => debug!(path = %path.display(), "Change suppressed"),
        }
    }
}
