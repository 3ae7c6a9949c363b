//! Service lifecycle.

use crate::dispatch::{self, Pipeline};
use crate::shutdown::ShutdownSignal;
use crate::writer::AuditWriter;
use filewarden_audit_attribution::{ExternalHandleTool, ProcFsTable, ProcessAttributor};
use filewarden_audit_capture::{ErrorCallback, EventQueue, WatchOptions, WatcherGroup};
use filewarden_common_config::AuditorSettings;
use filewarden_common_core::AuditError;
use filewarden_common_log::DiagnosticSink;
use std::sync::Arc;
use strum::Display;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Everything that exists only while running. Rebuilt on every start.
struct Active {
    group: WatcherGroup,
    shutdown: ShutdownSignal,
    dispatch: JoinHandle<usize>,
}

/// Watches the configured directories and logs attributed changes.
pub struct AuditService {
    settings: AuditorSettings,
    attributor: ProcessAttributor,
    sink: Arc<dyn DiagnosticSink>,
    state: ServiceState,
    active: Option<Active>,
}

impl AuditService {
    /// Create a service with the default strategies: the configured handle
    /// tool, if any, then the local process table.
    pub fn new(settings: AuditorSettings, sink: Arc<dyn DiagnosticSink>) -> Self {
        let attributor = default_attributor(&settings, sink.clone());
        Self::with_attributor(settings, attributor, sink)
    }

    /// Create a service with a custom attributor.
    pub fn with_attributor(
        settings: AuditorSettings,
        attributor: ProcessAttributor,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            settings,
            attributor,
            sink,
            state: ServiceState::Stopped,
            active: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Number of live directory subscriptions.
    pub fn active_watchers(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.group.active_count())
    }

    /// Validate settings, start watching and launch the dispatch loop.
    ///
    /// Does nothing when already running. On failure the service is left
    /// `Stopped` with no subscriptions.
    pub async fn start(&mut self) -> Result<(), AuditError> {
        if self.state == ServiceState::Running {
            debug!("Audit service already running");
            return Ok(());
        }

        self.state = ServiceState::Starting;
        match self.launch().await {
            Ok(active) => {
                self.active = Some(active);
                self.state = ServiceState::Running;
                info!(
                    directories = self.settings.input_directories.len(),
                    output = %self.settings.output_directory.display(),
                    "Audit service running"
                );
                Ok(())
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Audit service failed to start");
                self.state = ServiceState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<Active, AuditError> {
        self.settings
            .validate()
            .map_err(|e| AuditError::configuration_with("invalid auditor settings", e))?;

        let output = &self.settings.output_directory;
        tokio::fs::create_dir_all(output).await.map_err(|e| {
            AuditError::configuration_with(
                format!("cannot create output directory {}", output.display()),
                e,
            )
        })?;

        let options = WatchOptions {
            filter: self.settings.filter.clone(),
            recursive: self.settings.include_subdirectories,
            buffer_size: self.settings.internal_buffer_size,
        };
        let (queue, events) = EventQueue::new();
        let mut group = WatcherGroup::new(
            self.settings.input_directories.iter().cloned(),
            &options,
            Arc::new(queue),
            report_to(self.sink.clone()),
        )?;
        group.start()?;

        let pipeline = Pipeline::new(
            self.attributor.clone(),
            AuditWriter::new(output.clone(), self.sink.clone()),
            self.sink.clone(),
        );
        let shutdown = ShutdownSignal::new();
        let dispatch = tokio::spawn(dispatch::run(
            events,
            shutdown.subscribe(),
            Arc::new(pipeline),
        ));

        Ok(Active {
            group,
            shutdown,
            dispatch,
        })
    }

    /// Stop watching and end the dispatch loop. Events already dispatched
    /// finish in the background.
    pub async fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            self.state = ServiceState::Stopped;
            return;
        };

        self.state = ServiceState::Stopping;
        active.group.stop();
        active.shutdown.trigger();
        match active.dispatch.await {
            Ok(dispatched) => debug!(dispatched, "Dispatch loop joined"),
            Err(e) => warn!(error = %e, "Dispatch loop ended abnormally"),
        }

        self.state = ServiceState::Stopped;
        info!("Audit service stopped");
    }
}

fn default_attributor(
    settings: &AuditorSettings,
    sink: Arc<dyn DiagnosticSink>,
) -> ProcessAttributor {
    let attributor = ProcessAttributor::new(Arc::new(ProcFsTable::new()), sink);
    match &settings.handle_executable_path {
        Some(executable) => attributor.with_tool(Arc::new(
            ExternalHandleTool::new(executable).with_timeout(settings.handle_timeout()),
        )),
        None => attributor,
    }
}

fn report_to(sink: Arc<dyn DiagnosticSink>) -> ErrorCallback {
    Arc::new(move |e: AuditError| {
        warn!(kind = e.kind(), error = %e, "Watcher reported an error");
        sink.report(&e);
    })
}
