//! Dispatch loop: one task per queued event.

use crate::shutdown::ShutdownListener;
use crate::writer::AuditWriter;
use filewarden_audit_attribution::ProcessAttributor;
use filewarden_audit_capture::EventReceiver;
use filewarden_audit_types::{AuditEvent, AuditRecord};
use filewarden_common_log::DiagnosticSink;
use std::sync::Arc;
use tracing::{debug, info};

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A line was appended.
    Logged,
    /// Neither strategy attributed the event.
    Unresolved,
    /// The append failed and was reported.
    WriteFailed,
}

/// Attribution plus logging for a single event.
pub struct Pipeline {
    attributor: ProcessAttributor,
    writer: AuditWriter,
    sink: Arc<dyn DiagnosticSink>,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(
        attributor: ProcessAttributor,
        writer: AuditWriter,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            attributor,
            writer,
            sink,
        }
    }

    /// Attribute `event` and append its record when resolved.
    pub async fn process(&self, event: AuditEvent) -> Outcome {
        let attribution = self.attributor.attribute(&event).await;
        let record = AuditRecord::from_event(&event, attribution);
        if !record.is_resolved() {
            debug!(event_id = %event.id(), path = %event.full_path().display(), "Unresolved event discarded");
            return Outcome::Unresolved;
        }

        match self.writer.append(&record).await {
            Ok(_) => Outcome::Logged,
            Err(e) => {
                self.sink.report(&e);
                Outcome::WriteFailed
            }
        }
    }
}

/// Dequeue events until shutdown or until every producer is gone, spawning a
/// detached task for each. Returns the number of events dispatched.
///
/// Spawned tasks are not cancelled by shutdown.
pub async fn run(
    mut events: EventReceiver,
    mut shutdown: ShutdownListener,
    pipeline: Arc<Pipeline>,
) -> usize {
    let mut dispatched = 0;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            next = events.dequeue() => {
                let Some(event) = next else { break };
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline.process(event).await;
                });
                dispatched += 1;
            }
        }
    }
    info!(dispatched, pending = events.len(), "Dispatch loop stopped");
    dispatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownSignal;
    use async_trait::async_trait;
    use chrono::Local;
    use filewarden_audit_attribution::{HandleTool, OwnerLookup, ProcessEntry, ProcessTable};
    use filewarden_audit_capture::EventQueue;
    use filewarden_audit_types::ChangeKind;
    use filewarden_common_core::AuditError;
    use filewarden_test_utils::{temp_dir, RecordingSink};
    use std::path::Path;
    use std::time::Duration;

    struct EmptyTable;

    impl ProcessTable for EmptyTable {
        fn find_by_command_line(&self, _needle: &str) -> Result<Vec<ProcessEntry>, AuditError> {
            Ok(Vec::new())
        }

        fn owner_of(&self, _pid: u32) -> OwnerLookup {
            OwnerLookup::Failed { code: 1 }
        }
    }

    /// Claims every `*.docx` file for pid 7.
    struct DocxTool;

    #[async_trait]
    impl HandleTool for DocxTool {
        async fn query(&self, path: &Path) -> Result<String, AuditError> {
            if path.extension().is_some_and(|e| e == "docx") {
                Ok(format!("pid: 7 type: File CORP\\eve 4: {}\n", path.display()))
            } else {
                Ok(String::new())
            }
        }
    }

    fn pipeline(output: &Path, sink: Arc<RecordingSink>) -> Pipeline {
        let attributor = ProcessAttributor::new(Arc::new(EmptyTable), sink.clone())
            .with_tool(Arc::new(DocxTool));
        Pipeline::new(attributor, AuditWriter::new(output, sink.clone()), sink)
    }

    fn event(path: &str) -> AuditEvent {
        AuditEvent::new(path, ChangeKind::Created, Local::now())
    }

    #[tokio::test]
    async fn test_process_outcomes() {
        let dir = temp_dir();
        let sink = Arc::new(RecordingSink::new());
        let pipeline = pipeline(dir.path(), sink.clone());

        assert_eq!(pipeline.process(event("/srv/a.docx")).await, Outcome::Logged);
        assert_eq!(pipeline.process(event("/srv/a.txt")).await, Outcome::Unresolved);
        assert_eq!(sink.infos().len(), 1);
        assert!(sink.infos()[0].contains("User: CORP\\eve Process ID: 7 Access Type: Created"));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = temp_dir();
        let sink = Arc::new(RecordingSink::new());
        let pipeline = pipeline(&dir.path().join("gone"), sink.clone());

        assert_eq!(pipeline.process(event("/srv/a.docx")).await, Outcome::WriteFailed);
        assert!(sink.has_error_containing("failed to append"));
    }

    #[tokio::test]
    async fn test_loop_ends_on_shutdown() {
        let dir = temp_dir();
        let sink = Arc::new(RecordingSink::new());
        let (queue, rx) = EventQueue::new();
        let signal = ShutdownSignal::new();
        let handle = tokio::spawn(run(
            rx,
            signal.subscribe(),
            Arc::new(pipeline(dir.path(), sink)),
        ));

        queue.enqueue(event("/srv/a.docx"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.trigger();

        let dispatched = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stopped")
            .unwrap();
        assert_eq!(dispatched, 1);
    }

    #[tokio::test]
    async fn test_loop_ends_when_producers_gone() {
        let dir = temp_dir();
        let (queue, rx) = EventQueue::new();
        let signal = ShutdownSignal::new();
        queue.enqueue(event("/srv/a.txt"));
        queue.enqueue(event("/srv/b.txt"));
        drop(queue);

        let dispatched = run(
            rx,
            signal.subscribe(),
            Arc::new(pipeline(dir.path(), Arc::new(RecordingSink::new()))),
        )
        .await;
        assert_eq!(dispatched, 2);
    }
}
