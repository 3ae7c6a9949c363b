//! Ordered attribution strategies.

use crate::process_table::ProcessTable;
use crate::tool::{parse_handle_output, HandleTool};
use filewarden_audit_types::{Attribution, AuditEvent, ProcessId};
use filewarden_common_core::AuditError;
use filewarden_common_log::DiagnosticSink;
use std::sync::Arc;
use tracing::debug;

/// Resolves which process and account touched a file.
///
/// Strategy errors are reported to the diagnostic sink and degrade to
/// [`Attribution::Unresolved`]; [`attribute`](Self::attribute) never fails.
#[derive(Clone)]
pub struct ProcessAttributor {
    tool: Option<Arc<dyn HandleTool>>,
    table: Arc<dyn ProcessTable>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ProcessAttributor {
    /// Attributor using only the process table.
    pub fn new(table: Arc<dyn ProcessTable>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            tool: None,
            table,
            sink,
        }
    }

    /// Try `tool` before the process table.
    pub fn with_tool(mut self, tool: Arc<dyn HandleTool>) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Whether an external tool is configured.
    pub fn has_tool(&self) -> bool {
        self.tool.is_some()
    }

    /// Attribute `event`. The process table is consulted only when the tool
    /// is absent or did not resolve the event.
    pub async fn attribute(&self, event: &AuditEvent) -> Attribution {
        if let Some(tool) = &self.tool {
            let attribution = self.query_tool(tool.as_ref(), event).await;
            if attribution.is_resolved() {
                debug!(event_id = %event.id(), "Attributed by handle tool");
                return attribution;
            }
        }

        let attribution = self.query_process_table(event).await;
        debug!(
            event_id = %event.id(),
            resolved = attribution.is_resolved(),
            "Process table attribution finished"
        );
        attribution
    }

    async fn query_tool(&self, tool: &dyn HandleTool, event: &AuditEvent) -> Attribution {
        let full_path = event.full_path().to_string_lossy();
        match tool.query(event.full_path()).await {
            Ok(output) => parse_handle_output(&output, &full_path),
            Err(e) => {
                self.sink.error(&format!("Error Path: {full_path}"));
                self.sink.report(&e);
                Attribution::Unresolved
            }
        }
    }

    async fn query_process_table(&self, event: &AuditEvent) -> Attribution {
        let table = self.table.clone();
        let needle = event.file_name().to_string();

        let scan = tokio::task::spawn_blocking(move || scan_table(table.as_ref(), &needle)).await;
        let result = scan.unwrap_or_else(|e| {
            Err(ScanError {
                query: format!("process table scan for '{}'", event.file_name()),
                error: AuditError::attribution_with("process table scan aborted", e),
            })
        });

        match result {
            Ok(attribution) => attribution,
            Err(ScanError { query, error }) => {
                self.sink.error(&format!("Error Query: {query}"));
                self.sink.report(&error);
                Attribution::Unresolved
            }
        }
    }
}

struct ScanError {
    query: String,
    error: AuditError,
}

/// First process whose owner fully resolves wins.
fn scan_table(table: &dyn ProcessTable, needle: &str) -> Result<Attribution, ScanError> {
    let candidates = table.find_by_command_line(needle).map_err(|error| ScanError {
        query: table.describe_query(needle),
        error,
    })?;

    for candidate in candidates {
        match table.owner_of(candidate.pid).owner() {
            Some(owner) => {
                return Ok(Attribution::resolved(ProcessId::from(candidate.pid), owner));
            }
            None => debug!(pid = candidate.pid, "Owner lookup incomplete, skipping"),
        }
    }
    Ok(Attribution::Unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_table::{MockProcessTable, OwnerLookup, ProcessEntry};
    use async_trait::async_trait;
    use chrono::Local;
    use filewarden_audit_types::ChangeKind;
    use filewarden_test_utils::RecordingSink;
    use mockall::predicate::eq;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTool {
        output: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FakeTool {
        fn returning(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: Ok(output.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                output: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HandleTool for FakeTool {
        async fn query(&self, _path: &Path) -> Result<String, AuditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output.clone().map_err(AuditError::attribution)
        }
    }

    fn entry(pid: u32) -> ProcessEntry {
        ProcessEntry {
            pid,
            command_line: format!("editor /srv/share/report.docx #{pid}"),
        }
    }

    fn success(account: &str) -> OwnerLookup {
        OwnerLookup::Success {
            domain: Some("fileserver".into()),
            account: Some(account.into()),
        }
    }

    fn report_event() -> AuditEvent {
        AuditEvent::new("/srv/share/report.docx", ChangeKind::Modified, Local::now())
    }

    #[tokio::test]
    async fn test_tool_result_skips_process_table() {
        let mut table = MockProcessTable::new();
        table.expect_find_by_command_line().times(0);
        let sink = Arc::new(RecordingSink::new());
        let tool = FakeTool::returning("pid: 4821 type: File CORP\\bob 1A4: /srv/share/report.docx\n");

        let attributor = ProcessAttributor::new(Arc::new(table), sink.clone()).with_tool(tool.clone());
        let attribution = attributor.attribute(&report_event()).await;

        assert_eq!(attribution, Attribution::resolved(4821u32, "CORP\\bob"));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_tool_falls_back() {
        let mut table = MockProcessTable::new();
        table
            .expect_find_by_command_line()
            .withf(|needle| needle == "report.docx")
            .times(1)
            .returning(|_| Ok(vec![entry(900)]));
        table
            .expect_owner_of()
            .with(eq(900))
            .returning(|_| success("bob"));
        let sink = Arc::new(RecordingSink::new());
        let tool = FakeTool::returning("No matching handles found.\n");

        let attributor = ProcessAttributor::new(Arc::new(table), sink.clone()).with_tool(tool);
        let attribution = attributor.attribute(&report_event()).await;

        assert_eq!(attribution, Attribution::resolved(900u32, "fileserver\\bob"));
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_then_falls_back() {
        let mut table = MockProcessTable::new();
        table
            .expect_find_by_command_line()
            .times(1)
            .returning(|_| Ok(vec![entry(55)]));
        table.expect_owner_of().returning(|_| success("carol"));
        let sink = Arc::new(RecordingSink::new());
        let tool = FakeTool::failing("handle.exe not found");

        let attributor = ProcessAttributor::new(Arc::new(table), sink.clone()).with_tool(tool);
        let attribution = attributor.attribute(&report_event()).await;

        assert_eq!(attribution, Attribution::resolved(55u32, "fileserver\\carol"));
        let errors = sink.errors();
        assert_eq!(errors[0], "Error Path: /srv/share/report.docx");
        assert!(errors[1].starts_with("Message: attribution failed: handle.exe not found"));
    }

    #[tokio::test]
    async fn test_incomplete_owner_is_skipped() {
        let mut table = MockProcessTable::new();
        table
            .expect_find_by_command_line()
            .returning(|_| Ok(vec![entry(10), entry(11), entry(12)]));
        table
            .expect_owner_of()
            .with(eq(10))
            .returning(|_| OwnerLookup::Failed { code: 13 });
        table.expect_owner_of().with(eq(11)).returning(|_| OwnerLookup::Success {
            domain: None,
            account: Some("dave".into()),
        });
        table
            .expect_owner_of()
            .with(eq(12))
            .returning(|_| success("erin"));
        let sink = Arc::new(RecordingSink::new());

        let attributor = ProcessAttributor::new(Arc::new(table), sink);
        let attribution = attributor.attribute(&report_event()).await;

        assert_eq!(attribution, Attribution::resolved(12u32, "fileserver\\erin"));
    }

    #[tokio::test]
    async fn test_first_resolved_process_wins() {
        let mut table = MockProcessTable::new();
        table
            .expect_find_by_command_line()
            .returning(|_| Ok(vec![entry(20), entry(21)]));
        table
            .expect_owner_of()
            .with(eq(20))
            .times(1)
            .returning(|_| success("frank"));
        table.expect_owner_of().with(eq(21)).times(0);

        let attributor = ProcessAttributor::new(Arc::new(table), Arc::new(RecordingSink::new()));
        assert_eq!(
            attributor.attribute(&report_event()).await,
            Attribution::resolved(20u32, "fileserver\\frank")
        );
    }

    #[tokio::test]
    async fn test_table_error_is_reported_as_unresolved() {
        let mut table = MockProcessTable::new();
        table
            .expect_find_by_command_line()
            .returning(|_| Err(AuditError::attribution("access denied")));
        table
            .expect_describe_query()
            .returning(|needle| format!("cmdline contains '{needle}'"));
        let sink = Arc::new(RecordingSink::new());

        let attributor = ProcessAttributor::new(Arc::new(table), sink.clone());
        let attribution = attributor.attribute(&report_event()).await;

        assert_eq!(attribution, Attribution::Unresolved);
        assert_eq!(sink.errors()[0], "Error Query: cmdline contains 'report.docx'");
        assert!(sink.has_error_containing("access denied"));
    }

    #[tokio::test]
    async fn test_no_candidates_is_unresolved() {
        let mut table = MockProcessTable::new();
        table.expect_find_by_command_line().returning(|_| Ok(Vec::new()));
        let sink = Arc::new(RecordingSink::new());

        let attributor = ProcessAttributor::new(Arc::new(table), sink.clone());
        assert!(!attributor.has_tool());
        assert_eq!(attributor.attribute(&report_event()).await, Attribution::Unresolved);
        assert!(sink.errors().is_empty());
    }
}
