//! Daily audit log files.

use chrono::{DateTime, Local};
use filewarden_audit_types::AuditRecord;
use filewarden_common_core::AuditError;
use filewarden_common_log::DiagnosticSink;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Timestamp layout inside a log line, e.g. `3/14/2024 9:05:07 AM`.
pub const TIMESTAMP_FORMAT: &str = "%-m/%-d/%Y %-I:%M:%S %p";

/// Terminator appended to every line.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// Terminator appended to every line.
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Log file name for the day of `timestamp`: `audit_<DDMMYYYY>.txt`.
pub fn file_name_for(timestamp: &DateTime<Local>) -> String {
    format!("audit_{}.txt", timestamp.format("%d%m%Y"))
}

/// One log line, without terminator.
pub fn format_line(record: &AuditRecord) -> String {
    format!(
        "Detected: Timestamp: {} User: {} Process ID: {} Access Type: {}",
        record.timestamp.format(TIMESTAMP_FORMAT),
        record.user,
        record.process_id,
        record.access_type
    )
}

/// Appends attributed records to `audit_<DDMMYYYY>.txt` in the output
/// directory. Appends from concurrent tasks are serialized.
pub struct AuditWriter {
    output_dir: PathBuf,
    sink: Arc<dyn DiagnosticSink>,
    append_lock: Mutex<()>,
}

impl AuditWriter {
    /// Create a writer. The directory must already exist.
    pub fn new(output_dir: impl Into<PathBuf>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sink,
            append_lock: Mutex::new(()),
        }
    }

    /// File that `record` belongs in.
    pub fn path_for(&self, record: &AuditRecord) -> PathBuf {
        self.output_dir.join(file_name_for(&record.timestamp))
    }

    /// Append `record` and mirror the line to the diagnostic sink.
    ///
    /// Unresolved records are discarded; returns whether a line was written.
    pub async fn append(&self, record: &AuditRecord) -> Result<bool, AuditError> {
        if !record.is_resolved() {
            return Ok(false);
        }

        let path = self.path_for(record);
        let line = format_line(record);
        let mut bytes = line.clone().into_bytes();
        bytes.extend_from_slice(LINE_ENDING.as_bytes());

        {
            let _guard = self.append_lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| AuditError::write(&path, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| AuditError::write(&path, e))?;
            file.flush().await.map_err(|e| AuditError::write(&path, e))?;
        }

        self.sink.info(&line);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use filewarden_audit_types::{Attribution, AuditEvent, ChangeKind};
    use filewarden_test_utils::{temp_dir, RecordingSink};
    use test_case::test_case;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, s).single().unwrap()
    }

    fn record(timestamp: DateTime<Local>, pid: u32, user: &str) -> AuditRecord {
        let event = AuditEvent::new("/srv/share/report.docx", ChangeKind::Modified, timestamp);
        AuditRecord::from_event(&event, Attribution::resolved(pid, user))
    }

    #[test]
    fn test_file_name_uses_day_month_year() {
        assert_eq!(file_name_for(&at(2024, 3, 7, 23, 59, 0)), "audit_07032024.txt");
    }

    #[test]
    fn test_line_layout() {
        let line = format_line(&record(at(2024, 3, 14, 9, 5, 7), 4821, r"CORP\bob"));
        assert_eq!(
            line,
            r"Detected: Timestamp: 3/14/2024 9:05:07 AM User: CORP\bob Process ID: 4821 Access Type: Changed"
        );
    }

    #[test_case(at(2024, 12, 1, 15, 30, 0), "12/1/2024 3:30:00 PM" ; "afternoon")]
    #[test_case(at(2024, 1, 9, 0, 4, 5), "1/9/2024 12:04:05 AM" ; "just after midnight")]
    #[test_case(at(2024, 6, 30, 12, 0, 0), "6/30/2024 12:00:00 PM" ; "noon")]
    fn test_twelve_hour_clock(timestamp: DateTime<Local>, expected: &str) {
        let line = format_line(&record(timestamp, 1, "a"));
        assert!(line.contains(&format!("Timestamp: {expected} User: ")));
    }

    #[tokio::test]
    async fn test_append_creates_and_extends_file() {
        let dir = temp_dir();
        let sink = Arc::new(RecordingSink::new());
        let writer = AuditWriter::new(dir.path(), sink.clone());
        let first = record(at(2024, 3, 14, 9, 0, 0), 10, "alice");
        let second = record(at(2024, 3, 14, 10, 0, 0), 11, "bob");

        assert!(writer.append(&first).await.unwrap());
        assert!(writer.append(&second).await.unwrap());

        let content = std::fs::read_to_string(dir.path().join("audit_14032024.txt")).unwrap();
        let expected = format!(
            "{}{LINE_ENDING}{}{LINE_ENDING}",
            format_line(&first),
            format_line(&second)
        );
        assert_eq!(content, expected);
        assert_eq!(sink.infos(), vec![format_line(&first), format_line(&second)]);
    }

    #[tokio::test]
    async fn test_unresolved_record_is_discarded() {
        let dir = temp_dir();
        let writer = AuditWriter::new(dir.path(), Arc::new(RecordingSink::new()));
        let event = AuditEvent::new("/srv/a.txt", ChangeKind::Created, Local::now());
        let unresolved = AuditRecord::from_event(&event, Attribution::Unresolved);

        assert!(!writer.append(&unresolved).await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_write_error() {
        let dir = temp_dir();
        let writer = AuditWriter::new(dir.path().join("missing"), Arc::new(RecordingSink::new()));
        let err = writer
            .append(&record(Local::now(), 5, "carol"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "write");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = temp_dir();
        let writer = Arc::new(AuditWriter::new(dir.path(), Arc::new(RecordingSink::new())));
        let timestamp = at(2024, 5, 2, 8, 0, 0);

        let mut handles = Vec::new();
        for pid in 1..=50u32 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer.append(&record(timestamp, pid, "load")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("audit_02052024.txt")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 50);
        assert!(lines.iter().all(|l| l.starts_with("Detected: Timestamp: 5/2/2024 8:00:00 AM User: load Process ID: ")));
    }
}
