//! Queued audit event.

use crate::{AuditEventId, ChangeKind, RawChange};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A normalized filesystem change awaiting attribution.
///
/// Fields are private so an event cannot be edited after capture; later
/// stages derive new values from it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    id: AuditEventId,
    timestamp: DateTime<Local>,
    full_path: PathBuf,
    directory: PathBuf,
    file_name: String,
    change_kind: ChangeKind,
    previous_path: Option<PathBuf>,
}

impl AuditEvent {
    /// Build an event for `full_path`, captured at `timestamp`.
    pub fn new(full_path: impl Into<PathBuf>, change_kind: ChangeKind, timestamp: DateTime<Local>) -> Self {
        let full_path = full_path.into();
        let directory = full_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: AuditEventId::new(),
            timestamp,
            full_path,
            directory,
            file_name,
            change_kind,
            previous_path: None,
        }
    }

    /// Build an event from a raw change.
    pub fn from_raw(raw: RawChange, timestamp: DateTime<Local>) -> Self {
        let RawChange {
            kind,
            path,
            previous_path,
        } = raw;
        Self {
            previous_path,
            ..Self::new(path, kind, timestamp)
        }
    }

    /// Event identity.
    pub fn id(&self) -> AuditEventId {
        self.id
    }

    /// Capture time.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Absolute path of the affected file.
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Containing directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Change kind.
    pub fn change_kind(&self) -> ChangeKind {
        self.change_kind
    }

    /// Path before a rename, when the OS reported it.
    pub fn previous_path(&self) -> Option<&Path> {
        self.previous_path.as_deref()
    }
}
