//! Attribution results and audit log records.

use crate::AuditEvent;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process identifier as written to the audit log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(i64);

impl ProcessId {
    /// Sentinel meaning no strategy produced a process.
    pub const UNRESOLVED: Self = Self(-1);

    /// Wrap a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Only positive identifiers count as resolved.
    pub fn is_resolved(&self) -> bool {
        self.0 > 0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        Self(i64::from(pid))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

/// Outcome of attributing one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    /// A process and account were found.
    Resolved { process_id: ProcessId, user: String },
    /// No strategy produced a valid pair.
    Unresolved,
}

impl Attribution {
    /// Create a resolved attribution.
    pub fn resolved(process_id: impl Into<ProcessId>, user: impl Into<String>) -> Self {
        Self::Resolved {
            process_id: process_id.into(),
            user: user.into(),
        }
    }

    /// True only for a positive process id.
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Resolved { process_id, .. } => process_id.is_resolved(),
            Self::Unresolved => false,
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Capture time of the originating event.
    pub timestamp: DateTime<Local>,
    /// String form of the change kind.
    pub access_type: String,
    /// Owning process, or [`ProcessId::UNRESOLVED`].
    pub process_id: ProcessId,
    /// Owning account; empty when unresolved.
    pub user: String,
}

impl AuditRecord {
    /// Combine an event with its attribution.
    pub fn from_event(event: &AuditEvent, attribution: Attribution) -> Self {
        let (process_id, user) = match attribution {
            Attribution::Resolved { process_id, user } => (process_id, user),
            Attribution::Unresolved => (ProcessId::UNRESOLVED, String::new()),
        };

        Self {
            timestamp: event.timestamp(),
            access_type: event.change_kind().to_string(),
            process_id,
            user,
        }
    }

    /// Whether the record may be written to the audit log.
    pub fn is_resolved(&self) -> bool {
        self.process_id.is_resolved()
    }
}
