//! Audit event types for Filewarden.
//!
//! [`RawChange`] is what the OS layer reports, [`AuditEvent`] is what the
//! queue carries, and [`AuditRecord`] is what the audit log receives.

mod change;
mod event;
mod id;
mod record;

pub use change::{ChangeKind, RawChange};
pub use event::AuditEvent;
pub use id::AuditEventId;
pub use record::{Attribution, AuditRecord, ProcessId};
