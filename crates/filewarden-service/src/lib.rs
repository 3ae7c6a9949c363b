//! Filewarden audit service.
//!
//! [`AuditService`] wires the capture, attribution and logging stages
//! together:
//!
//! ```text
//! WatcherGroup ──▶ EventQueue ──▶ dispatch loop ──▶ task per event
//!                                                   ├─ ProcessAttributor
//!                                                   └─ AuditWriter
//! ```

pub mod dispatch;
mod service;
pub mod shutdown;
pub mod writer;

pub use dispatch::{Outcome, Pipeline};
pub use service::{AuditService, ServiceState};
pub use shutdown::{ShutdownListener, ShutdownSignal};
pub use writer::{file_name_for, format_line, AuditWriter};
