//! Process attribution for Filewarden.
//!
//! Two strategies are tried in order for every event:
//!
//! 1. [`HandleTool`]: an external handle-enumeration executable whose output
//!    is parsed by [`parse_handle_output`]
//! 2. [`ProcessTable`]: a scan of running processes whose command line
//!    mentions the file name
//!
//! [`ProcessAttributor`] owns the ordering and the error reporting.

mod attributor;
pub mod process_table;
pub mod tool;

pub use attributor::ProcessAttributor;
pub use process_table::{OwnerLookup, ProcFsTable, ProcessEntry, ProcessTable};
pub use tool::{parse_handle_output, ExternalHandleTool, HandleTool};

// Re-export types for convenience
pub use filewarden_audit_types::{Attribution, ProcessId};
