//! Filewarden common core types.

pub mod error;

pub use error::{AuditError, BoxError, Result};
