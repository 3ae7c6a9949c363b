//! Configuration types for Filewarden.
//!
//! Settings are read once at startup from `filewarden.<environment>.yaml`,
//! overlaid with `FILEWARDEN_*` environment variables and validated into an
//! immutable [`FilewardenConfig`].

pub mod types;
pub mod loader;
pub mod env;

pub use types::*;
pub use loader::*;
pub use env::*;
