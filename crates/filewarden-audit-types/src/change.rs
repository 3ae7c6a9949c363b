//! Canonical change kinds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

/// Normalized kind of a filesystem change.
///
/// The display form is what appears after `Access Type:` in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A file was created.
    Created,
    /// File content or metadata changed.
    #[strum(to_string = "Changed", serialize = "Modified")]
    Modified,
    /// A file was removed.
    Deleted,
    /// A file was renamed or moved.
    Renamed,
    /// Access or any change the OS could not classify.
    Other,
}

impl ChangeKind {
    /// Get all kinds.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }
}

/// A change as reported by the OS layer, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Change kind.
    pub kind: ChangeKind,
    /// Absolute path of the affected file (the new path for renames).
    pub path: PathBuf,
    /// Previous path, for renames only.
    pub previous_path: Option<PathBuf>,
}

impl RawChange {
    /// Create a change with no previous path.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            previous_path: None,
        }
    }

    /// Create a rename from `from` to `to`.
    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            path: to.into(),
            previous_path: Some(from.into()),
        }
    }
}
