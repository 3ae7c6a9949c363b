//! Normalization of raw OS notifications.
//!
//! Everything here is pure: the existence check is passed in, so the
//! suppression rules can be exercised without a real filesystem.

use chrono::{DateTime, Local};
use filewarden_audit_types::{AuditEvent, ChangeKind, RawChange};
use filewarden_common_core::AuditError;
use glob::{MatchOptions, Pattern};
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Office suites create lock files named `~$<document>` next to open files.
pub const LOCK_FILE_MARKER: &str = "~$";

/// Unpaired move origins kept before the oldest are forgotten.
const MAX_PENDING_MOVES: usize = 256;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// File name filter.
#[derive(Debug, Clone)]
pub enum FileFilter {
    /// Accept every file.
    All,
    /// Accept file names matching the glob.
    Glob(Pattern),
}

impl FileFilter {
    /// Parse a filter. `""`, `*` and `*.*` accept every file.
    pub fn new(pattern: &str) -> Result<Self, AuditError> {
        match pattern.trim() {
            "" | "*" | "*.*" => Ok(Self::All),
            other => Pattern::new(other).map(Self::Glob).map_err(|e| {
                AuditError::configuration_with(format!("invalid filter '{other}'"), e)
            }),
        }
    }

    /// Check the final component of `path`.
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::All => true,
            Self::Glob(pattern) => path
                .file_name()
                .map(|name| pattern.matches_with(&name.to_string_lossy(), MATCH_OPTIONS))
                .unwrap_or(false),
        }
    }
}

/// Applies the suppression rules and builds [`AuditEvent`]s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    filter: FileFilter,
}

impl Normalizer {
    /// Create a normalizer.
    pub fn new(filter: FileFilter) -> Self {
        Self { filter }
    }

    /// Turn a raw change into an event, or `None` if it is suppressed.
    ///
    /// Suppressed: lock-file artifacts, names rejected by the filter, and
    /// paths for which `exists` is false at normalization time.
    pub fn normalize(
        &self,
        raw: RawChange,
        captured_at: DateTime<Local>,
        exists: impl Fn(&Path) -> bool,
    ) -> Option<AuditEvent> {
        if is_lock_artifact(&raw.path) {
            return None;
        }
        if !self.filter.matches(&raw.path) {
            return None;
        }
        if !exists(&raw.path) {
            return None;
        }
        Some(AuditEvent::from_raw(raw, captured_at))
    }
}

/// Whether `path` is an office lock/temp artifact.
pub fn is_lock_artifact(path: &Path) -> bool {
    path.to_string_lossy().contains(LOCK_FILE_MARKER)
}

/// Maps notify events of one watcher to raw changes, reporting each move
/// exactly once.
///
/// A move surfaces from its `To` half. When a `From` with the same tracker
/// was seen, the change carries that origin as its previous path.
#[derive(Debug, Default)]
pub struct ChangeMapper {
    pending_moves: HashMap<usize, PathBuf>,
}

impl ChangeMapper {
    /// Create a mapper with no pending moves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one notify event.
    pub fn map(&mut self, event: &notify::Event) -> Vec<RawChange> {
        if let EventKind::Modify(ModifyKind::Name(mode)) = &event.kind {
            match (mode, event.attrs.tracker(), event.paths.as_slice()) {
                (RenameMode::From, Some(tracker), [from]) => {
                    if self.pending_moves.len() >= MAX_PENDING_MOVES {
                        self.pending_moves.clear();
                    }
                    self.pending_moves.insert(tracker, from.clone());
                }
                (RenameMode::To, Some(tracker), [to]) => {
                    if let Some(from) = self.pending_moves.remove(&tracker) {
                        return vec![RawChange::renamed(from, to)];
                    }
                }
                _ => {}
            }
        }
        raw_changes(event)
    }

    /// Number of move origins still waiting for their destination.
    pub fn pending_moves(&self) -> usize {
        self.pending_moves.len()
    }
}

/// Map one notify event to zero or more raw changes, without pairing.
///
/// `Both` events repeat a move already reported by its `To` half and yield
/// nothing.
pub fn raw_changes(event: &notify::Event) -> Vec<RawChange> {
    let paths = &event.paths;
    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => ChangeKind::Other,
    };

    paths.iter().map(|p| RawChange::new(kind, p)).collect()
}
