//! Test utilities for Filewarden crates.

use filewarden_common_log::DiagnosticSink;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Creates a temporary directory that is cleaned up on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Writes `content` to `dir/name` and returns the full path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Polls `check` every 25ms until it yields a value or `timeout` elapses.
pub async fn wait_for<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Diagnostic sink that keeps every message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    infos: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Informational messages received so far.
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().expect("sink poisoned").clone()
    }

    /// Error messages received so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("sink poisoned").clone()
    }

    /// Whether any error message contains `needle`.
    pub fn has_error_containing(&self, needle: &str) -> bool {
        self.errors().iter().any(|m| m.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn info(&self, message: &str) {
        self.infos.lock().expect("sink poisoned").push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().expect("sink poisoned").push(message.to_string());
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(_) => panic!("Expected Err, got Ok"),
            Err(e) => e,
        }
    };
}
