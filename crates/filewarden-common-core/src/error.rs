//! Error types for Filewarden.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boxed error used as the source of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error taxonomy shared by every stage of the audit pipeline.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Missing or invalid settings. Fatal to service start.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The OS refused a directory subscription.
    #[error("failed to watch {}", path.display())]
    WatchSubscription {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The OS reported a problem after subscription; the watcher keeps running.
    #[error("notification delivery failed for {}: {message}", path.display())]
    NotificationDelivery {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// An attribution strategy failed; the event degrades to unresolved.
    #[error("attribution failed: {context}")]
    Attribution {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Appending to the audit log failed.
    #[error("failed to append to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error caused by another error.
    pub fn configuration_with(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a subscription error for `path`.
    pub fn watch_subscription(path: impl AsRef<Path>, source: impl Into<BoxError>) -> Self {
        Self::WatchSubscription {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    /// Create a delivery error for `path`.
    pub fn notification_delivery(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::NotificationDelivery {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a delivery error for `path` caused by another error.
    pub fn notification_delivery_with(
        path: impl AsRef<Path>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::NotificationDelivery {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an attribution error.
    pub fn attribution(context: impl Into<String>) -> Self {
        Self::Attribution {
            context: context.into(),
            source: None,
        }
    }

    /// Create an attribution error caused by another error.
    pub fn attribution_with(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Attribution {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Create a write error for `path`.
    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Short name of the error class, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::WatchSubscription { .. } => "watch_subscription",
            Self::NotificationDelivery { .. } => "notification_delivery",
            Self::Attribution { .. } => "attribution",
            Self::Write { .. } => "write",
        }
    }

    /// Whether this error prevents the service from entering `Running`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::WatchSubscription { .. }
        )
    }
}

/// Result type alias using [`AuditError`].
pub type Result<T> = std::result::Result<T, AuditError>;
