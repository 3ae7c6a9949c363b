//! Diagnostic sink used by the audit pipeline.

use std::error::Error;

/// Injected capability that receives operational diagnostics.
///
/// The pipeline never raises errors to a caller once running; everything is
/// routed here instead.
pub trait DiagnosticSink: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);

    /// Error message.
    fn error(&self, message: &str);

    /// Report an error together with every cause it wraps, outermost first.
    fn report(&self, error: &(dyn Error + 'static)) {
        for cause in cause_chain(error) {
            self.error(&format!("Message: {cause}\nTrace: {cause:?}"));
        }
    }
}

/// Iterate over `error` and each of its sources down to the root cause.
pub fn cause_chain<'a>(error: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(error), |&e| e.source())
}

/// Sink that forwards to the global `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new sink.
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn report(&self, error: &(dyn Error + 'static)) {
        for (depth, cause) in cause_chain(error).enumerate() {
            tracing::error!(depth, trace = ?cause, "Message: {cause}");
        }
    }
}
