//! User-facing output of the incremental core.
//!
//! Two channels share one [`DiagnosticSink`]:
//! - [`Diagnostics`] carries warnings, e.g. a prior graph that could not be read.
//! - [`Reporter`] carries incremental-build remarks. It only exists when the
//!   user asked to see incremental decisions, so callers hold an
//!   `Option<Reporter>` and must behave identically either way.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// Prefix of every reporter remark.
pub const REPORT_PREFIX: &str = "Incremental compilation: ";

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Remark,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Remark => "remark",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// A single message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Where diagnostics go.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Messages of the given severity.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.diagnostics
            .lock()
            .iter()
            .filter(|diagnostic| diagnostic.severity == severity)
            .map(|diagnostic| diagnostic.message.clone())
            .collect()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Remark => tracing::info!(target: "ori_incremental", "{}", diagnostic.message),
            Severity::Warning => tracing::warn!(target: "ori_incremental", "{}", diagnostic.message),
            Severity::Error => tracing::error!(target: "ori_incremental", "{}", diagnostic.message),
        }
    }
}

/// The diagnostics engine: warnings and errors.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.sink.emit(Diagnostic::new(Severity::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.sink.emit(Diagnostic::new(Severity::Error, message));
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Diagnostics")
    }
}

/// Incremental-build remarks.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn DiagnosticSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    /// Emit `message` as a remark.
    pub fn report(&self, message: &str) {
        self.sink
            .emit(Diagnostic::new(Severity::Remark, format!("{REPORT_PREFIX}{message}")));
    }

    /// Emit `message` about `path`.
    pub fn report_path(&self, message: &str, path: &Path) {
        self.report(&format!("{message} {{{}}}", path.display()));
    }

    /// Announce that this build will not be incremental.
    pub fn report_disabling_incremental_build(&self, reason: &str) {
        self.report(&format!("Disabling incremental build: {reason}"));
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reporter")
    }
}
