//! Diagnostics sink shared by every pipeline stage.
//!
//! The pipeline never writes files or prints; everything a caller needs to
//! explain an outcome ("why was this selector not repaired?") lands here as
//! an ordered list of `{code, level, message}` records.

use serde::{Deserialize, Serialize};

/// Stable diagnostic codes emitted by the pipeline.
pub mod codes {
    /// A locator expression failed the allowlist or the parser
    pub const EXPRESSION_REJECTED: &str = "locator_expression_rejected";
    /// Snapshot lines that could not be parsed were skipped
    pub const SNAPSHOT_LINES_SKIPPED: &str = "snapshot_lines_skipped";
    /// Snapshot capture failed; snapshot candidates were skipped
    pub const SNAPSHOT_CAPTURE_FAILED: &str = "snapshot_capture_failed";
    /// Accessibility probe of an element failed
    pub const PROBE_FAILED: &str = "selector_probe_failed";
    /// Runtime match count/visibility probe failed
    pub const RUNTIME_RESOLUTION_FAILED: &str = "runtime_resolution_failed";
    /// Public repair tier disabled by policy
    pub const REPAIR_PUBLIC_DISABLED: &str = "selector_repair_public_disabled";
    /// Public repair tier not offered by the page
    pub const REPAIR_PUBLIC_UNAVAILABLE: &str = "selector_repair_public_unavailable";
    /// Internal repair tier disabled by policy
    pub const REPAIR_INTERNAL_DISABLED: &str = "selector_repair_internal_disabled";
    /// Internal repair tier not offered by the page
    pub const REPAIR_INTERNAL_UNAVAILABLE: &str = "selector_repair_internal_unavailable";
    /// Internal tier not attempted because the public tier produced a candidate
    pub const REPAIR_INTERNAL_NOT_NEEDED: &str = "selector_repair_internal_not_needed";
    /// Target did not match exactly one element, so it cannot be repaired
    pub const REPAIR_NON_UNIQUE: &str = "selector_repair_non_unique";
    /// Resolver returned nothing
    pub const REPAIR_NO_RESULT: &str = "selector_repair_no_result";
    /// Resolver output could not be converted into a locator expression
    pub const REPAIR_CONVERSION_FAILED: &str = "selector_repair_conversion_failed";
    /// Resolver call failed
    pub const REPAIR_RESOLVER_FAILED: &str = "selector_repair_resolver_failed";
    /// A better selector was recommended
    pub const SELECTOR_RECOMMENDED: &str = "selector_recommended";
    /// A recommended selector was written into the output steps
    pub const SELECTOR_APPLIED: &str = "selector_applied";
    /// A recommendation could not be applied and stays report-only
    pub const SELECTOR_REPORT_ONLY: &str = "selector_report_only";
    /// Tie exception preferred a runtime-repair candidate
    pub const SELECTOR_TIE_REPAIR: &str = "selector_tie_runtime_repair";
    /// Replaying a step against the page failed
    pub const STEP_EXECUTION_FAILED: &str = "step_execution_failed";
    /// An assertion candidate was hard-filtered for dynamic content
    pub const ASSERTION_FILTERED_DYNAMIC: &str = "assertion_filtered_dynamic";
    /// An assertion candidate was dropped by a per-step cap
    pub const ASSERTION_CAPPED: &str = "assertion_capped";
    /// An assertion was inserted into the output steps
    pub const ASSERTION_APPLIED: &str = "assertion_applied";
    /// An assertion was force-applied to keep step coverage
    pub const ASSERTION_FORCED: &str = "assertion_forced_by_coverage";
    /// An assertion failed runtime validation
    pub const ASSERTION_RUNTIME_FAILED: &str = "assertion_runtime_failed";
    /// Network idle wait timed out before validating an assertion
    pub const NETWORK_IDLE_TIMEOUT: &str = "network_idle_timeout";
    /// Assertion validation impossible without a page
    pub const ASSERTION_NO_PAGE: &str = "assertion_validation_unavailable";
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Informational
    Info,
    /// Degraded, processing continued
    Warn,
    /// Something failed outright
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable machine-readable code
    pub code: String,
    /// Severity
    pub level: DiagnosticLevel,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Create a new diagnostic
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        level: DiagnosticLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            level,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.code, self.message)
    }
}

/// Append-only diagnostics collector.
///
/// Passed by `&mut` through every stage; nothing is ever removed or
/// reordered once pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(
            code = %diagnostic.code,
            level = %diagnostic.level,
            "{}",
            diagnostic.message
        );
        self.entries.push(diagnostic);
    }

    /// Append an info diagnostic
    pub fn info(&mut self, code: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(code, DiagnosticLevel::Info, message));
    }

    /// Append a warning
    pub fn warn(&mut self, code: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(code, DiagnosticLevel::Warn, message));
    }

    /// Append an error
    pub fn error(&mut self, code: &str, message: impl Into<String>) {
        self.push(Diagnostic::new(code, DiagnosticLevel::Error, message));
    }

    /// All diagnostics in emission order
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of diagnostics
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any diagnostic carries `code`
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.entries.iter().any(|d| d.code == code)
    }

    /// Diagnostics with the given code
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |d| d.code == code)
    }

    /// Count of diagnostics at `level`
    #[must_use]
    pub fn count_level(&self, level: DiagnosticLevel) -> usize {
        self.entries.iter().filter(|d| d.level == level).count()
    }

    /// Consume into the underlying list
    #[must_use]
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
