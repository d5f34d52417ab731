//! Result and error types for the refine pipeline.

use thiserror::Error;

/// Result type for refine operations
pub type RefineResult<T> = Result<T, RefineError>;

/// Errors that can occur while refining a script
#[derive(Debug, Error)]
pub enum RefineError {
    /// A locator expression used a construct outside the allowlist
    #[error("Locator expression rejected: {construct} in `{text}`")]
    ExpressionRejected {
        /// Offending construct, e.g. "computed member access"
        construct: String,
        /// Source text of the offending fragment
        text: String,
    },

    /// A locator expression could not be parsed at all
    #[error("Locator expression syntax error at offset {offset}: {message}")]
    ExpressionSyntax {
        /// Error message
        message: String,
        /// Byte offset into the expression
        offset: usize,
    },

    /// A live probe against the page failed
    #[error("Probe failed: {message}")]
    Probe {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// The page handle does not offer a capability
    #[error("Capability not supported by page: {capability}")]
    Unsupported {
        /// Capability name
        capability: String,
    },

    /// Executing a step against the page failed
    #[error("Step execution failed: {message}")]
    StepFailed {
        /// Error message
        message: String,
    },

    /// The step sequence handed to a pass is malformed
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message
        message: String,
    },

    /// The page handle is unusable
    #[error("Page unavailable: {message}")]
    PageUnavailable {
        /// Error message
        message: String,
    },

    /// A selector could not be converted into a locator expression
    #[error("Selector conversion failed: {message}")]
    Conversion {
        /// Error message
        message: String,
    },

    /// Policy values are out of range or could not be compiled
    #[error("Invalid policy: {message}")]
    InvalidPolicy {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl RefineError {
    /// Create a rejection for a disallowed construct
    #[must_use]
    pub fn rejected(construct: impl Into<String>, text: impl Into<String>) -> Self {
        Self::ExpressionRejected {
            construct: construct.into(),
            text: text.into(),
        }
    }

    /// Create a syntax error
    #[must_use]
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::ExpressionSyntax {
            message: message.into(),
            offset,
        }
    }

    /// Create a probe error
    #[must_use]
    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe {
            message: message.into(),
        }
    }

    /// Create an unsupported-capability error
    #[must_use]
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    /// Create a step failure
    #[must_use]
    pub fn step_failed(message: impl Into<String>) -> Self {
        Self::StepFailed {
            message: message.into(),
        }
    }

    /// Create an invalid-input error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a conversion error
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Create an invalid-policy error
    #[must_use]
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }

    /// Whether this error came from a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_names_construct() {
        let err = RefineError::rejected("spread argument", "...args");
        let msg = err.to_string();
        assert!(msg.contains("spread argument"));
        assert!(msg.contains("...args"));
    }

    #[test]
    fn test_timeout_detection() {
        assert!(RefineError::Timeout { ms: 1500 }.is_timeout());
        assert!(!RefineError::probe("boom").is_timeout());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RefineError = io.into();
        assert!(matches!(err, RefineError::Io(_)));
    }
}
