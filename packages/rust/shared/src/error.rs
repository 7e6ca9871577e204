//! Error types for contentplan.
//!
//! Library crates use [`ContentPlanError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::PlanStatus;

/// Top-level error type for all contentplan operations.
///
/// Every failure carries the identifier of the thing that failed (URL,
/// filename, processor or provider id) so callers can render a precise message.
#[derive(Debug, thiserror::Error)]
pub enum ContentPlanError {
    /// The URL or file reference could not be accepted as a source.
    #[error("invalid source '{source_id}': {reason}")]
    InvalidSource { source_id: String, reason: String },

    /// Network fetch failed, returned an error status, or an empty body.
    #[error("failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// Normalization produced no Markdown at all.
    #[error("no extractable content in '{source_id}'")]
    NoExtractableContent { source_id: String },

    /// No registered converter handles the extension (or none has its requirements met).
    #[error("no processor available for '.{extension}' files")]
    NoProcessorAvailable { extension: String },

    /// A converter ran but failed (non-zero exit, timeout, unreadable output).
    #[error("processor '{processor}' failed on '{filename}': {reason}")]
    ProcessingFailed {
        processor: String,
        filename: String,
        reason: String,
    },

    /// Plan generation was requested without any normalized source.
    #[error("no source content: provide at least one document or webpage")]
    NoSourceContent,

    /// No chat-completion capability is configured.
    #[error("no AI provider configured: {hint}")]
    NoProviderConfigured { hint: String },

    /// The chat provider failed at the transport or API level.
    #[error("chat provider '{provider}' failed: {message}")]
    ChatFailed { provider: String, message: String },

    /// The model output could not be parsed into a plan after every attempt.
    #[error("plan generation failed after {attempts} attempt(s): {reason}")]
    PlanGenerationFailed { attempts: u32, reason: String },

    /// The plan has already been refined the maximum number of times.
    #[error("refinement limit of {max} reached for this plan")]
    RefinementLimitExceeded { max: usize },

    /// A plan status change that the lifecycle does not allow.
    #[error("cannot {action} a plan in status '{from}'")]
    InvalidStatusTransition { from: PlanStatus, action: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContentPlanError>;

impl ContentPlanError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_source(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn processing_failed(
        processor: impl Into<String>,
        filename: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProcessingFailed {
            processor: processor.into(),
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    pub fn chat_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChatFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ContentPlanError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ContentPlanError::NoProcessorAvailable {
            extension: "pdf".into(),
        };
        assert_eq!(err.to_string(), "no processor available for '.pdf' files");
    }

    #[test]
    fn processing_failure_names_processor_and_file() {
        let err = ContentPlanError::processing_failed("pdftotext", "report.pdf", "exit code 1");
        let msg = err.to_string();
        assert!(msg.contains("pdftotext"));
        assert!(msg.contains("report.pdf"));
    }

    #[test]
    fn status_transition_error_names_status() {
        let err = ContentPlanError::InvalidStatusTransition {
            from: PlanStatus::Completed,
            action: "refine".into(),
        };
        assert_eq!(err.to_string(), "cannot refine a plan in status 'completed'");
    }
}
