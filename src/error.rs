//! Structured error handling and exit codes.

use serde::Serialize;

use crate::config::ConfigError;
use crate::signal::EXIT_CODE_INTERRUPTED;

/// Exit codes for the docdedup application.
///
/// - 0: Success (single pass finished, or the scheduler stopped normally)
/// - 1: General error (connectivity, setup, unexpected failure)
/// - 2: Configuration error (invalid flags, file or environment values)
/// - 130: Interrupted by user (Ctrl+C / SIGTERM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error: an unexpected or connectivity failure occurred.
    GeneralError = 1,
    /// Configuration error: the service never started.
    ConfigError = 2,
    /// Interrupted: shutdown was requested by a signal.
    Interrupted = EXIT_CODE_INTERRUPTED as isize,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DD000",
            Self::GeneralError => "DD001",
            Self::ConfigError => "DD002",
            Self::Interrupted => "DD130",
        }
    }

    /// Exit code for an error that reached `main`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<ConfigError>().is_some() {
            Self::ConfigError
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}
