//! CLI-specific error types and exit code mapping

use logscope_analysis::AnalysisError;
use logscope_core::error::LogscopeError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Analysis failed after processing started (cancelled, pool saturated, task failure).
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Rule files could not be read or are invalid.
    #[error("rule error: {0}")]
    Rule(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from logscope-core.
    #[error("{0}")]
    Core(#[from] LogscopeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                               |
    /// |------|---------------------------------------|
    /// | 0    | Success                               |
    /// | 1    | General / analysis / rule error       |
    /// | 2    | Configuration error                   |
    /// | 10   | IO error                              |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(LogscopeError::Config(_)) => 2,
            Self::Io(_) | Self::Core(LogscopeError::Io(_)) => 10,
            Self::JsonSerialize(_)
            | Self::Command(_)
            | Self::Analysis(_)
            | Self::Rule(_)
            | Self::Core(_) => 1,
        }
    }
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        if e.is_config() {
            Self::Config(e.to_string())
        } else {
            Self::Analysis(e.to_string())
        }
    }
}
