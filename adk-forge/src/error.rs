//! Error types for Forge.
//!
//! Only [`ParseError`] and configuration errors stop a run. LLM, file and git
//! errors are caught by the dispatcher and folded into the task's
//! [`ExecutionResult`](crate::models::ExecutionResult) message.

use crate::models::config::ValidationError;
use thiserror::Error;

/// Result type alias for Forge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Errors raised while reading a task document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The task file could not be read
    #[error("Cannot read task file {path}: {message}")]
    Unreadable { path: String, message: String },
}

/// Errors raised by an LLM provider adapter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
    /// Network failure, timeout or non-2xx response
    #[error("{provider} unavailable{}: {reason}", status_suffix(.status))]
    Unavailable {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    /// The provider answered but the body carried no usable text
    #[error("{provider} returned an unusable response: {reason}")]
    Response { provider: String, reason: String },

    /// The client could not be constructed from its configuration
    #[error("{provider} client configuration error: {reason}")]
    Configuration { provider: String, reason: String },
}

impl LlmError {
    /// Create an unavailable error with no HTTP status.
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmError::Unavailable {
            provider: provider.into(),
            status: None,
            reason: reason.into(),
        }
    }

    /// Create an unavailable error for a non-2xx status.
    pub fn http_status(provider: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        LlmError::Unavailable {
            provider: provider.into(),
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// Create a response error.
    pub fn response(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmError::Response {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        LlmError::Configuration {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Unavailable { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Errors raised while writing a generated file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileWriteError {
    /// The relative path is empty, absolute or otherwise unusable
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The resolved location is outside the project root
    #[error("Path '{path}' resolves outside the project root")]
    OutsideRoot { path: String },

    /// The filesystem refused the operation
    #[error("Failed to write '{path}': {message}")]
    Io { path: String, message: String },
}

impl FileWriteError {
    pub(crate) fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        FileWriteError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Relative path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            FileWriteError::InvalidPath { path, .. }
            | FileWriteError::OutsideRoot { path }
            | FileWriteError::Io { path, .. } => path,
        }
    }
}

/// Errors raised while committing generated files.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GitError {
    /// The git executable could not be started
    #[error("Failed to run git: {0}")]
    Spawn(String),

    /// A git command exited with a failure status
    #[error("git {command} failed: {message}")]
    Command { command: String, message: String },
}

/// Errors that can occur in Forge.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration validation error with detailed context
    #[error("Configuration validation error: {0}")]
    ConfigValidation(#[from] ValidationError),

    /// Task document error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// File output error
    #[error("File write error: {0}")]
    FileWrite(#[from] FileWriteError),

    /// File I/O error outside of generated output
    #[error("File error ({path}): {message}")]
    File { path: String, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Git error
    #[error("Git error: {0}")]
    Git(#[from] GitError),
}

impl ForgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ForgeError::Configuration(msg.into())
    }

    /// Create a file error.
    pub fn file(path: impl Into<String>, msg: impl Into<String>) -> Self {
        ForgeError::File {
            path: path.into(),
            message: msg.into(),
        }
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::File {
            path: "unknown".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ForgeError {
    fn from(err: serde_yaml::Error) -> Self {
        ForgeError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForgeError::config("missing api_base");
        assert_eq!(err.to_string(), "Configuration error: missing api_base");

        let err = ForgeError::file("tasks.md", "not found");
        assert_eq!(err.to_string(), "File error (tasks.md): not found");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::http_status("groq", 503, "overloaded");
        assert_eq!(err.to_string(), "groq unavailable (HTTP 503): overloaded");
        assert_eq!(err.status(), Some(503));

        let err = LlmError::unavailable("lmstudio", "connection refused");
        assert_eq!(err.to_string(), "lmstudio unavailable: connection refused");
        assert_eq!(err.status(), None);

        let err = LlmError::response("openai", "missing choices");
        assert!(err.to_string().contains("unusable response"));
    }

    #[test]
    fn test_error_conversions() {
        let err: ForgeError = ParseError::Unreadable {
            path: "tasks/setup.md".to_string(),
            message: "invalid UTF-8".to_string(),
        }
        .into();
        assert!(matches!(err, ForgeError::Parse(_)));
        assert!(err.to_string().contains("tasks/setup.md"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ForgeError = io.into();
        assert!(matches!(err, ForgeError::File { .. }));
    }

    #[test]
    fn test_file_write_error_path() {
        let err = FileWriteError::OutsideRoot {
            path: "../x".to_string(),
        };
        assert_eq!(err.path(), "../x");
    }
}
