//! Error taxonomy shared by the connection, project store and orchestration layers.

use std::path::Path;

use thiserror::Error;

/// Errors raised by remote control and project bookkeeping.
#[derive(Debug, Error)]
pub enum VmError {
    /// Bad enum value or malformed action field; raised before any remote effect.
    #[error("{0}")]
    Validation(String),

    /// The remote session could not be established or verified.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A remote command exited nonzero or the transport failed mid-command.
    #[error("Remote command failed (exit code {exit_code:?}): {stderr}")]
    RemoteExecution {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("No project initialized. Call project_init first.")]
    NoActiveProject,

    #[error("Invalid project metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VmError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O failure on `path`, naming the attempted operation.
    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {} {}", action, path.display()), source)
    }
}

pub type VmResult<T> = Result<T, VmError>;
