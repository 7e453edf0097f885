//! Errors raised by the OS-facing collaborators.

use crate::model::Pid;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Failed to enumerate windows of process {pid}: {message}")]
    Enumeration { pid: Pid, message: String },

    #[error("Failed to activate process {pid}: {message}")]
    Activation { pid: Pid, message: String },

    #[error("Compositor IPC error: {0}")]
    Ipc(#[from] swayipc::Error),
}

impl BackendError {
    /// Whether retrying the same call later can succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::PermissionDenied { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
