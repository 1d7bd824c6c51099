use ccsa_protocol::ErrorKind;

/// Errors surfaced by the installer.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    AttestationFailed(String),

    #[error("refusing to delete unsafe tracked path: {0}")]
    Unsafe(String),

    #[error("tracked state is unreadable; resolve {path} and retry")]
    InvalidState { path: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::InvalidInput(_) => ErrorKind::InvalidInput,
            InstallError::NotFound(_) => ErrorKind::NotFound,
            InstallError::AttestationFailed(_) => ErrorKind::AttestationFailed,
            InstallError::Unsafe(_) => ErrorKind::Unsafe,
            InstallError::InvalidState { .. } => ErrorKind::Internal,
            InstallError::Failed { .. } => ErrorKind::Internal,
            InstallError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wrap a failure that triggered a rollback, folding in any errors the
    /// rollback itself produced so both surface in the one returned message.
    pub fn with_rollback(message: impl Into<String>, rollback_errors: &[String]) -> Self {
        let message = message.into();
        if rollback_errors.is_empty() {
            InstallError::Failed { message }
        } else {
            InstallError::Failed {
                message: format!(
                    "{message} (rollback also failed: {})",
                    rollback_errors.join("; ")
                ),
            }
        }
    }
}

impl From<std::io::Error> for InstallError {
    fn from(e: std::io::Error) -> Self {
        InstallError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for InstallError {
    fn from(e: serde_json::Error) -> Self {
        InstallError::Internal(e.to_string())
    }
}

pub type InstallResult<T> = Result<T, InstallError>;
