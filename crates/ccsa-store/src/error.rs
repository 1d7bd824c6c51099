use ccsa_protocol::ErrorKind;

/// Errors surfaced by the file store and artifact service.
///
/// Every variant maps to one of the abstract [`ErrorKind`] categories via
/// [`StoreError::kind`], so tool handlers don't need to match on every
/// variant to decide how to present a failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            StoreError::InvalidInput(d) | StoreError::Conflict(d) | StoreError::Internal(d) => {
                d.clone()
            }
            StoreError::NotFound => String::new(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Internal(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Internal(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
