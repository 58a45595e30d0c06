use thiserror::Error;

pub type EducResult<T> = Result<T, EducError>;

#[derive(Debug, Error)]
pub enum EducError {
    #[error("config error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid input: {0}")]
    Validation(String),

    /// Structured refusal from the backend (`{error}` / `{details}` / `{detail}` body)
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Transport failure; the request may or may not have reached the backend
    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EducError {
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        EducError::Backend {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EducError::Backend { status: 404, .. })
    }
}
