use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel transport error: {0}")]
    Transport(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("session expired")]
    Auth,

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("malformed payload: {0}")]
    DataShape(String),
}

impl AppError {
    /// Classify a REST failure by HTTP status. 401/403 mean the session is
    /// gone and must be surfaced distinctly from generic failures.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => AppError::Auth,
            _ => AppError::Persistence(format!("{context}: http {status}")),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth)
    }

    /// Transport errors are recovered locally by the reconnect policy;
    /// everything else is surfaced per-operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if matches!(status.as_u16(), 401 | 403) => AppError::Auth,
            _ => AppError::Persistence(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::DataShape(err.to_string())
    }
}
