use agrisat_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Credentials missing, malformed, or rejected. Never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("imagery service unreachable after {attempts} attempt(s): {source}")]
    Service {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("imagery service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RemoteError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
