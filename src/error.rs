use reqwest::StatusCode;

/// Errors surfaced by the catalog and account clients.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{url} -> {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("JSON parse failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

impl Error {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
