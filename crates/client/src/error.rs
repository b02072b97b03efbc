#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
