use thiserror::Error;

/// Failures of a remote API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The call was superseded and cancelled by its owner.
    #[error("request canceled")]
    Canceled,

    #[error("failed to send request to {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid API url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, ApiError::Canceled)
    }
}
