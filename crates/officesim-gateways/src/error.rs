use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no valid recipients after normalization")]
    EmptyRecipients,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
