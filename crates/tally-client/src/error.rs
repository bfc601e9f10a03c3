//! Client error types.

/// Errors that can occur when using the tally client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The user has no credits left.
    #[error("insufficient credits")]
    InsufficientCredits,

    /// The user, account or conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An admin call was made without a valid admin key.
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
