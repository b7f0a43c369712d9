use thiserror::Error;

/// Errors that can be returned by discover-fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An HTTP request failed (connect, TLS, read timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A filesystem I/O error occurred while writing or validating the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The download URL (or a redirect `Location`) could not be parsed.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The HTTP client could not be constructed from the supplied configuration.
    #[error("HTTP client configuration error: {message}")]
    ClientConfig { message: String },
}
