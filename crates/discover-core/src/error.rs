use thiserror::Error;

/// Errors surfaced by the catalog, orchestrator and launcher session.
///
/// Cloneable so a copy can live in the state snapshot while another is
/// returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoverError {
    /// DNS resolution or connection establishment failed.
    #[error("No internet or host unreachable: {0}")]
    Network(String),

    /// The catalog backend answered with a non-2xx status.
    #[error("HTTP {code}: {message}")]
    Server { code: u16, message: String },

    /// The catalog body could not be decoded.
    #[error("malformed catalog response: {0}")]
    Parse(String),

    /// Any other catalog transport failure.
    #[error("{0}")]
    Unknown(String),

    /// The artifact download ended in failure.
    #[error("download failed: {reason}")]
    Download { reason: String },

    /// The download was cancelled. Carries no message.
    #[error("cancelled")]
    Cancelled,

    /// The install collaborator reports that installing packages is not permitted.
    #[error("install permission missing")]
    PermissionDenied,

    /// The orchestrator's dispatch loop has stopped.
    #[error("download orchestrator shut down")]
    OrchestratorShutdown,

    /// The orchestrator's request queue is saturated.
    #[error("download queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// `install` was called for a package without a completed download.
    #[error("no completed download for {package}")]
    NotDownloaded { package: String },

    /// A component could not be constructed from its configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DiscoverError {
    /// Message shown to the user when a catalog refresh fails.
    pub fn user_message(&self) -> String {
        match self {
            DiscoverError::Network(_) => format!("Network error: {self}"),
            DiscoverError::Server { .. } => format!("Server error: {self}"),
            other => other.to_string(),
        }
    }
}

impl From<discover_fetch::FetchError> for DiscoverError {
    fn from(err: discover_fetch::FetchError) -> Self {
        DiscoverError::Config(err.to_string())
    }
}
