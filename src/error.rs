/// Unified error types for the Umber client
use thiserror::Error;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum ClientError {
    /// No token was stored before an authenticated call
    #[error("Please log in to continue")]
    NotAuthenticated,

    /// The server rejected the token; the session has already been cleared
    #[error("Your session has expired. Please log in again.")]
    Unauthorized,

    /// Transport failure, message surfaced verbatim
    #[error("{0}")]
    Network(String),

    /// 4xx/5xx other than 401
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Delete attempted without the link's secret key
    #[error("Secret key is missing for deletion.")]
    MissingSecret,

    /// QR image could not be fetched or decoded
    #[error("Failed to load QR code: {0}")]
    AssetLoad(String),

    /// Client-side form validation
    #[error("{0}")]
    Validation(String),

    /// Payload did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No record with this id in the collection
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// Operation requires the view to be in its Ready phase
    #[error("Links are not loaded yet")]
    NotReady,

    /// The session was replaced or cleared while a request was in flight
    #[error("Session changed, please retry")]
    SessionChanged,

    /// Clipboard access failed
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Persistent store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the caller should send the user to the login screen
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::NotAuthenticated | ClientError::Unauthorized)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
