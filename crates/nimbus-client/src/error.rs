//! Client error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Guidance attached to a rejected key/id pair
pub(crate) const INVALID_KEY_GUIDANCE: &str =
    "If you are using an application key and not a master key, make sure that you are \
     supplying the key id and key value for that application key. \
     Do not mix your account id with your application key.";

/// Failures of the authentication exchange.
///
/// Cloneable so that every caller waiting on the same in-flight exchange
/// observes the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Key id or application key is empty
    #[error("key id and application key must both be specified")]
    MissingCredentials,

    /// The service answered 401 to the credential pair
    #[error("invalid application key: {message}")]
    InvalidApplicationKey { message: String },

    /// The service refused the exchange with any other non-success status
    #[error("authorization rejected ({status}): {detail}")]
    ServerRejected { status: u16, detail: String },

    /// The exchange succeeded but the body is unusable
    #[error("invalid authorization response: {0}")]
    InvalidResponse(String),

    /// The request never produced a response
    #[error("authorization request failed: {0}")]
    Transport(String),
}

/// A failure reported by the service, already classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("service error {status} ({code}): {message}")]
pub struct ServiceError {
    /// Numeric status from the error body
    pub status: u16,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Whether the same request may succeed if sent again
    pub retryable: bool,
}

impl ServiceError {
    /// Check if the request may be retried
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Authentication exchange failed
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),

    /// Session state was requested before authenticating
    #[error("not authenticated: authorize the client before using session state")]
    NotAuthenticated,

    /// Part number outside 1..=10000
    #[error("part number {0} is out of range (must be between 1 and 10000)")]
    InvalidPartNumber(u32),

    /// A failed response whose body is not the documented error shape
    #[error("malformed error body (HTTP {status}): {reason}")]
    MalformedErrorBody {
        status: u16,
        body: String,
        reason: String,
    },

    /// Error reported by the service
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// A large-file upload handle was used after it finished or was cancelled
    #[error("large file {file_id} is already {state}")]
    UploadClosed { file_id: String, state: String },

    /// Finishing would leave a gap in the part sequence
    #[error("part {0} has not been uploaded")]
    MissingPart(u32),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A successful response that could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport failure not originating in reqwest
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Check if the failed request may be sent again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(e) if e.retryable)
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Service(e) if e.status == 404 || e.code == "not_found" || e.code == "no_such_file")
    }

    /// Status carried by a server-origin failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service(e) => Some(e.status),
            Self::MalformedErrorBody { status, .. } => Some(*status),
            Self::Auth(AuthError::ServerRejected { status, .. }) => Some(*status),
            Self::Auth(AuthError::InvalidApplicationKey { .. }) => Some(401),
            _ => None,
        }
    }
}
