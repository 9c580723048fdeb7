use crate::allocator::AllocationError;

// ---------------------------------------------------------------------------
// Main client error type
// ---------------------------------------------------------------------------

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum WarrenError {
    /// The client's allocator refused an allocation.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Malformed account, queue, or message identifier, or a stale
    /// managed-attributes id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend refused the command at submission time. No deliveries
    /// will ever follow for this attempt.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// I/O failure while talking to a server, outside the window covered
    /// by log deliveries.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization / deserialization failure on the wire.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Builder misconfiguration.
    #[error("builder error: {0}")]
    Builder(String),

    /// No backend registered under the given name.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
}

impl From<AllocationError> for WarrenError {
    fn from(err: AllocationError) -> Self {
        WarrenError::OutOfMemory(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for WarrenError {
    fn from(err: reqwest::Error) -> Self {
        WarrenError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for WarrenError {
    fn from(err: serde_json::Error) -> Self {
        WarrenError::Serialization(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Result type alias
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, WarrenError>;
