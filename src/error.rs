//! Error types shared by every programmer operation.

/// Result type for programmer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by the programmer driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The programmer detected a data integrity mismatch.
    ///
    /// Resending the identical exchange is safe.
    #[error("programmer reported a checksum mismatch")]
    Checksum,
    /// Unexpected acknowledgement, missing device or exhausted read budget.
    #[error("{0}")]
    Command(String),
}

impl Error {
    pub(crate) fn command(msg: impl Into<String>) -> Self {
        Error::Command(msg.into())
    }

    /// Only checksum failures may be retried by resending.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Checksum)
    }
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        Error::Command(format!("USB transfer failed: {}", e))
    }
}

impl From<scroll::Error> for Error {
    fn from(e: scroll::Error) -> Self {
        Error::Command(format!("malformed command frame: {}", e))
    }
}
