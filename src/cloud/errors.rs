use thiserror::Error;

/// Failures surfaced by the Green Energy cloud API.
///
/// The client never retries; callers decide what a failure means. Upload
/// failures of any kind put the batch back in the buffer, refresh failures
/// degrade the published snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
    /// The pairing code was rejected (unknown, already used or expired).
    #[error("invalid or expired pairing code")]
    InvalidPairingCode,

    /// The stored token is missing, invalid or revoked.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport failure or timeout. Transient, retried on the next cycle.
    #[error("cannot connect: {0}")]
    CannotConnect(String),

    /// Any other unexpected response from the server.
    #[error("API error: {0}")]
    Api(String),
}

impl CloudError {
    /// `true` for failures that are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CannotConnect(_))
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Api(format!("malformed response body: {e}"))
        } else if e.is_timeout() {
            Self::CannotConnect("request timed out".to_owned())
        } else {
            Self::CannotConnect(format!("connection error: {e}"))
        }
    }
}
