use thiserror::Error;

use paraconnect_shared::{CaseId, DomainError, PayoutError};
use paraconnect_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response; `message` is the server's own error text when it
    /// sent one.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("No case is open")]
    NoActiveCase,

    #[error("Case {0} is no longer active")]
    StaleCase(CaseId),

    #[error("{0} is already in progress")]
    Busy(String),

    #[error("Upload canceled")]
    Canceled,

    #[error("No upload endpoint accepted the file")]
    NoUploadEndpoint,

    #[error("Attachment not found")]
    AttachmentNotFound,

    #[error("{name} is {size} bytes; the limit is {limit} bytes")]
    AttachmentTooLarge { name: String, size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<PayoutError> for ClientError {
    fn from(e: PayoutError) -> Self {
        Self::Domain(DomainError::Payout(e))
    }
}

impl ClientError {
    /// The route does not exist on this server (404/405).
    pub fn is_endpoint_missing(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 405, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
