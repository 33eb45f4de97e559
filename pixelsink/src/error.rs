//! Error type shared by every upload operation.
//!
//! Each variant maps onto one [`Disposition`], which is all a caller needs to
//! decide between dropping the connection and answering with a domain error.

use thiserror::Error;

/// Which check raised a [`UploadError::BudgetExceeded`].
///
/// At [`Stage::Complete`] `length` is the reported size and `limit` the
/// number of bytes actually buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// The length announced with the file metadata.
    Announce,
    /// The running total after a chunk.
    Chunk,
    /// The announced length, enforced when `strict_declared_length` is set.
    DeclaredLength,
    /// The final size reported by the protocol layer.
    Complete,
}

/// What the caller should do with the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stop reading and reset the connection.
    ResetConnection,
    /// The transfer was fine, the payload was not.
    RejectContent,
    /// The service is not configured to accept uploads.
    Misconfigured,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload budget is not configured")]
    ConfigMissing,

    #[error("upload size rejected at {stage}: {length} bytes against {limit}")]
    BudgetExceeded { stage: Stage, length: u64, limit: u64 },

    #[error("{0}")]
    InvalidContent(String),

    #[error("invalid upload metadata: {0}")]
    InvalidMetadata(&'static str),

    #[error("`{operation}` is not valid while the upload is {state}")]
    OutOfSequence {
        operation: &'static str,
        state: &'static str,
    },

    #[error("failed to read upload stream: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn disposition(&self) -> Disposition {
        match self {
            UploadError::ConfigMissing => Disposition::Misconfigured,
            UploadError::InvalidContent(_) | UploadError::InvalidMetadata(_) => {
                Disposition::RejectContent
            }
            UploadError::BudgetExceeded { .. }
            | UploadError::OutOfSequence { .. }
            | UploadError::Io(_) => Disposition::ResetConnection,
        }
    }

    pub fn resets_connection(&self) -> bool {
        self.disposition() == Disposition::ResetConnection
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
