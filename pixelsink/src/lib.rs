pub mod accumulator;
pub mod config;
pub mod error;
pub mod image;
pub mod ingest;
pub mod upload;

// Re-export commonly used types
pub use accumulator::UploadAccumulator;
pub use config::{UploadLimits, DEFAULT_CHUNK_SIZE};
pub use error::{Disposition, Result, Stage, UploadError};
pub use crate::image::{PixelArray, Samples};
pub use ingest::stream_upload;
pub use upload::{Claim, FileInfo, UploadHandler};
