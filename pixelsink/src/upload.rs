//! Callbacks a multipart layer drives for every uploaded file.

use crate::error::Result;

/// What the multipart layer knows about a file when it starts streaming it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    /// Length announced by the sender.
    pub content_length: u64,
    pub charset: Option<String>,
}

impl FileInfo {
    pub fn new(content_type: impl Into<String>, content_length: u64) -> Self {
        Self {
            content_type: content_type.into(),
            content_length,
            ..Self::default()
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

/// Answer to [`UploadHandler::new_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This handler owns the rest of the stream, skip every later handler.
    Exclusive,
    /// Let the next handler see the file.
    Pass,
}

pub trait UploadHandler {
    type Output;

    fn new_file(&mut self, info: &FileInfo) -> Result<Claim>;

    /// `offset` is where `chunk` starts in the file. Chunks arrive in order.
    fn receive_chunk(&mut self, chunk: &[u8], offset: u64) -> Result<()>;

    fn file_complete(&mut self, file_size: u64) -> Result<Self::Output>;

    /// The stream broke before `file_complete` could be called.
    fn upload_interrupted(&mut self) {}
}
