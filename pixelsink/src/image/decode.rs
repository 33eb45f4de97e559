//! Image decoding

use image::{DynamicImage, ImageError, ImageReader};
use std::io::Cursor;

use crate::error::{Result, UploadError};

/// Decode a complete, in-memory image of any enabled format.
///
/// The format is sniffed from the leading bytes, never from the announced
/// content type. Any decoder failure becomes [`UploadError::InvalidContent`].
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| invalid_content(&ImageError::IoError(e)))?;

    if reader.format().is_none() {
        return Err(UploadError::InvalidContent(
            "Given content does not contain a valid image.".to_string(),
        ));
    }

    reader.decode().map_err(|e| invalid_content(&e))
}

fn invalid_content(err: &ImageError) -> UploadError {
    log::debug!("Decoder rejected upload: {err}");
    UploadError::InvalidContent(format!(
        "Given content does not contain a valid image: {err}"
    ))
}
