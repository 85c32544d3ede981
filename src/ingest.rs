//! Decoding of uploaded image bytes.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use thiserror::Error;

/// Upload cap when none is configured (10MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("form field 'image' is missing")]
    MissingField,
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("image data is empty")]
    Empty,
    #[error("image is too large: more than {0} bytes")]
    TooLarge(usize),
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to re-encode image: {0}")]
    Reencode(String),
}

/// A decoded upload plus the bytes to forward to the vision model.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub image: DynamicImage,
    pub model_bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl UploadedImage {
    pub fn decode(bytes: Vec<u8>, max_bytes: usize) -> Result<Self, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(UploadError::TooLarge(max_bytes));
        }

        let format = image::guess_format(&bytes).map_err(|_| UploadError::UnsupportedFormat)?;
        let image = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| UploadError::Decode(e.to_string()))?;

        match inline_mime_type(format) {
            Some(mime_type) => Ok(Self {
                image,
                model_bytes: bytes,
                mime_type,
            }),
            None => {
                let mut png = Vec::new();
                image
                    .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
                    .map_err(|e| UploadError::Reencode(e.to_string()))?;
                Ok(Self {
                    image,
                    model_bytes: png,
                    mime_type: "image/png",
                })
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Formats the vision model accepts as inline data.
fn inline_mime_type(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
