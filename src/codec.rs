//! Image decoding and PNG encoding

use crate::error::Result;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Turns uploaded bytes into pixels and pixels into PNG bytes
pub trait ImageCodec: Send + Sync {
    /// Decode an image, detecting the format from its content
    ///
    /// # Errors
    /// - Unknown or unsupported format
    /// - Corrupt image data
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;

    /// Encode an RGBA image as PNG into memory
    ///
    /// # Errors
    /// - Encoder failures
    fn encode_png(&self, image: &RgbaImage) -> Result<Vec<u8>>;
}

/// Codec backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImageCodec;

impl ImageCodec for DefaultImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    fn encode_png(&self, image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}
