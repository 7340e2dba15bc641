//! Image preprocessing for model inference

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Padding colour used around the letterboxed image
pub const PADDING_COLOR: [u8; 3] = [255, 255, 255];

/// Geometry of the aspect-preserving resize and centre padding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor from original to resized coordinates
    pub scale: f32,
    /// Size of the resized image inside the canvas
    pub resized: (u32, u32),
    /// Top-left corner of the resized image inside the canvas
    pub offset: (u32, u32),
    /// Canvas size `(width, height)`
    pub canvas: (u32, u32),
}

impl Letterbox {
    /// Compute the letterbox for an image placed on a `[height, width]` canvas
    pub fn compute(original: (u32, u32), target_size: [u32; 2]) -> Result<Self> {
        let (orig_width, orig_height) = original;
        let [target_height, target_width] = target_size;

        if orig_width == 0 || orig_height == 0 {
            return Err(BgRemovalError::processing("Image has zero width or height"));
        }
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::invalid_config("Target size must be non-zero"));
        }

        let scale = (target_width as f32 / orig_width as f32)
            .min(target_height as f32 / orig_height as f32);

        let resized_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_width);
        let resized_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_height);

        Ok(Self {
            scale,
            resized: (resized_width, resized_height),
            offset: (
                (target_width - resized_width) / 2,
                (target_height - resized_height) / 2,
            ),
            canvas: (target_width, target_height),
        })
    }

    /// Map an original pixel coordinate onto the canvas
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> (u32, u32) {
        let scaled_x = ((x as f32 * self.scale).round() as u32).min(self.resized.0 - 1);
        let scaled_y = ((y as f32 * self.scale).round() as u32).min(self.resized.1 - 1);
        (scaled_x + self.offset.0, scaled_y + self.offset.1)
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// This function handles:
    /// - RGB conversion
    /// - Aspect ratio preserving resize
    /// - Center padding to target size
    /// - Normalization to tensor format (NCHW)
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let rgb_image = image.to_rgb8();
        let letterbox =
            Letterbox::compute(rgb_image.dimensions(), preprocessing_config.target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.resized.0,
            letterbox.resized.1,
            image::imageops::FilterType::Triangle,
        );

        let (canvas_width, canvas_height) = letterbox.canvas;
        let mut canvas = ImageBuffer::from_pixel(
            canvas_width,
            canvas_height,
            image::Rgb(PADDING_COLOR),
        );
        image::imageops::overlay(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset.0),
            i64::from(letterbox.offset.1),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        Ok((tensor, letterbox))
    }

    /// Convert canvas to normalized NCHW tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for (channel, ((value, m), s)) in pixel.0.iter().zip(mean).zip(std).enumerate() {
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = (f32::from(*value) / 255.0 - m) / s;
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config(size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn test_letterbox_landscape() {
        let letterbox = Letterbox::compute((200, 100), [64, 64]).unwrap();
        assert_eq!(letterbox.resized, (64, 32));
        assert_eq!(letterbox.offset, (0, 16));
        assert_eq!(letterbox.canvas, (64, 64));
        assert_eq!(letterbox.to_canvas(0, 0), (0, 16));
        assert_eq!(letterbox.to_canvas(199, 99), (63, 47));
    }

    #[test]
    fn test_letterbox_rejects_empty_image() {
        assert!(Letterbox::compute((0, 10), [64, 64]).is_err());
    }

    #[test]
    fn test_tensor_shape_and_padding() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(40, 20, Rgb([0, 0, 0])));
        let (tensor, letterbox) =
            ImagePreprocessor::preprocess_for_inference(&image, &config(32)).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        assert_eq!(letterbox.offset, (0, 8));
        // White padding row above the image, black image pixels below it
        assert!((tensor[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 0, 16, 16]] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_non_square_target() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(10, 10, Rgb([255, 0, 0])));
        let config = PreprocessingConfig {
            target_size: [20, 40],
            ..config(0)
        };
        let (tensor, letterbox) =
            ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 20, 40]);
        assert_eq!(letterbox.resized, (20, 20));
        assert_eq!(letterbox.offset, (10, 0));
    }
}
