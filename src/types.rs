//! Segmentation mask type

use crate::error::{BgRemovalError, Result};
use crate::utils::Letterbox;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;

/// Foreground confidence per pixel (0-255) at the original image dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values, row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    ///
    /// # Errors
    /// - `data` length does not match `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::processing(format!(
                "Mask has {} values, expected {expected} for {}x{}",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Map a `(1, 1, H, W)` model output back onto the original image
    ///
    /// Each original pixel samples the tensor at its letterboxed position;
    /// values are clamped to 0-1 before scaling to 0-255.
    pub fn from_tensor(
        tensor: &Array4<f32>,
        letterbox: &Letterbox,
        original_dimensions: (u32, u32),
    ) -> Result<Self> {
        let (batch, channels, mask_height, mask_width) = tensor.dim();
        if batch != 1 || channels != 1 {
            return Err(BgRemovalError::processing_stage_error(
                "mask",
                "invalid output tensor shape",
                Some(&format!("{batch}x{channels}x{mask_height}x{mask_width}")),
            ));
        }

        let (width, height) = original_dimensions;
        let mut data = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            for x in 0..width {
                let (tensor_x, tensor_y) = letterbox.to_canvas(x, y);
                let value = tensor
                    .get([0, 0, tensor_y as usize, tensor_x as usize])
                    .copied()
                    .unwrap_or(0.0);
                data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }

        Self::new(data, original_dimensions)
    }

    /// Cut the background out of `image`: alpha becomes the mask value and
    /// fully transparent pixels are cleared to `[0, 0, 0, 0]`
    pub fn apply_to_image(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != self.dimensions {
            return Err(BgRemovalError::processing(
                "Image and mask dimensions do not match",
            ));
        }

        for (pixel, alpha) in rgba.pixels_mut().zip(&self.data) {
            *pixel = if *alpha == 0 {
                image::Rgba([0, 0, 0, 0])
            } else {
                image::Rgba([pixel[0], pixel[1], pixel[2], *alpha])
            };
        }

        Ok(rgba)
    }

    /// Fraction of pixels with non-zero alpha
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().filter(|v| **v > 0).count() as f32 / self.data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_new_validates_length() {
        assert!(SegmentationMask::new(vec![0; 5], (2, 2)).is_err());
        assert!(SegmentationMask::new(vec![0; 4], (2, 2)).is_ok());
    }

    #[test]
    fn test_from_tensor_maps_letterbox() {
        // 4x2 image on a 4x4 canvas: rows 1..3 hold the image
        let letterbox = Letterbox::compute((4, 2), [4, 4]).unwrap();
        let mut tensor = Array4::<f32>::zeros((1, 1, 4, 4));
        tensor[[0, 0, 1, 0]] = 1.0;
        tensor[[0, 0, 2, 3]] = 0.5;
        tensor[[0, 0, 0, 0]] = 1.0; // padding, never sampled

        let mask = SegmentationMask::from_tensor(&tensor, &letterbox, (4, 2)).unwrap();
        assert_eq!(mask.dimensions, (4, 2));
        assert_eq!(mask.data, vec![255, 0, 0, 0, 0, 0, 0, 128]);
    }

    #[test]
    fn test_from_tensor_rejects_multichannel() {
        let letterbox = Letterbox::compute((2, 2), [2, 2]).unwrap();
        let tensor = Array4::<f32>::zeros((1, 3, 2, 2));
        assert!(SegmentationMask::from_tensor(&tensor, &letterbox, (2, 2)).is_err());
    }

    #[test]
    fn test_apply_to_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let mask = SegmentationMask::new(vec![0, 200], (2, 1)).unwrap();

        let result = mask.apply_to_image(&image).unwrap();
        assert_eq!(result.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(result.get_pixel(1, 0).0, [10, 20, 30, 200]);
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_apply_to_image_dimension_mismatch() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        let mask = SegmentationMask::new(vec![0; 4], (2, 2)).unwrap();
        assert!(mask.apply_to_image(&image).is_err());
    }
}
