//! Shared helpers for integration tests

#![allow(dead_code)]

use axum::http::HeaderValue;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bgremove_api::{
    BackendType, BackgroundRemover, BgRemovalError, DefaultImageCodec, InferenceBackend,
    MockBackend, ModelInfo, ModelRemover, PreprocessingConfig, RemovalConfig,
    RemoveBackgroundRequest, RequestHandler, Result,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use instant::Duration;
use ndarray::Array4;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// White image with a dark square in the middle
pub fn square_image(width: u32, height: u32) -> DynamicImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for y in height / 4..height * 3 / 4 {
        for x in width / 4..width * 3 / 4 {
            image.put_pixel(x, y, Rgb([20, 20, 20]));
        }
    }
    DynamicImage::ImageRgb8(image)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

pub fn base64_image(image: &DynamicImage, format: ImageFormat) -> String {
    STANDARD.encode(encode(image, format))
}

/// Request body with the given string as the `image` field
pub fn request_body(image: &str) -> Vec<u8> {
    let request = RemoveBackgroundRequest {
        image: Some(image.to_string()),
    };
    serde_json::to_vec(&request).expect("Failed to build body")
}

pub fn content_length(body: &[u8]) -> HeaderValue {
    HeaderValue::from(body.len())
}

/// Handler backed by the mock model on a small input size
pub fn mock_handler() -> RequestHandler {
    let remover = ModelRemover::new(Box::new(MockBackend::with_target_size(64)), mock_config());
    RequestHandler::new(Arc::new(remover), Arc::new(DefaultImageCodec))
}

pub fn mock_config() -> RemovalConfig {
    RemovalConfig::builder()
        .backend_type(BackendType::Mock)
        .build()
        .expect("Mock config is valid")
}

pub fn handler_with(remover: impl BackgroundRemover + 'static) -> RequestHandler {
    RequestHandler::new(Arc::new(remover), Arc::new(DefaultImageCodec))
}

/// Remover that always fails with a fixed message
pub struct FailingRemover(pub &'static str);

impl BackgroundRemover for FailingRemover {
    fn remove_background(&self, _image: &DynamicImage) -> Result<RgbaImage> {
        Err(BgRemovalError::inference(self.0))
    }
}

/// Remover that panics, standing in for a crashed worker
pub struct PanickingRemover;

impl BackgroundRemover for PanickingRemover {
    fn remove_background(&self, _image: &DynamicImage) -> Result<RgbaImage> {
        panic!("remover exploded");
    }
}

/// Mock model whose inference panics once, while the session lock is held
pub struct PanicOnceBackend {
    inner: MockBackend,
    panicked: Arc<AtomicBool>,
}

impl PanicOnceBackend {
    /// Backends sharing `panicked` panic only on the first inference among them
    pub fn new(panicked: Arc<AtomicBool>) -> Self {
        Self {
            inner: MockBackend::with_target_size(32),
            panicked,
        }
    }
}

impl InferenceBackend for PanicOnceBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        self.inner.initialize(config)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("inference session crashed");
        }
        self.inner.infer(input)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.inner.input_shape()
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.inner.output_shape()
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.inner.get_preprocessing_config()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.inner.get_model_info()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }
}

/// Remover keeping every pixel opaque except the left half, which is cleared
pub struct LeftHalfRemover;

impl BackgroundRemover for LeftHalfRemover {
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        let half = rgba.width() / 2;
        for (x, _, pixel) in rgba.enumerate_pixels_mut() {
            if x < half {
                *pixel = image::Rgba([0, 0, 0, 0]);
            }
        }
        Ok(rgba)
    }
}

/// Decode the PNG carried by a success body's data URL
pub fn decode_data_url(url: &str) -> DynamicImage {
    let payload = url
        .strip_prefix("data:image/png;base64,")
        .expect("Data URL should carry a PNG");
    let bytes = STANDARD.decode(payload).expect("Payload should be base64");
    assert_eq!(
        image::guess_format(&bytes).expect("Payload should be an image"),
        ImageFormat::Png
    );
    image::load_from_memory(&bytes).expect("Payload should decode")
}
