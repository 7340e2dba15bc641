#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unused_async)]

//! # Background Removal HTTP API
//!
//! An HTTP endpoint that accepts a base64 image (raw or as a data URL),
//! removes its background with a segmentation model, and answers with the
//! result as a PNG data URL.
//!
//! ## Features
//!
//! - **Stateless handler**: [`RequestHandler`] turns a request body into a
//!   complete response; the remover and the image codec are injected
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Local models**: a single `.onnx` file or a `HuggingFace` style model folder
//! - **CORS**: preflight answers and `Access-Control-Allow-Origin: *` on every reply
//! - **Server binary**: `bgremove-server` (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_api::{server, BackendType, RemovalConfig, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let removal = RemovalConfig::builder()
//!     .backend_type(BackendType::Onnx)
//!     .model_path("models/isnet-general-onnx")
//!     .build()?;
//! let config = ServerConfig::builder().removal(removal).build()?;
//!
//! // POST {"image": "data:image/jpeg;base64,..."} to /api/remove-background
//! server::serve(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Embedding the handler
//!
//! Any [`BackgroundRemover`] can be plugged in, which is how the tests run
//! the whole request path without a model:
//!
//! ```rust
//! use std::sync::Arc;
//! use axum::http::{HeaderValue, StatusCode};
//! use bgremove_api::{DefaultImageCodec, MockBackend, ModelRemover, RemovalConfig, RequestHandler};
//!
//! let backend = Box::new(MockBackend::with_target_size(32));
//! let remover = ModelRemover::new(backend, RemovalConfig::default());
//! let handler = RequestHandler::new(Arc::new(remover), Arc::new(DefaultImageCodec));
//!
//! let body = br#"{"image": ""}"#;
//! let response = handler.handle_post(Some(&HeaderValue::from(body.len())), body);
//! assert_eq!(response.status, StatusCode::BAD_REQUEST);
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract`: Pure Rust backend
//! - `cli` (default): server binary, argument parsing and subscriber setup
//! - `tracing-json`: JSON log output
//! - `webp-support` (default): WebP input support

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod inference;
pub mod models;
pub mod payload;
pub mod remover;
pub mod server;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use codec::{DefaultImageCodec, ImageCodec};
pub use config::{
    BackendType, ExecutionProvider, RemovalConfig, RemovalConfigBuilder, ServerConfig,
    ServerConfigBuilder,
};
pub use error::{BgRemovalError, Result};
pub use handler::{HandlerError, HandlerResponse, RequestHandler};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, PreprocessingConfig};
pub use payload::{ErrorBody, RemoveBackgroundRequest, SuccessBody};
pub use remover::{BackendFactory, BackgroundRemover, ModelRemover};
pub use types::SegmentationMask;
pub use utils::{ImagePreprocessor, Letterbox};

#[cfg(feature = "cli")]
pub use tracing_config::{init_server_tracing, spans, TracingConfig, TracingFormat};

/// Remove the background from encoded image bytes, returning PNG bytes
///
/// Convenience for one-off use without the HTTP layer. The model is loaded
/// on every call; keep a [`ModelRemover`] around to amortise it.
///
/// ```rust,no_run
/// use bgremove_api::{remove_background_from_bytes, BackendType, RemovalConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let config = RemovalConfig::builder()
///     .backend_type(BackendType::Onnx)
///     .model_path("models/isnet.onnx")
///     .build()?;
/// let png = remove_background_from_bytes(&upload, &config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<Vec<u8>> {
    let image_bytes = image_bytes.to_vec();
    let config = config.clone();

    tokio::task::spawn_blocking(move || {
        let codec = DefaultImageCodec;
        let image = codec.decode(&image_bytes)?;
        let remover = ModelRemover::from_config(config)?;
        let result = remover.remove_background(&image)?;
        codec.encode_png(&result)
    })
    .await
    .map_err(|e| BgRemovalError::internal(format!("Background removal task failed: {e}")))?
}
