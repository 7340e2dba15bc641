//! Inference backend implementations
//!
//! - ONNX Runtime backend (GPU acceleration, `onnx` feature)
//! - Tract backend (pure Rust, `tract` feature)
//! - Mock backend (always available, no model)

pub mod mock;
#[cfg(feature = "onnx")]
pub mod onnx;
#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::MockBackend;
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;
#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::{
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
};

/// Boxed backend that can move into the blocking worker pool
pub type BoxedBackend = Box<dyn InferenceBackend + Send>;

/// Backend types compiled into this build
#[must_use]
pub fn available_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    backends.push(BackendType::Mock);
    backends
}

/// Create the backend selected by the configuration
///
/// The model path is resolved here; the model itself is only read when the
/// backend is initialized.
///
/// # Errors
/// - Backend not compiled into this build
/// - Missing or unreadable model path
pub fn create_backend(config: &RemovalConfig) -> Result<BoxedBackend> {
    match config.backend_type {
        BackendType::Mock => Ok(Box::new(MockBackend::new())),
        #[cfg(feature = "onnx")]
        BackendType::Onnx => {
            let manager = model_manager(config)?;
            Ok(Box::new(OnnxBackend::with_model_manager(manager)))
        },
        #[cfg(feature = "tract")]
        BackendType::Tract => {
            let manager = model_manager(config)?;
            Ok(Box::new(TractBackend::with_model_manager(manager)))
        },
        #[allow(unreachable_patterns)]
        other => Err(BgRemovalError::invalid_config(format!(
            "Backend '{other}' is not compiled into this build (available: {:?})",
            available_backends()
        ))),
    }
}

#[cfg(any(feature = "onnx", feature = "tract"))]
fn model_manager(config: &RemovalConfig) -> Result<crate::models::ModelManager> {
    let path = config.model_path.as_ref().ok_or_else(|| {
        BgRemovalError::invalid_config(format!(
            "A model path is required for the {} backend",
            config.backend_type
        ))
    })?;
    crate::models::ModelManager::from_path(path, config.variant.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_always_available() {
        assert!(available_backends().contains(&BackendType::Mock));

        let config = RemovalConfig::builder()
            .backend_type(BackendType::Mock)
            .build()
            .unwrap();
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.input_shape(), (1, 3, 1024, 1024));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_onnx_requires_existing_model() {
        let config = RemovalConfig {
            model_path: Some("/definitely/not/here.onnx".into()),
            ..RemovalConfig::default()
        };
        assert!(create_backend(&config).is_err());
    }
}
