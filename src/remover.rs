//! Background removal capability

use crate::{
    backends::{create_backend, BoxedBackend},
    config::RemovalConfig,
    error::Result,
    models::ModelInfo,
    types::SegmentationMask,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, GenericImageView, RgbaImage};
use instant::Instant;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, span, warn, Level};

/// Builds a fresh backend, used to replace one left behind by a panic
pub type BackendFactory = Box<dyn Fn(&RemovalConfig) -> Result<BoxedBackend> + Send + Sync>;

/// Produces a copy of an image with its background made transparent
///
/// The output always has the dimensions of the input.
pub trait BackgroundRemover: Send + Sync {
    /// # Errors
    /// - Model loading or inference failures
    /// - Mask generation errors
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Remover running a segmentation model through an inference backend
///
/// The backend session is shared by all callers; concurrent requests take
/// turns at the model. A panic while the session is in use does not take the
/// remover down: the next caller rebuilds the backend through the factory, or
/// reuses the old one when there is no factory.
pub struct ModelRemover {
    backend: Mutex<BoxedBackend>,
    factory: Option<BackendFactory>,
    config: RemovalConfig,
}

impl ModelRemover {
    /// Wrap an already created backend
    #[must_use]
    pub fn new(backend: BoxedBackend, config: RemovalConfig) -> Self {
        Self {
            backend: Mutex::new(backend),
            factory: None,
            config,
        }
    }

    /// Create the backend through `factory`, keeping it for later rebuilds
    ///
    /// # Errors
    /// - Whatever the factory returns
    pub fn with_factory(config: RemovalConfig, factory: BackendFactory) -> Result<Self> {
        let backend = factory(&config)?;
        Ok(Self {
            backend: Mutex::new(backend),
            factory: Some(factory),
            config,
        })
    }

    /// Validate the configuration and create the configured backend
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend not compiled in or model path not usable
    pub fn from_config(config: RemovalConfig) -> Result<Self> {
        config.validate()?;
        Self::with_factory(config, Box::new(create_backend))
    }

    /// Load the model now instead of on the first request
    ///
    /// # Errors
    /// - Model loading or execution provider setup failures
    pub fn initialize(&self) -> Result<()> {
        let mut backend = self.lock_backend()?;
        Self::ensure_initialized(&mut backend, &self.config)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lock_backend()
            .map(|backend| backend.is_initialized())
            .unwrap_or(false)
    }

    pub fn model_info(&self) -> Result<ModelInfo> {
        self.lock_backend()?.get_model_info()
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    fn lock_backend(&self) -> Result<MutexGuard<'_, BoxedBackend>> {
        let poisoned = match self.backend.lock() {
            Ok(guard) => return Ok(guard),
            Err(poisoned) => poisoned,
        };

        let mut backend = poisoned.into_inner();
        match &self.factory {
            Some(factory) => {
                warn!("Inference backend panicked earlier, rebuilding it");
                // Stays poisoned until a rebuild succeeds
                *backend = factory(&self.config)?;
            }
            None => warn!("Inference backend panicked earlier, reusing it"),
        }
        self.backend.clear_poison();
        Ok(backend)
    }

    fn ensure_initialized(backend: &mut BoxedBackend, config: &RemovalConfig) -> Result<()> {
        if backend.is_initialized() {
            return Ok(());
        }

        info!(backend = %config.backend_type, "Initializing inference backend");
        if let Some(load_time) = backend.initialize(config)? {
            info!(
                load_ms = load_time.as_millis() as u64,
                "Inference backend ready"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for ModelRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRemover")
            .field("config", &self.config)
            .field("rebuildable", &self.factory.is_some())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemover for ModelRemover {
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let total_start = Instant::now();
        let original_dimensions = image.dimensions();

        let mut backend = self.lock_backend()?;
        Self::ensure_initialized(&mut backend, &self.config)?;
        let preprocessing_config = backend.get_preprocessing_config()?;

        let (input_tensor, letterbox) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let result = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
            debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Preprocessing done");
            result
        };

        let output_tensor = {
            let _span = span!(Level::DEBUG, "inference").entered();
            let start = Instant::now();
            let output = backend.infer(&input_tensor)?;
            debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Inference done");
            output
        };
        drop(backend);

        let result = {
            let _span = span!(Level::DEBUG, "mask_application").entered();
            let mask =
                SegmentationMask::from_tensor(&output_tensor, &letterbox, original_dimensions)?;
            debug!(foreground_ratio = mask.foreground_ratio(), "Mask generated");
            mask.apply_to_image(image)?
        };

        debug!(
            total_ms = total_start.elapsed().as_millis() as u64,
            "Background removed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::config::BackendType;
    use crate::error::BgRemovalError;
    use crate::inference::InferenceBackend;
    use crate::models::PreprocessingConfig;
    use image::{Rgb, RgbImage};
    use instant::Duration;
    use ndarray::Array4;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mock_config() -> RemovalConfig {
        RemovalConfig::builder()
            .backend_type(BackendType::Mock)
            .build()
            .unwrap()
    }

    fn remover(backend: MockBackend) -> ModelRemover {
        ModelRemover::new(Box::new(backend), mock_config())
    }

    /// White image with a dark square in the middle
    fn square_image(width: u32, height: u32) -> DynamicImage {
        let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        for y in height / 4..height * 3 / 4 {
            for x in width / 4..width * 3 / 4 {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        DynamicImage::ImageRgb8(image)
    }

    #[test]
    fn test_output_keeps_dimensions() {
        let remover = remover(MockBackend::with_target_size(64));

        for (width, height) in [(40, 40), (100, 30), (17, 90), (1, 1)] {
            let result = remover
                .remove_background(&square_image(width, height))
                .unwrap();
            assert_eq!(result.dimensions(), (width, height));
        }
    }

    #[test]
    fn test_lazy_and_eager_initialization() {
        let lazy = remover(MockBackend::with_target_size(32));
        assert!(!lazy.is_initialized());
        lazy.remove_background(&square_image(16, 16)).unwrap();
        assert!(lazy.is_initialized());

        let eager = remover(MockBackend::with_target_size(32));
        eager.initialize().unwrap();
        assert!(eager.is_initialized());
        // Second call is a no-op
        eager.initialize().unwrap();
    }

    #[test]
    fn test_alpha_follows_mask() {
        let remover = remover(MockBackend::with_target_size(64));
        let result = remover.remove_background(&square_image(64, 64)).unwrap();

        // Flat white corner has no edges: fully transparent and cleared
        assert_eq!(result.get_pixel(2, 2).0, [0, 0, 0, 0]);
        // Border of the dark square is an edge: opaque
        assert_eq!(result.get_pixel(16, 32).0[3], 255);
    }

    #[test]
    fn test_failures_propagate() {
        let remover = remover(MockBackend::with_target_size(32).failing_inference());
        let err = remover.remove_background(&square_image(8, 8)).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));

        let remover = remover_with_failing_init();
        assert!(remover.initialize().is_err());
        assert!(remover.remove_background(&square_image(8, 8)).is_err());
    }

    fn remover_with_failing_init() -> ModelRemover {
        remover(MockBackend::with_target_size(32).failing_initialization())
    }

    #[test]
    fn test_from_config() {
        let remover = ModelRemover::from_config(mock_config()).unwrap();
        assert_eq!(remover.model_info().unwrap().name, "Mock Backend");

        let missing_model = RemovalConfig {
            backend_type: BackendType::Onnx,
            model_path: None,
            ..RemovalConfig::default()
        };
        assert!(ModelRemover::from_config(missing_model).is_err());
    }

    /// Mock backend whose first inference panics while holding the lock
    struct PanicOnceBackend {
        inner: MockBackend,
        panicked: Arc<AtomicBool>,
    }

    impl InferenceBackend for PanicOnceBackend {
        fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
            self.inner.initialize(config)
        }

        fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("session crashed");
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

    fn panic_once_backend(panicked: &Arc<AtomicBool>) -> BoxedBackend {
        Box::new(PanicOnceBackend {
            inner: MockBackend::with_target_size(32),
            panicked: Arc::clone(panicked),
        })
    }

    #[test]
    fn test_panic_rebuilds_backend() {
        let panicked = Arc::new(AtomicBool::new(false));
        let builds = Arc::new(AtomicUsize::new(0));
        let factory: BackendFactory = {
            let panicked = Arc::clone(&panicked);
            let builds = Arc::clone(&builds);
            Box::new(move |_config: &RemovalConfig| {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(panic_once_backend(&panicked))
            })
        };
        let remover = ModelRemover::with_factory(mock_config(), factory).unwrap();
        let image = square_image(16, 16);

        let crashed = catch_unwind(AssertUnwindSafe(|| remover.remove_background(&image)));
        assert!(crashed.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // Rebuilt once, then served normally
        remover.remove_background(&image).unwrap();
        remover.remove_background(&image).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert!(remover.is_initialized());
    }

    #[test]
    fn test_panic_without_factory_reuses_backend() {
        let panicked = Arc::new(AtomicBool::new(false));
        let remover = ModelRemover::new(panic_once_backend(&panicked), mock_config());
        let image = square_image(16, 16);

        let crashed = catch_unwind(AssertUnwindSafe(|| remover.remove_background(&image)));
        assert!(crashed.is_err());

        let result = remover.remove_background(&image).unwrap();
        assert_eq!(result.dimensions(), (16, 16));
        assert_eq!(remover.model_info().unwrap().name, "Mock Backend");
    }

    #[test]
    fn test_failed_rebuild_is_retried() {
        let panicked = Arc::new(AtomicBool::new(false));
        let builds = Arc::new(AtomicUsize::new(0));
        let factory: BackendFactory = {
            let panicked = Arc::clone(&panicked);
            let builds = Arc::clone(&builds);
            Box::new(move |_config: &RemovalConfig| {
                match builds.fetch_add(1, Ordering::SeqCst) {
                    1 => Err(BgRemovalError::model("model file vanished")),
                    _ => Ok(panic_once_backend(&panicked)),
                }
            })
        };
        let remover = ModelRemover::with_factory(mock_config(), factory).unwrap();
        let image = square_image(16, 16);

        let crashed = catch_unwind(AssertUnwindSafe(|| remover.remove_background(&image)));
        assert!(crashed.is_err());

        let err = remover.remove_background(&image).unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
        remover.remove_background(&image).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }
}
