//! Mock backend for tests, benchmarks and model-free smoke runs

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, PreprocessingConfig};
use instant::Duration;
use ndarray::Array4;

/// Backend producing an edge-strength mask instead of a model prediction
///
/// Pixels whose red channel differs from their 4-neighbourhood by more than
/// a fixed threshold are marked foreground. This keeps the whole removal
/// pipeline runnable without model files.
#[derive(Debug, Clone)]
pub struct MockBackend {
    target_size: usize,
    initialized: bool,
    fail_initialization: bool,
    fail_inference: bool,
}

impl MockBackend {
    /// Create a mock backend with the default 1024x1024 input
    #[must_use]
    pub fn new() -> Self {
        Self::with_target_size(1024)
    }

    /// Create a mock backend with a smaller square input, useful for fast tests
    #[must_use]
    pub fn with_target_size(target_size: usize) -> Self {
        Self {
            target_size: target_size.max(3),
            initialized: false,
            fail_initialization: false,
            fail_inference: false,
        }
    }

    /// Make `initialize` fail
    #[must_use]
    pub fn failing_initialization(mut self) -> Self {
        self.fail_initialization = true;
        self
    }

    /// Make `infer` fail
    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.fail_initialization {
            return Err(BgRemovalError::model("Mock backend initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        if self.fail_inference {
            return Err(BgRemovalError::inference("Mock backend inference failure"));
        }

        let (n, _c, h, w) = input.dim();
        let mut output = Array4::<f32>::zeros((n, 1, h, w));

        for batch in 0..n {
            for y in 1..h.saturating_sub(1) {
                for x in 1..w.saturating_sub(1) {
                    let value = |yy: usize, xx: usize| {
                        input.get([batch, 0, yy, xx]).copied().unwrap_or(0.0)
                    };
                    let center = value(y, x);
                    let edge_strength = ((center - value(y, x - 1)).abs()
                        + (center - value(y, x + 1)).abs()
                        + (center - value(y - 1, x)).abs()
                        + (center - value(y + 1, x)).abs())
                        / 4.0;

                    if let Some(elem) = output.get_mut([batch, 0, y, x]) {
                        *elem = if edge_strength > 0.1 { 1.0 } else { 0.0 };
                    }
                }
            }
        }

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.target_size, self.target_size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.target_size, self.target_size)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let size = u32::try_from(self.target_size)
            .map_err(|_| BgRemovalError::invalid_config("Mock target size too large"))?;
        Ok(PreprocessingConfig {
            target_size: [size, size],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "Mock Backend".to_string(),
            precision: "mock".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
