//! Model loading from local paths
//!
//! Two layouts are accepted:
//! - a single `.onnx` file, which gets `ISNet` preprocessing defaults;
//! - a `HuggingFace` style folder with `preprocessor_config.json` and an
//!   `onnx/` directory holding `model.onnx` (fp32) and/or `model_fp16.onnx`.

use crate::error::{BgRemovalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default square input size for `ISNet` style models
pub const DEFAULT_TARGET_SIZE: u32 = 1024;

/// Preprocessing parameters the model was trained with
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Target size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel mean in the 0-1 range
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation in the 0-1 range
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Resolved model on disk
#[derive(Debug, Clone)]
pub struct ModelManager {
    onnx_path: PathBuf,
    name: String,
    precision: String,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model from a file or folder path
    ///
    /// # Errors
    /// - Path does not exist
    /// - Folder without a readable `preprocessor_config.json`
    /// - Requested variant not present in the `onnx/` directory
    pub fn from_path<P: AsRef<Path>>(path: P, variant: Option<&str>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BgRemovalError::invalid_config(format!(
                "Model path does not exist: {}",
                path.display()
            )));
        }

        if path.is_file() {
            return Ok(Self::from_onnx_file(path));
        }

        Self::from_folder(path, variant)
    }

    fn from_onnx_file(path: &Path) -> Self {
        let name = path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let precision = if name.ends_with("fp16") { "fp16" } else { "fp32" };

        Self {
            onnx_path: path.to_path_buf(),
            name,
            precision: precision.to_string(),
            preprocessing: PreprocessingConfig::default(),
        }
    }

    fn from_folder(path: &Path, variant: Option<&str>) -> Result<Self> {
        let preprocessor_path = path.join("preprocessor_config.json");
        let content = fs::read_to_string(&preprocessor_path)
            .map_err(|e| BgRemovalError::file_io_error("read", &preprocessor_path, &e))?;
        let preprocessor: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to parse preprocessor_config.json: {e}"))
        })?;

        let preprocessing = PreprocessingConfig {
            target_size: Self::parse_target_size(&preprocessor)?,
            normalization_mean: Self::parse_channel_values(&preprocessor, "image_mean")?,
            normalization_std: Self::parse_channel_values(&preprocessor, "image_std")?,
        };

        let precision = Self::resolve_variant(path, variant)?;
        let file_name = if precision == "fp16" {
            "model_fp16.onnx"
        } else {
            "model.onnx"
        };

        let name = Self::read_model_name(path).unwrap_or_else(|| {
            path.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        });

        Ok(Self {
            onnx_path: path.join("onnx").join(file_name),
            name,
            precision,
            preprocessing,
        })
    }

    /// Pick the variant, preferring fp32 when nothing is requested
    fn resolve_variant(path: &Path, requested: Option<&str>) -> Result<String> {
        let onnx_dir = path.join("onnx");
        let mut available = Vec::new();
        if onnx_dir.join("model.onnx").is_file() {
            available.push("fp32");
        }
        if onnx_dir.join("model_fp16.onnx").is_file() {
            available.push("fp16");
        }

        if available.is_empty() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                path,
                "no model.onnx or model_fp16.onnx under onnx/",
                &["check the model folder layout"],
            ));
        }

        match requested {
            Some(variant) if available.contains(&variant) => Ok(variant.to_string()),
            Some(variant) => Err(BgRemovalError::model_error_with_context(
                "load variant of",
                path,
                &format!("variant '{variant}' not found. Available: {available:?}"),
                &[],
            )),
            None => Ok(available.first().copied().unwrap_or("fp32").to_string()),
        }
    }

    /// `config.json` is optional; it only contributes a display name
    fn read_model_name(path: &Path) -> Option<String> {
        let content = fs::read_to_string(path.join("config.json")).ok()?;
        let config: serde_json::Value = serde_json::from_str(&content).ok()?;
        config
            .get("name")
            .or_else(|| config.get("model_type"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    fn parse_target_size(preprocessor: &serde_json::Value) -> Result<[u32; 2]> {
        let Some(size) = preprocessor.get("size") else {
            return Ok([DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE]);
        };

        let dimension = |key: &str| -> Result<u32> {
            size.get(key)
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    BgRemovalError::invalid_config(format!("Missing {key} in size config"))
                })?
                .try_into()
                .map_err(|_| BgRemovalError::invalid_config(format!("{key} too large for u32")))
        };

        let height = dimension("height")?;
        let width = dimension("width")?;
        if height == 0 || width == 0 {
            return Err(BgRemovalError::invalid_config(
                "Target size must be non-zero",
            ));
        }

        Ok([height, width])
    }

    /// Channel values may be given in the 0-255 range; normalise them to 0-1
    ///
    /// Every entry must be a number, and standard deviations must be positive.
    fn parse_channel_values(preprocessor: &serde_json::Value, key: &str) -> Result<[f32; 3]> {
        let values = preprocessor
            .get(key)
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!("Missing {key} in preprocessor config"))
            })?;

        let parsed = values
            .iter()
            .map(|value| {
                value.as_f64().ok_or_else(|| {
                    BgRemovalError::invalid_config(format!(
                        "{key} contains a non-numeric value: {value}"
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let [a, b, c] = parsed.as_slice() else {
            return Err(BgRemovalError::invalid_config(format!(
                "{key} must have exactly 3 numeric values"
            )));
        };

        if key == "image_std" && [a, b, c].iter().any(|v| **v <= 0.0) {
            return Err(BgRemovalError::invalid_config(format!(
                "{key} values must be greater than 0"
            )));
        }

        let scale = if [a, b, c].iter().any(|v| **v > 1.0) {
            255.0
        } else {
            1.0
        };

        Ok([(a / scale) as f32, (b / scale) as f32, (c / scale) as f32])
    }

    /// Load model data as bytes
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.onnx_path)
            .map_err(|e| BgRemovalError::file_io_error("read", &self.onnx_path, &e))
    }

    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.onnx_path)
            .map(|m| m.len() as usize)
            .unwrap_or(0);
        let [height, width] = self.preprocessing.target_size;

        Ok(ModelInfo {
            name: self.name.clone(),
            precision: self.precision.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    pub fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing.clone())
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.onnx_path
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.precision)
    }
}
