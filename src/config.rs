//! Configuration types for the removal engine and the HTTP server

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default endpoint path, matching the serverless route the handler replaces
pub const DEFAULT_ROUTE: &str = "/api/remove-background";

/// Default maximum accepted request body (32 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, CPU only)
    Tract,
    /// Deterministic edge-strength mask, no model required
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Configuration for the model-backed remover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Path to an `.onnx` file or a model folder (unused by the mock backend)
    pub model_path: Option<PathBuf>,

    /// Model variant inside a folder (`fp32`, `fp16`)
    pub variant: Option<String>,

    /// Inference backend
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            variant: None,
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

impl RemovalConfig {
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Check that the configuration can produce a working backend
    pub fn validate(&self) -> Result<()> {
        if self.backend_type != BackendType::Mock && self.model_path.is_none() {
            return Err(BgRemovalError::invalid_config(format!(
                "A model path is required for the {} backend",
                self.backend_type
            )));
        }

        if let Some(variant) = &self.variant {
            if variant != "fp32" && variant != "fp16" {
                return Err(BgRemovalError::invalid_config(format!(
                    "Unknown model variant '{variant}' (expected fp32 or fp16)"
                )));
            }
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RemovalConfig::default(),
        }
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn variant<S: Into<String>>(mut self, variant: S) -> Self {
        self.config.variant = Some(variant.into());
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for RemovalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the HTTP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_address: SocketAddr,

    /// Path serving POST and OPTIONS
    pub route: String,

    /// Maximum request body accepted by the router
    pub max_body_bytes: usize,

    /// Remover configuration
    pub removal: RemovalConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            route: DEFAULT_ROUTE.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            removal: RemovalConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.route.starts_with('/') {
            return Err(BgRemovalError::invalid_config(format!(
                "Route must start with '/': {}",
                self.route
            )));
        }
        if self.route == "/health" {
            return Err(BgRemovalError::invalid_config(
                "Route '/health' is reserved for the liveness probe",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(BgRemovalError::invalid_config(
                "Maximum body size must be greater than zero",
            ));
        }
        self.removal.validate()
    }
}

/// Builder for `ServerConfig`
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    #[must_use]
    pub fn bind_address(mut self, address: SocketAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    #[must_use]
    pub fn route<S: Into<String>>(mut self, route: S) -> Self {
        self.config.route = route.into();
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    #[must_use]
    pub fn removal(mut self, removal: RemovalConfig) -> Self {
        self.config.removal = removal;
        self
    }

    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
