//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{BackendType, ExecutionProvider, RemovalConfig, ServerConfig},
    error::{BgRemovalError, Result},
};

/// Convert CLI arguments to a `ServerConfig`
pub struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build and validate the server configuration from CLI arguments
    ///
    /// # Errors
    /// - Unknown backend or provider in `--execution-provider`
    /// - Missing model path for a model-backed backend
    /// - Invalid route, variant or body limit
    pub fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let (backend_type, execution_provider) =
            Self::parse_provider_string(&cli.execution_provider)?;

        let mut removal = RemovalConfig::builder()
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            // Same thread count for intra and inter op parallelism
            .intra_threads(cli.threads)
            .inter_threads(cli.threads);

        if let Some(model) = &cli.model {
            removal = removal.model_path(model);
        }
        if let Some(variant) = &cli.variant {
            removal = removal.variant(variant);
        }

        ServerConfig::builder()
            .bind_address(cli.bind)
            .route(&cli.route)
            .max_body_bytes(cli.max_body_bytes)
            .removal(removal.build()?)
            .build()
    }

    /// Parse `backend:provider` (or a bare backend name) into its parts
    ///
    /// ```text
    /// onnx:auto   onnx:cpu   onnx:cuda   onnx:coreml   onnx
    /// tract:cpu   tract
    /// mock
    /// ```
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let (backend, provider) = match provider_str.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (provider_str, None),
        };

        match (backend, provider) {
            ("onnx", None) => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", Some(provider)) => Ok((BackendType::Onnx, provider.parse()?)),
            ("tract", None | Some("cpu")) => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", Some(provider)) => Err(BgRemovalError::invalid_config(format!(
                "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
            ))),
            ("mock", None) => Ok((BackendType::Mock, ExecutionProvider::Cpu)),
            _ => Err(BgRemovalError::invalid_config(format!(
                "Invalid execution provider '{provider_str}'. \
                 Use backend:provider (e.g., onnx:auto, tract:cpu) or mock"
            ))),
        }
    }
}
