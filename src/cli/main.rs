//! Background removal HTTP server
//!
//! Parses flags, initialises tracing, loads the model and serves the endpoint.

use super::config::CliConfigBuilder;
use crate::{
    backends::available_backends,
    server,
    tracing_config::{init_server_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Instrument;

/// Background removal HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-server")]
pub struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Path serving the removal endpoint (POST and OPTIONS)
    #[arg(short, long, default_value = crate::config::DEFAULT_ROUTE)]
    pub route: String,

    /// Path to an .onnx file or a model folder (not needed with --execution-provider mock)
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Model variant inside a model folder (fp16, fp32) [default: fp32 if present]
    #[arg(long)]
    pub variant: Option<String>,

    /// Execution provider as backend:provider
    /// (e.g., onnx:auto, onnx:coreml, tract:cpu, mock)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Largest request body accepted, in bytes
    #[arg(long, default_value_t = crate::config::DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show compiled backends and execution providers, then exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    let session_id = init_server_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let backend = config.removal.backend_type.to_string();

    let model = config
        .removal
        .model_path
        .as_ref()
        .map_or_else(|| "none".to_string(), |path| path.display().to_string());
    tracing::info!(
        model = %model,
        provider = %config.removal.execution_provider,
        "Loading model"
    );

    async {
        let handler = server::build_handler(&config)
            .instrument(spans::model_loading(
                &model,
                &config.removal.execution_provider.to_string(),
            ))
            .await
            .context("Failed to load model")?;
        server::serve_handler(handler, &config)
            .await
            .context("Server error")
    }
    .instrument(spans::session(&session_id, &backend))
    .await
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nCompiled backends:");
    for backend in available_backends() {
        println!("  - {backend}");
    }

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {name}: {status} - {description}");
        }
    }

    println!("\nUsage examples:");
    println!("  --execution-provider onnx:auto    # Best available ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider tract:cpu    # Pure Rust Tract backend");
    println!("  --execution-provider mock         # Edge-detection stand-in, no model needed");
}
