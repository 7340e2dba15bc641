//! Background removal HTTP server
//!
//! Serves the removal endpoint backed by the ONNX Runtime, Tract or mock
//! inference backends.

use bgremove_api::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
