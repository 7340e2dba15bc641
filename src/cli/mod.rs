//! Command-line front end for the server binary
//!
//! Only available with the `cli` feature.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use config::CliConfigBuilder;
pub use main_impl::{main, Cli, CliLogFormat};
