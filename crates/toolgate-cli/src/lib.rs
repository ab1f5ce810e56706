//! Command-line adapter for toolgate.
//!
//! `bootstrap` is the composition root: it turns flags and environment into
//! settings, a server registry, a gateway, a node catalog and the engine.
//! Handlers stay thin and print results for the terminal.
#![deny(unused_crate_dependencies)]

// Used by the binary entry point only.
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod provider;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
pub use provider::OpenAiProvider;
