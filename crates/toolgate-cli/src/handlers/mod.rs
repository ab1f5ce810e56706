//! Command handlers.
//!
//! Each handler is `execute(ctx, ...) -> Result<(), CliError>`: parse the
//! command's input, call into the gateway, catalog or engine, and print.

pub mod call;
pub mod credential;
pub mod nodes;
pub mod run;
pub mod servers;
pub mod tools;

use serde_json::Value;

use crate::error::CliError;

/// Parse a JSON argument given on the command line.
pub(crate) fn parse_json_arg(flag: &str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Arguments(format!("{flag} is not valid JSON: {e}")))
}
