//! `run`: execute a workflow and stream its events as JSON lines.

use std::path::Path;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolgate_core::{ExecutionError, Workflow};

use crate::bootstrap::CliContext;
use crate::credentials::load_credentials;
use crate::error::CliError;

pub async fn execute(
    ctx: &CliContext,
    workflow_path: &Path,
    input: &str,
    credentials: Option<&Path>,
) -> Result<(), CliError> {
    let workflow = load_workflow(workflow_path)?;
    let credentials = credentials.map(load_credentials).transpose()?.unwrap_or_default();
    let engine = ctx.engine()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling execution");
            interrupt.cancel();
        }
    });

    let (mut events, handle) = engine.spawn(workflow, parse_input(input), credentials, cancel);
    while let Some(event) = events.recv().await {
        let line = serde_json::to_string(&event).map_err(|e| CliError::Io(e.to_string()))?;
        println!("{line}");
    }

    let outcome = handle
        .await
        .map_err(|e| ExecutionError::failed(format!("Execution task failed: {e}")))?;
    outcome?;
    Ok(())
}

fn load_workflow(path: &Path) -> Result<Workflow, CliError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::Arguments(format!("Invalid workflow {}: {e}", path.display())))
}

/// JSON when the text parses as JSON, the raw text otherwise.
fn parse_input(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}
