//! `call`: one tool call over a scoped connection.

use std::path::Path;

use futures_util::FutureExt;
use toolgate_mcp::GatewayError;

use crate::bootstrap::CliContext;
use crate::credentials::load_credential;
use crate::error::CliError;
use crate::handlers::parse_json_arg;

pub async fn execute(
    ctx: &CliContext,
    server_id: &str,
    tool: &str,
    args: &str,
    credential: Option<&Path>,
) -> Result<(), CliError> {
    let arguments = parse_json_arg("--args", args)?;
    if !arguments.is_object() {
        return Err(CliError::Arguments("--args must be a JSON object".into()));
    }
    let credential = credential.map(load_credential).transpose()?;

    let tool_name = tool.to_string();
    let result = ctx
        .gateway()
        .connection(server_id, credential.as_ref(), move |conn| {
            async move { conn.call_tool(&tool_name, arguments).await }.boxed()
        })
        .await?;

    tracing::debug!(server_id, tool, "Tool call finished");
    println!("{}", result.to_text());
    Ok(())
}
