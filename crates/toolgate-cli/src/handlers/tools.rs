//! `tools`: connect and list what a server offers.

use std::path::Path;

use futures_util::FutureExt;
use toolgate_mcp::GatewayError;

use crate::bootstrap::CliContext;
use crate::credentials::load_credential;
use crate::error::CliError;
use crate::presentation::{print_separator, truncate_string};

pub async fn execute(
    ctx: &CliContext,
    server_id: &str,
    credential: Option<&Path>,
) -> Result<(), CliError> {
    let credential = credential.map(load_credential).transpose()?;

    let tools = ctx
        .gateway()
        .connection(server_id, credential.as_ref(), |conn| {
            async move { Ok::<_, GatewayError>(conn.tools().to_vec()) }.boxed()
        })
        .await?;

    println!("{} tool(s) on '{server_id}':\n", tools.len());
    println!("{:<32} Description", "Name");
    print_separator(90);
    for tool in tools {
        println!(
            "{:<32} {}",
            truncate_string(&tool.name, 31),
            truncate_string(&tool.description, 57)
        );
    }
    Ok(())
}
