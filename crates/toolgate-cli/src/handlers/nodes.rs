//! `nodes`: list the node catalog.

use toolgate_core::NodeCatalog;

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{print_separator, truncate_string};

pub fn execute(ctx: &CliContext, json: bool) -> Result<(), CliError> {
    let definitions = ctx.catalog().list();

    if json {
        let rendered = serde_json::to_string_pretty(&definitions)
            .map_err(|e| CliError::Io(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "{:<22} {:<8} {:<14} {:<12} Description",
        "Name", "Category", "Credential", "Server"
    );
    print_separator(100);
    for def in definitions {
        println!(
            "{:<22} {:<8} {:<14} {:<12} {}",
            def.name,
            def.category.as_str(),
            def.credential_type.as_deref().unwrap_or("--"),
            def.mcp_server_id.as_deref().unwrap_or("--"),
            truncate_string(&def.description, 40),
        );
    }
    Ok(())
}
