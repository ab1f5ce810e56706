//! `servers`: list the catalog.

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::{print_separator, truncate_string};

pub fn execute(ctx: &CliContext, credential_types: &[String]) -> Result<(), CliError> {
    let servers = if credential_types.is_empty() {
        ctx.gateway().list_servers()
    } else {
        ctx.gateway().servers_available_to_user(credential_types)
    };

    if servers.is_empty() {
        println!("No tool servers available.");
        return Ok(());
    }

    println!(
        "{:<16} {:<22} {:<16} {:<16} Description",
        "ID", "Name", "Transport", "Credential"
    );
    print_separator(100);
    for server in servers {
        println!(
            "{:<16} {:<22} {:<16} {:<16} {}",
            truncate_string(&server.id, 15),
            truncate_string(&server.name, 21),
            server.kind().as_str(),
            server.credential_type.as_deref().unwrap_or("--"),
            server.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}
