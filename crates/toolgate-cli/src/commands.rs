//! Subcommands.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// List enabled tool servers, or those usable with the given credential types
    Servers {
        /// Only servers that need no credential or one of these types
        #[arg(long = "credential-type")]
        credential_types: Vec<String>,
    },

    /// Connect to a server and list the tools it offers
    Tools {
        /// Server id from the catalog
        server_id: String,
        /// Credential file ({"type": ..., "data": {...}})
        #[arg(long)]
        credential: Option<PathBuf>,
    },

    /// Call one tool over a scoped connection
    Call {
        server_id: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Credential file ({"type": ..., "data": {...}})
        #[arg(long)]
        credential: Option<PathBuf>,
    },

    /// Check a credential file for problems before using it
    ValidateCredential {
        /// Credential type the file should satisfy
        credential_type: String,
        file: PathBuf,
    },

    /// List the node catalog
    Nodes {
        /// Print full definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a workflow, printing each event as one JSON line
    Run {
        /// Workflow file ({"id", "name", "graph": {"nodes", "edges"}})
        workflow: PathBuf,
        /// Input for the first turn; plain text or JSON
        #[arg(long, default_value = "")]
        input: String,
        /// Credential file holding one credential or an array of them
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
}
