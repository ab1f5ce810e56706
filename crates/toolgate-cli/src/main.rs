//! CLI entry point.
//!
//! Loads `.env`, initialises logging, resolves configuration, and dispatches
//! to the command handlers. Logs go to stderr so `run` output stays clean
//! JSON lines on stdout.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolgate_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("toolgate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let ctx = bootstrap(CliConfig::from_cli(&cli)?)?;

    match command {
        Commands::Servers { credential_types } => {
            handlers::servers::execute(&ctx, credential_types)?;
        }
        Commands::Tools {
            server_id,
            credential,
        } => {
            handlers::tools::execute(&ctx, server_id, credential.as_deref()).await?;
        }
        Commands::Call {
            server_id,
            tool,
            args,
            credential,
        } => {
            handlers::call::execute(&ctx, server_id, tool, args, credential.as_deref()).await?;
        }
        Commands::ValidateCredential {
            credential_type,
            file,
        } => {
            handlers::credential::execute(&ctx, credential_type, file)?;
        }
        Commands::Nodes { json } => {
            handlers::nodes::execute(&ctx, *json)?;
        }
        Commands::Run {
            workflow,
            input,
            credentials,
        } => {
            handlers::run::execute(&ctx, workflow, input, credentials.as_deref()).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(e.downcast_ref::<CliError>().map_or(1, CliError::exit_code))
        }
    }
}
