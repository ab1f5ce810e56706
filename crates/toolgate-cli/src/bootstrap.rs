//! Composition root.
//!
//! The only place concrete infrastructure is wired together: the server
//! registry, the gateway and its transport factory, the node catalog, and,
//! for `run`, the model provider and engine.

use std::path::PathBuf;
use std::sync::Arc;

use toolgate_agent::{Engine, InMemoryNodeCatalog, ToolBridge};
use toolgate_core::{EngineSettings, validate_settings};
use toolgate_mcp::{DefaultTransportFactory, Gateway, ServerRegistry, TransportTimeouts};

use crate::error::CliError;
use crate::parser::Cli;
use crate::provider::OpenAiProvider;

/// Everything resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub settings: EngineSettings,
    pub servers: Option<PathBuf>,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl CliConfig {
    /// Resolve and range-check the configuration.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let settings = EngineSettings {
            model: cli.model.clone(),
            temperature: cli.temperature,
            max_steps: cli.max_steps,
            tool_call_timeout_secs: cli.tool_timeout,
            execution_timeout_secs: cli.execution_timeout,
            ..EngineSettings::default()
        };
        validate_settings(&settings)?;

        Ok(Self {
            settings,
            servers: cli.servers.clone(),
            api_key: cli.api_key.clone().filter(|key| !key.is_empty()),
            base_url: cli.base_url.clone(),
        })
    }
}

/// Fully composed context handed to command handlers.
pub struct CliContext {
    config: CliConfig,
    gateway: Gateway,
    catalog: Arc<InMemoryNodeCatalog>,
}

impl CliContext {
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.config.settings
    }

    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn catalog(&self) -> &InMemoryNodeCatalog {
        &self.catalog
    }

    /// Engine backed by the OpenAI-compatible provider.
    ///
    /// Requires an API key; the other commands do not.
    pub fn engine(&self) -> Result<Engine, CliError> {
        let api_key = self.config.api_key.clone().ok_or_else(|| {
            CliError::Config("OPENAI_API_KEY is not set (or pass --api-key)".into())
        })?;
        let provider = OpenAiProvider::new(&self.config.base_url, api_key, &self.config.settings);
        let bridge = ToolBridge::new(self.catalog.clone(), self.gateway.clone());

        Ok(Engine::new(Arc::new(provider), bridge).with_settings(self.config.settings.clone()))
    }
}

/// Wire the infrastructure for one CLI invocation.
pub fn bootstrap(config: CliConfig) -> Result<CliContext, CliError> {
    let registry = match &config.servers {
        Some(path) => ServerRegistry::from_json_file(path)?,
        None => ServerRegistry::with_defaults(),
    };
    tracing::debug!(
        servers = registry.list_all().len(),
        catalog = ?config.servers,
        "Server registry ready"
    );

    let factory = DefaultTransportFactory::new(TransportTimeouts::from_settings(&config.settings));
    let gateway = Gateway::new(Arc::new(registry)).with_factory(Arc::new(factory));

    Ok(CliContext {
        config,
        gateway,
        catalog: Arc::new(InMemoryNodeCatalog::with_builtins()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["toolgate"];
        argv.extend_from_slice(args);
        argv.push("nodes");
        Cli::parse_from(argv)
    }

    #[test]
    fn test_out_of_range_settings_are_rejected() {
        let err = CliConfig::from_cli(&cli(&["--max-steps", "0"])).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));

        let err = CliConfig::from_cli(&cli(&["--temperature", "3.5"])).unwrap_err();
        assert!(err.to_string().contains("Temperature"));
    }

    #[test]
    fn test_flags_become_settings() {
        let config =
            CliConfig::from_cli(&cli(&["--max-steps", "12", "--tool-timeout", "9"])).unwrap();
        assert_eq!(config.settings.effective_max_steps(), 12);
        assert_eq!(config.settings.tool_call_timeout_secs, Some(9));
    }

    #[test]
    fn test_bootstrap_with_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "echo", "name": "Echo", "transport": "stdio", "command": "echo-server"}}]"#
        )
        .unwrap();

        let mut config = CliConfig::from_cli(&cli(&[])).unwrap();
        config.servers = Some(file.path().to_path_buf());
        let ctx = bootstrap(config).unwrap();

        let ids: Vec<String> = ctx.gateway().list_servers().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["echo"]);
        assert_eq!(ctx.catalog().len(), 8);
    }

    #[test]
    fn test_engine_requires_api_key() {
        let mut config = CliConfig::from_cli(&cli(&[])).unwrap();
        config.api_key = None;
        let ctx = bootstrap(config).unwrap();
        assert!(matches!(ctx.engine(), Err(CliError::Config(_))));
    }
}
