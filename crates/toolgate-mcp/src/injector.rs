//! Credential injection.
//!
//! Turns a decrypted credential into the auth material a transport carries:
//! an HTTP header, a query parameter, or an environment variable for a local
//! process. Which one is decided by a strategy table keyed by credential type.

use std::collections::HashMap;

use thiserror::Error;
use toolgate_core::{Credential, InjectedAuth, ServerConfig};

/// Field read from credentials whose type has no strategy.
const FALLBACK_TOKEN_FIELD: &str = "token";

/// Errors raised while preparing credentials. Always surfaced before any
/// connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialInjectionError {
    #[error("Credential required for server '{server_id}' (type: {credential_type})")]
    MissingCredential {
        server_id: String,
        credential_type: String,
    },

    #[error("Server '{server_id}' requires a '{expected}' credential, got '{actual}'")]
    TypeMismatch {
        server_id: String,
        expected: String,
        actual: String,
    },

    #[error("Missing required field '{field}' in credential")]
    MissingField { field: String },
}

/// Where the secret goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionMethod {
    /// `Authorization: Bearer <secret>`.
    Bearer,
    /// A named header carrying the raw secret.
    Header { name: String },
    /// A query parameter appended to every request.
    Query { param: String },
    /// An environment variable for local processes.
    Env { var: String },
}

/// How to inject one credential type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionStrategy {
    pub method: InjectionMethod,
    /// Field of the credential's data holding the secret.
    pub token_field: String,
}

impl InjectionStrategy {
    pub fn bearer(token_field: impl Into<String>) -> Self {
        Self {
            method: InjectionMethod::Bearer,
            token_field: token_field.into(),
        }
    }

    pub fn header(name: impl Into<String>, token_field: impl Into<String>) -> Self {
        Self {
            method: InjectionMethod::Header { name: name.into() },
            token_field: token_field.into(),
        }
    }

    pub fn query(param: impl Into<String>, token_field: impl Into<String>) -> Self {
        Self {
            method: InjectionMethod::Query {
                param: param.into(),
            },
            token_field: token_field.into(),
        }
    }

    pub fn env(var: impl Into<String>, token_field: impl Into<String>) -> Self {
        Self {
            method: InjectionMethod::Env { var: var.into() },
            token_field: token_field.into(),
        }
    }

    fn apply(&self, secret: &str, auth: &mut InjectedAuth) {
        match &self.method {
            InjectionMethod::Bearer => {
                auth.headers
                    .insert("Authorization".to_string(), format!("Bearer {secret}"));
            }
            InjectionMethod::Header { name } => {
                auth.headers.insert(name.clone(), secret.to_string());
            }
            InjectionMethod::Query { param } => {
                auth.query.insert(param.clone(), secret.to_string());
            }
            InjectionMethod::Env { var } => {
                auth.env.insert(var.clone(), secret.to_string());
            }
        }
    }

    const fn method_name(&self) -> &'static str {
        match self.method {
            InjectionMethod::Bearer => "bearer",
            InjectionMethod::Header { .. } => "header",
            InjectionMethod::Query { .. } => "query",
            InjectionMethod::Env { .. } => "env",
        }
    }
}

/// Applies credentials to servers using a strategy table.
#[derive(Debug, Clone)]
pub struct CredentialInjector {
    strategies: HashMap<String, InjectionStrategy>,
}

impl Default for CredentialInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialInjector {
    /// Injector with the built-in strategy table.
    pub fn new() -> Self {
        let strategies = [
            ("slack_oauth", InjectionStrategy::bearer("access_token")),
            ("github_token", InjectionStrategy::bearer("token")),
            ("openai_api_key", InjectionStrategy::bearer("api_key")),
            (
                "anthropic_api_key",
                InjectionStrategy::header("x-api-key", "api_key"),
            ),
            ("google_oauth", InjectionStrategy::bearer("access_token")),
            ("notion_token", InjectionStrategy::bearer("token")),
            (
                "notion_oauth",
                InjectionStrategy::env("NOTION_TOKEN", "access_token"),
            ),
            (
                "weather_api_key",
                InjectionStrategy::query("appid", "api_key"),
            ),
            (
                "generic_api_key",
                InjectionStrategy::header("X-API-Key", "api_key"),
            ),
        ]
        .into_iter()
        .map(|(kind, strategy)| (kind.to_string(), strategy))
        .collect();

        Self { strategies }
    }

    /// Add or replace the strategy for a credential type.
    #[must_use]
    pub fn with_strategy(
        mut self,
        credential_type: impl Into<String>,
        strategy: InjectionStrategy,
    ) -> Self {
        self.strategies.insert(credential_type.into(), strategy);
        self
    }

    pub fn strategy(&self, credential_type: &str) -> Option<&InjectionStrategy> {
        self.strategies.get(credential_type)
    }

    /// Compute the auth material for connecting to `server` with `credential`.
    ///
    /// Servers that need no credential get empty auth whatever is passed.
    ///
    /// # Errors
    ///
    /// Fails when a required credential is absent, of the wrong type, or lacks
    /// its secret field.
    pub fn prepare(
        &self,
        server: &ServerConfig,
        credential: Option<&Credential>,
    ) -> Result<InjectedAuth, CredentialInjectionError> {
        let Some(required) = server.credential_type.as_deref() else {
            tracing::debug!(server_id = %server.id, "No credential required");
            return Ok(InjectedAuth::default());
        };

        let credential = credential.ok_or_else(|| CredentialInjectionError::MissingCredential {
            server_id: server.id.clone(),
            credential_type: required.to_string(),
        })?;

        if credential.credential_type != required {
            return Err(CredentialInjectionError::TypeMismatch {
                server_id: server.id.clone(),
                expected: required.to_string(),
                actual: credential.credential_type.clone(),
            });
        }

        let fallback;
        let strategy = if let Some(strategy) = self.strategies.get(&credential.credential_type) {
            strategy
        } else {
            tracing::warn!(
                credential_type = %credential.credential_type,
                using_default = "bearer",
                "Unknown credential strategy"
            );
            fallback = InjectionStrategy::bearer(FALLBACK_TOKEN_FIELD);
            &fallback
        };

        let secret = credential.field(&strategy.token_field).ok_or_else(|| {
            CredentialInjectionError::MissingField {
                field: strategy.token_field.clone(),
            }
        })?;

        let mut auth = InjectedAuth::default();
        strategy.apply(secret, &mut auth);

        tracing::debug!(
            server_id = %server.id,
            credential_type = %credential.credential_type,
            method = strategy.method_name(),
            "Credentials prepared"
        );
        Ok(auth)
    }

    /// Pre-flight check of credential data. Returns problems instead of failing.
    ///
    /// Unknown types accept any data.
    pub fn validate(&self, credential_type: &str, data: &HashMap<String, String>) -> Vec<String> {
        let Some(strategy) = self.strategies.get(credential_type) else {
            return Vec::new();
        };

        let mut problems = Vec::new();
        if !data.contains_key(&strategy.token_field) {
            problems.push(format!("Missing required field: {}", strategy.token_field));
        }
        if credential_type.ends_with("_oauth") && !data.contains_key("refresh_token") {
            problems.push("Missing refresh_token for OAuth credential".to_string());
        }
        problems
    }
}
