//! Credential domain types.
//!
//! Decrypted credentials are ephemeral: they live for one gateway or engine
//! call and are never persisted or logged. `Debug` output therefore lists
//! field names only.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A decrypted, typed bundle of secret values for one user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential type tag (e.g. "slack_oauth").
    #[serde(rename = "type")]
    pub credential_type: String,

    /// Secret values keyed by field name.
    #[serde(default)]
    pub data: HashMap<String, String>,

    /// Opaque owner scope supplied by the credential store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Credential {
    pub fn new(credential_type: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            data: HashMap::new(),
            owner: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Look up a non-empty secret field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("credential_type", &self.credential_type)
            .field("fields", &self.field_names())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Transport-specific auth material produced by applying a credential to a server.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InjectedAuth {
    /// HTTP headers (HTTP-based transports).
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to every HTTP request.
    pub query: BTreeMap<String, String>,
    /// Environment additions for local processes.
    pub env: BTreeMap<String, String>,
}

impl InjectedAuth {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.query.is_empty() && self.env.is_empty()
    }
}

impl fmt::Debug for InjectedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedAuth")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("query", &self.query.keys().collect::<Vec<_>>())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}
