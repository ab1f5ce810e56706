//! Engine settings and validation.
//!
//! All fields are optional so that settings can be layered (defaults, then
//! environment, then command-line flags) with `merge`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default model identifier passed to the provider.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

/// Default step budget for one execution.
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Default timeout for a single transport request.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Default timeout for connecting to a tool server, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default budget for a whole execution.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;

/// Default grace period between terminate and kill for local processes.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Engine and gateway settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Model identifier passed to the provider.
    pub model: Option<String>,

    /// Sampling temperature (0.0-2.0).
    pub temperature: Option<f64>,

    /// Maximum number of tool-calling steps per execution (1-1000).
    pub max_steps: Option<u32>,

    /// Per-request timeout for tool servers, in seconds.
    pub tool_call_timeout_secs: Option<u64>,

    /// Connect and handshake timeout for tool servers, in seconds.
    pub connect_timeout_secs: Option<u64>,

    /// Whole-execution timeout, in seconds.
    pub execution_timeout_secs: Option<u64>,

    /// Terminate-to-kill grace period for local tool servers, in seconds.
    pub shutdown_grace_secs: Option<u64>,
}

impl EngineSettings {
    /// Create settings with every field at its default.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.to_string()),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_steps: Some(DEFAULT_MAX_STEPS),
            tool_call_timeout_secs: Some(DEFAULT_TOOL_TIMEOUT_SECS),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            execution_timeout_secs: Some(DEFAULT_EXECUTION_TIMEOUT_SECS),
            shutdown_grace_secs: Some(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }

    #[must_use]
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    #[must_use]
    pub fn effective_temperature(&self) -> f64 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    #[must_use]
    pub fn effective_max_steps(&self) -> u32 {
        self.max_steps.unwrap_or(DEFAULT_MAX_STEPS)
    }

    #[must_use]
    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(
            self.tool_call_timeout_secs
                .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(
            self.execution_timeout_secs
                .unwrap_or(DEFAULT_EXECUTION_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(
            self.shutdown_grace_secs
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        )
    }

    /// Apply a partial update, only touching fields that are `Some`.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref model) = other.model {
            self.model.clone_from(model);
        }
        if let Some(temperature) = other.temperature {
            self.temperature = temperature;
        }
        if let Some(steps) = other.max_steps {
            self.max_steps = steps;
        }
        if let Some(secs) = other.tool_call_timeout_secs {
            self.tool_call_timeout_secs = secs;
        }
        if let Some(secs) = other.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = other.execution_timeout_secs {
            self.execution_timeout_secs = secs;
        }
        if let Some(secs) = other.shutdown_grace_secs {
            self.shutdown_grace_secs = secs;
        }
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = reset the field to its default
/// - `Some(Some(value))` = set the field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub model: Option<Option<String>>,
    pub temperature: Option<Option<f64>>,
    pub max_steps: Option<Option<u32>>,
    pub tool_call_timeout_secs: Option<Option<u64>>,
    pub connect_timeout_secs: Option<Option<u64>>,
    pub execution_timeout_secs: Option<Option<u64>>,
    pub shutdown_grace_secs: Option<Option<u64>>,
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("Max steps must be between 1 and 1000, got {0}")]
    InvalidMaxSteps(u32),

    #[error("{name} must be between 1 and 3600 seconds, got {value}")]
    InvalidTimeout { name: &'static str, value: u64 },

    #[error("Temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f64),

    #[error("Model identifier cannot be empty")]
    EmptyModel,
}

/// Validate settings values.
pub fn validate_settings(settings: &EngineSettings) -> Result<(), SettingsError> {
    if let Some(steps) = settings.max_steps
        && !(1..=1000).contains(&steps)
    {
        return Err(SettingsError::InvalidMaxSteps(steps));
    }

    let timeouts = [
        ("Tool call timeout", settings.tool_call_timeout_secs),
        ("Connect timeout", settings.connect_timeout_secs),
        ("Execution timeout", settings.execution_timeout_secs),
        ("Shutdown grace", settings.shutdown_grace_secs),
    ];
    for (name, value) in timeouts {
        if let Some(value) = value
            && !(1..=3600).contains(&value)
        {
            return Err(SettingsError::InvalidTimeout { name, value });
        }
    }

    if let Some(temperature) = settings.temperature
        && !(0.0..=2.0).contains(&temperature)
    {
        return Err(SettingsError::InvalidTemperature(temperature));
    }

    if settings
        .model
        .as_ref()
        .is_some_and(|m| m.trim().is_empty())
    {
        return Err(SettingsError::EmptyModel);
    }

    Ok(())
}
