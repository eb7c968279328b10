use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, Result};

/// Top-level configuration for Tasklane.
///
/// Loaded from `~/.tasklane/config.toml` by default. Each section maps to one
/// concern of the command engine; every section falls back to its defaults
/// when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasklaneConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl TasklaneConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TasklaneConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing,
    /// unparsable or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.providers.primary.validate("providers.primary")?;
        if let Some(secondary) = &self.providers.secondary {
            secondary.validate("providers.secondary")?;
        }
        if self.engine.max_command_length == 0 {
            return Err(invalid("engine.max_command_length", "must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> CoreError {
    CoreError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Offset from UTC, in minutes, of the wall clock users speak in.
    /// Relative dates ("mañana") resolve against this clock.
    pub timezone_offset_minutes: i32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timezone_offset_minutes: 0,
        }
    }
}

/// Primary and secondary completion backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub primary: ProviderConfig,
    /// Fallback backend. Leaving it out of a `[providers]` table disables
    /// fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderConfig {
                name: "deepseek".to_string(),
                api_url: "https://api.deepseek.com/chat/completions".to_string(),
                model: "deepseek-chat".to_string(),
                api_key: None,
                api_key_env: "TASKLANE_PRIMARY_API_KEY".to_string(),
                timeout_ms: 8_000,
                max_tokens: 1024,
            },
            secondary: Some(ProviderConfig {
                name: "anthropic".to_string(),
                api_url: "https://api.anthropic.com/v1/messages".to_string(),
                model: "claude-3-5-sonnet-latest".to_string(),
                api_key: None,
                api_key_env: "TASKLANE_SECONDARY_API_KEY".to_string(),
                timeout_ms: 15_000,
                max_tokens: 1024,
            }),
        }
    }
}

/// One completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name used in logs and telemetry.
    pub name: String,
    /// Endpoint URL. Anthropic URLs select the Messages API format,
    /// anything else the OpenAI-compatible chat format.
    pub api_url: String,
    pub model: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            api_url: String::new(),
            model: String::new(),
            api_key: None,
            api_key_env: String::new(),
            timeout_ms: 10_000,
            max_tokens: 1024,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key: inline value first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        if self.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid(&format!("{}.name", section), "must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid(
                &format!("{}.timeout_ms", section),
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Confidence thresholds for the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum confidence at which every action runs without confirmation.
    pub auto_execute_threshold: f64,
    /// Below this minimum confidence the engine asks a follow-up question.
    pub clarify_threshold: f64,
    /// Stricter bar a `delete` action must clear to run unattended.
    pub delete_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_execute_threshold: 0.85,
            clarify_threshold: 0.5,
            delete_threshold: 0.95,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("policy.auto_execute_threshold", self.auto_execute_threshold),
            ("policy.clarify_threshold", self.clarify_threshold),
            ("policy.delete_threshold", self.delete_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }
        if self.clarify_threshold > self.auto_execute_threshold {
            return Err(invalid(
                "policy.clarify_threshold",
                "must not exceed auto_execute_threshold",
            ));
        }
        if self.delete_threshold < self.auto_execute_threshold {
            return Err(invalid(
                "policy.delete_threshold",
                "must not be below auto_execute_threshold",
            ));
        }
        Ok(())
    }
}

/// Engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum command length in characters.
    pub max_command_length: usize,
    /// How long a suggested action set stays confirmable.
    pub suggestion_ttl_secs: u64,
    /// Upper bound on parked suggestions; oldest are evicted first.
    pub max_pending_suggestions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_command_length: 1000,
            suggestion_ttl_secs: 300,
            max_pending_suggestions: 100,
        }
    }
}
