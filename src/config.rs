//! Router configuration.
//!
//! Loaded from TOML with the following resolution order:
//! 1. Explicit path (e.g. `--config <path>`)
//! 2. `~/.bifrost/config.toml` (user)
//! 3. `/etc/bifrost/config.toml` (system)
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::health::HealthConfig;
use crate::ledger::LedgerConfig;
use crate::profiler::DEFAULT_PROFILE_TTL;
use crate::selection::{MAX_WIDTH, SelectionConfig};
use crate::timeout::TimeoutConfig;
use crate::types::ModelCapability;
use crate::{BifrostError, Result};

/// Complete router configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub selection: SelectionConfig,
    pub health: HealthConfig,
    pub profiler: ProfilerConfig,
    pub ledger: LedgerConfig,
    pub timeouts: TimeoutConfig,
    pub providers: ProvidersConfig,
    pub catalog: CatalogConfig,
}

/// Resource profiler settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// How long a detected profile is reused. Default: 300.
    pub ttl_secs: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_PROFILE_TTL.as_secs(),
        }
    }
}

impl ProfilerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Provider configurations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
    #[serde(default)]
    pub remote: Vec<RemoteProviderConfig>,
}

/// Ollama-specific configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OllamaConfig {
    /// Ollama base URL (default: http://localhost:11434).
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// An OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteProviderConfig {
    /// Provider name used in catalog entries.
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Extra static catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogConfig {
    /// Skip the bundled seed entries. Default: false.
    #[serde(default)]
    pub skip_seed: bool,
    #[serde(default)]
    pub models: Vec<ModelCapability>,
}

impl RouterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BifrostError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the standard locations.
    ///
    /// Fails if no file is found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BifrostError::Configuration(msg) => {
                BifrostError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Like [`load`](Self::load), but defaults when no file exists.
    ///
    /// An explicit path that does not exist is still an error.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        if explicit_path.is_none() && Self::default_paths().iter().all(|p| !p.exists()) {
            return Ok(Self::default());
        }
        Self::load(explicit_path)
    }

    /// Reject values that would make the router misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.selection.width == 0 || self.selection.width > MAX_WIDTH {
            return Err(invalid(format!(
                "selection.width must be between 1 and {MAX_WIDTH}, got {}",
                self.selection.width
            )));
        }
        if self.health.ttl_secs == 0 {
            return Err(invalid("health.ttl_secs must be positive"));
        }
        if self.health.failure_threshold == 0 {
            return Err(invalid("health.failure_threshold must be positive"));
        }
        for (field, alpha) in [
            ("health.latency_alpha", self.health.latency_alpha),
            ("health.error_rate_alpha", self.health.error_rate_alpha),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(invalid(format!("{field} must be in (0, 1], got {alpha}")));
            }
        }
        if self.ledger.capacity == 0 {
            return Err(invalid("ledger.capacity must be positive"));
        }
        if self.ledger.speed_reference_ms == 0 {
            return Err(invalid("ledger.speed_reference_ms must be positive"));
        }
        if self.timeouts.min_secs > self.timeouts.max_secs {
            return Err(invalid(format!(
                "timeouts.min_secs ({}) exceeds timeouts.max_secs ({})",
                self.timeouts.min_secs, self.timeouts.max_secs
            )));
        }
        if !(self.timeouts.safety_buffer >= 1.0) {
            return Err(invalid(format!(
                "timeouts.safety_buffer must be at least 1.0, got {}",
                self.timeouts.safety_buffer
            )));
        }
        for remote in &self.providers.remote {
            if remote.name.is_empty() || remote.base_url.is_empty() {
                return Err(invalid("providers.remote entries need a name and base_url"));
            }
        }
        Ok(())
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".bifrost").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/bifrost/config.toml"));
        paths
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(BifrostError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::default_paths()
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                BifrostError::Configuration(
                    "No config file found. Create ~/.bifrost/config.toml or /etc/bifrost/config.toml"
                        .to_string(),
                )
            })
    }
}

fn invalid(message: impl Into<String>) -> BifrostError {
    BifrostError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = RouterConfig::from_toml_str("").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.selection.width, 3);
        assert_eq!(config.profiler.ttl_secs, 300);
        assert!(config.providers.ollama.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [selection]
            width = 5
            provider_priority = ["ollama", "openrouter"]

            [health]
            ttl_secs = 10
            failure_threshold = 2

            [timeouts]
            max_secs = 300

            [providers.ollama]

            [[providers.remote]]
            name = "openrouter"
            base_url = "https://openrouter.ai/api/v1"
            api_key_env = "OPENROUTER_API_KEY"

            [[catalog.models]]
            name = "mistral:7b"
            provider = "ollama"
            strengths = ["chat", "general"]
            tool_calling = true
        "#;
        let config = RouterConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.selection.width, 5);
        assert_eq!(config.selection.provider_priority, ["ollama", "openrouter"]);
        assert!(config.selection.last_resort);
        assert_eq!(config.health.failure_threshold, 2);
        assert_eq!(config.health.probe_timeout_secs, 5);
        assert_eq!(config.timeouts.max_secs, 300);
        assert_eq!(config.timeouts.min_secs, 10);
        assert_eq!(
            config.providers.ollama.unwrap().base_url,
            "http://localhost:11434"
        );
        assert_eq!(config.providers.remote[0].name, "openrouter");
        assert_eq!(config.catalog.models.len(), 1);
        assert!(config.catalog.models[0].tool_calling);
    }

    #[test]
    fn zero_width_is_rejected() {
        let err = RouterConfig::from_toml_str("[selection]\nwidth = 0").unwrap_err();
        assert!(err.to_string().contains("selection.width"));
    }

    #[test]
    fn small_safety_buffer_is_rejected() {
        let err = RouterConfig::from_toml_str("[timeouts]\nsafety_buffer = 0.5").unwrap_err();
        assert!(err.to_string().contains("safety_buffer"));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = RouterConfig::load(Some(Path::new("/nonexistent/bifrost.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }
}
