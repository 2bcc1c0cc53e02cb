//! Model identity and declared capability metadata.
//!
//! A [`ModelCapability`] is what the catalog stores for every known
//! (provider, model) pair: what it is good at, what it needs from the host,
//! and how fast it is expected to be.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BifrostError;

/// Unique identifier for a (provider, model) pair.
///
/// Displays and parses as `provider/model`. Only the first `/` separates the
/// two halves, so model names like `meta-llama/llama-3.1-8b` survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub provider: String,
    pub model: String,
}

impl ModelKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

impl FromStr for ModelKey {
    type Err = BifrostError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(BifrostError::validation(
                "model key",
                format!("expected 'provider/model', got '{s}'"),
            )),
        }
    }
}

/// Where a model executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// Runs on this host (e.g. Ollama); subject to resource filtering.
    #[default]
    Local,
    /// Runs on a remote API; host resources are irrelevant.
    Remote,
}

/// Declared relative generation speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Fast,
    #[default]
    Medium,
    Slow,
}

/// Model size bucket used for timeout budgeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Up to ~4B parameters.
    Tiny,
    /// Up to ~9B parameters.
    Small,
    /// Up to ~20B parameters.
    Medium,
    /// Up to ~40B parameters.
    Large,
    /// Anything bigger.
    XLarge,
    /// Remote model, unless an explicit size says otherwise.
    Hosted,
}

impl SizeClass {
    /// Bucket a parameter count given in billions.
    pub fn from_parameters(billions: f64) -> Self {
        if billions <= 4.0 {
            Self::Tiny
        } else if billions <= 9.0 {
            Self::Small
        } else if billions <= 20.0 {
            Self::Medium
        } else if billions <= 40.0 {
            Self::Large
        } else {
            Self::XLarge
        }
    }
}

/// Minimum host resources a local model needs.
///
/// Zero means "no requirement". Remote models leave everything at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub min_ram_mb: u64,
    #[serde(default)]
    pub min_vram_mb: u64,
    #[serde(default)]
    pub min_cpu_cores: u32,
}

impl ResourceRequirements {
    pub fn new(min_ram_mb: u64, min_vram_mb: u64, min_cpu_cores: u32) -> Self {
        Self {
            min_ram_mb,
            min_vram_mb,
            min_cpu_cores,
        }
    }

    /// True when nothing is required of the host.
    pub fn is_unconstrained(&self) -> bool {
        self.min_ram_mb == 0 && self.min_vram_mb == 0 && self.min_cpu_cores == 0
    }
}

/// Declared capabilities of one model on one provider.
///
/// Immutable once registered; the catalog replaces whole entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapability {
    /// Model name as the provider knows it (e.g. `qwen2.5-coder:7b`).
    pub name: String,
    /// Provider name (e.g. `ollama`, `openrouter`).
    pub provider: String,
    #[serde(default)]
    pub execution: ExecutionKind,
    #[serde(default)]
    pub strengths: BTreeSet<String>,
    #[serde(default)]
    pub weaknesses: BTreeSet<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub speed: SpeedClass,
    /// Explicit size bucket. Derived from `parameters_b` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeClass>,
    /// Parameter count in billions, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Whether the model supports tool/function calling.
    #[serde(default)]
    pub tool_calling: bool,
    /// Reference to credentials (an environment variable name), never the secret itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl ModelCapability {
    /// Create a local model entry with no declared strengths.
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            execution: ExecutionKind::Local,
            strengths: BTreeSet::new(),
            weaknesses: BTreeSet::new(),
            resources: ResourceRequirements::default(),
            speed: SpeedClass::default(),
            size: None,
            parameters_b: None,
            context_window: None,
            tool_calling: false,
            credentials: None,
        }
    }

    /// Create a remote model entry.
    pub fn remote(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(name, provider).with_execution(ExecutionKind::Remote)
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.provider.clone(), self.name.clone())
    }

    pub fn is_local(&self) -> bool {
        self.execution == ExecutionKind::Local
    }

    /// Effective size bucket.
    ///
    /// Explicit `size` wins. Otherwise remote models are `Hosted` whatever
    /// their parameter count; local ones bucket `parameters_b` and default
    /// to `Medium`.
    pub fn size_class(&self) -> SizeClass {
        if let Some(size) = self.size {
            return size;
        }
        match (self.execution, self.parameters_b) {
            (ExecutionKind::Remote, _) => SizeClass::Hosted,
            (ExecutionKind::Local, Some(b)) => SizeClass::from_parameters(b),
            (ExecutionKind::Local, None) => SizeClass::Medium,
        }
    }

    pub fn has_strength(&self, tag: &str) -> bool {
        self.strengths.contains(tag)
    }

    pub fn with_execution(mut self, execution: ExecutionKind) -> Self {
        self.execution = execution;
        self
    }

    /// Add strength tags.
    pub fn with_strengths<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strengths.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add weakness tags.
    pub fn with_weaknesses<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.weaknesses.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_speed(mut self, speed: SpeedClass) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_size(mut self, size: SizeClass) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_parameters(mut self, billions: f64) -> Self {
        self.parameters_b = Some(billions);
        self
    }

    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = Some(tokens);
        self
    }

    pub fn with_tool_calling(mut self, enabled: bool) -> Self {
        self.tool_calling = enabled;
        self
    }

    pub fn with_credentials(mut self, reference: impl Into<String>) -> Self {
        self.credentials = Some(reference.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_key_round_trips_through_display() {
        let key = ModelKey::new("openrouter", "meta-llama/llama-3.1-8b");
        assert_eq!(key.to_string(), "openrouter/meta-llama/llama-3.1-8b");
        let parsed: ModelKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn model_key_rejects_missing_half() {
        assert!("ollama".parse::<ModelKey>().is_err());
        assert!("/model".parse::<ModelKey>().is_err());
        assert!("ollama/".parse::<ModelKey>().is_err());
    }

    #[test]
    fn size_class_buckets() {
        assert_eq!(SizeClass::from_parameters(3.0), SizeClass::Tiny);
        assert_eq!(SizeClass::from_parameters(7.6), SizeClass::Small);
        assert_eq!(SizeClass::from_parameters(14.0), SizeClass::Medium);
        assert_eq!(SizeClass::from_parameters(32.0), SizeClass::Large);
        assert_eq!(SizeClass::from_parameters(70.0), SizeClass::XLarge);
    }

    #[test]
    fn size_class_resolution_order() {
        let explicit = ModelCapability::new("m", "p")
            .with_parameters(70.0)
            .with_size(SizeClass::Tiny);
        assert_eq!(explicit.size_class(), SizeClass::Tiny);

        let derived = ModelCapability::new("m", "p").with_parameters(7.0);
        assert_eq!(derived.size_class(), SizeClass::Small);

        assert_eq!(ModelCapability::remote("m", "p").size_class(), SizeClass::Hosted);
        assert_eq!(
            ModelCapability::remote("m", "p").with_parameters(70.0).size_class(),
            SizeClass::Hosted
        );
        assert_eq!(
            ModelCapability::remote("m", "p")
                .with_parameters(70.0)
                .with_size(SizeClass::XLarge)
                .size_class(),
            SizeClass::XLarge
        );
        assert_eq!(ModelCapability::new("m", "p").size_class(), SizeClass::Medium);
    }

    #[test]
    fn capability_deserializes_with_defaults() {
        let json = r#"{"name": "llama3.2:3b", "provider": "ollama", "strengths": ["chat"]}"#;
        let cap: ModelCapability = serde_json::from_str(json).unwrap();
        assert_eq!(cap.execution, ExecutionKind::Local);
        assert_eq!(cap.speed, SpeedClass::Medium);
        assert!(cap.resources.is_unconstrained());
        assert!(cap.has_strength("chat"));
        assert!(!cap.tool_calling);
    }
}
