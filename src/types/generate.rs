//! Generation request and response shapes exchanged with provider collaborators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BifrostError, Result};

/// Output tokens assumed when the caller does not set `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Options for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Sequences where generation should stop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Seed for deterministic generation (where supported).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Caller-supplied input token estimate. Derived from the prompt when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_input_tokens: Option<u32>,
}

impl GenerateOptions {
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn stop_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.stop_sequences.push(sequence.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn estimated_input_tokens(mut self, tokens: u32) -> Self {
        self.estimated_input_tokens = Some(tokens);
        self
    }

    /// `max_tokens`, or [`DEFAULT_MAX_TOKENS`].
    pub fn output_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }
}

/// Tool definition for function calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call made by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String, // JSON string
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the arguments as JSON
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(
        &self,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// What to generate. Validated before the first attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerateRequest {
    Plain {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        #[serde(default)]
        options: GenerateOptions,
    },
    WithTools {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        #[serde(default)]
        options: GenerateOptions,
    },
}

impl GenerateRequest {
    pub fn plain(prompt: impl Into<String>) -> Self {
        Self::Plain {
            prompt: prompt.into(),
            system: None,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_tools(prompt: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self::WithTools {
            prompt: prompt.into(),
            system: None,
            tools,
            options: GenerateOptions::default(),
        }
    }

    /// Set the system prompt.
    pub fn system(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Plain { system, .. } | Self::WithTools { system, .. } => {
                *system = Some(text.into())
            }
        }
        self
    }

    /// Replace the options.
    pub fn options(mut self, opts: GenerateOptions) -> Self {
        match &mut self {
            Self::Plain { options, .. } | Self::WithTools { options, .. } => *options = opts,
        }
        self
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Plain { prompt, .. } | Self::WithTools { prompt, .. } => prompt,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        match self {
            Self::Plain { system, .. } | Self::WithTools { system, .. } => system.as_deref(),
        }
    }

    pub fn generate_options(&self) -> &GenerateOptions {
        match self {
            Self::Plain { options, .. } | Self::WithTools { options, .. } => options,
        }
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        match self {
            Self::Plain { .. } => &[],
            Self::WithTools { tools, .. } => tools,
        }
    }

    pub fn requires_tools(&self) -> bool {
        matches!(self, Self::WithTools { .. })
    }

    /// Caller estimate, or `ceil(chars / 4)` over prompt and system text.
    pub fn estimated_input_tokens(&self) -> u32 {
        if let Some(tokens) = self.generate_options().estimated_input_tokens {
            return tokens;
        }
        let chars = self.prompt().chars().count()
            + self.system_prompt().map_or(0, |s| s.chars().count());
        chars.div_ceil(4) as u32
    }

    /// Reject requests no provider could serve.
    pub fn validate(&self) -> Result<()> {
        if self.prompt().trim().is_empty() {
            return Err(BifrostError::validation("prompt", "must not be empty"));
        }
        let options = self.generate_options();
        if options.max_tokens == Some(0) {
            return Err(BifrostError::validation("max_tokens", "must be positive"));
        }
        if let Some(t) = options.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(BifrostError::validation(
                "temperature",
                format!("{t} is outside 0.0..=2.0"),
            ));
        }
        if let Some(p) = options.top_p
            && !(0.0..=1.0).contains(&p)
        {
            return Err(BifrostError::validation(
                "top_p",
                format!("{p} is outside 0.0..=1.0"),
            ));
        }
        if let Self::WithTools { tools, .. } = self {
            if tools.is_empty() {
                return Err(BifrostError::validation(
                    "tools",
                    "a tool request needs at least one tool",
                ));
            }
            if let Some(tool) = tools.iter().find(|t| t.name.trim().is_empty()) {
                return Err(BifrostError::validation(
                    "tools",
                    format!("tool with empty name ({})", tool.description),
                ));
            }
        }
        Ok(())
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Response from one successful generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub finish_reason: FinishReason,
    /// Model name as reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerateResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Time allowed for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptBudget {
    /// Covers connection setup and model load.
    pub connection: Duration,
    /// Covers token generation.
    pub generation: Duration,
}

impl AttemptBudget {
    pub fn new(connection: Duration, generation: Duration) -> Self {
        Self {
            connection,
            generation,
        }
    }

    /// Hard deadline for the whole attempt.
    pub fn total(&self) -> Duration {
        self.connection + self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> ToolDefinition {
        ToolDefinition::new("search", "web search", json!({"type": "object"}))
    }

    #[test]
    fn estimate_rounds_up() {
        let req = GenerateRequest::plain("abcde");
        assert_eq!(req.estimated_input_tokens(), 2);

        let req = GenerateRequest::plain("abcd").system("abcd");
        assert_eq!(req.estimated_input_tokens(), 2);
    }

    #[test]
    fn caller_estimate_wins() {
        let req = GenerateRequest::plain("short")
            .options(GenerateOptions::default().estimated_input_tokens(4000));
        assert_eq!(req.estimated_input_tokens(), 4000);
    }

    #[test]
    fn validate_rejects_bad_requests() {
        assert!(GenerateRequest::plain("  ").validate().is_err());
        assert!(
            GenerateRequest::plain("hi")
                .options(GenerateOptions::default().max_tokens(0))
                .validate()
                .is_err()
        );
        assert!(
            GenerateRequest::plain("hi")
                .options(GenerateOptions::default().temperature(3.5))
                .validate()
                .is_err()
        );
        assert!(GenerateRequest::with_tools("hi", vec![]).validate().is_err());
        assert!(GenerateRequest::with_tools("hi", vec![tool()]).validate().is_ok());
    }

    #[test]
    fn tagged_serialization() {
        let req = GenerateRequest::with_tools("hi", vec![tool()]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["kind"], "with_tools");
        assert!(req.requires_tools());
        assert!(!GenerateRequest::plain("hi").requires_tools());
    }

    #[test]
    fn budget_total() {
        let budget = AttemptBudget::new(Duration::from_secs(15), Duration::from_secs(30));
        assert_eq!(budget.total(), Duration::from_secs(45));
    }

    #[test]
    fn output_tokens_default() {
        assert_eq!(GenerateOptions::default().output_tokens(), DEFAULT_MAX_TOKENS);
        assert_eq!(GenerateOptions::default().max_tokens(10).output_tokens(), 10);
    }
}
