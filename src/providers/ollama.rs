//! Ollama collaborator: generation, liveness probe and model discovery.
//!
//! Plain requests go to `/api/generate`; requests with tools go to
//! `/api/chat`, which is the only Ollama endpoint that accepts tool
//! definitions. `/api/tags` doubles as the liveness probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::http::{cancellable, check_status, normalize_base_url};
use super::traits::{GenerateProvider, HealthProbe, ModelDiscovery, ProbeReport};
use crate::catalog::infer::infer_capability;
use crate::types::{
    AttemptBudget, ExecutionKind, FinishReason, GenerateOptions, GenerateRequest,
    GenerateResponse, ModelCapability, ToolCall, Usage,
};
use crate::{BifrostError, Result};

/// Default local Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Timeout for discovery listing.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a local (or LAN) Ollama server.
#[derive(Clone)]
pub struct OllamaProvider {
    name: String,
    base_url: String,
    http: Client,
}

impl OllamaProvider {
    /// Provider named `ollama` at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            name: "ollama".to_string(),
            base_url: normalize_base_url(base_url),
            http: Client::new(),
        }
    }

    /// Default localhost endpoint.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }

    /// Override the provider name, e.g. for a second Ollama host.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_tags(&self, timeout: Duration) -> Result<TagsResponse> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(timeout)
            .send()
            .await?;
        let response = check_status(response, "").await?;
        Ok(response.json().await?)
    }

    async fn send_generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
    ) -> Result<GenerateResponse> {
        let body = OllamaGenerateRequest {
            model,
            prompt: request.prompt(),
            system: request.system_prompt(),
            stream: false,
            options: OllamaOptions::from(request.generate_options()),
        };
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(budget.total())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, model).await?;
        let parsed: OllamaGenerateResponse = response.json().await?;
        parsed.into_response()
    }

    async fn send_chat(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
    ) -> Result<GenerateResponse> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt() {
            messages.push(OllamaMessage::new("system", system));
        }
        messages.push(OllamaMessage::new("user", request.prompt()));

        let body = OllamaChatRequest {
            model,
            messages,
            tools: request.tools().iter().map(OllamaTool::from).collect(),
            stream: false,
            options: OllamaOptions::from(request.generate_options()),
        };
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .timeout(budget.total())
            .json(&body)
            .send()
            .await?;
        let response = check_status(response, model).await?;
        let parsed: OllamaChatResponse = response.json().await?;
        parsed.into_response()
    }
}

#[async_trait]
impl GenerateProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "ollama.generate", skip(self, request, cancel), fields(provider = %self.name))]
    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        if request.requires_tools() {
            cancellable(&cancel, self.send_chat(model, request, budget)).await
        } else {
            cancellable(&cancel, self.send_generate(model, request, budget)).await
        }
    }
}

#[async_trait]
impl HealthProbe for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, timeout: Duration) -> Result<ProbeReport> {
        let start = Instant::now();
        self.list_tags(timeout).await?;
        Ok(ProbeReport {
            latency: start.elapsed(),
        })
    }
}

#[async_trait]
impl ModelDiscovery for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover_models(&self) -> Result<Vec<ModelCapability>> {
        let tags = self.list_tags(DISCOVERY_TIMEOUT).await?;
        debug!(provider = %self.name, count = tags.models.len(), "listed ollama models");
        Ok(tags
            .models
            .into_iter()
            .map(|m| infer_capability(&self.name, &m.name, ExecutionKind::Local))
            .collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl From<&GenerateOptions> for OllamaOptions {
    fn from(opts: &GenerateOptions) -> Self {
        Self {
            temperature: opts.temperature,
            top_p: opts.top_p,
            num_predict: opts.max_tokens,
            stop: opts.stop_sequences.clone(),
            seed: opts.seed,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaGenerateResponse {
    fn into_response(self) -> Result<GenerateResponse> {
        if self.response.is_empty() {
            return Err(BifrostError::EmptyResponse);
        }
        Ok(GenerateResponse {
            content: self.response,
            tool_calls: Vec::new(),
            usage: usage(self.prompt_eval_count, self.eval_count),
            finish_reason: finish_reason(self.done_reason.as_deref(), false),
            model: self.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> OllamaMessage<'a> {
    fn new(role: &'static str, content: &'a str) -> Self {
        Self { role, content }
    }
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OllamaFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> From<&'a crate::types::ToolDefinition> for OllamaTool<'a> {
    fn from(tool: &'a crate::types::ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: OllamaFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    tools: Vec<OllamaTool<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaCalledFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaCalledFunction {
    name: String,
    /// Ollama sends arguments as a JSON object, not a string.
    #[serde(default)]
    arguments: serde_json::Value,
}

impl OllamaChatResponse {
    fn into_response(self) -> Result<GenerateResponse> {
        let tool_calls: Vec<ToolCall> = self
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                ToolCall::new(
                    format!("call_{i}"),
                    call.function.name,
                    call.function.arguments.to_string(),
                )
            })
            .collect();
        if self.message.content.is_empty() && tool_calls.is_empty() {
            return Err(BifrostError::EmptyResponse);
        }
        Ok(GenerateResponse {
            content: self.message.content,
            finish_reason: finish_reason(self.done_reason.as_deref(), !tool_calls.is_empty()),
            tool_calls,
            usage: usage(self.prompt_eval_count, self.eval_count),
            model: self.model,
        })
    }
}

fn usage(prompt: Option<u32>, completion: Option<u32>) -> Option<Usage> {
    match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(Usage::new(p.unwrap_or(0), c.unwrap_or(0))),
    }
}

fn finish_reason(done_reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match done_reason {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_ollama_names() {
        let opts = GenerateOptions::default()
            .max_tokens(64)
            .temperature(0.3)
            .stop_sequence("END");
        let json = serde_json::to_value(OllamaOptions::from(&opts)).unwrap();
        assert_eq!(json["num_predict"], 64);
        assert_eq!(json["stop"][0], "END");
        assert!(json.get("seed").is_none());
    }

    #[test]
    fn chat_tool_calls_are_stringified() {
        let raw = serde_json::json!({
            "model": "qwen2.5:7b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "lookup", "arguments": {"q": "rust"}}}]
            },
            "done_reason": "stop"
        });
        let parsed: OllamaChatResponse = serde_json::from_value(raw).unwrap();
        let response = parsed.into_response().unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls[0].name, "lookup");
        assert_eq!(response.tool_calls[0].arguments, r#"{"q":"rust"}"#);
    }

    #[test]
    fn empty_generation_is_an_error() {
        let parsed: OllamaGenerateResponse =
            serde_json::from_value(serde_json::json!({"response": ""})).unwrap();
        assert!(matches!(parsed.into_response(), Err(BifrostError::EmptyResponse)));
    }

    #[test]
    fn usage_from_eval_counts() {
        assert_eq!(usage(Some(10), Some(5)), Some(Usage::new(10, 5)));
        assert_eq!(usage(None, None), None);
    }
}
