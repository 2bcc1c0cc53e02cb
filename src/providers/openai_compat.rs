//! Collaborator for OpenAI-compatible HTTP APIs (OpenRouter, vLLM, LM Studio...).
//!
//! Uses `GET {base}/models` for discovery and liveness and
//! `POST {base}/chat/completions` for generation. The API key is read once
//! from an environment variable at construction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::http::{cancellable, check_status, normalize_base_url};
use super::traits::{GenerateProvider, HealthProbe, ModelDiscovery, ProbeReport};
use crate::catalog::infer::infer_capability;
use crate::types::{
    AttemptBudget, ExecutionKind, FinishReason, GenerateRequest, GenerateResponse,
    ModelCapability, ToolCall, ToolDefinition, Usage,
};
use crate::{BifrostError, Result};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for one OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: normalize_base_url(base_url),
            api_key: None,
            http: Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the key from `var`. A missing variable leaves the client
    /// unauthenticated, which local servers accept.
    pub fn with_api_key_env(self, var: &str) -> Self {
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => self.with_api_key(key),
            _ => {
                warn!(provider = %self.name, var, "API key variable not set");
                self
            }
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn list_models(&self, timeout: Duration) -> Result<ModelsResponse> {
        let request = self
            .http
            .get(format!("{}/models", self.base_url))
            .timeout(timeout);
        let response = self.authorize(request).send().await?;
        let response = check_status(response, "").await?;
        Ok(response.json().await?)
    }

    async fn send_chat(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
    ) -> Result<GenerateResponse> {
        let opts = request.generate_options();
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt(),
        });

        let body = ChatRequest {
            model,
            messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            top_p: opts.top_p,
            stop: &opts.stop_sequences,
            seed: opts.seed,
            tools: request.tools().iter().map(ChatTool::from).collect(),
        };
        let builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(budget.total())
            .json(&body);
        let response = self.authorize(builder).send().await?;
        let response = check_status(response, model).await?;
        let parsed: ChatResponse = response.json().await?;
        parsed.into_response()
    }
}

#[async_trait]
impl GenerateProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "openai_compat.generate", skip(self, request, cancel), fields(provider = %self.name))]
    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse> {
        cancellable(&cancel, self.send_chat(model, request, budget)).await
    }
}

#[async_trait]
impl HealthProbe for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, timeout: Duration) -> Result<ProbeReport> {
        let start = Instant::now();
        self.list_models(timeout).await?;
        Ok(ProbeReport {
            latency: start.elapsed(),
        })
    }
}

#[async_trait]
impl ModelDiscovery for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover_models(&self) -> Result<Vec<ModelCapability>> {
        let models = self.list_models(DISCOVERY_TIMEOUT).await?;
        debug!(provider = %self.name, count = models.data.len(), "listed remote models");
        Ok(models
            .data
            .into_iter()
            .map(|entry| {
                let mut cap = infer_capability(&self.name, &entry.id, ExecutionKind::Remote);
                if let Some(window) = entry.context_length {
                    cap = cap.with_context_window(window);
                }
                if entry.supported_parameters.iter().any(|p| p == "tools") {
                    cap = cap.with_tool_calling(true);
                }
                cap
            })
            .collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    context_length: Option<u32>,
    #[serde(default)]
    supported_parameters: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ChatFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> From<&'a ToolDefinition> for ChatTool<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: ChatFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ChatResponse {
    fn into_response(self) -> Result<GenerateResponse> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(BifrostError::EmptyResponse)?;
        let content = choice.message.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
            .collect();
        if content.is_empty() && tool_calls.is_empty() {
            return Err(BifrostError::EmptyResponse);
        }
        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };
        Ok(GenerateResponse {
            content,
            tool_calls,
            usage: self
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
            finish_reason,
            model: self.model,
        })
    }
}
