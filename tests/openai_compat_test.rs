#![cfg(feature = "remote")]

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bifrost::{
    AttemptBudget, BifrostError, ExecutionKind, FinishReason, GenerateOptions, GenerateProvider,
    GenerateRequest, HealthProbe, ModelDiscovery, OpenAiCompatProvider, ToolDefinition,
};

fn budget() -> AttemptBudget {
    AttemptBudget::new(Duration::from_secs(5), Duration::from_secs(10))
}

#[tokio::test]
async fn chat_completion_sends_bearer_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "meta-llama/llama-3.1-70b-instruct",
            "messages": [
                {"role": "system", "content": "Answer tersely."},
                {"role": "user", "content": "2+2?"}
            ],
            "max_tokens": 16
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "meta-llama/llama-3.1-70b-instruct",
            "choices": [{"message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::new("openrouter", format!("{}/v1", server.uri())).with_api_key("sk-test");
    let request = GenerateRequest::plain("2+2?")
        .system("Answer tersely.")
        .options(GenerateOptions::default().max_tokens(16));

    let response = provider
        .generate(
            "meta-llama/llama-3.1-70b-instruct",
            &request,
            budget(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "4");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.unwrap().total_tokens, 10);
}

#[tokio::test]
async fn tool_calls_come_back_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "lookup"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{"id": "call_9", "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"rust\"}"}}]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new("local", server.uri());
    let request = GenerateRequest::with_tools(
        "search for rust",
        vec![ToolDefinition::new("lookup", "search", json!({"type": "object"}))],
    );

    let response = provider
        .generate("m", &request, budget(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    assert_eq!(response.tool_calls[0].id, "call_9");
    assert_eq!(response.tool_calls[0].arguments, "{\"q\":\"rust\"}");
}

#[tokio::test]
async fn rejected_key_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new("remote", server.uri()).with_api_key("nope");
    let err = provider
        .generate(
            "m",
            &GenerateRequest::plain("hi"),
            budget(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BifrostError::AuthenticationFailed));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new("remote", server.uri());
    let err = provider
        .generate(
            "m",
            &GenerateRequest::plain("hi"),
            budget(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn discovery_reads_context_and_tool_support() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "qwen/qwen-2.5-72b-instruct", "context_length": 131072,
                 "supported_parameters": ["tools", "temperature"]},
                {"id": "some/unknown-model"}
            ]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::new("openrouter", server.uri());
    assert!(provider.probe(Duration::from_secs(5)).await.is_ok());

    let models = provider.discover_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert!(models.iter().all(|m| m.execution == ExecutionKind::Remote));
    assert!(models.iter().all(|m| m.provider == "openrouter"));
    assert_eq!(models[0].context_window, Some(131_072));
    assert!(models[0].tool_calling);
    assert!(!models[1].tool_calling);
}

#[tokio::test]
async fn unreachable_endpoint_fails_the_probe() {
    // Nothing listens on port 9 (discard) in the test environment.
    let provider = OpenAiCompatProvider::new("remote", "http://127.0.0.1:9");
    let err = provider.probe(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, BifrostError::Http(_)));
}
