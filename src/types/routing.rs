//! Route input/output and per-attempt diagnostics.

use std::time::Duration;

use serde::Serialize;

use super::{AttemptBudget, GenerateRequest, GenerateResponse, SelectionContext, SelectionResult};

/// What one attempt in the fallback walk came to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Transport,
}

/// Diagnostic record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptDiagnostic {
    pub provider: String,
    pub model: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    pub budget: AttemptBudget,
    /// Failure message; `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How a routed request was served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingMetadata {
    pub provider: String,
    pub model: String,
    /// Number of attempts made, including the successful one.
    pub attempts: usize,
    pub total_latency: Duration,
    /// True when the chain came from the last-resort rule.
    pub degraded: bool,
    pub diagnostics: Vec<AttemptDiagnostic>,
    /// The ranked chain that was walked.
    pub selection: SelectionResult,
}

impl RoutingMetadata {
    /// Attempts that failed before the successful one.
    pub fn fallbacks(&self) -> usize {
        self.attempts.saturating_sub(1)
    }
}

/// A request to route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub context: SelectionContext,
    pub request: GenerateRequest,
}

impl RouteRequest {
    pub fn new(context: SelectionContext, request: GenerateRequest) -> Self {
        Self { context, request }
    }
}

/// A routed response with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResponse {
    pub response: GenerateResponse,
    pub metadata: RoutingMetadata,
}
