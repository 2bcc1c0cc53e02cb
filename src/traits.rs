//! The caller-facing routing trait.

use async_trait::async_trait;

use crate::Result;
use crate::types::{FeedbackOutcome, ModelKey, RouteRequest, RouteResponse};

/// Routes generation requests across providers.
///
/// [`Router`](crate::Router) is the bundled implementation. Depend on this
/// trait to swap in a test double.
#[async_trait]
pub trait InferenceRouter: Send + Sync {
    /// Select a fallback chain for the request and walk it until one
    /// candidate succeeds.
    async fn route(&self, request: RouteRequest) -> Result<RouteResponse>;

    /// Adjust the performance history of `key` for `task_type` with an
    /// external quality judgement.
    fn record_feedback(&self, key: &ModelKey, task_type: &str, outcome: FeedbackOutcome)
    -> Result<()>;
}
