//! Collaborator traits the routing core calls into.
//!
//! Each backend implements only the capabilities it has, rather than a
//! single "god trait":
//! - [`GenerateProvider`]: the generation call itself
//! - [`HealthProbe`]: a lightweight liveness check
//! - [`ModelDiscovery`]: enumerating installed/offered models
//!
//! The core treats all three as opaque and fallible. Every method that does
//! I/O receives its own time budget; generation also receives a
//! [`CancellationToken`] that fires exactly when the budget expires, and
//! implementations must abort the underlying transport when it does.
//!
//! # Example
//!
//! ```ignore
//! async fn generate(&self, model: &str, request: &GenerateRequest,
//!                   budget: AttemptBudget, cancel: CancellationToken)
//!     -> Result<GenerateResponse>
//! {
//!     tokio::select! {
//!         _ = cancel.cancelled() => Err(BifrostError::Cancelled),
//!         response = self.send(model, request, budget) => response,
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::types::{AttemptBudget, GenerateRequest, GenerateResponse, ModelCapability};

// ============================================================================
// Generate Provider
// ============================================================================

/// Backend that runs generation for the models it hosts.
#[async_trait]
pub trait GenerateProvider: Send + Sync {
    /// Provider name; must match `ModelCapability::provider` in the catalog.
    fn name(&self) -> &str;

    /// Run one generation.
    ///
    /// `budget` is informational (e.g. for a transport-level timeout);
    /// the executor enforces it independently by cancelling `cancel`.
    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        budget: AttemptBudget,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse>;
}

// ============================================================================
// Health Probe
// ============================================================================

/// Outcome of a successful liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub latency: Duration,
}

/// Liveness check for one provider.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Provider name this probe checks.
    fn name(&self) -> &str;

    /// Check liveness within `timeout`. Errors mean unhealthy.
    async fn probe(&self, timeout: Duration) -> Result<ProbeReport>;
}

// ============================================================================
// Model Discovery
// ============================================================================

/// Enumerates the models a provider currently offers.
#[async_trait]
pub trait ModelDiscovery: Send + Sync {
    /// Provider name the discovered models belong to.
    fn name(&self) -> &str;

    /// List available models with whatever metadata the provider exposes.
    async fn discover_models(&self) -> Result<Vec<ModelCapability>>;
}
