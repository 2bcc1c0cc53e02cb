//! The routing boundary exposed to callers.
//!
//! A [`Router`] owns one instance of every routing component. Construct it
//! with [`Router::builder`] (or [`Router::from_config`]); there is no
//! process-wide state, so tests and multi-tenant hosts can run several
//! independent routers side by side.
//!
//! ```no_run
//! # async fn demo() -> bifrost::Result<()> {
//! use bifrost::{GenerateRequest, RouteRequest, Router, SelectionContext, Urgency};
//!
//! let router = Router::builder()
//!     .ollama("http://localhost:11434")
//!     .build()?;
//!
//! let request = RouteRequest::new(
//!     SelectionContext::new("coding").urgency(Urgency::High),
//!     GenerateRequest::plain("Write a binary search in Rust."),
//! );
//! let routed = router.route(request).await?;
//! println!("{} via {}/{}", routed.response.content,
//!          routed.metadata.provider, routed.metadata.model);
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::RouterBuilder;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::catalog::{CapabilityCatalog, UpsertOutcome};
use crate::config::RouterConfig;
use crate::executor::FallbackExecutor;
use crate::health::HealthMonitor;
use crate::ledger::PerformanceLedger;
use crate::profiler::ResourceProfiler;
use crate::providers::ModelDiscovery;
use crate::selection::{SelectionConfig, SelectionInputs, select};
use crate::telemetry;
use crate::traits::InferenceRouter;
use crate::types::{
    FeedbackOutcome, ModelKey, RouteRequest, RouteResponse, SelectionContext, SelectionResult,
};
use crate::{BifrostError, Result};

/// Outcome of [`Router::refresh_catalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries inserted or updated from discovery.
    pub discovered: usize,
    /// Discovered entries that failed validation.
    pub rejected: usize,
    /// Discovered entries dropped because their provider stopped listing them.
    pub pruned: usize,
    /// Providers whose discovery failed after retries.
    pub failed_providers: Vec<String>,
}

/// Capability-, resource-, health- and history-aware inference router.
pub struct Router {
    catalog: Arc<CapabilityCatalog>,
    profiler: ResourceProfiler,
    health: Arc<HealthMonitor>,
    ledger: Arc<PerformanceLedger>,
    executor: FallbackExecutor,
    discovery: Vec<Arc<dyn ModelDiscovery>>,
    selection: SelectionConfig,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Router with the providers declared in `config`.
    pub fn from_config(config: RouterConfig) -> Result<Self> {
        RouterBuilder::new()
            .config(config)
            .with_configured_providers()
            .build()
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Route with no caller cancellation.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteResponse> {
        self.route_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Route until success, exhaustion, or `cancel` fires.
    ///
    /// A request carrying tools forces `requires_tool_calling` on.
    #[instrument(skip_all, fields(task = %request.context.task_type))]
    pub async fn route_with_cancel(
        &self,
        request: RouteRequest,
        cancel: CancellationToken,
    ) -> Result<RouteResponse> {
        let RouteRequest {
            mut context,
            request,
        } = request;

        let result: Result<RouteResponse> = async {
            request.validate()?;
            if request.requires_tools() {
                context.requires_tool_calling = true;
            }
            let selection = self.select(&context).await?;
            self.executor
                .execute(&mut context, &request, selection, &cancel)
                .await
        }
        .await;

        metrics::counter!(telemetry::ROUTE_REQUESTS_TOTAL, "status" => route_status(&result))
            .increment(1);
        result
    }

    /// Rank candidates for `context` without generating anything.
    ///
    /// Stale health is refreshed for every provider in the catalog first;
    /// the ranking itself is a pure function of the resulting snapshots.
    pub async fn select(&self, context: &SelectionContext) -> Result<SelectionResult> {
        let catalog = self.catalog.snapshot();
        let providers = self.catalog.providers();
        let (profile, ()) = tokio::join!(self.profiler.profile(), self.health.refresh(&providers));
        let health = self.health.snapshot();
        let performance = self.ledger.snapshot();

        let start = Instant::now();
        let result = select(
            context,
            SelectionInputs {
                catalog: &catalog,
                profile: &profile,
                health: &health,
                performance: &performance,
            },
            &self.selection,
        );
        metrics::histogram!(telemetry::SELECTION_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        if let Ok(selection) = &result
            && selection.degraded
        {
            metrics::counter!(telemetry::DEGRADED_SELECTIONS_TOTAL).increment(1);
            warn!(
                task = %context.task_type,
                provider = selection.first().map(|c| c.provider()).unwrap_or_default(),
                "no healthy provider, using last resort"
            );
        }
        result
    }

    // ========================================================================
    // Feedback and catalog maintenance
    // ========================================================================

    /// Amend the latest sample for `key` with an external judgement.
    pub fn record_feedback(
        &self,
        key: &ModelKey,
        task_type: &str,
        outcome: FeedbackOutcome,
    ) -> Result<()> {
        if !outcome.quality.is_finite() || !(0.0..=1.0).contains(&outcome.quality) {
            return Err(BifrostError::validation(
                "quality",
                format!("must be within [0, 1], got {}", outcome.quality),
            ));
        }
        if task_type.trim().is_empty() {
            return Err(BifrostError::validation("task_type", "must not be empty"));
        }
        self.catalog.get(key)?;
        self.ledger.record_feedback(key, task_type, outcome);
        Ok(())
    }

    /// Run every discovery collaborator and merge the results.
    ///
    /// After a successful listing, the provider's previously discovered
    /// entries that are no longer listed are removed. Static entries and
    /// providers whose discovery failed are left as they are.
    pub async fn refresh_catalog(&self) -> RefreshReport {
        let results = join_all(self.discovery.iter().map(|d| async move {
            (d.name().to_string(), d.discover_models().await)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (provider, result) in results {
            match result {
                Ok(models) => {
                    let mut listed = HashSet::with_capacity(models.len());
                    for model in models {
                        listed.insert(model.key());
                        match self.catalog.upsert_discovered(model) {
                            Ok(UpsertOutcome::Inserted | UpsertOutcome::Updated) => {
                                report.discovered += 1;
                            }
                            Ok(UpsertOutcome::KeptStatic) => {}
                            Err(_) => report.rejected += 1,
                        }
                    }
                    let removed = self.catalog.prune_discovered(&provider, &listed);
                    if !removed.is_empty() {
                        info!(provider = %provider, removed = removed.len(), "pruned unlisted models");
                    }
                    report.pruned += removed.len();
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "model discovery failed");
                    report.failed_providers.push(provider);
                }
            }
        }
        info!(
            discovered = report.discovered,
            rejected = report.rejected,
            pruned = report.pruned,
            failed = report.failed_providers.len(),
            "catalog refreshed"
        );
        report
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn ledger(&self) -> &PerformanceLedger {
        &self.ledger
    }

    pub fn profiler(&self) -> &ResourceProfiler {
        &self.profiler
    }

    pub fn selection_config(&self) -> &SelectionConfig {
        &self.selection
    }
}

#[async_trait]
impl InferenceRouter for Router {
    async fn route(&self, request: RouteRequest) -> Result<RouteResponse> {
        Router::route(self, request).await
    }

    fn record_feedback(
        &self,
        key: &ModelKey,
        task_type: &str,
        outcome: FeedbackOutcome,
    ) -> Result<()> {
        Router::record_feedback(self, key, task_type, outcome)
    }
}

/// `status` label for one `route` outcome.
fn route_status(result: &Result<RouteResponse>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(BifrostError::Validation { .. }) => "invalid",
        Err(BifrostError::NoCandidates { .. }) => "no_candidates",
        Err(BifrostError::AllProvidersFailed { .. }) => "exhausted",
        Err(BifrostError::Cancelled) => "cancelled",
        Err(_) => "error",
    }
}
