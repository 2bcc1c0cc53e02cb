//! Bifrost - inference provider routing engine
//!
//! Given a task description, Bifrost picks a ranked fallback chain of
//! `(provider, model)` candidates from a capability catalog, filtered by
//! what the host can actually run and by provider health, and ordered by
//! task fit and past performance. It then walks that chain one attempt at
//! a time under adaptive timeouts until a candidate succeeds.
//!
//! # Example
//!
//! ```rust,no_run
//! use bifrost::{GenerateRequest, RouteRequest, Router, SelectionContext, Urgency};
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let router = Router::builder()
//!         .ollama("http://localhost:11434")
//!         .build()?;
//!     router.refresh_catalog().await;
//!
//!     let routed = router
//!         .route(RouteRequest::new(
//!             SelectionContext::new("quick").urgency(Urgency::High),
//!             GenerateRequest::plain("Name three moons of Jupiter."),
//!         ))
//!         .await?;
//!
//!     println!("{}", routed.response.content);
//!     println!(
//!         "served by {}/{} after {} attempt(s)",
//!         routed.metadata.provider, routed.metadata.model, routed.metadata.attempts
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Selection only
//!
//! [`select`] is a pure function; it can rank candidates from snapshots
//! without any network access:
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use bifrost::{
//!     ModelCapability, PerformanceSnapshot, SelectionConfig, SelectionContext,
//!     SelectionInputs, SystemProfile, select,
//! };
//!
//! let catalog = vec![Arc::new(
//!     ModelCapability::remote("gpt-small", "remote").with_strengths(["chat", "general"]),
//! )];
//! let result = select(
//!     &SelectionContext::new("chat"),
//!     SelectionInputs {
//!         catalog: &catalog,
//!         profile: &SystemProfile::conservative(),
//!         health: &HashMap::new(),
//!         performance: &PerformanceSnapshot::new(),
//!     },
//!     &SelectionConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(result.first().unwrap().model(), "gpt-small");
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod ledger;
pub mod profiler;
pub mod providers;
pub mod router;
pub mod selection;
pub mod telemetry;
pub mod timeout;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use catalog::{CapabilityCatalog, EntryOrigin, UpsertOutcome};
pub use config::RouterConfig;
pub use error::{AttemptFailure, AttemptFailureKind, BifrostError, Result, UnmetConstraint};
pub use executor::FallbackExecutor;
pub use health::{HealthConfig, HealthMonitor};
pub use ledger::{LedgerConfig, PerformanceLedger, PerformanceSnapshot};
pub use profiler::{
    FixedDetector, HostDetector, ResourceDetector, ResourceProfiler, can_run, headroom_score,
};
pub use providers::{
    GenerateProvider, HealthProbe, ModelDiscovery, ProbeReport, ProviderRegistry, RetryConfig,
};
pub use router::{RefreshReport, Router, RouterBuilder};
pub use selection::{SelectionConfig, SelectionInputs, select};
pub use timeout::{TimeoutCalculator, TimeoutConfig};
pub use traits::InferenceRouter;

#[cfg(feature = "ollama")]
pub use providers::OllamaProvider;
#[cfg(feature = "remote")]
pub use providers::OpenAiCompatProvider;

// Re-export all types
pub use types::{
    AttemptBudget, AttemptDiagnostic, AttemptOutcome, Candidate, CandidateReason, Complexity,
    CpuInfo, ExecutionKind, FeedbackOutcome, FinishReason, GenerateOptions, GenerateRequest,
    GenerateResponse, GpuInfo, GpuVendor, HealthRecord, HealthState, MemoryInfo, ModelCapability,
    ModelKey, PerformanceSample, PerformanceStats, ResourceRequirements, RouteRequest,
    RouteResponse, RoutingMetadata, ScoreBreakdown, SelectionContext, SelectionResult, SizeClass,
    SpeedClass, SystemProfile, ToolCall, ToolDefinition, Usage, Urgency,
};
