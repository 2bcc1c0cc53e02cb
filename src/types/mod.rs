//! Public types for the Bifrost API.

mod context;
mod generate;
mod health;
mod model;
mod performance;
mod profile;
mod routing;
mod selection;

pub use context::{Complexity, SelectionContext, Urgency};
pub use generate::{
    AttemptBudget, DEFAULT_MAX_TOKENS, FinishReason, GenerateOptions, GenerateRequest,
    GenerateResponse, ToolCall, ToolDefinition, Usage,
};
pub use health::{HealthRecord, HealthState};
pub use model::{
    ExecutionKind, ModelCapability, ModelKey, ResourceRequirements, SizeClass, SpeedClass,
};
pub use performance::{FeedbackOutcome, PerformanceSample, PerformanceStats};
pub use profile::{CpuInfo, GpuInfo, GpuVendor, MemoryInfo, SystemProfile};
pub use routing::{
    AttemptDiagnostic, AttemptOutcome, RouteRequest, RouteResponse, RoutingMetadata,
};
pub use selection::{Candidate, CandidateReason, ScoreBreakdown, SelectionResult};
