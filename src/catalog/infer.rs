//! Bootstrap capability inference from model names.
//!
//! Discovery often yields nothing but a name like `qwen2.5-coder:7b`. This
//! module guesses enough metadata for such a model to be selectable. It is
//! only a fallback: declared catalog entries always take precedence.

use crate::types::{ExecutionKind, ModelCapability, ResourceRequirements, SizeClass, SpeedClass};

/// RAM per billion parameters at 4-bit quantization.
const RAM_MB_PER_BILLION: f64 = 0.6 * 1024.0;
/// Fixed runtime overhead on top of the weights.
const RAM_OVERHEAD_MB: u64 = 512;
/// Assumed size when the name carries no parameter count.
const UNKNOWN_PARAMETERS_B: f64 = 7.0;

/// Families known to support tool calling.
const TOOL_FAMILIES: &[&str] = &[
    "llama3.1",
    "llama3.2",
    "llama3.3",
    "llama-3.1",
    "llama-3.2",
    "llama-3.3",
    "qwen2.5",
    "qwen-2.5",
    "qwen3",
    "mistral",
    "mixtral",
    "command-r",
    "firefunction",
    "hermes3",
    "granite3",
    "gpt-4",
    "gpt-5",
    "claude",
    "gemini",
];

/// Build a capability entry for a model known only by name.
pub fn infer_capability(
    provider: &str,
    name: &str,
    execution: ExecutionKind,
) -> ModelCapability {
    let lower = name.to_lowercase();
    let params = parse_parameters(&lower);
    let size = params.map(SizeClass::from_parameters);

    let mut cap = ModelCapability::new(name, provider)
        .with_execution(execution)
        .with_strengths(infer_strengths(&lower, size))
        .with_tool_calling(supports_tools(&lower))
        .with_speed(speed_for(size, execution));
    if let Some(b) = params {
        cap = cap.with_parameters(b);
    }
    if matches!(size, Some(SizeClass::Tiny)) && !cap.has_strength("embedding") {
        cap = cap.with_weaknesses(["analysis"]);
    }
    if execution == ExecutionKind::Local {
        cap = cap.with_resources(estimate_resources(params.unwrap_or(UNKNOWN_PARAMETERS_B)));
    }
    cap
}

/// Parse a parameter count in billions from a model name.
///
/// Recognises `7b`, `0.5b`, `70B` and mixture-of-experts forms like `8x7b`
/// anywhere between `:`, `-`, `_` or `/` separators.
pub fn parse_parameters(name: &str) -> Option<f64> {
    name.to_lowercase()
        .split([':', '-', '_', '/'])
        .find_map(parse_parameter_token)
}

fn parse_parameter_token(token: &str) -> Option<f64> {
    let number = token.strip_suffix('b')?;
    let value = match number.split_once('x') {
        Some((experts, each)) => experts.parse::<f64>().ok()? * each.parse::<f64>().ok()?,
        None => number.parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Strength tags suggested by the name.
pub fn infer_strengths(name: &str, size: Option<SizeClass>) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if name.contains("embed") {
        return vec!["embedding"];
    }
    if name.contains("code") {
        tags.extend(["coding", "coder", "debugging"]);
    }
    if name.contains("instruct") || name.contains("chat") {
        tags.extend(["chat", "general"]);
    }
    if name.contains("vision") || name.contains("llava") || name.contains("-vl") {
        tags.push("vision");
    }
    if name.contains("math") {
        tags.push("math");
    }
    if name.contains("reasoning") || name.contains("qwq") || name.contains("-r1") {
        tags.extend(["reasoning", "analysis"]);
    }
    if tags.is_empty() {
        tags.extend(["chat", "general"]);
    }
    if matches!(size, Some(SizeClass::Tiny)) {
        tags.push("fast");
    }
    tags
}

/// Whether the name belongs to a family known to support tool calling.
pub fn supports_tools(name: &str) -> bool {
    !name.contains("embed") && TOOL_FAMILIES.iter().any(|family| name.contains(family))
}

/// Minimum host resources for a local model of `billions` parameters.
pub fn estimate_resources(billions: f64) -> ResourceRequirements {
    let ram = (billions * RAM_MB_PER_BILLION).ceil() as u64 + RAM_OVERHEAD_MB;
    let cores = if billions <= 4.0 {
        2
    } else if billions <= 20.0 {
        4
    } else {
        8
    };
    ResourceRequirements::new(ram, 0, cores)
}

fn speed_for(size: Option<SizeClass>, execution: ExecutionKind) -> SpeedClass {
    match (size, execution) {
        (Some(SizeClass::Tiny), _) => SpeedClass::Fast,
        (Some(SizeClass::Small | SizeClass::Medium), _) | (None, _) => SpeedClass::Medium,
        (Some(SizeClass::Hosted), _) => SpeedClass::Medium,
        (Some(SizeClass::Large | SizeClass::XLarge), ExecutionKind::Remote) => SpeedClass::Medium,
        (Some(SizeClass::Large | SizeClass::XLarge), ExecutionKind::Local) => SpeedClass::Slow,
    }
}
