//! Adaptive attempt timeouts.
//!
//! Every attempt gets two budgets:
//!
//! - **Connection**: covers connect and cold model load, by size class
//!   (15 s for small models up to 37.5 s for the largest), capped at 60 s.
//! - **Generation**: `ceil(tokens / tokens_per_second) * multiplier * 1.5`,
//!   clamped to [10 s, 900 s]. Throughput is a static lookup by size class;
//!   the multiplier rises for tool use and analysis-style work and falls for
//!   plain writing.

use std::time::Duration;

use serde::Deserialize;

use crate::types::{AttemptBudget, Complexity, GenerateRequest, ModelCapability, SizeClass};

/// Timeout settings.
///
/// ```toml
/// [timeouts]
/// min_secs = 10
/// max_secs = 900
/// connection_cap_secs = 60
/// safety_buffer = 1.5
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Lower bound on the generation timeout. Default: 10.
    pub min_secs: u64,
    /// Upper bound on the generation timeout. Default: 900.
    pub max_secs: u64,
    /// Upper bound on the connection timeout. Default: 60.
    pub connection_cap_secs: u64,
    /// Multiplier applied on top of the estimate. Default: 1.5.
    pub safety_buffer: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            min_secs: 10,
            max_secs: 900,
            connection_cap_secs: 60,
            safety_buffer: 1.5,
        }
    }
}

/// Task keywords that call for more time.
const ANALYSIS_TASKS: &[&str] = &["analy", "audit", "debug", "review", "security"];
/// Task keywords for plain text production.
const GENERATION_TASKS: &[&str] = &["generat", "doc", "writ"];

const TOOLS_BONUS: f64 = 0.5;
const ANALYSIS_BONUS: f64 = 0.3;
const GENERATION_DISCOUNT: f64 = 0.2;
const MIN_MULTIPLIER: f64 = 0.5;

/// Derives attempt budgets from model size and request volume.
#[derive(Debug, Clone, Default)]
pub struct TimeoutCalculator {
    config: TimeoutConfig,
}

impl TimeoutCalculator {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Time allowed to connect and load the model.
    pub fn connection_timeout(&self, cap: &ModelCapability) -> Duration {
        let secs = match cap.size_class() {
            SizeClass::Tiny | SizeClass::Small | SizeClass::Hosted => 15.0,
            SizeClass::Medium => 22.5,
            SizeClass::Large => 30.0,
            SizeClass::XLarge => 37.5,
        };
        Duration::from_secs_f64(secs).min(Duration::from_secs(self.config.connection_cap_secs))
    }

    /// Time allowed to generate, always within `[min_secs, max_secs]`.
    pub fn generation_timeout(
        &self,
        cap: &ModelCapability,
        input_tokens: u32,
        output_tokens: u32,
        requires_tools: bool,
        task_type: &str,
        complexity: Complexity,
    ) -> Duration {
        let tokens = u64::from(input_tokens) + u64::from(output_tokens);
        let tps = tokens_per_second(cap.size_class());
        let base = (tokens as f64 / tps).ceil();
        let multiplier = complexity_multiplier(task_type, requires_tools, complexity);
        let secs = base * multiplier * self.config.safety_buffer.max(1.0);

        let min = self.config.min_secs as f64;
        let max = (self.config.max_secs as f64).max(min);
        Duration::from_secs_f64(secs.clamp(min, max))
    }

    /// Both budgets for running `request` on `cap`.
    pub fn budget(
        &self,
        cap: &ModelCapability,
        request: &GenerateRequest,
        task_type: &str,
        complexity: Complexity,
    ) -> AttemptBudget {
        AttemptBudget::new(
            self.connection_timeout(cap),
            self.generation_timeout(
                cap,
                request.estimated_input_tokens(),
                request.generate_options().output_tokens(),
                request.requires_tools(),
                task_type,
                complexity,
            ),
        )
    }
}

/// Expected throughput by size class.
pub fn tokens_per_second(size: SizeClass) -> f64 {
    match size {
        SizeClass::Tiny => 50.0,
        SizeClass::Small => 25.0,
        SizeClass::Medium => 10.0,
        SizeClass::Large => 3.0,
        SizeClass::XLarge => 2.0,
        SizeClass::Hosted => 40.0,
    }
}

/// 1.0, +0.5 with tools, +0.3 for analysis-style or complex work,
/// -0.2 for plain writing; never below 0.5.
pub fn complexity_multiplier(task_type: &str, requires_tools: bool, complexity: Complexity) -> f64 {
    let task = task_type.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| task.contains(w));

    let mut multiplier = 1.0;
    if requires_tools {
        multiplier += TOOLS_BONUS;
    }
    if mentions(ANALYSIS_TASKS) || complexity == Complexity::Complex {
        multiplier += ANALYSIS_BONUS;
    }
    if mentions(GENERATION_TASKS) {
        multiplier -= GENERATION_DISCOUNT;
    }
    f64::max(multiplier, MIN_MULTIPLIER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(params: f64) -> ModelCapability {
        ModelCapability::new("m", "ollama").with_parameters(params)
    }

    #[test]
    fn connection_scales_with_size() {
        let calc = TimeoutCalculator::default();
        assert_eq!(calc.connection_timeout(&model(3.0)), Duration::from_secs(15));
        assert_eq!(calc.connection_timeout(&model(14.0)), Duration::from_millis(22_500));
        assert_eq!(calc.connection_timeout(&model(32.0)), Duration::from_secs(30));
        assert_eq!(calc.connection_timeout(&model(70.0)), Duration::from_millis(37_500));
    }

    #[test]
    fn connection_respects_cap() {
        let calc = TimeoutCalculator::new(TimeoutConfig {
            connection_cap_secs: 20,
            ..Default::default()
        });
        assert_eq!(calc.connection_timeout(&model(70.0)), Duration::from_secs(20));
    }

    #[test]
    fn generation_formula() {
        let calc = TimeoutCalculator::default();
        // 2000 tokens / 25 tok/s = 80 s * 1.0 * 1.5 = 120 s
        let t = calc.generation_timeout(&model(7.0), 1000, 1000, false, "chat", Complexity::Medium);
        assert_eq!(t, Duration::from_secs(120));
        // with tools: 80 * 1.5 * 1.5 = 180 s
        let t = calc.generation_timeout(&model(7.0), 1000, 1000, true, "chat", Complexity::Medium);
        assert_eq!(t, Duration::from_secs(180));
    }

    #[test]
    fn generation_is_clamped() {
        let calc = TimeoutCalculator::default();
        let tiny = calc.generation_timeout(&model(1.0), 1, 1, false, "quick", Complexity::Simple);
        assert_eq!(tiny, Duration::from_secs(10));
        let huge =
            calc.generation_timeout(&model(70.0), 100_000, 8_000, true, "audit", Complexity::Complex);
        assert_eq!(huge, Duration::from_secs(900));
    }

    #[test]
    fn multiplier_rules() {
        assert_eq!(complexity_multiplier("chat", false, Complexity::Medium), 1.0);
        assert_eq!(complexity_multiplier("chat", true, Complexity::Medium), 1.5);
        assert!((complexity_multiplier("security_audit", false, Complexity::Medium) - 1.3).abs() < 1e-9);
        assert!((complexity_multiplier("chat", false, Complexity::Complex) - 1.3).abs() < 1e-9);
        assert!((complexity_multiplier("documentation", false, Complexity::Medium) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn budget_uses_request_estimates() {
        let calc = TimeoutCalculator::default();
        let request = GenerateRequest::plain("x".repeat(4000));
        let budget = calc.budget(&model(7.0), &request, "chat", Complexity::Medium);
        // 1000 input + 1024 default output = 2024 / 25 = 80.96 -> 81 s * 1.5
        assert_eq!(budget.connection, Duration::from_secs(15));
        assert_eq!(budget.generation, Duration::from_secs_f64(121.5));
    }
}
