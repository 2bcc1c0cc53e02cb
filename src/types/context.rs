//! Selection input.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ModelKey;

/// Caller's hint about how hard the task is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

/// How much the caller cares about latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// Everything selection needs to know about a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionContext {
    /// Task type, e.g. `coding`, `analysis`, `quick`.
    pub task_type: String,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub requires_tool_calling: bool,
    #[serde(default)]
    pub urgency: Urgency,
    /// Candidates that already failed in this fallback walk.
    #[serde(default)]
    pub excluded: BTreeSet<ModelKey>,
}

impl SelectionContext {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            complexity: Complexity::default(),
            requires_tool_calling: false,
            urgency: Urgency::default(),
            excluded: BTreeSet::new(),
        }
    }

    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn tool_calling(mut self, required: bool) -> Self {
        self.requires_tool_calling = required;
        self
    }

    pub fn exclude(mut self, key: ModelKey) -> Self {
        self.excluded.insert(key);
        self
    }

    pub fn is_excluded(&self, key: &ModelKey) -> bool {
        self.excluded.contains(key)
    }
}
