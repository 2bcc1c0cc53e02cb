//! Static task type → strength tag mapping.

use std::collections::BTreeSet;

/// Tag that lets a model serve any task, at a low fit.
pub const GENERAL_TAG: &str = "general";

/// Fit given to `general` models with no direct tag overlap.
pub const GENERAL_FIT: f64 = 0.2;

/// Fit lost per matched weakness tag.
pub const WEAKNESS_PENALTY: f64 = 0.25;

const TASK_TAGS: &[(&[&str], &[&str])] = &[
    (&["coding", "code"], &["coding", "coder", "debugging"]),
    (&["debug", "debugging"], &["debugging", "coding", "coder"]),
    (&["refactor", "refactoring"], &["refactoring", "coding", "coder"]),
    (&["review", "code_review"], &["review", "coding", "analysis"]),
    (&["analysis", "audit", "security"], &["analysis", "reasoning"]),
    (&["reasoning", "planning"], &["reasoning", "analysis", "math"]),
    (&["math"], &["math", "reasoning"]),
    (&["quick", "fast"], &["fast", "general", "chat"]),
    (&["chat", "conversation"], &["chat", "general"]),
    (&["documentation", "docs"], &["documentation", "writing"]),
    (&["writing", "generation"], &["writing", "general"]),
    (&["summarization", "summary"], &["summarization", "general"]),
    (&["embedding", "embed"], &["embedding"]),
    (&["vision", "image"], &["vision"]),
    (&["general"], &["general", "chat"]),
];

/// Strength tags that serve `task_type`.
///
/// Matching is case-insensitive. Unknown task types map to the task name
/// itself plus `general`, so catalog entries can opt into new tasks by tag.
pub fn strength_tags(task_type: &str) -> BTreeSet<String> {
    let task = task_type.trim().to_lowercase();
    TASK_TAGS
        .iter()
        .find(|(names, _)| names.contains(&task.as_str()))
        .map(|(_, tags)| tags.iter().map(|t| t.to_string()).collect())
        .unwrap_or_else(|| [task, GENERAL_TAG.to_string()].into_iter().collect())
}
