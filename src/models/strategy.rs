use super::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A learned (or seeded) repair recipe for one error class. Confidence is
/// derived from the performance tracker and never assigned by callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub error_class: ErrorClass,
    pub conditions: Vec<String>,
    pub actions: serde_json::Value,
    pub confidence: f64,
    pub success_rate: f64,
    pub usage_count: u64,
    pub version: u32,
    pub source: StrategySource,
    pub context: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl Strategy {
    pub fn new(id: &str, error_class: ErrorClass, source: StrategySource) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            error_class,
            conditions: Vec::new(),
            actions: serde_json::Value::Null,
            confidence: 0.5,
            success_rate: 0.0,
            usage_count: 0,
            version: 1,
            source,
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_used: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_actions(mut self, actions: serde_json::Value) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.05, 0.95);
        self
    }

    /// A strategy applies when every condition predicate holds for the
    /// incident context. Predicates are textual equalities of the form
    /// `key == 'value'`; unknown keys never match but never error.
    pub fn matches_context(&self, context: &HashMap<String, String>) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition_holds(condition, context))
    }
}

fn condition_holds(condition: &str, context: &HashMap<String, String>) -> bool {
    let Some((key, value)) = parse_condition(condition) else {
        // Free-form qualifiers without an equality assert nothing.
        return true;
    };
    match context.get(&key) {
        Some(actual) => actual == &value,
        None => false,
    }
}

fn parse_condition(condition: &str) -> Option<(String, String)> {
    let (key, raw_value) = condition.split_once("==")?;
    let value = raw_value.trim().trim_matches(['\'', '"']);
    Some((key.trim().to_string(), value.to_string()))
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategySource {
    Learned,
    Manual,
    Seed,
}

/// Append-only record of one strategy application.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageRecord {
    pub strategy_id: String,
    pub pod_name: String,
    pub namespace: String,
    pub success: bool,
    pub execution_time: f64,
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit trail of every strategy mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub strategy_id: String,
    pub version: u32,
    pub change_type: ChangeType,
    pub change_description: String,
    pub old_confidence: Option<f64>,
    pub new_confidence: f64,
    pub trigger_event: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    PerformanceUpdate,
    Modified,
    Merged,
}

/// The strategy the loop settled on for the current attempt, with enough
/// metadata for prompts and downstream explanation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectedStrategy {
    pub id: String,
    pub action: String,
    pub confidence: f64,
    pub parameters: serde_json::Value,
    pub conditions: Vec<String>,
    pub selection_reason: SelectionReason,
    pub usage_count: u64,
    pub success_rate: f64,
    pub decision_reasoning: String,
}

impl SelectedStrategy {
    /// Strategies loaded from the persistent store feed outcomes back into
    /// it; defaults and placeholders do not.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self.selection_reason,
            SelectionReason::HighConfidencePersistent | SelectionReason::HighestConfidenceLearned
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    HighConfidencePersistent,
    HighestConfidenceLearned,
    DefaultFallback,
    NoStrategyAvailable,
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionReason::HighConfidencePersistent => write!(f, "high_confidence_persistent"),
            SelectionReason::HighestConfidenceLearned => write!(f, "highest_confidence_learned"),
            SelectionReason::DefaultFallback => write!(f, "default_fallback"),
            SelectionReason::NoStrategyAvailable => write!(f, "no_strategy_available"),
        }
    }
}

/// Modifications the learner may merge into an existing strategy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StrategyModifications {
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StrategyModifications {
    pub fn is_empty(&self) -> bool {
        self.timeout.is_none()
            && self.retry_count.is_none()
            && self.confidence_threshold.is_none()
            && self.conditions.is_empty()
            && self.parameters.is_empty()
            && self.description.is_none()
    }

    pub fn summary(&self) -> String {
        let mut changed = Vec::new();
        if self.timeout.is_some() {
            changed.push("timeout");
        }
        if self.retry_count.is_some() {
            changed.push("retry_count");
        }
        if self.confidence_threshold.is_some() {
            changed.push("confidence_threshold");
        }
        if !self.conditions.is_empty() {
            changed.push("conditions");
        }
        if !self.parameters.is_empty() {
            changed.push("parameters");
        }
        if self.description.is_some() {
            changed.push("description");
        }
        format!("Applied modifications: [{}]", changed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_conditions_always_match() {
        let strategy = Strategy::new("s1", ErrorClass::OomKilled, StrategySource::Learned);
        assert!(strategy.matches_context(&context(&[("namespace", "prod")])));
        assert!(strategy.matches_context(&HashMap::new()));
    }

    #[test]
    fn test_condition_equality() {
        let strategy = Strategy::new("s1", ErrorClass::OomKilled, StrategySource::Learned)
            .with_conditions(vec!["namespace == 'prod'".to_string()]);

        assert!(strategy.matches_context(&context(&[("namespace", "prod")])));
        assert!(!strategy.matches_context(&context(&[("namespace", "staging")])));
    }

    #[test]
    fn test_unknown_key_does_not_match_but_never_errors() {
        let strategy = Strategy::new("s1", ErrorClass::OomKilled, StrategySource::Learned)
            .with_conditions(vec!["cluster_size == 'large'".to_string()]);

        assert!(!strategy.matches_context(&context(&[("namespace", "prod")])));
    }

    #[test]
    fn test_non_equality_condition_asserts_nothing() {
        let strategy = Strategy::new("s1", ErrorClass::OomKilled, StrategySource::Learned)
            .with_conditions(vec!["requires_context_evaluation".to_string()]);

        assert!(strategy.matches_context(&HashMap::new()));
    }

    #[test]
    fn test_double_quoted_condition_value() {
        let strategy = Strategy::new("s1", ErrorClass::OomKilled, StrategySource::Learned)
            .with_conditions(vec!["error_type == \"OOMKilled\"".to_string()]);

        assert!(strategy.matches_context(&context(&[("error_type", "OOMKilled")])));
    }

    #[test]
    fn test_confidence_clamped_on_build() {
        let strategy = Strategy::new("s1", ErrorClass::Other, StrategySource::Seed)
            .with_confidence(1.4);
        assert!((strategy.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_modifications_summary_lists_changed_fields() {
        let mods = StrategyModifications {
            timeout: Some(30.0),
            conditions: vec!["namespace == 'prod'".to_string()],
            ..Default::default()
        };
        let summary = mods.summary();
        assert!(summary.contains("timeout"));
        assert!(summary.contains("conditions"));
        assert!(!summary.contains("parameters"));
    }
}
