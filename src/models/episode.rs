use super::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One full traversal of the remediation loop for one incident, persisted
/// with outcome and lessons.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub pod_name: String,
    pub namespace: String,
    pub error_class: ErrorClass,
    pub context: HashMap<String, String>,
    pub actions_taken: serde_json::Value,
    pub outcome: EpisodeOutcome,
    pub lessons_learned: Vec<String>,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub resolution_time: f64,
    pub reflection_quality: f64,
    pub insights_generated: u32,
    pub timestamp: DateTime<Utc>,
}

impl Episode {
    pub fn new(
        pod_name: &str,
        namespace: &str,
        error_class: ErrorClass,
        context: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pod_name: pod_name.to_string(),
            namespace: namespace.to_string(),
            error_class,
            context,
            actions_taken: serde_json::Value::Null,
            outcome: EpisodeOutcome::default(),
            lessons_learned: Vec::new(),
            confidence_before: 0.5,
            confidence_after: 0.5,
            resolution_time: 0.0,
            reflection_quality: 0.0,
            insights_generated: 0,
            timestamp: Utc::now(),
        }
    }

    /// Shared-key equality similarity: `matches / |keys(a) ∩ keys(b)|`,
    /// zero when the key sets are disjoint.
    pub fn context_similarity(a: &HashMap<String, String>, b: &HashMap<String, String>) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let common: Vec<&String> = a.keys().filter(|k| b.contains_key(*k)).collect();
        if common.is_empty() {
            return 0.0;
        }

        let matches = common.iter().filter(|k| a.get(**k) == b.get(**k)).count();
        matches as f64 / common.len() as f64
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub success: bool,
    pub resolution_time: f64,
    pub status: String,
}

/// Derived aggregate over episodes; frequency incremented on every match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryPattern {
    pub pattern_type: PatternType,
    pub pattern_data: serde_json::Value,
    pub strength: f64,
    pub frequency: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Temporal,
    Contextual,
    Causal,
}

/// Link between two episodes whose contexts proved similar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryAssociation {
    pub episode_a: String,
    pub episode_b: String,
    pub association_type: AssociationType,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssociationType {
    SimilarContext,
    SimilarOutcome,
    Causal,
}

/// Daily learning progression row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyProgression {
    pub date: String,
    pub confidence_gain: f64,
    pub reflection_quality: f64,
    pub avg_insights: f64,
    pub episode_count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorClassStats {
    pub error_class: ErrorClass,
    pub count: u64,
    pub avg_improvement: f64,
    pub avg_resolution_time: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearningProgression {
    pub daily_progression: Vec<DailyProgression>,
    pub per_class_stats: Vec<ErrorClassStats>,
    pub analysis_period_days: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total_episodes: u64,
    pub avg_reflection_quality: f64,
    pub avg_insights_generated: f64,
    pub avg_confidence_gain: f64,
    pub avg_resolution_time: f64,
    pub patterns_discovered: u64,
    pub associations_formed: u64,
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
    fn test_similarity_identical_contexts() {
        let a = context(&[("namespace", "default"), ("error_type", "OOMKilled")]);
        assert!((Episode::context_similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_similarity_partial_overlap() {
        let a = context(&[("namespace", "default"), ("error_type", "OOMKilled")]);
        let b = context(&[("namespace", "prod"), ("error_type", "OOMKilled")]);
        assert!((Episode::context_similarity(&a, &b) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_similarity_disjoint_keys_is_zero() {
        let a = context(&[("namespace", "default")]);
        let b = context(&[("cluster", "west")]);
        assert_eq!(Episode::context_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_similarity_empty_context_is_zero() {
        let a = context(&[("namespace", "default")]);
        assert_eq!(Episode::context_similarity(&a, &HashMap::new()), 0.0);
    }
}
