use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured self-analysis of one loop iteration. The structured block is
/// optional: models frequently return prose-only reflections and parsers
/// must tolerate that.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub trigger_action: String,
    pub outcome_observed: serde_json::Value,
    pub reflection_text: String,
    pub insights_gained: Vec<String>,
    pub structured: Option<StructuredReflection>,
    pub strategy_modifications: HashMap<String, serde_json::Value>,
    pub confidence_level: f64,
    pub meta_quality_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReflectionEntry {
    pub fn fallback(trigger_action: String, outcome: serde_json::Value) -> Self {
        Self {
            trigger_action,
            outcome_observed: outcome,
            reflection_text:
                "Fallback reflection: LLM analysis unavailable. Basic outcome recorded."
                    .to_string(),
            insights_gained: vec![
                "Reflection system needs improvement".to_string(),
                "Fallback mechanism activated".to_string(),
            ],
            structured: None,
            strategy_modifications: HashMap::new(),
            confidence_level: 0.3,
            meta_quality_score: 0.2,
            timestamp: Utc::now(),
        }
    }
}

/// The optional machine-readable block a reflection may carry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuredReflection {
    #[serde(default)]
    pub decision_quality_score: Option<f64>,
    #[serde(default)]
    pub execution_quality_score: Option<f64>,
    #[serde(default)]
    pub learning_integration_score: Option<f64>,
    #[serde(default)]
    pub main_insights: Vec<String>,
    #[serde(default)]
    pub strategy_modifications: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub confidence_updates: HashMap<String, f64>,
    #[serde(default)]
    pub knowledge_gaps_identified: Vec<String>,
    #[serde(default)]
    pub meta_reflection_quality: Option<f64>,
    #[serde(default)]
    pub overall_reflection_confidence: Option<f64>,
}

/// Outcome of reflecting on the reflection process itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaReflection {
    pub quality_trend: String,
    pub average_quality: f64,
    pub insights_per_reflection: f64,
    pub actionable_insights: bool,
    pub meta_insight: String,
}

pub const REFLECTION_SYSTEM_PROMPT: &str = r#"You are an advanced AI system capable of deep self-reflection and meta-cognition.
Your task is to analyze your own decision-making process in Kubernetes error resolution.

Key principles for reflection:
1. Be brutally honest about mistakes and limitations
2. Look for patterns and meta-patterns in your thinking
3. Consider alternative approaches you didn't try
4. Identify cognitive biases or blind spots
5. Focus on actionable insights for improvement
6. Maintain scientific skepticism about your own conclusions

Provide structured, analytical reflection that demonstrates genuine self-awareness and learning."#;

pub const REFLECTION_BASE_TEMPLATE: &str = r#"SELF-REFLECTION ON KUBERNETES FIX ATTEMPT

Context: {context}
Action Taken: {action}
Outcome: {outcome}
Past Similar Attempts: {past_attempts}
Current Strategy Database: {strategy_summary}

DEEP SELF-ANALYSIS:
1. Decision Quality Assessment:
   - Was my strategy selection optimal given the available context?
   - What contextual factors did I consider vs. miss?

2. Execution Analysis:
   - Was the timing of my action appropriate?
   - Did I adequately assess potential risks and side effects?

3. Learning Integration:
   - How effectively did I apply lessons from past attempts?
   - What patterns am I starting to recognize?

4. Outcome Evaluation:
   - Was the outcome aligned with my prediction?
   - What unexpected factors emerged?

5. Strategy Evolution:
   - What modifications should I make to my strategy database?
   - How should I adjust my confidence levels?

STRUCTURED REFLECTION OUTPUT:
{
    "decision_quality_score": <0.0-1.0>,
    "execution_quality_score": <0.0-1.0>,
    "learning_integration_score": <0.0-1.0>,
    "main_insights": [<list of key insights>],
    "strategy_modifications": {<specific changes to make>},
    "confidence_updates": {<strategy_id: new_confidence>},
    "knowledge_gaps_identified": [<list of gaps>],
    "meta_reflection_quality": <0.0-1.0>,
    "overall_reflection_confidence": <0.0-1.0>
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_entry_is_degraded() {
        let entry = ReflectionEntry::fallback("{}".to_string(), serde_json::Value::Null);
        assert!((entry.meta_quality_score - 0.2).abs() < f64::EPSILON);
        assert!(!entry.insights_gained.is_empty());
        assert!(entry.structured.is_none());
    }

    #[test]
    fn test_structured_block_tolerates_missing_fields() {
        let parsed: StructuredReflection =
            serde_json::from_str(r#"{"main_insights": ["check image tags first"]}"#).unwrap();
        assert_eq!(parsed.main_insights.len(), 1);
        assert!(parsed.decision_quality_score.is_none());
    }
}
