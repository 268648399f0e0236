use crate::clients::{extract_json, LlmClient};
use crate::config::ReflectionDepth;
use crate::models::{
    ErrorClass, ReflectionEntry, SelectedStrategy, StructuredReflection,
    REFLECTION_BASE_TEMPLATE, REFLECTION_SYSTEM_PROMPT,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INSIGHT_MARKERS: &[&str] = &[
    "I learned that",
    "I realized that",
    "I realised that",
    "The key insight is",
    "This reveals that",
    "I should have",
    "In the future, I will",
    "A better approach would be",
];

const QUALITY_MARKERS: &[&str] = &[
    "because",
    "however",
    "alternatively",
    "in hindsight",
    "pattern",
    "insight",
    "improvement",
    "better approach",
];

const MAX_INSIGHTS: usize = 5;

/// Everything the reflection prompt needs about the attempt just made.
pub struct ReflectionContext<'a> {
    pub pod_name: &'a str,
    pub namespace: &'a str,
    pub error_class: ErrorClass,
    pub retry_count: u32,
    pub strategy: &'a SelectedStrategy,
    pub observation: serde_json::Value,
    pub past_attempts: serde_json::Value,
    pub strategy_count: usize,
    pub performance_trend: &'a str,
}

/// LLM-mediated structured self-analysis.
pub struct Reflector {
    llm: Arc<dyn LlmClient>,
    depth: ReflectionDepth,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>, depth: ReflectionDepth) -> Self {
        Self { llm, depth }
    }

    /// Returns the reflection entry and whether the LLM path failed; a
    /// failure degrades to the fallback entry and costs self-awareness.
    pub async fn reflect(&self, ctx: &ReflectionContext<'_>) -> (ReflectionEntry, bool) {
        let prompt = self.build_prompt(ctx);

        match self.llm.chat(REFLECTION_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                let entry = process_reflection(&text, ctx);
                info!(
                    "Reflection complete for {}: {} insights, quality {:.2}",
                    ctx.pod_name,
                    entry.insights_gained.len(),
                    entry.meta_quality_score
                );
                (entry, false)
            }
            Err(e) => {
                warn!("Reflection failed for {}: {}", ctx.pod_name, e);
                let trigger = serde_json::to_string(ctx.strategy).unwrap_or_default();
                (
                    ReflectionEntry::fallback(trigger, ctx.observation.clone()),
                    true,
                )
            }
        }
    }

    fn build_prompt(&self, ctx: &ReflectionContext<'_>) -> String {
        let situation = serde_json::json!({
            "pod_name": ctx.pod_name,
            "namespace": ctx.namespace,
            "error_type": ctx.error_class.to_string(),
            "retry_count": ctx.retry_count,
        });
        let strategy_summary = serde_json::json!({
            "total_strategies": ctx.strategy_count,
        });

        let base = REFLECTION_BASE_TEMPLATE
            .replace("{context}", &situation.to_string())
            .replace(
                "{action}",
                &serde_json::to_string(ctx.strategy).unwrap_or_default(),
            )
            .replace("{outcome}", &ctx.observation.to_string())
            .replace("{past_attempts}", &ctx.past_attempts.to_string())
            .replace("{strategy_summary}", &strategy_summary.to_string());

        format!(
            "{}\n\nREFLECTION DEPTH: {:?}\n{}\n\nDOMAIN-SPECIFIC ANALYSIS:\n{}\n\n\
             HISTORICAL CONTEXT:\nPerformance Trend: {}\n\n\
             Provide a thorough, honest self-reflection.\n\
             Format your key insights using one of these patterns:\n\
             - \"I learned that...\"\n- \"I realized that...\"\n\
             - \"The key insight is...\"\n- \"In the future, I will...\"\n\
             Include at least 3 specific insights from this experience.",
            base,
            self.depth,
            self.depth.prompt_modifier(),
            domain_questions(ctx.error_class),
            ctx.performance_trend,
        )
    }
}

fn domain_questions(error_class: ErrorClass) -> &'static str {
    match error_class {
        ErrorClass::ImagePullBackOff | ErrorClass::ErrImagePull => {
            "- How well did I assess image availability and registry accessibility?\n\
             - Did I consider alternative image sources or versions?\n\
             - What does this teach me about image tag management strategies?"
        }
        ErrorClass::CrashLoopBackOff => {
            "- How effectively did I analyze the crash patterns and exit codes?\n\
             - Did I consider resource constraints, initialization timing, and dependencies?\n\
             - How might I better predict and prevent crash scenarios?"
        }
        ErrorClass::OomKilled => {
            "- How accurate was my resource requirement assessment?\n\
             - Did I consider memory usage patterns and peak demands?\n\
             - How might I better balance performance and resource efficiency?"
        }
        _ => "Focus on general patterns and improvement opportunities.",
    }
}

fn process_reflection(text: &str, ctx: &ReflectionContext<'_>) -> ReflectionEntry {
    let structured = extract_json(text)
        .and_then(|value| serde_json::from_value::<StructuredReflection>(value).ok());

    let mut insights = extract_insights(text);
    if insights.is_empty() {
        if let Some(block) = &structured {
            insights = block.main_insights.iter().take(MAX_INSIGHTS).cloned().collect();
        }
    }

    let strategy_modifications = structured
        .as_ref()
        .map(|s| s.strategy_modifications.clone())
        .unwrap_or_default();

    let confidence_level = structured
        .as_ref()
        .and_then(|s| s.overall_reflection_confidence)
        .unwrap_or(0.7);

    let meta_quality_score = assess_quality(text, structured.as_ref());

    debug!(
        "Processed reflection: {} insights, quality {:.2}",
        insights.len(),
        meta_quality_score
    );

    ReflectionEntry {
        trigger_action: serde_json::to_string(ctx.strategy).unwrap_or_default(),
        outcome_observed: ctx.observation.clone(),
        reflection_text: text.to_string(),
        insights_gained: insights,
        structured,
        strategy_modifications,
        confidence_level,
        meta_quality_score,
        timestamp: Utc::now(),
    }
}

/// Marker-based extraction of insight sentences, at most five.
fn extract_insights(text: &str) -> Vec<String> {
    let mut insights = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let lower = line.to_lowercase();
        for marker in INSIGHT_MARKERS {
            if let Some(idx) = lower.find(&marker.to_lowercase()) {
                let insight = line[idx + marker.len()..].trim().to_string();
                if insight.len() > 10 {
                    insights.push(insight);
                }
                break;
            }
        }
        if insights.len() >= MAX_INSIGHTS {
            break;
        }
    }

    insights
}

/// Quality rubric: length, structured-block completeness and meta-discourse
/// markers.
fn assess_quality(text: &str, structured: Option<&StructuredReflection>) -> f64 {
    let mut score: f64 = 0.0;

    if text.len() > 500 {
        score += 0.2;
    }
    if text.len() > 1000 {
        score += 0.1;
    }

    if let Some(block) = structured {
        if block.decision_quality_score.is_some() {
            score += 0.2;
        }
        if !block.main_insights.is_empty() {
            score += 0.2;
        }
        if !block.strategy_modifications.is_empty() {
            score += 0.2;
        }
    }

    let lower = text.to_lowercase();
    let marker_hits = QUALITY_MARKERS
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count();
    score += (marker_hits as f64 * 0.05).min(0.3);

    score.min(1.0)
}

/// Weighted aggregate of recent reflection quality, insight depth and the
/// current reflection's own confidence.
pub fn self_awareness_level(current: &ReflectionEntry, history: &[ReflectionEntry]) -> f64 {
    if history.is_empty() {
        return current.meta_quality_score;
    }

    let recent: Vec<&ReflectionEntry> = history.iter().rev().take(5).collect();
    let avg_quality =
        recent.iter().map(|r| r.meta_quality_score).sum::<f64>() / recent.len() as f64;
    let avg_insights =
        recent.iter().map(|r| r.insights_gained.len() as f64).sum::<f64>() / recent.len() as f64;
    let insight_depth = (avg_insights / 3.0).min(1.0);

    (avg_quality * 0.4 + insight_depth * 0.3 + current.confidence_level * 0.3).min(1.0)
}
