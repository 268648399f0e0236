use crate::error::KubemendError;
use crate::models::{
    AttemptRecord, Episode, EpisodeOutcome, ErrorClass, Incident, PatternType, ReflectionEntry,
    SelectedStrategy, Strategy, StrategyModifications, StrategySource,
};
use crate::stores::{EpisodicMemory, StrategyStore};
use chrono::Timelike;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACTIONABLE_CUES: &[&str] = &[
    "should", "need to", "must", "will", "better to", "instead of", "rather than", "improve by",
    "optimize",
];

const STRATEGY_CUES: &[&str] = &[
    "strategy",
    "approach",
    "method",
    "technique",
    "algorithm",
    "timeout",
    "retry",
    "threshold",
    "parameter",
];

const CONTEXT_CUES: &[&str] = &[
    "when",
    "if",
    "during",
    "in case of",
    "depends on",
    "environment",
    "namespace",
    "cluster",
    "time",
];

const ACTIONABILITY_THRESHOLD: f64 = 0.5;

/// How many lessons an episode carries forward.
const LESSON_LIMIT: usize = 3;

/// Attempts considered when refreshing strategy confidence.
const CONFIDENCE_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsightType {
    Temporal,
    ResourceManagement,
    ContextAwareness,
    StrategyOptimization,
    PatternRecognition,
    General,
}

impl InsightType {
    fn as_str(&self) -> &'static str {
        match self {
            InsightType::Temporal => "temporal",
            InsightType::ResourceManagement => "resource_management",
            InsightType::ContextAwareness => "context_awareness",
            InsightType::StrategyOptimization => "strategy_optimization",
            InsightType::PatternRecognition => "pattern_recognition",
            InsightType::General => "general",
        }
    }

    fn seeded_confidence(&self) -> f64 {
        match self {
            InsightType::Temporal => 0.6,
            InsightType::ResourceManagement => 0.7,
            InsightType::ContextAwareness => 0.65,
            InsightType::PatternRecognition => 0.55,
            InsightType::StrategyOptimization | InsightType::General => 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct InsightAnalysis {
    pub insight: String,
    pub actionable: bool,
    pub actionability_score: f64,
    pub insight_type: InsightType,
}

/// What one learning pass changed.
#[derive(Clone, Debug, Default)]
pub struct LearningOutcome {
    pub actionable_insights: usize,
    pub strategies_evolved: usize,
    pub strategies_created: usize,
    pub patterns_detected: usize,
    pub learning_velocity: f64,
}

pub struct LearnInput<'a> {
    pub incident: &'a Incident,
    pub strategy: &'a SelectedStrategy,
    pub reflection: Option<&'a ReflectionEntry>,
    pub success: bool,
    pub resolution_time: f64,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub past_attempts: &'a [AttemptRecord],
    pub workflow_id: &'a str,
}

/// Integrates reflection output into strategy evolution, episodic memory and
/// pattern detection. Store failures degrade to logs; learning never aborts
/// the loop.
pub struct Learner {
    strategy_store: Arc<StrategyStore>,
    memory: Arc<EpisodicMemory>,
    pattern_threshold: usize,
}

impl Learner {
    pub fn new(
        strategy_store: Arc<StrategyStore>,
        memory: Arc<EpisodicMemory>,
        pattern_threshold: usize,
    ) -> Self {
        Self {
            strategy_store,
            memory,
            pattern_threshold,
        }
    }

    pub async fn learn(
        &self,
        input: &LearnInput<'_>,
        improvement_trajectory: &mut Vec<f64>,
    ) -> LearningOutcome {
        let mut outcome = LearningOutcome::default();

        let analyses = input
            .reflection
            .map(|r| analyze_insights(&r.insights_gained))
            .unwrap_or_default();
        outcome.actionable_insights = analyses.iter().filter(|a| a.actionable).count();

        self.evolve_strategies(input, &analyses, &mut outcome).await;
        self.refresh_confidence(input.past_attempts).await;

        let episode = build_episode(input);
        if let Err(e) = self.memory.store(episode).await {
            warn!("Failed to store episode: {}", e);
        }

        outcome.patterns_detected = self.detect_patterns().await;

        // Trajectory point: running success rate for this incident.
        let attempts = input.past_attempts.len() + 1;
        let successes =
            input.past_attempts.iter().filter(|a| a.success).count() + input.success as usize;
        improvement_trajectory.push(successes as f64 / attempts as f64);
        outcome.learning_velocity = learning_velocity(improvement_trajectory);

        info!(
            "Learning complete for {}: {} actionable insights, {} evolved, {} created, {} patterns, velocity {:.3}",
            input.incident.pod_name,
            outcome.actionable_insights,
            outcome.strategies_evolved,
            outcome.strategies_created,
            outcome.patterns_detected,
            outcome.learning_velocity
        );
        outcome
    }

    async fn evolve_strategies(
        &self,
        input: &LearnInput<'_>,
        analyses: &[InsightAnalysis],
        outcome: &mut LearningOutcome,
    ) {
        let Some(reflection) = input.reflection else {
            return;
        };

        // Named modifications from the structured reflection block.
        for (strategy_id, raw_mods) in &reflection.strategy_modifications {
            let Ok(mods) = serde_json::from_value::<StrategyModifications>(raw_mods.clone())
            else {
                debug!("Skipping unparseable modifications for {}", strategy_id);
                continue;
            };
            if mods.is_empty() {
                continue;
            }

            let trigger = format!("reflection_insight_{}", input.workflow_id);
            match self
                .strategy_store
                .apply_modifications(strategy_id, mods.clone(), &trigger)
                .await
            {
                Ok(_) => outcome.strategies_evolved += 1,
                Err(KubemendError::NotFound(_)) => {
                    let strategy = strategy_from_modifications(
                        strategy_id,
                        input.incident.error_class,
                        &mods,
                    );
                    if self.add_ignoring_conflict(strategy).await {
                        outcome.strategies_created += 1;
                    }
                }
                Err(e) => warn!("Strategy modification failed for {}: {}", strategy_id, e),
            }
        }

        // Actionable insights become new strategies.
        for analysis in analyses.iter().filter(|a| a.actionable) {
            let strategy = strategy_from_insight(analysis, input.incident);
            if self.add_ignoring_conflict(strategy).await {
                outcome.strategies_created += 1;
            }
        }
    }

    async fn add_ignoring_conflict(&self, strategy: Strategy) -> bool {
        match self.strategy_store.add(strategy).await {
            Ok(()) => true,
            Err(KubemendError::Conflict(_)) => false,
            Err(e) => {
                warn!("Failed to add learned strategy: {}", e);
                false
            }
        }
    }

    /// Recompute confidence for every strategy seen in the recent attempts:
    /// `0.7·old + 0.3·recent_rate·min(1, n/5)`.
    async fn refresh_confidence(&self, past_attempts: &[AttemptRecord]) {
        let recent: Vec<&AttemptRecord> = past_attempts
            .iter()
            .rev()
            .take(CONFIDENCE_WINDOW)
            .collect();

        let mut by_strategy: HashMap<&str, Vec<&AttemptRecord>> = HashMap::new();
        for attempt in recent {
            by_strategy
                .entry(attempt.strategy_id.as_str())
                .or_default()
                .push(attempt);
        }

        for (strategy_id, attempts) in by_strategy {
            let Ok(Some(strategy)) = self.strategy_store.get(strategy_id).await else {
                continue;
            };

            let successes = attempts.iter().filter(|a| a.success).count();
            let rate = successes as f64 / attempts.len() as f64;
            let sample_weight = (attempts.len() as f64 / 5.0).min(1.0);
            let new_confidence = strategy.confidence * 0.7 + rate * sample_weight * 0.3;

            if let Err(e) = self
                .strategy_store
                .update_confidence(strategy_id, new_confidence, "recent_attempt_refresh")
                .await
            {
                warn!("Confidence refresh failed for {}: {}", strategy_id, e);
            }
        }
    }

    /// Run the three detectors over recent memory once enough episodes have
    /// accumulated.
    async fn detect_patterns(&self) -> usize {
        let episodes = match self.memory.recent(20).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!("Pattern detection skipped, memory unavailable: {}", e);
                return 0;
            }
        };
        if episodes.len() < self.pattern_threshold {
            return 0;
        }

        let mut detected = 0;

        // Error class × namespace correlations.
        let mut class_namespace: HashMap<String, u64> = HashMap::new();
        for episode in &episodes {
            let key = format!("{}:{}", episode.error_class, episode.namespace);
            *class_namespace.entry(key).or_insert(0) += 1;
        }
        for (key, count) in class_namespace {
            if count >= self.pattern_threshold as u64 {
                let data = serde_json::json!({"correlation": key.clone(), "count": count});
                if self
                    .memory
                    .record_pattern(PatternType::Contextual, &key, data)
                    .await
                    .is_ok()
                {
                    detected += 1;
                }
            }
        }

        // Temporal clustering by hour.
        let mut by_hour: HashMap<u32, u64> = HashMap::new();
        for episode in episodes.iter().take(10) {
            *by_hour.entry(episode.timestamp.hour()).or_insert(0) += 1;
        }
        let peak_hours: Vec<u32> = by_hour
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(hour, _)| hour)
            .collect();
        if !peak_hours.is_empty() {
            let data = serde_json::json!({"peak_hours": peak_hours});
            if self
                .memory
                .record_pattern(PatternType::Temporal, "clustering", data)
                .await
                .is_ok()
            {
                detected += 1;
            }
        }

        // Strategy effectiveness by action.
        let mut by_action: HashMap<String, (u64, u64)> = HashMap::new();
        for episode in episodes.iter().take(15) {
            let Some(action) = episode
                .actions_taken
                .get("action")
                .and_then(|a| a.as_str())
            else {
                continue;
            };
            let counts = by_action.entry(action.to_string()).or_insert((0, 0));
            counts.1 += 1;
            if episode.outcome.success {
                counts.0 += 1;
            }
        }
        let rates: HashMap<String, f64> = by_action
            .into_iter()
            .filter(|(_, (_, total))| *total >= 3)
            .map(|(action, (wins, total))| (action, wins as f64 / total as f64))
            .collect();
        if !rates.is_empty() {
            let data = serde_json::json!({"strategy_success_rates": rates});
            if self
                .memory
                .record_pattern(PatternType::Causal, "strategy_effectiveness", data)
                .await
                .is_ok()
            {
                detected += 1;
            }
        }

        detected
    }
}

/// Actionability from three cue families: imperative verbs (0.4), strategy
/// nouns (0.3), context conditionals (0.3); actionable above 0.5.
pub fn analyze_insight(insight: &str) -> InsightAnalysis {
    let lower = insight.to_lowercase();
    let mut score = 0.0;

    if ACTIONABLE_CUES.iter().any(|cue| lower.contains(cue)) {
        score += 0.4;
    }
    if STRATEGY_CUES.iter().any(|cue| lower.contains(cue)) {
        score += 0.3;
    }
    if CONTEXT_CUES.iter().any(|cue| lower.contains(cue)) {
        score += 0.3;
    }

    InsightAnalysis {
        insight: insight.to_string(),
        actionable: score > ACTIONABILITY_THRESHOLD,
        actionability_score: score,
        insight_type: classify_insight(&lower),
    }
}

pub fn analyze_insights(insights: &[String]) -> Vec<InsightAnalysis> {
    insights.iter().map(|i| analyze_insight(i)).collect()
}

fn classify_insight(lower: &str) -> InsightType {
    if ["timing", "time", "delay", "duration"]
        .iter()
        .any(|w| lower.contains(w))
    {
        InsightType::Temporal
    } else if ["resource", "memory", "cpu", "limit"]
        .iter()
        .any(|w| lower.contains(w))
    {
        InsightType::ResourceManagement
    } else if ["context", "environment", "namespace", "cluster"]
        .iter()
        .any(|w| lower.contains(w))
    {
        InsightType::ContextAwareness
    } else if ["strategy", "approach", "algorithm"]
        .iter()
        .any(|w| lower.contains(w))
    {
        InsightType::StrategyOptimization
    } else if ["pattern", "correlation", "relationship"]
        .iter()
        .any(|w| lower.contains(w))
    {
        InsightType::PatternRecognition
    } else {
        InsightType::General
    }
}

/// Stable id for an insight-derived strategy: `<type>_<hash mod 10000>`.
pub fn insight_strategy_id(analysis: &InsightAnalysis) -> String {
    let mut hasher = DefaultHasher::new();
    analysis.insight.hash(&mut hasher);
    format!(
        "{}_{}",
        analysis.insight_type.as_str(),
        hasher.finish() % 10_000
    )
}

fn strategy_from_insight(analysis: &InsightAnalysis, incident: &Incident) -> Strategy {
    let conditions = match analysis.insight_type {
        InsightType::Temporal | InsightType::StrategyOptimization => {
            vec![format!("error_type == '{}'", incident.error_class)]
        }
        InsightType::ResourceManagement => {
            vec![format!("namespace == '{}'", incident.namespace)]
        }
        _ => Vec::new(),
    };

    Strategy::new(
        &insight_strategy_id(analysis),
        incident.error_class,
        StrategySource::Learned,
    )
    .with_conditions(conditions)
    .with_actions(serde_json::json!({
        "insight": analysis.insight.clone(),
        "type": analysis.insight_type.as_str(),
    }))
    .with_confidence(analysis.insight_type.seeded_confidence())
}

fn strategy_from_modifications(
    strategy_id: &str,
    error_class: ErrorClass,
    mods: &StrategyModifications,
) -> Strategy {
    let mut strategy = Strategy::new(strategy_id, error_class, StrategySource::Learned)
        .with_conditions(mods.conditions.clone())
        .with_confidence(0.5);
    strategy.actions = serde_json::json!({
        "parameters": mods.parameters.clone(),
        "description": mods.description.clone(),
    });
    strategy
}

fn build_episode(input: &LearnInput<'_>) -> Episode {
    let mut lessons: Vec<String> = input
        .reflection
        .map(|r| r.insights_gained.iter().take(LESSON_LIMIT).cloned().collect())
        .unwrap_or_default();
    // The reflector ran but markers extracted nothing worth keeping; the
    // episode still records that reflection happened.
    if lessons.is_empty() && input.reflection.is_some() {
        lessons.push("Reflection completed without extractable insights".to_string());
    }

    let mut episode = Episode::new(
        &input.incident.pod_name,
        &input.incident.namespace,
        input.incident.error_class,
        input.incident.context(),
    );
    episode.actions_taken = serde_json::json!({
        "strategy_id": input.strategy.id.clone(),
        "action": input.strategy.action.clone(),
        "selection_reason": input.strategy.selection_reason.to_string(),
    });
    episode.outcome = EpisodeOutcome {
        success: input.success,
        resolution_time: input.resolution_time,
        status: if input.success {
            "resolved".to_string()
        } else {
            "failed".to_string()
        },
    };
    episode.lessons_learned = lessons;
    episode.confidence_before = input.confidence_before;
    episode.confidence_after = input.confidence_after;
    episode.resolution_time = input.resolution_time;
    episode.reflection_quality = input
        .reflection
        .map(|r| r.meta_quality_score)
        .unwrap_or(0.0);
    episode.insights_generated = input
        .reflection
        .map(|r| r.insights_gained.len() as u32)
        .unwrap_or(0);
    episode
}

/// Normalised slope of the last five trajectory points.
pub fn learning_velocity(trajectory: &[f64]) -> f64 {
    if trajectory.len() < 3 {
        return 0.0;
    }

    let recent: Vec<f64> = trajectory.iter().rev().take(5).rev().cloned().collect();
    let n = recent.len() as f64;
    let sum_x: f64 = (0..recent.len()).map(|x| x as f64).sum();
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_x2: f64 = (0..recent.len()).map(|x| (x * x) as f64).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    (slope + 0.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectionReason;
    use chrono::Utc;
    use tempfile::TempDir;

    fn stores(dir: &TempDir) -> (Arc<StrategyStore>, Arc<EpisodicMemory>) {
        (
            Arc::new(StrategyStore::open(&dir.path().join("strategies.redb")).unwrap()),
            Arc::new(EpisodicMemory::open(&dir.path().join("episodes.redb")).unwrap()),
        )
    }

    fn selected() -> SelectedStrategy {
        SelectedStrategy {
            id: "s1".to_string(),
            action: "learned_strategy".to_string(),
            confidence: 0.6,
            parameters: serde_json::Value::Null,
            conditions: vec![],
            selection_reason: SelectionReason::HighConfidencePersistent,
            usage_count: 3,
            success_rate: 0.66,
            decision_reasoning: String::new(),
        }
    }

    fn reflection(insights: Vec<&str>) -> ReflectionEntry {
        ReflectionEntry {
            trigger_action: String::new(),
            outcome_observed: serde_json::Value::Null,
            reflection_text: String::new(),
            insights_gained: insights.into_iter().map(|s| s.to_string()).collect(),
            structured: None,
            strategy_modifications: Default::default(),
            confidence_level: 0.7,
            meta_quality_score: 0.6,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_actionability_scoring() {
        let strong = analyze_insight(
            "I should increase the timeout parameter when the namespace is production",
        );
        assert!(strong.actionable);
        assert!((strong.actionability_score - 1.0).abs() < 1e-9);

        let weak = analyze_insight("The pod was red");
        assert!(!weak.actionable);
        assert_eq!(weak.actionability_score, 0.0);
    }

    #[test]
    fn test_single_cue_family_is_not_actionable() {
        let only_imperative = analyze_insight("something must happen again eventually");
        assert!(!only_imperative.actionable);
        assert!((only_imperative.actionability_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_insight_classification() {
        assert_eq!(
            analyze_insight("the timing of retries matters").insight_type,
            InsightType::Temporal
        );
        assert_eq!(
            analyze_insight("memory limits were too low").insight_type,
            InsightType::ResourceManagement
        );
        assert_eq!(
            analyze_insight("the namespace affects behaviour").insight_type,
            InsightType::ContextAwareness
        );
        assert_eq!(
            analyze_insight("a different approach works better").insight_type,
            InsightType::StrategyOptimization
        );
        assert_eq!(
            analyze_insight("a correlation between failures emerged").insight_type,
            InsightType::PatternRecognition
        );
        assert_eq!(
            analyze_insight("something happened").insight_type,
            InsightType::General
        );
    }

    #[test]
    fn test_insight_strategy_id_is_stable_and_bounded() {
        let analysis = analyze_insight("I should raise the memory limit");
        let id_a = insight_strategy_id(&analysis);
        let id_b = insight_strategy_id(&analysis);
        assert_eq!(id_a, id_b);
        assert!(id_a.starts_with("resource_management_"));
        let suffix: u64 = id_a.rsplit('_').next().unwrap().parse().unwrap();
        assert!(suffix < 10_000);
    }

    #[test]
    fn test_learning_velocity_flat_trajectory() {
        assert!((learning_velocity(&[0.5, 0.5, 0.5, 0.5, 0.5]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_learning_velocity_rising_beats_falling() {
        let rising = learning_velocity(&[0.2, 0.4, 0.6, 0.8, 1.0]);
        let falling = learning_velocity(&[1.0, 0.8, 0.6, 0.4, 0.2]);
        assert!(rising > 0.5);
        assert!(falling < 0.5);
        assert!((0.0..=1.0).contains(&rising));
        assert!((0.0..=1.0).contains(&falling));
    }

    #[test]
    fn test_learning_velocity_short_history_is_zero() {
        assert_eq!(learning_velocity(&[0.5, 0.6]), 0.0);
    }

    #[tokio::test]
    async fn test_learn_stores_episode_with_lessons() {
        let dir = TempDir::new().unwrap();
        let (strategies, memory) = stores(&dir);
        let learner = Learner::new(Arc::clone(&strategies), Arc::clone(&memory), 3);

        let incident = Incident::new("nginx-test", "default", ErrorClass::ImagePullBackOff);
        let strategy = selected();
        let entry = reflection(vec![
            "I should verify the image tag before retrying the pull strategy",
        ]);
        let mut trajectory = Vec::new();

        let outcome = learner
            .learn(
                &LearnInput {
                    incident: &incident,
                    strategy: &strategy,
                    reflection: Some(&entry),
                    success: true,
                    resolution_time: 12.0,
                    confidence_before: 0.5,
                    confidence_after: 0.62,
                    past_attempts: &[],
                    workflow_id: "wf-test",
                },
                &mut trajectory,
            )
            .await;

        assert_eq!(outcome.actionable_insights, 1);
        assert_eq!(outcome.strategies_created, 1);
        assert_eq!(trajectory.len(), 1);

        let stored = memory
            .similar(ErrorClass::ImagePullBackOff, &incident.context(), 5)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].lessons_learned.is_empty());
        assert!((stored[0].confidence_after - 0.62).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learn_without_reflection_stores_lessonless_episode() {
        let dir = TempDir::new().unwrap();
        let (strategies, memory) = stores(&dir);
        let learner = Learner::new(Arc::clone(&strategies), Arc::clone(&memory), 3);

        let incident = Incident::new("nginx-test", "default", ErrorClass::OomKilled);
        let strategy = selected();
        let mut trajectory = Vec::new();

        learner
            .learn(
                &LearnInput {
                    incident: &incident,
                    strategy: &strategy,
                    reflection: None,
                    success: true,
                    resolution_time: 5.0,
                    confidence_before: 0.5,
                    confidence_after: 0.5,
                    past_attempts: &[],
                    workflow_id: "wf-test",
                },
                &mut trajectory,
            )
            .await;

        let stored = memory.recent(1).await.unwrap();
        assert!(stored[0].lessons_learned.is_empty());
        assert_eq!(stored[0].insights_generated, 0);
    }

    #[tokio::test]
    async fn test_confidence_refresh_uses_recent_attempts() {
        let dir = TempDir::new().unwrap();
        let (strategies, memory) = stores(&dir);
        strategies
            .add(Strategy::new(
                "s1",
                ErrorClass::ImagePullBackOff,
                StrategySource::Learned,
            ))
            .await
            .unwrap();
        let learner = Learner::new(Arc::clone(&strategies), Arc::clone(&memory), 3);

        let attempts: Vec<AttemptRecord> = (0..5)
            .map(|_| AttemptRecord {
                strategy_id: "s1".to_string(),
                action: "learned_strategy".to_string(),
                success: true,
                resolution_time: 10.0,
                timestamp: Utc::now(),
            })
            .collect();

        learner.refresh_confidence(&attempts).await;

        let strategy = strategies.get("s1").await.unwrap().unwrap();
        // 0.5 * 0.7 + 1.0 * 1.0 * 0.3 = 0.65
        assert!((strategy.confidence - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pattern_detection_waits_for_threshold() {
        let dir = TempDir::new().unwrap();
        let (strategies, memory) = stores(&dir);
        let learner = Learner::new(Arc::clone(&strategies), Arc::clone(&memory), 3);

        let incident = Incident::new("nginx-test", "default", ErrorClass::OomKilled);
        let strategy = selected();
        let mut trajectory = Vec::new();

        for i in 0..3 {
            let input = LearnInput {
                incident: &incident,
                strategy: &strategy,
                reflection: None,
                success: true,
                resolution_time: 5.0,
                confidence_before: 0.5,
                confidence_after: 0.5,
                past_attempts: &[],
                workflow_id: "wf-test",
            };
            let outcome = learner.learn(&input, &mut trajectory).await;
            if i < 2 {
                assert_eq!(outcome.patterns_detected, 0, "below threshold at {}", i);
            } else {
                assert!(outcome.patterns_detected > 0, "threshold reached");
            }
        }
    }
}
