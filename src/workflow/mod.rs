mod routing;

pub use routing::{
    meta_reflection_routing, post_learning_routing, should_reflect, transition, LoopState,
    RoutingEvent,
};

use crate::clients::{ClusterDriver, LlmClient};
use crate::config::AppConfig;
use crate::engine::{
    self_awareness_level, LearnInput, Learner, Observer, ReflectionContext, Reflector,
};
use crate::error::{KubemendError, Result};
use crate::executor::SafeExecutor;
use crate::models::{
    AttemptRecord, ClusterSnapshot, Episode, EpisodeOutcome, ErrorClass, EvolutionEntry,
    ExecutionPlan, ExecutionReport, Incident, LearningProgression, MemoryStatistics,
    MetaReflection, Observation, PerformanceInsights, ReflectionEntry, SelectedStrategy,
    SelectionReason, SnapshotAnalysis, Strategy, StrategyRanking, StrategySource,
};
use crate::stores::{
    EpisodicMemory, OutcomeUpdate, PerformanceTracker, StrategyStatistics, StrategyStore,
};
use crate::synth::PlanSynthesiser;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Final answer for one incident.
#[derive(Clone, Debug, Serialize)]
pub struct RemediationResult {
    pub workflow_id: String,
    pub success: bool,
    pub pod_name: String,
    pub final_strategy: Option<SelectedStrategy>,
    pub resolution_time_seconds: f64,
    pub requires_human_intervention: bool,
    pub escalation: Option<EscalationContext>,
    pub summary: ReflexionSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReflexionSummary {
    pub reflections_performed: usize,
    pub strategies_learned: usize,
    pub self_awareness_level: f64,
    pub learning_velocity: f64,
    pub used_real_cluster_data: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct EscalationContext {
    pub reason: String,
    pub attempts_made: u32,
    pub strategies_tried: Vec<String>,
    pub last_error: Option<String>,
    pub total_reflections: usize,
    pub self_awareness_level: f64,
    pub learning_velocity: f64,
}

/// Execution feedback reported by an external executor.
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutionFeedback {
    pub workflow_id: String,
    pub pod_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub error_class: String,
    pub strategy_id: String,
    pub success: bool,
    #[serde(default)]
    pub partial_success: bool,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub total_commands: u32,
    #[serde(default)]
    pub executed_commands: Vec<String>,
    pub timestamp: Option<chrono::DateTime<Utc>>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Clone, Debug, Serialize)]
pub struct FeedbackResult {
    pub feedback_processed: bool,
    pub reflexion_updated: bool,
    pub strategy_confidence_updated: bool,
    pub learning_summary: LearningSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct LearningSummary {
    pub new_confidence: f64,
    pub total_episodes: u64,
    pub total_strategies: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemStatistics {
    pub strategies: StrategyStatistics,
    pub memory: MemoryStatistics,
}

/// Everything one incident accumulates while traversing the loop. Handed
/// along by the driver; nothing here outlives the incident.
struct IncidentContext {
    incident: Incident,
    workflow_id: String,
    analysis: SnapshotAnalysis,
    retry_count: u32,
    entered_selection: bool,
    success: bool,
    current_strategy: Option<SelectedStrategy>,
    execution_report: Option<ExecutionReport>,
    observation: Observation,
    current_reflection: Option<ReflectionEntry>,
    reflection_history: Vec<ReflectionEntry>,
    lessons: Vec<String>,
    past_attempts: Vec<AttemptRecord>,
    improvement_trajectory: Vec<f64>,
    self_awareness: f64,
    learning_velocity: f64,
    confidence_before: f64,
    confidence_after: f64,
    strategies_learned: usize,
    resolution_time: f64,
    meta_reflection: Option<MetaReflection>,
    escalation: Option<EscalationContext>,
    requires_human: bool,
    started: Instant,
}

impl IncidentContext {
    fn new(incident: Incident, workflow_id: String, analysis: SnapshotAnalysis) -> Self {
        Self {
            incident,
            workflow_id,
            analysis,
            retry_count: 0,
            entered_selection: false,
            success: false,
            current_strategy: None,
            execution_report: None,
            observation: Observation::default(),
            current_reflection: None,
            reflection_history: Vec::new(),
            lessons: Vec::new(),
            past_attempts: Vec::new(),
            improvement_trajectory: Vec::new(),
            self_awareness: 0.5,
            learning_velocity: 0.0,
            confidence_before: 0.5,
            confidence_after: 0.5,
            strategies_learned: 0,
            resolution_time: 0.0,
            meta_reflection: None,
            escalation: None,
            requires_human: false,
            started: Instant::now(),
        }
    }

    fn summary(&self) -> ReflexionSummary {
        ReflexionSummary {
            reflections_performed: self.reflection_history.len(),
            strategies_learned: self.strategies_learned,
            self_awareness_level: self.self_awareness,
            learning_velocity: self.learning_velocity,
            used_real_cluster_data: self.analysis.used_real_cluster_data,
        }
    }
}

/// The reflexive remediation loop: strategy selection over persistent
/// knowledge, LLM plan synthesis, safe execution, observation, reflection
/// and learning, stitched together by an explicit state machine.
pub struct ReflexiveWorkflow {
    config: AppConfig,
    strategy_store: Arc<StrategyStore>,
    memory: Arc<EpisodicMemory>,
    tracker: Arc<PerformanceTracker>,
    synthesiser: PlanSynthesiser,
    executor: SafeExecutor,
    observer: Observer,
    reflector: Reflector,
    learner: Learner,
}

impl ReflexiveWorkflow {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        driver: Arc<dyn ClusterDriver>,
    ) -> Result<Self> {
        let strategy_store = Arc::new(StrategyStore::open(std::path::Path::new(
            &config.stores.strategy_db_path,
        ))?);
        let memory = Arc::new(EpisodicMemory::open(std::path::Path::new(
            &config.stores.episode_db_path,
        ))?);
        let tracker = Arc::new(PerformanceTracker::open(std::path::Path::new(
            &config.stores.performance_db_path,
        ))?);

        let command_timeout = Duration::from_secs(config.executor.command_timeout_seconds);
        let synthesiser = PlanSynthesiser::new(
            Arc::clone(&llm),
            Arc::clone(&driver),
            Arc::clone(&memory),
            config.workflow.mode,
            command_timeout,
        );
        let executor = SafeExecutor::new(Arc::clone(&driver), config.executor.clone());
        let observer = Observer::new(Arc::clone(&driver), command_timeout);
        let reflector = Reflector::new(Arc::clone(&llm), config.workflow.reflection_depth);
        let learner = Learner::new(
            Arc::clone(&strategy_store),
            Arc::clone(&memory),
            config.workflow.pattern_detection_threshold,
        );

        Ok(Self {
            config,
            strategy_store,
            memory,
            tracker,
            synthesiser,
            executor,
            observer,
            reflector,
            learner,
        })
    }

    /// Run one incident through the loop to a terminal state.
    pub async fn process(
        &self,
        pod_name: &str,
        namespace: &str,
        error_class: &str,
        snapshot: Option<ClusterSnapshot>,
        thread_id: Option<&str>,
    ) -> Result<RemediationResult> {
        let class = ErrorClass::parse(error_class);
        let mut incident = Incident::new(pod_name, namespace, class);
        let analysis = match snapshot {
            Some(snapshot) => {
                let analysis = SnapshotAnalysis::from_snapshot(&snapshot);
                incident = incident.with_snapshot(snapshot);
                analysis
            }
            None => SnapshotAnalysis::synthetic(class),
        };

        let workflow_id = thread_id.map(|t| t.to_string()).unwrap_or_else(|| {
            format!("reflexive_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), pod_name)
        });

        info!(
            "Processing incident {}: {}/{} ({})",
            workflow_id, namespace, pod_name, class
        );

        let mut ctx = IncidentContext::new(incident, workflow_id, analysis);
        let mut state = LoopState::AnalyzeError;
        let mut transitions: u32 = 0;

        while state != LoopState::Done {
            transitions += 1;
            if transitions > self.config.workflow.recursion_limit
                && state != LoopState::HumanEscalation
            {
                warn!("Recursion limit reached for {}", ctx.workflow_id);
                self.build_escalation(&mut ctx, "recursion_limit_reached");
                state = LoopState::HumanEscalation;
                continue;
            }

            let event = match state {
                LoopState::AnalyzeError => self.analyze_error(&mut ctx),
                LoopState::StrategySelection => self.strategy_selection(&mut ctx).await,
                LoopState::DecideStrategy => self.decide_strategy(&mut ctx),
                LoopState::ExecuteFix => self.execute_fix(&mut ctx).await,
                LoopState::ObserveOutcome => self.observe_outcome(&mut ctx).await,
                LoopState::ReflectOnAction => self.reflect_on_action(&mut ctx).await,
                LoopState::LearnAndEvolve => self.learn_and_evolve(&mut ctx).await,
                LoopState::MetaReflect => self.meta_reflect(&mut ctx),
                LoopState::DeepAnalysis => self.deep_analysis(&mut ctx),
                LoopState::HumanEscalation => self.human_escalation(&mut ctx),
                LoopState::Done => break,
            };
            state = transition(state, event);
        }

        let result = RemediationResult {
            workflow_id: ctx.workflow_id.clone(),
            success: ctx.success,
            pod_name: ctx.incident.pod_name.clone(),
            final_strategy: ctx.current_strategy.clone(),
            resolution_time_seconds: ctx.resolution_time,
            requires_human_intervention: ctx.requires_human,
            escalation: ctx.escalation.clone(),
            summary: ctx.summary(),
        };

        info!(
            "Incident {} finished: success={}, attempts={}, escalated={}",
            result.workflow_id,
            result.success,
            ctx.retry_count + 1,
            result.requires_human_intervention
        );
        Ok(result)
    }

    // === Loop nodes ===

    fn analyze_error(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        if ctx.analysis.used_real_cluster_data {
            info!(
                "Analysis using real cluster data (confidence {:.2}, {} patterns)",
                ctx.analysis.confidence,
                ctx.analysis.error_patterns.len()
            );
        } else {
            debug!("Synthetic analysis for {}", ctx.incident.error_class);
        }
        RoutingEvent::Proceed
    }

    async fn strategy_selection(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        // Canonical retry increment point: every re-entry is a retry.
        if ctx.entered_selection {
            ctx.retry_count += 1;
        }
        ctx.entered_selection = true;

        if ctx.retry_count >= self.config.workflow.hard_retry_cap {
            warn!(
                "Retry cap reached ({}) for {}",
                ctx.retry_count, ctx.workflow_id
            );
            self.build_escalation(ctx, "retry_cap_reached");
            return RoutingEvent::Escalate;
        }

        let context = ctx.incident.context();

        // Lessons from similar episodes feed plan synthesis.
        ctx.lessons = match self
            .memory
            .similar(ctx.incident.error_class, &context, 5)
            .await
        {
            Ok(episodes) => episodes
                .into_iter()
                .flat_map(|e| e.lessons_learned)
                .collect(),
            Err(e) => {
                warn!("Episodic memory unavailable during selection: {}", e);
                Vec::new()
            }
        };
        if !ctx.lessons.is_empty() {
            info!(
                "Retrieved {} lessons for {}",
                ctx.lessons.len(),
                ctx.incident.error_class
            );
        }

        let persistent = match self
            .strategy_store
            .find_for(ctx.incident.error_class, &context)
            .await
        {
            Ok(strategies) => strategies,
            Err(e) => {
                warn!("Strategy store unavailable, continuing without: {}", e);
                Vec::new()
            }
        };

        let selected = self.pick_strategy(ctx, persistent);
        ctx.confidence_before = selected.confidence;
        ctx.confidence_after = selected.confidence;
        info!(
            "Selected strategy {} ({}) at confidence {:.2}",
            selected.id, selected.selection_reason, selected.confidence
        );
        ctx.current_strategy = Some(selected);
        RoutingEvent::Proceed
    }

    fn pick_strategy(
        &self,
        ctx: &IncidentContext,
        persistent: Vec<Strategy>,
    ) -> SelectedStrategy {
        if !persistent.is_empty() {
            let roll: f64 = rand::random();
            let prefer = roll < self.config.workflow.prefer_persistent_probability;
            debug!(
                "Persistent strategies available ({}), roll {:.3}, prefer={}",
                persistent.len(),
                roll,
                prefer
            );

            let best = &persistent[0];
            let reason = if prefer {
                SelectionReason::HighConfidencePersistent
            } else {
                SelectionReason::HighestConfidenceLearned
            };
            return SelectedStrategy {
                id: best.id.clone(),
                action: "learned_strategy".to_string(),
                confidence: best.confidence,
                parameters: best.actions.clone(),
                conditions: best.conditions.clone(),
                selection_reason: reason,
                usage_count: best.usage_count,
                success_rate: best.success_rate,
                decision_reasoning: format!(
                    "Selected learned strategy '{}' with {:.2} confidence based on {} previous uses (success rate: {:.0}%).",
                    best.id,
                    best.confidence,
                    best.usage_count,
                    best.success_rate * 100.0
                ),
            };
        }

        default_strategy(ctx.incident.error_class)
    }

    fn decide_strategy(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        if let Some(strategy) = &mut ctx.current_strategy {
            strategy.decision_reasoning = decision_reasoning(strategy, ctx.incident.error_class);
            debug!("Decision reasoning: {}", strategy.decision_reasoning);
        }
        RoutingEvent::Proceed
    }

    async fn execute_fix(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        let Some(strategy) = ctx.current_strategy.clone() else {
            error!("Execute reached without a strategy; escalating");
            self.build_escalation(ctx, "no_strategy_selected");
            ctx.success = false;
            return RoutingEvent::Escalate;
        };

        let execution_start = Instant::now();
        let report = match self
            .synthesiser
            .synthesise(&ctx.incident, &strategy, &ctx.lessons)
            .await
        {
            Ok(ExecutionPlan::Command(plan)) => self.executor.execute_command_plan(&plan).await,
            Ok(ExecutionPlan::Manifest(plan)) => self.executor.execute_manifest_plan(&plan).await,
            Err(e) => Err(e),
        };

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                // Component errors become a failed attempt, never a crash.
                error!("Fix execution failed: {}", e);
                ExecutionReport::failed(&e.to_string())
            }
        };

        let execution_time = execution_start.elapsed().as_secs_f64();
        ctx.success = report.overall_success;
        ctx.resolution_time = ctx.started.elapsed().as_secs_f64();

        info!(
            "Execution for {}: {} ({})",
            ctx.incident.pod_name,
            if ctx.success { "success" } else { "failure" },
            report.summary()
        );

        // Performance is tracked for every strategy; only store-backed
        // strategies feed the strategy store.
        match self
            .tracker
            .record(
                &strategy.id,
                ctx.success,
                Some(execution_time),
                ctx.confidence_before,
                ctx.incident.context(),
            )
            .await
        {
            Ok(new_confidence) => {
                ctx.confidence_after = new_confidence;
                if let Some(current) = &mut ctx.current_strategy {
                    current.confidence = new_confidence;
                }

                if strategy.is_persistent() {
                    let update = OutcomeUpdate {
                        strategy_id: strategy.id.clone(),
                        success: ctx.success,
                        execution_time,
                        pod_name: ctx.incident.pod_name.clone(),
                        namespace: ctx.incident.namespace.clone(),
                        feedback: Some(report.summary()),
                        new_confidence,
                    };
                    if let Err(e) = self.strategy_store.record_outcome(update).await {
                        warn!("Failed to record outcome for {}: {}", strategy.id, e);
                    }
                }
            }
            Err(e) => warn!("Performance tracker unavailable: {}", e),
        }

        ctx.execution_report = Some(report);
        RoutingEvent::Proceed
    }

    async fn observe_outcome(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        let report = ctx
            .execution_report
            .clone()
            .unwrap_or_else(|| ExecutionReport::failed("no execution report"));
        let action = ctx
            .current_strategy
            .as_ref()
            .map(|s| s.action.clone())
            .unwrap_or_default();

        ctx.observation = self
            .observer
            .observe(
                &ctx.incident,
                &report,
                ctx.resolution_time,
                ctx.retry_count,
                &ctx.past_attempts,
                &action,
            )
            .await;

        let roll: f64 = rand::random();
        if should_reflect(
            ctx.success,
            ctx.retry_count,
            ctx.reflection_history.len(),
            ctx.resolution_time,
            roll,
            self.config.workflow.reflect_on_success_probability,
        ) {
            RoutingEvent::Reflect
        } else {
            debug!("Skipping reflection for {}", ctx.incident.pod_name);
            RoutingEvent::SkipReflection
        }
    }

    async fn reflect_on_action(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        let Some(strategy) = ctx.current_strategy.clone() else {
            return RoutingEvent::Proceed;
        };

        let observation =
            serde_json::to_value(&ctx.observation).unwrap_or(serde_json::Value::Null);
        let recent_attempts: Vec<&AttemptRecord> =
            ctx.past_attempts.iter().rev().take(3).collect();
        let past = serde_json::to_value(&recent_attempts).unwrap_or(serde_json::Value::Null);
        let strategy_count = self
            .strategy_store
            .statistics()
            .await
            .map(|s| s.total_strategies as usize)
            .unwrap_or(0);

        let reflection_ctx = ReflectionContext {
            pod_name: &ctx.incident.pod_name,
            namespace: &ctx.incident.namespace,
            error_class: ctx.incident.error_class,
            retry_count: ctx.retry_count,
            strategy: &strategy,
            observation,
            past_attempts: past,
            strategy_count,
            performance_trend: trend_label(&ctx.improvement_trajectory),
        };

        let (entry, llm_failed) = self.reflector.reflect(&reflection_ctx).await;

        ctx.self_awareness = if llm_failed {
            (ctx.self_awareness - 0.1).max(0.0)
        } else {
            self_awareness_level(&entry, &ctx.reflection_history)
        };
        ctx.current_reflection = Some(entry.clone());
        ctx.reflection_history.push(entry);

        debug!(
            "Self-awareness for {} now {:.2}",
            ctx.incident.pod_name, ctx.self_awareness
        );
        RoutingEvent::Proceed
    }

    async fn learn_and_evolve(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        let Some(strategy) = ctx.current_strategy.clone() else {
            return RoutingEvent::Escalate;
        };

        let input = LearnInput {
            incident: &ctx.incident,
            strategy: &strategy,
            reflection: ctx.current_reflection.as_ref(),
            success: ctx.success,
            resolution_time: ctx.resolution_time,
            confidence_before: ctx.confidence_before,
            confidence_after: ctx.confidence_after,
            past_attempts: &ctx.past_attempts,
            workflow_id: &ctx.workflow_id,
        };

        let outcome = self.learner.learn(&input, &mut ctx.improvement_trajectory).await;
        ctx.strategies_learned += outcome.strategies_created + outcome.strategies_evolved;
        ctx.learning_velocity = outcome.learning_velocity;

        ctx.past_attempts.push(AttemptRecord {
            strategy_id: strategy.id.clone(),
            action: strategy.action.clone(),
            success: ctx.success,
            resolution_time: ctx.resolution_time,
            timestamp: Utc::now(),
        });
        ctx.current_reflection = None;

        let strategy_count = self
            .strategy_store
            .statistics()
            .await
            .map(|s| s.total_strategies as usize)
            .unwrap_or(0);

        post_learning_routing(
            ctx.success,
            ctx.retry_count,
            ctx.self_awareness,
            strategy_count,
            ctx.incident.error_class.is_known(),
        )
    }

    fn meta_reflect(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        let recent: Vec<&ReflectionEntry> = ctx.reflection_history.iter().rev().take(3).collect();

        let meta = if recent.len() >= 2 {
            let avg_quality = recent.iter().map(|r| r.meta_quality_score).sum::<f64>()
                / recent.len() as f64;
            let insights_per = recent
                .iter()
                .map(|r| r.insights_gained.len() as f64)
                .sum::<f64>()
                / recent.len() as f64;
            // recent is newest-first.
            let trend = if recent.len() > 1
                && recent[0].meta_quality_score > recent[recent.len() - 1].meta_quality_score
            {
                "improving"
            } else {
                "stable"
            };
            MetaReflection {
                quality_trend: trend.to_string(),
                average_quality: avg_quality,
                insights_per_reflection: insights_per,
                actionable_insights: avg_quality > 0.6,
                meta_insight: if avg_quality < 0.5 {
                    "Reflection quality needs improvement".to_string()
                } else {
                    "Reflection process is effective".to_string()
                },
            }
        } else {
            MetaReflection {
                quality_trend: "unknown".to_string(),
                average_quality: 0.0,
                insights_per_reflection: 0.0,
                actionable_insights: false,
                meta_insight: "Insufficient reflection history for meta-analysis".to_string(),
            }
        };

        info!(
            "Meta-reflection for {}: {} (avg quality {:.2})",
            ctx.incident.pod_name, meta.meta_insight, meta.average_quality
        );
        let actionable = meta.actionable_insights;
        ctx.meta_reflection = Some(meta);

        meta_reflection_routing(actionable, ctx.retry_count)
    }

    fn deep_analysis(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        info!(
            "Deep analysis pass for unknown error class on {}",
            ctx.incident.pod_name
        );
        ctx.analysis
            .error_patterns
            .push("deep_analysis_performed".to_string());
        RoutingEvent::Proceed
    }

    fn human_escalation(&self, ctx: &mut IncidentContext) -> RoutingEvent {
        if ctx.escalation.is_none() {
            self.build_escalation(ctx, "automated_resolution_failed");
        }
        ctx.requires_human = true;
        RoutingEvent::Proceed
    }

    fn build_escalation(&self, ctx: &mut IncidentContext, reason: &str) {
        let last_error = ctx.execution_report.as_ref().and_then(|report| {
            report
                .errors
                .first()
                .map(|e| format!("{}: {}", e.command, e.stderr))
        });

        ctx.requires_human = true;
        ctx.escalation = Some(EscalationContext {
            reason: reason.to_string(),
            attempts_made: ctx.past_attempts.len() as u32,
            strategies_tried: ctx
                .past_attempts
                .iter()
                .map(|a| a.strategy_id.clone())
                .collect(),
            last_error,
            total_reflections: ctx.reflection_history.len(),
            self_awareness_level: ctx.self_awareness,
            learning_velocity: ctx.learning_velocity,
        });
    }

    // === Execution feedback ingress ===

    /// Record an externally executed fix: one performance sample and one
    /// feedback-derived episode.
    pub async fn feedback(&self, feedback: ExecutionFeedback) -> Result<FeedbackResult> {
        let class = ErrorClass::parse(&feedback.error_class);
        info!(
            "Processing execution feedback for {} ({}): success={}",
            feedback.pod_name, feedback.workflow_id, feedback.success
        );

        let mut context = std::collections::HashMap::new();
        context.insert("pod_name".to_string(), feedback.pod_name.clone());
        context.insert("namespace".to_string(), feedback.namespace.clone());
        context.insert("error_type".to_string(), class.to_string());

        let new_confidence = self
            .tracker
            .record(
                &feedback.strategy_id,
                feedback.success,
                None,
                0.5,
                context.clone(),
            )
            .await?;

        let strategy_confidence_updated = match self.strategy_store.get(&feedback.strategy_id).await
        {
            Ok(Some(_)) => {
                let update = OutcomeUpdate {
                    strategy_id: feedback.strategy_id.clone(),
                    success: feedback.success,
                    execution_time: 0.0,
                    pod_name: feedback.pod_name.clone(),
                    namespace: feedback.namespace.clone(),
                    feedback: Some(format!(
                        "External execution: {}/{} commands successful",
                        feedback.success_count, feedback.total_commands
                    )),
                    new_confidence,
                };
                self.strategy_store.record_outcome(update).await.is_ok()
            }
            _ => false,
        };

        let mut episode = Episode::new(&feedback.pod_name, &feedback.namespace, class, context);
        episode.actions_taken = serde_json::json!({
            "strategy_id": feedback.strategy_id,
            "executed_commands": feedback.executed_commands,
            "source": "execution_feedback",
        });
        episode.outcome = EpisodeOutcome {
            success: feedback.success,
            resolution_time: 0.0,
            status: if feedback.success {
                "resolved".to_string()
            } else if feedback.partial_success {
                "partial".to_string()
            } else {
                "failed".to_string()
            },
        };
        episode.confidence_after = new_confidence;
        self.memory.store(episode).await?;

        let strategies = self.strategy_store.statistics().await?;
        let memory_stats = self.memory.statistics().await?;

        Ok(FeedbackResult {
            feedback_processed: true,
            reflexion_updated: true,
            strategy_confidence_updated,
            learning_summary: LearningSummary {
                new_confidence,
                total_episodes: memory_stats.total_episodes,
                total_strategies: strategies.total_strategies,
            },
        })
    }

    // === Inspection ===

    pub async fn list_strategies(&self, error_class: Option<ErrorClass>) -> Result<Vec<Strategy>> {
        let all = self.strategy_store.all().await?;
        Ok(match error_class {
            Some(class) => all.into_iter().filter(|s| s.error_class == class).collect(),
            None => all,
        })
    }

    pub async fn list_episodes(
        &self,
        error_class: Option<ErrorClass>,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        match error_class {
            Some(class) => {
                self.memory
                    .similar(class, &std::collections::HashMap::new(), limit)
                    .await
            }
            None => self.memory.recent(limit).await,
        }
    }

    pub async fn performance_insights(&self, days: u32) -> Result<PerformanceInsights> {
        self.tracker.insights(days).await
    }

    pub async fn strategy_ranking(
        &self,
        error_class: Option<ErrorClass>,
    ) -> Result<Vec<StrategyRanking>> {
        self.tracker.ranking(error_class).await
    }

    pub async fn learning_progression(&self, days: u32) -> Result<LearningProgression> {
        self.memory.progression(days).await
    }

    pub async fn strategy_evolution(&self, strategy_id: &str) -> Result<Vec<EvolutionEntry>> {
        self.strategy_store.evolution_for(strategy_id).await
    }

    pub async fn statistics(&self) -> Result<SystemStatistics> {
        Ok(SystemStatistics {
            strategies: self.strategy_store.statistics().await?,
            memory: self.memory.statistics().await?,
        })
    }

    // === Resets ===

    pub async fn clear_strategies(&self) -> Result<()> {
        self.strategy_store.clear_all().await
    }

    pub async fn clear_episodes(&self) -> Result<()> {
        self.memory.clear_all().await
    }

    pub async fn clear_performance(&self) -> Result<()> {
        self.tracker.clear_all().await
    }

    /// Soft reset: truncate every table in every store.
    pub async fn reset_all(&self) -> Result<()> {
        self.strategy_store.clear_all().await?;
        self.memory.clear_all().await?;
        self.tracker.clear_all().await?;
        warn!("All stores reset");
        Ok(())
    }

    /// Hard reset: delete the backing files and re-initialise.
    pub async fn nuclear_reset(&self) -> Result<()> {
        self.strategy_store.nuclear_reset().await?;
        self.memory.nuclear_reset().await?;
        self.tracker.nuclear_reset().await?;
        warn!("Nuclear reset complete");
        Ok(())
    }

    /// Install the built-in seed strategies so a fresh deployment starts
    /// with non-default behaviour. Existing ids are left untouched.
    pub async fn install_seed_strategies(&self) -> Result<usize> {
        let mut installed = 0;
        for strategy in seed_strategies() {
            match self.strategy_store.add(strategy).await {
                Ok(()) => installed += 1,
                Err(KubemendError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if installed > 0 {
            info!("Installed {} seed strategies", installed);
        }
        Ok(installed)
    }
}

fn trend_label(trajectory: &[f64]) -> &'static str {
    if trajectory.len() < 2 {
        return "insufficient_data";
    }
    let last = trajectory[trajectory.len() - 1];
    let previous = trajectory[trajectory.len() - 2];
    if last > previous {
        "improving"
    } else if last < previous {
        "declining"
    } else {
        "stable"
    }
}

fn decision_reasoning(strategy: &SelectedStrategy, error_class: ErrorClass) -> String {
    let base = match strategy.selection_reason {
        SelectionReason::HighConfidencePersistent | SelectionReason::HighestConfidenceLearned => {
            format!(
                "Selected strategy based on learned knowledge with {:.2} confidence from {} previous uses.",
                strategy.confidence, strategy.usage_count
            )
        }
        SelectionReason::DefaultFallback => format!(
            "Using default strategy for {} as no learned strategies are available yet.",
            error_class
        ),
        SelectionReason::NoStrategyAvailable => {
            "No specific strategy available - requires human investigation.".to_string()
        }
    };

    if strategy.confidence > 0.0 && strategy.usage_count > 0 {
        format!(
            "{} This strategy has {:.0}% confidence from {} previous applications.",
            base,
            strategy.confidence * 100.0,
            strategy.usage_count
        )
    } else {
        base
    }
}

fn default_strategy(error_class: ErrorClass) -> SelectedStrategy {
    let (id, action, confidence, parameters) = match error_class {
        ErrorClass::ImagePullBackOff | ErrorClass::ErrImagePull => (
            "default_image_fix",
            "image_tag_replacement",
            0.8,
            serde_json::json!({"new_tag": "latest"}),
        ),
        ErrorClass::CrashLoopBackOff => (
            "default_crash_fix",
            "resource_adjustment",
            0.7,
            serde_json::json!({"memory_increase": "256Mi"}),
        ),
        ErrorClass::OomKilled => (
            "default_oom_fix",
            "memory_limit_increase",
            0.75,
            serde_json::json!({"memory_factor": 2}),
        ),
        ErrorClass::CreateContainerConfigError => (
            "default_config_fix",
            "config_reference_repair",
            0.6,
            serde_json::json!({}),
        ),
        ErrorClass::Other => {
            return SelectedStrategy {
                id: "generic_default".to_string(),
                action: "manual_investigation_required".to_string(),
                confidence: 0.3,
                parameters: serde_json::Value::Null,
                conditions: Vec::new(),
                selection_reason: SelectionReason::NoStrategyAvailable,
                usage_count: 0,
                success_rate: 0.0,
                decision_reasoning: String::new(),
            }
        }
    };

    SelectedStrategy {
        id: id.to_string(),
        action: action.to_string(),
        confidence,
        parameters,
        conditions: Vec::new(),
        selection_reason: SelectionReason::DefaultFallback,
        usage_count: 0,
        success_rate: 0.0,
        decision_reasoning: String::new(),
    }
}

fn seed_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new(
            "seed_image_tag_replacement",
            ErrorClass::ImagePullBackOff,
            StrategySource::Seed,
        )
        .with_actions(serde_json::json!({
            "action": "replace_image",
            "image": "nginx:latest",
        }))
        .with_confidence(0.8),
        Strategy::new(
            "seed_memory_limit_increase",
            ErrorClass::OomKilled,
            StrategySource::Seed,
        )
        .with_actions(serde_json::json!({
            "action": "raise_memory_limit",
            "factor": 2,
        }))
        .with_confidence(0.75),
        Strategy::new(
            "seed_crash_resource_adjustment",
            ErrorClass::CrashLoopBackOff,
            StrategySource::Seed,
        )
        .with_actions(serde_json::json!({
            "action": "adjust_resources",
            "memory": "512Mi",
        }))
        .with_confidence(0.7),
    ]
}
