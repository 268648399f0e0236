/// Nodes of the remediation loop. One incident traverses the graph on one
/// task; edges are decided by `transition`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AnalyzeError,
    StrategySelection,
    DecideStrategy,
    ExecuteFix,
    ObserveOutcome,
    ReflectOnAction,
    LearnAndEvolve,
    MetaReflect,
    DeepAnalysis,
    HumanEscalation,
    Done,
}

/// Routing outcome a node hands back to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingEvent {
    Proceed,
    Reflect,
    SkipReflection,
    Success,
    Retry,
    MetaReflect,
    Escalate,
    DeepAnalyse,
    RetryWithInsights,
    End,
}

/// Pure transition function over the loop graph. Unknown combinations land
/// in human escalation rather than looping silently.
pub fn transition(state: LoopState, event: RoutingEvent) -> LoopState {
    use LoopState as S;
    use RoutingEvent as E;

    match (state, event) {
        (S::AnalyzeError, E::Proceed) => S::StrategySelection,
        (S::StrategySelection, E::Proceed) => S::DecideStrategy,
        (S::StrategySelection, E::Escalate) => S::HumanEscalation,
        (S::DecideStrategy, E::Proceed) => S::ExecuteFix,
        (S::ExecuteFix, E::Proceed) => S::ObserveOutcome,
        (S::ObserveOutcome, E::Reflect) => S::ReflectOnAction,
        (S::ObserveOutcome, E::SkipReflection) => S::LearnAndEvolve,
        (S::ReflectOnAction, E::Proceed) => S::LearnAndEvolve,
        (S::LearnAndEvolve, E::Success) => S::Done,
        (S::LearnAndEvolve, E::Retry) => S::StrategySelection,
        (S::LearnAndEvolve, E::MetaReflect) => S::MetaReflect,
        (S::LearnAndEvolve, E::Escalate) => S::HumanEscalation,
        (S::LearnAndEvolve, E::DeepAnalyse) => S::DeepAnalysis,
        (S::MetaReflect, E::RetryWithInsights) => S::StrategySelection,
        (S::MetaReflect, E::Escalate) => S::HumanEscalation,
        (S::MetaReflect, E::End) => S::Done,
        (S::DeepAnalysis, E::Proceed) => S::StrategySelection,
        (S::HumanEscalation, E::Proceed) => S::Done,
        _ => S::HumanEscalation,
    }
}

/// Reflection triggers: every failure, every retry, the first attempt, slow
/// resolutions, and a configurable share of successes.
pub fn should_reflect(
    success: bool,
    retry_count: u32,
    reflections_so_far: usize,
    resolution_time: f64,
    success_roll: f64,
    reflect_on_success_probability: f64,
) -> bool {
    if !success {
        return true;
    }
    if retry_count > 0 {
        return true;
    }
    if reflections_so_far == 0 {
        return true;
    }
    if resolution_time > 60.0 {
        return true;
    }
    success_roll < reflect_on_success_probability
}

/// Post-learning routing over outcome, retry budget and self-awareness.
pub fn post_learning_routing(
    success: bool,
    retry_count: u32,
    self_awareness: f64,
    strategy_count: usize,
    known_error_class: bool,
) -> RoutingEvent {
    if success {
        return RoutingEvent::Success;
    }

    if retry_count < 3 {
        if self_awareness > 0.7 && strategy_count > 0 {
            return RoutingEvent::Retry;
        }
        if retry_count < 2 {
            return RoutingEvent::Retry;
        }
    }

    if retry_count >= 2 && self_awareness < 0.6 {
        return RoutingEvent::MetaReflect;
    }

    if !known_error_class {
        return RoutingEvent::DeepAnalyse;
    }

    RoutingEvent::Escalate
}

/// Whether meta-reflection found further retries worthwhile.
pub fn meta_reflection_routing(actionable_insights: bool, retry_count: u32) -> RoutingEvent {
    if actionable_insights {
        RoutingEvent::RetryWithInsights
    } else if retry_count >= 3 {
        RoutingEvent::Escalate
    } else {
        RoutingEvent::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_flow_edges() {
        assert_eq!(
            transition(LoopState::AnalyzeError, RoutingEvent::Proceed),
            LoopState::StrategySelection
        );
        assert_eq!(
            transition(LoopState::StrategySelection, RoutingEvent::Proceed),
            LoopState::DecideStrategy
        );
        assert_eq!(
            transition(LoopState::DecideStrategy, RoutingEvent::Proceed),
            LoopState::ExecuteFix
        );
        assert_eq!(
            transition(LoopState::ExecuteFix, RoutingEvent::Proceed),
            LoopState::ObserveOutcome
        );
    }

    #[test]
    fn test_reflection_fork() {
        assert_eq!(
            transition(LoopState::ObserveOutcome, RoutingEvent::Reflect),
            LoopState::ReflectOnAction
        );
        assert_eq!(
            transition(LoopState::ObserveOutcome, RoutingEvent::SkipReflection),
            LoopState::LearnAndEvolve
        );
        assert_eq!(
            transition(LoopState::ReflectOnAction, RoutingEvent::Proceed),
            LoopState::LearnAndEvolve
        );
    }

    #[test]
    fn test_post_learning_edges() {
        assert_eq!(
            transition(LoopState::LearnAndEvolve, RoutingEvent::Success),
            LoopState::Done
        );
        assert_eq!(
            transition(LoopState::LearnAndEvolve, RoutingEvent::Retry),
            LoopState::StrategySelection
        );
        assert_eq!(
            transition(LoopState::LearnAndEvolve, RoutingEvent::DeepAnalyse),
            LoopState::DeepAnalysis
        );
        assert_eq!(
            transition(LoopState::DeepAnalysis, RoutingEvent::Proceed),
            LoopState::StrategySelection
        );
        assert_eq!(
            transition(LoopState::HumanEscalation, RoutingEvent::Proceed),
            LoopState::Done
        );
    }

    #[test]
    fn test_unknown_edge_escalates() {
        assert_eq!(
            transition(LoopState::AnalyzeError, RoutingEvent::Retry),
            LoopState::HumanEscalation
        );
    }

    #[test]
    fn test_transition_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                transition(LoopState::MetaReflect, RoutingEvent::RetryWithInsights),
                LoopState::StrategySelection
            );
        }
    }

    #[test]
    fn test_should_reflect_on_failure_and_retry() {
        assert!(should_reflect(false, 0, 5, 1.0, 0.99, 0.8));
        assert!(should_reflect(true, 1, 5, 1.0, 0.99, 0.8));
    }

    #[test]
    fn test_should_reflect_first_attempt_and_slow_resolution() {
        assert!(should_reflect(true, 0, 0, 1.0, 0.99, 0.8));
        assert!(should_reflect(true, 0, 5, 61.0, 0.99, 0.8));
    }

    #[test]
    fn test_should_reflect_probabilistic_on_success() {
        assert!(should_reflect(true, 0, 5, 1.0, 0.5, 0.8));
        assert!(!should_reflect(true, 0, 5, 1.0, 0.9, 0.8));
    }

    #[test]
    fn test_post_learning_success_terminates() {
        assert_eq!(
            post_learning_routing(true, 4, 0.1, 0, true),
            RoutingEvent::Success
        );
    }

    #[test]
    fn test_post_learning_early_retries() {
        assert_eq!(
            post_learning_routing(false, 0, 0.5, 0, true),
            RoutingEvent::Retry
        );
        assert_eq!(
            post_learning_routing(false, 1, 0.5, 0, true),
            RoutingEvent::Retry
        );
    }

    #[test]
    fn test_post_learning_aware_agent_keeps_retrying() {
        assert_eq!(
            post_learning_routing(false, 2, 0.8, 3, true),
            RoutingEvent::Retry
        );
    }

    #[test]
    fn test_post_learning_meta_reflection_for_low_awareness() {
        assert_eq!(
            post_learning_routing(false, 2, 0.4, 0, true),
            RoutingEvent::MetaReflect
        );
    }

    #[test]
    fn test_post_learning_unknown_class_deep_analysis() {
        assert_eq!(
            post_learning_routing(false, 3, 0.65, 0, false),
            RoutingEvent::DeepAnalyse
        );
    }

    #[test]
    fn test_post_learning_escalates_when_exhausted() {
        assert_eq!(
            post_learning_routing(false, 3, 0.65, 0, true),
            RoutingEvent::Escalate
        );
    }

    #[test]
    fn test_meta_reflection_routing() {
        assert_eq!(
            meta_reflection_routing(true, 1),
            RoutingEvent::RetryWithInsights
        );
        assert_eq!(meta_reflection_routing(false, 3), RoutingEvent::Escalate);
        assert_eq!(meta_reflection_routing(false, 1), RoutingEvent::End);
    }
}
