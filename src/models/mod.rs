mod episode;
mod incident;
mod observation;
mod performance;
mod plan;
mod reflection;
mod strategy;

pub use episode::{
    AssociationType, DailyProgression, Episode, EpisodeOutcome, ErrorClassStats,
    LearningProgression, MemoryAssociation, MemoryPattern, MemoryStatistics, PatternType,
};
pub use incident::{
    AttemptRecord, ClusterSnapshot, ContainerStatus, ErrorClass, Incident, PodEvent,
    SnapshotAnalysis,
};
pub use observation::{
    AnomalyReport, ComparativeAnalysis, ContextFactors, NamespaceCriticality, Observation,
    PerformanceAxis, SuccessMetrics,
};
pub use performance::{
    DailyTrend, OverallPerformance, PerformanceInsights, PerformanceSample, PerformanceTrend,
    StrategyPerformance, StrategyRanking,
};
pub use plan::{
    CommandFailure, CommandPlan, CommandResult, ExecutionPlan, ExecutionReport, ManifestPlan,
    PhaseResult, PlanPhase,
};
pub use reflection::{
    MetaReflection, ReflectionEntry, StructuredReflection, REFLECTION_BASE_TEMPLATE,
    REFLECTION_SYSTEM_PROMPT,
};
pub use strategy::{
    ChangeType, EvolutionEntry, SelectedStrategy, SelectionReason, Strategy,
    StrategyModifications, StrategySource, UsageRecord,
};
