mod learner;
mod observer;
mod reflector;

pub use learner::{
    analyze_insight, analyze_insights, insight_strategy_id, learning_velocity, InsightAnalysis,
    InsightType, LearnInput, Learner, LearningOutcome,
};
pub use observer::{improvement_trajectory, Observer};
pub use reflector::{self_awareness_level, ReflectionContext, Reflector};
