use super::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recorded application of a strategy; drives dynamic confidence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub strategy_id: String,
    pub success: bool,
    pub resolution_time: Option<f64>,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub context: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub period_days: u32,
    pub overall: OverallPerformance,
    pub top_strategies: Vec<StrategyPerformance>,
    pub daily_trends: Vec<DailyTrend>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OverallPerformance {
    pub success_rate: f64,
    pub avg_resolution_time: f64,
    pub total_processed: u64,
    pub strategies_used: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy_id: String,
    pub success_rate: f64,
    pub usage_count: u64,
    pub avg_resolution_time: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: String,
    pub success_rate: f64,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyRanking {
    pub rank: usize,
    pub strategy_id: String,
    pub error_class: Option<ErrorClass>,
    pub success_rate: f64,
    pub avg_resolution_time: f64,
    pub confidence_score: f64,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub trend: PerformanceTrend,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Declining,
    Stable,
}

impl PerformanceTrend {
    /// Compare the last three samples against the three before them; a 0.1
    /// shift in success rate flips the label.
    pub fn from_recent(recent_successes: &[bool]) -> Self {
        if recent_successes.len() < 6 {
            return PerformanceTrend::Stable;
        }
        let rate = |slice: &[bool]| {
            slice.iter().filter(|s| **s).count() as f64 / slice.len() as f64
        };
        let newer = rate(&recent_successes[..3]);
        let older = rate(&recent_successes[3..6]);

        if newer > older + 0.1 {
            PerformanceTrend::Improving
        } else if newer < older - 0.1 {
            PerformanceTrend::Declining
        } else {
            PerformanceTrend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_improving() {
        // Newest first: three wins after three losses.
        let samples = [true, true, true, false, false, false];
        assert_eq!(
            PerformanceTrend::from_recent(&samples),
            PerformanceTrend::Improving
        );
    }

    #[test]
    fn test_trend_declining() {
        let samples = [false, false, false, true, true, true];
        assert_eq!(
            PerformanceTrend::from_recent(&samples),
            PerformanceTrend::Declining
        );
    }

    #[test]
    fn test_trend_stable_on_short_history() {
        assert_eq!(
            PerformanceTrend::from_recent(&[true, false]),
            PerformanceTrend::Stable
        );
    }
}
