use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Multi-axis outcome measurement produced after every execution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Observation {
    pub success_metrics: Option<SuccessMetrics>,
    pub performance: Option<PerformanceAxis>,
    pub context_factors: Option<ContextFactors>,
    pub comparative: Option<ComparativeAnalysis>,
    pub anomalies: Option<AnomalyReport>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Observation {
    /// Fraction of the five axes that produced data; recorded for
    /// meta-learning.
    pub fn quality(&self) -> f64 {
        let mut score: f64 = 0.0;
        if self.success_metrics.is_some() {
            score += 0.3;
        }
        if self.performance.is_some() {
            score += 0.2;
        }
        if self.context_factors.is_some() {
            score += 0.2;
        }
        if self.comparative.is_some() {
            score += 0.2;
        }
        if self.anomalies.is_some() {
            score += 0.1;
        }
        score
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessMetrics {
    pub pod_phase: String,
    pub container_ready: bool,
    pub restart_count: u32,
    pub error_resolved: bool,
    pub stability_score: f64,
}

impl SuccessMetrics {
    pub fn stability_score(pod_phase: &str, restart_count: u32) -> f64 {
        if pod_phase == "Running" {
            (1.0 - restart_count as f64 * 0.1).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceAxis {
    pub time_to_resolution: f64,
    pub resource_cpu_impact: f64,
    pub resource_memory_impact: f64,
    pub efficiency_score: f64,
}

impl PerformanceAxis {
    pub fn efficiency_score(resolution_time: f64, resource_impact: f64) -> f64 {
        let time_efficiency = (1.0 - resolution_time / 300.0).clamp(0.0, 1.0);
        let resource_efficiency = 1.0 - resource_impact;
        (time_efficiency + resource_efficiency) / 2.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextFactors {
    pub time_of_day: u32,
    pub day_of_week: u32,
    pub namespace_criticality: NamespaceCriticality,
    pub cluster_load: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceCriticality {
    Critical,
    Medium,
    Low,
}

impl NamespaceCriticality {
    pub fn assess(namespace: &str) -> Self {
        match namespace {
            "prod" | "live" | "production" => NamespaceCriticality::Critical,
            "stage" | "staging" => NamespaceCriticality::Medium,
            _ => NamespaceCriticality::Low,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComparativeAnalysis {
    pub strategy_similarity_to_previous: f64,
    pub historical_success_rate: f64,
    pub avg_historical_resolution_time: f64,
    pub outcome_vs_previous: String,
    pub improvement_trajectory: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub unexpected_success: bool,
    pub timing_outlier: bool,
    pub resource_anomaly: bool,
    pub pattern_violation: bool,
    pub anomaly_score: f64,
}

impl AnomalyReport {
    pub fn new(
        unexpected_success: bool,
        timing_outlier: bool,
        resource_anomaly: bool,
        pattern_violation: bool,
    ) -> Self {
        let detected = [
            unexpected_success,
            timing_outlier,
            resource_anomaly,
            pattern_violation,
        ]
        .iter()
        .filter(|d| **d)
        .count();

        Self {
            unexpected_success,
            timing_outlier,
            resource_anomaly,
            pattern_violation,
            anomaly_score: detected as f64 / 4.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_score_decays_with_restarts() {
        assert!((SuccessMetrics::stability_score("Running", 0) - 1.0).abs() < f64::EPSILON);
        assert!((SuccessMetrics::stability_score("Running", 3) - 0.7).abs() < 1e-9);
        assert_eq!(SuccessMetrics::stability_score("Running", 20), 0.0);
        assert_eq!(SuccessMetrics::stability_score("Failed", 0), 0.0);
    }

    #[test]
    fn test_namespace_criticality_mapping() {
        assert_eq!(
            NamespaceCriticality::assess("production"),
            NamespaceCriticality::Critical
        );
        assert_eq!(
            NamespaceCriticality::assess("staging"),
            NamespaceCriticality::Medium
        );
        assert_eq!(
            NamespaceCriticality::assess("default"),
            NamespaceCriticality::Low
        );
    }

    #[test]
    fn test_anomaly_score_is_fraction_of_checks() {
        let report = AnomalyReport::new(true, true, false, false);
        assert!((report.anomaly_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_observation_quality_counts_axes() {
        let mut observation = Observation::default();
        assert_eq!(observation.quality(), 0.0);

        observation.success_metrics = Some(SuccessMetrics {
            pod_phase: "Running".to_string(),
            container_ready: true,
            restart_count: 0,
            error_resolved: true,
            stability_score: 1.0,
        });
        assert!((observation.quality() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_efficiency_score_bounds() {
        // Instant resolution with no resource impact is perfectly efficient.
        assert!((PerformanceAxis::efficiency_score(0.0, 0.0) - 1.0).abs() < f64::EPSILON);
        // A 10-minute resolution has zero time efficiency.
        assert!((PerformanceAxis::efficiency_score(600.0, 0.0) - 0.5).abs() < f64::EPSILON);
    }
}
