use crate::clients::ClusterDriver;
use crate::models::{
    AnomalyReport, AttemptRecord, ComparativeAnalysis, ContextFactors, ExecutionReport, Incident,
    NamespaceCriticality, Observation, PerformanceAxis, SuccessMetrics,
};
use chrono::{Datelike, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed resource impact estimates for a single-pod fix; real monitoring
/// integration would replace these.
const CPU_IMPACT: f64 = 0.1;
const MEMORY_IMPACT: f64 = 0.05;

/// Sliding window for the improvement trajectory.
const TRAJECTORY_WINDOW: usize = 5;

/// Multi-axis outcome measurement. Every axis degrades independently; a
/// missing axis lowers observation quality instead of failing the loop.
pub struct Observer {
    driver: Arc<dyn ClusterDriver>,
    timeout: Duration,
}

impl Observer {
    pub fn new(driver: Arc<dyn ClusterDriver>, timeout: Duration) -> Self {
        Self { driver, timeout }
    }

    pub async fn observe(
        &self,
        incident: &Incident,
        report: &ExecutionReport,
        resolution_time: f64,
        retry_count: u32,
        past_attempts: &[AttemptRecord],
        current_action: &str,
    ) -> Observation {
        let success = report.overall_success;

        let (success_metrics, performance, context_factors, comparative, anomalies) = futures::join!(
            self.collect_success_metrics(incident, success),
            async { collect_performance(resolution_time) },
            async { collect_context_factors(&incident.namespace) },
            async { collect_comparative(past_attempts, current_action, success) },
            async { detect_anomalies(success, retry_count, resolution_time) },
        );

        let observation = Observation {
            success_metrics,
            performance,
            context_factors,
            comparative,
            anomalies,
            observed_at: Some(Utc::now()),
        };

        debug!(
            "Observation complete for {}/{}: quality={:.2}",
            incident.namespace,
            incident.pod_name,
            observation.quality()
        );
        observation
    }

    /// Post-execution pod state straight from the cluster, falling back to
    /// the execution report when the lookup fails (dry runs, flaky API).
    async fn collect_success_metrics(
        &self,
        incident: &Incident,
        success: bool,
    ) -> Option<SuccessMetrics> {
        let command = format!(
            "kubectl get pod {} -n {} -o json",
            incident.pod_name, incident.namespace
        );

        let live = match self.driver.run(&command, self.timeout).await {
            Ok(result) if result.success => {
                serde_json::from_str::<serde_json::Value>(&result.stdout).ok()
            }
            _ => None,
        };

        match live {
            Some(pod) => {
                let phase = pod
                    .pointer("/status/phase")
                    .and_then(|p| p.as_str())
                    .unwrap_or("Unknown")
                    .to_string();
                let ready = pod
                    .pointer("/status/containerStatuses")
                    .and_then(|c| c.as_array())
                    .map(|statuses| {
                        !statuses.is_empty()
                            && statuses
                                .iter()
                                .all(|s| s.get("ready").and_then(|r| r.as_bool()).unwrap_or(false))
                    })
                    .unwrap_or(false);
                let restart_count = pod
                    .pointer("/status/containerStatuses/0/restartCount")
                    .and_then(|r| r.as_u64())
                    .unwrap_or(0) as u32;

                Some(SuccessMetrics {
                    stability_score: SuccessMetrics::stability_score(&phase, restart_count),
                    error_resolved: phase == "Running",
                    pod_phase: phase,
                    container_ready: ready,
                    restart_count,
                })
            }
            None => {
                warn!(
                    "Live pod lookup failed for {}/{}, deriving from report",
                    incident.namespace, incident.pod_name
                );
                let phase = if success { "Running" } else { "Failed" };
                let restart_count = if success { 0 } else { 3 };
                Some(SuccessMetrics {
                    pod_phase: phase.to_string(),
                    container_ready: success,
                    restart_count,
                    error_resolved: success,
                    stability_score: SuccessMetrics::stability_score(phase, restart_count),
                })
            }
        }
    }
}

fn collect_performance(resolution_time: f64) -> Option<PerformanceAxis> {
    Some(PerformanceAxis {
        time_to_resolution: resolution_time,
        resource_cpu_impact: CPU_IMPACT,
        resource_memory_impact: MEMORY_IMPACT,
        efficiency_score: PerformanceAxis::efficiency_score(
            resolution_time,
            CPU_IMPACT + MEMORY_IMPACT,
        ),
    })
}

fn collect_context_factors(namespace: &str) -> Option<ContextFactors> {
    let now = Utc::now();
    Some(ContextFactors {
        time_of_day: now.hour(),
        day_of_week: now.weekday().num_days_from_monday(),
        namespace_criticality: NamespaceCriticality::assess(namespace),
        cluster_load: "low".to_string(),
    })
}

fn collect_comparative(
    past_attempts: &[AttemptRecord],
    current_action: &str,
    success: bool,
) -> Option<ComparativeAnalysis> {
    let strategy_similarity = past_attempts
        .last()
        .map(|last| if last.action == current_action { 0.8 } else { 0.2 })
        .unwrap_or(0.0);

    let outcome_vs_previous = match past_attempts.last() {
        Some(last) if success && !last.success => "improved".to_string(),
        Some(_) => "similar".to_string(),
        None => "no_previous_attempts".to_string(),
    };

    let (historical_rate, historical_time) = if past_attempts.is_empty() {
        (0.0, 0.0)
    } else {
        let wins = past_attempts.iter().filter(|a| a.success).count();
        let total_time: f64 = past_attempts.iter().map(|a| a.resolution_time).sum();
        (
            wins as f64 / past_attempts.len() as f64,
            total_time / past_attempts.len() as f64,
        )
    };

    Some(ComparativeAnalysis {
        strategy_similarity_to_previous: strategy_similarity,
        historical_success_rate: historical_rate,
        avg_historical_resolution_time: historical_time,
        outcome_vs_previous,
        improvement_trajectory: improvement_trajectory(past_attempts),
    })
}

/// Success rate over each sliding window of five attempts.
pub fn improvement_trajectory(attempts: &[AttemptRecord]) -> Vec<f64> {
    if attempts.len() < TRAJECTORY_WINDOW {
        return Vec::new();
    }

    (0..=attempts.len() - TRAJECTORY_WINDOW)
        .map(|start| {
            let window = &attempts[start..start + TRAJECTORY_WINDOW];
            window.iter().filter(|a| a.success).count() as f64 / TRAJECTORY_WINDOW as f64
        })
        .collect()
}

fn detect_anomalies(success: bool, retry_count: u32, resolution_time: f64) -> Option<AnomalyReport> {
    Some(AnomalyReport::new(
        success && retry_count >= 2,
        resolution_time < 5.0 || resolution_time > 300.0,
        false,
        false,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockClusterDriver;
    use crate::models::{CommandResult, ErrorClass, PhaseResult, PlanPhase};

    fn attempt(action: &str, success: bool) -> AttemptRecord {
        AttemptRecord {
            strategy_id: "s1".to_string(),
            action: action.to_string(),
            success,
            resolution_time: 10.0,
            timestamp: Utc::now(),
        }
    }

    fn report(success: bool) -> ExecutionReport {
        ExecutionReport::from_phases(vec![PhaseResult {
            phase: PlanPhase::Fix,
            results: vec![CommandResult {
                command: "kubectl delete pod x -n default".to_string(),
                success,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: if success { 0 } else { 1 },
                execution_time: 1.0,
                timestamp: Utc::now(),
            }],
        }])
    }

    fn failing_driver() -> Arc<MockClusterDriver> {
        let mut driver = MockClusterDriver::new();
        driver.expect_run().returning(|cmd, _| {
            Ok(CommandResult {
                command: cmd.to_string(),
                success: false,
                stdout: String::new(),
                stderr: "no cluster".to_string(),
                exit_code: 1,
                execution_time: 0.1,
                timestamp: Utc::now(),
            })
        });
        Arc::new(driver)
    }

    #[tokio::test]
    async fn test_all_axes_populated_without_cluster() {
        let observer = Observer::new(failing_driver(), Duration::from_secs(5));
        let incident = Incident::new("nginx-test", "default", ErrorClass::ImagePullBackOff);

        let observation = observer
            .observe(&incident, &report(true), 12.0, 0, &[], "learned_strategy")
            .await;

        assert!((observation.quality() - 1.0).abs() < f64::EPSILON);
        let metrics = observation.success_metrics.unwrap();
        assert_eq!(metrics.pod_phase, "Running");
        assert!(metrics.error_resolved);
    }

    #[tokio::test]
    async fn test_live_pod_state_preferred_over_report() {
        let mut driver = MockClusterDriver::new();
        driver.expect_run().returning(|cmd, _| {
            Ok(CommandResult {
                command: cmd.to_string(),
                success: true,
                stdout: r#"{"status": {"phase": "Running", "containerStatuses": [{"ready": true, "restartCount": 2}]}}"#.to_string(),
                stderr: String::new(),
                exit_code: 0,
                execution_time: 0.1,
                timestamp: Utc::now(),
            })
        });
        let observer = Observer::new(Arc::new(driver), Duration::from_secs(5));
        let incident = Incident::new("nginx-test", "default", ErrorClass::ImagePullBackOff);

        // Report says failure, but the live pod is Running with restarts.
        let observation = observer
            .observe(&incident, &report(false), 12.0, 0, &[], "learned_strategy")
            .await;
        let metrics = observation.success_metrics.unwrap();
        assert_eq!(metrics.restart_count, 2);
        assert!((metrics.stability_score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unexpected_success_flagged_after_two_retries() {
        let observer = Observer::new(failing_driver(), Duration::from_secs(5));
        let incident = Incident::new("nginx-test", "default", ErrorClass::OomKilled);

        let observation = observer
            .observe(&incident, &report(true), 12.0, 2, &[], "learned_strategy")
            .await;
        assert!(observation.anomalies.unwrap().unexpected_success);

        let observation = observer
            .observe(&incident, &report(true), 12.0, 1, &[], "learned_strategy")
            .await;
        assert!(!observation.anomalies.unwrap().unexpected_success);
    }

    #[tokio::test]
    async fn test_timing_outliers_flagged() {
        let observer = Observer::new(failing_driver(), Duration::from_secs(5));
        let incident = Incident::new("nginx-test", "default", ErrorClass::OomKilled);

        let fast = observer
            .observe(&incident, &report(true), 2.0, 0, &[], "a")
            .await;
        assert!(fast.anomalies.unwrap().timing_outlier);

        let slow = observer
            .observe(&incident, &report(true), 301.0, 0, &[], "a")
            .await;
        assert!(slow.anomalies.unwrap().timing_outlier);

        let normal = observer
            .observe(&incident, &report(true), 30.0, 0, &[], "a")
            .await;
        assert!(!normal.anomalies.unwrap().timing_outlier);
    }

    #[test]
    fn test_improvement_trajectory_windows() {
        let attempts: Vec<AttemptRecord> = [false, false, true, true, true, true]
            .iter()
            .map(|s| attempt("a", *s))
            .collect();

        let trajectory = improvement_trajectory(&attempts);
        assert_eq!(trajectory.len(), 2);
        assert!((trajectory[0] - 0.6).abs() < 1e-9);
        assert!((trajectory[1] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_trajectory_empty_below_window() {
        let attempts: Vec<AttemptRecord> = (0..4).map(|_| attempt("a", true)).collect();
        assert!(improvement_trajectory(&attempts).is_empty());
    }
}
