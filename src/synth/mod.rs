mod command;
mod manifest;

pub use command::CommandSynthesiser;
pub use manifest::ManifestSynthesiser;

use crate::clients::{owner_kind, ClusterDriver, LlmClient};
use crate::config::PlanMode;
use crate::error::Result;
use crate::models::{ExecutionPlan, Incident, SelectedStrategy};
use crate::stores::EpisodicMemory;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Whether a pod is controller-managed decides the whole shape of the fix:
/// deployment-level operations for managed pods, delete-and-recreate for
/// standalone ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodType {
    Standalone,
    DeploymentManaged,
}

/// Name heuristic used when the ownerReferences lookup is unavailable:
/// controller pods carry at least two hash-like suffix segments.
pub fn heuristic_pod_type(pod_name: &str) -> PodType {
    let parts: Vec<&str> = pod_name.split('-').collect();
    if parts.len() >= 3
        && parts[parts.len() - 2..]
            .iter()
            .all(|part| part.len() >= 5 && part.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        PodType::DeploymentManaged
    } else {
        PodType::Standalone
    }
}

/// Owner lookup first, heuristic as the fallback.
pub async fn detect_pod_type(
    driver: &dyn ClusterDriver,
    pod_name: &str,
    namespace: &str,
    timeout: Duration,
) -> PodType {
    match owner_kind(driver, pod_name, namespace, timeout).await {
        Some(kind) if kind == "ReplicaSet" || kind == "Deployment" || kind == "StatefulSet" => {
            PodType::DeploymentManaged
        }
        Some(_) => PodType::Standalone,
        None => heuristic_pod_type(pod_name),
    }
}

/// Strip the controller hash segments back off a managed pod's name.
pub fn deployment_name(pod_name: &str) -> String {
    let parts: Vec<&str> = pod_name.split('-').collect();
    if parts.len() > 2 {
        parts[..parts.len() - 2].join("-")
    } else {
        pod_name.to_string()
    }
}

/// LLM-backed generator of execution plans. Never executes anything.
pub struct PlanSynthesiser {
    command: CommandSynthesiser,
    manifest: ManifestSynthesiser,
    memory: Arc<EpisodicMemory>,
    driver: Arc<dyn ClusterDriver>,
    mode: PlanMode,
    lookup_timeout: Duration,
}

impl PlanSynthesiser {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        driver: Arc<dyn ClusterDriver>,
        memory: Arc<EpisodicMemory>,
        mode: PlanMode,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            command: CommandSynthesiser::new(Arc::clone(&llm)),
            manifest: ManifestSynthesiser::new(llm),
            memory,
            driver,
            mode,
            lookup_timeout,
        }
    }

    pub async fn synthesise(
        &self,
        incident: &Incident,
        strategy: &SelectedStrategy,
        lessons: &[String],
    ) -> Result<ExecutionPlan> {
        let lessons = self.ensure_lessons(incident, lessons).await;
        let pod_type = detect_pod_type(
            self.driver.as_ref(),
            &incident.pod_name,
            &incident.namespace,
            self.lookup_timeout,
        )
        .await;

        info!(
            "Synthesising {:?} plan for {}/{} ({:?} pod, {} lessons)",
            self.mode,
            incident.namespace,
            incident.pod_name,
            pod_type,
            lessons.len()
        );

        match self.mode {
            PlanMode::Command => {
                let plan = self
                    .command
                    .generate(incident, strategy, pod_type, &lessons)
                    .await;
                Ok(ExecutionPlan::Command(plan))
            }
            PlanMode::Manifest => {
                let plan = self
                    .manifest
                    .generate(incident, strategy, pod_type, &lessons)
                    .await;
                Ok(ExecutionPlan::Manifest(plan))
            }
        }
    }

    /// Lessons normally arrive from strategy selection; when the caller
    /// supplied none, issue a direct retrieval so plumbing bugs upstream
    /// cannot silence the learning loop.
    async fn ensure_lessons(&self, incident: &Incident, lessons: &[String]) -> Vec<String> {
        if !lessons.is_empty() {
            return lessons.to_vec();
        }

        warn!(
            "No lessons supplied for {}; issuing direct episodic retrieval",
            incident.error_class
        );
        match self
            .memory
            .similar(incident.error_class, &incident.context(), 5)
            .await
        {
            Ok(episodes) => episodes
                .into_iter()
                .flat_map(|e| e.lessons_learned)
                .collect(),
            Err(e) => {
                warn!("Emergency lesson retrieval failed: {}", e);
                Vec::new()
            }
        }
    }
}

pub(crate) fn lessons_section(lessons: &[String]) -> String {
    if lessons.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = lessons.iter().map(|l| format!("- {}", l)).collect();
    format!(
        "\nLESSONS LEARNED FROM PAST EXPERIENCES:\n{}\n\nUse these lessons to improve the fix. Consider what worked and what failed in similar situations.\n",
        rendered.join("\n")
    )
}

pub(crate) fn error_context_section(incident: &Incident) -> String {
    let Some(snapshot) = &incident.snapshot else {
        return "No cluster snapshot available.".to_string();
    };

    let containers: Vec<serde_json::Value> = snapshot
        .container_statuses
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name.clone(),
                "image": s.image.clone(),
                "restart_count": s.restart_count,
                "exit_code": s.exit_code,
            })
        })
        .collect();

    let warnings: Vec<&str> = snapshot
        .events
        .iter()
        .rev()
        .take(5)
        .filter(|e| e.event_type == "Warning")
        .map(|e| e.message.as_str())
        .collect();

    let log_errors: Vec<&str> = snapshot
        .logs
        .iter()
        .rev()
        .take(10)
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains("error") || lower.contains("failed") || lower.contains("exit")
        })
        .map(|s| s.as_str())
        .collect();

    format!(
        "CONTAINERS:\n{}\n\nERROR MESSAGES:\n{}\n\nLOG ERRORS:\n{}",
        serde_json::to_string_pretty(&containers).unwrap_or_default(),
        serde_json::to_string_pretty(&warnings).unwrap_or_default(),
        serde_json::to_string_pretty(&log_errors).unwrap_or_default(),
    )
}

/// Parse a Kubernetes memory quantity and scale it. Unknown formats return
/// `None` so callers can pick a safe default instead.
pub(crate) fn scale_memory_quantity(quantity: &str, factor: u64) -> Option<String> {
    let split = quantity.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = quantity.split_at(split);
    let value: u64 = number.parse().ok()?;
    match unit {
        "Ki" | "Mi" | "Gi" | "K" | "M" | "G" => Some(format!("{}{}", value * factor, unit)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockClusterDriver;
    use crate::models::CommandResult;
    use chrono::Utc;

    #[test]
    fn test_heuristic_standalone_names() {
        assert_eq!(heuristic_pod_type("nginx-test"), PodType::Standalone);
        assert_eq!(heuristic_pod_type("test-pod"), PodType::Standalone);
        assert_eq!(heuristic_pod_type("redis"), PodType::Standalone);
        // Last segment too short to look like a hash.
        assert_eq!(heuristic_pod_type("my-web-app"), PodType::Standalone);
    }

    #[test]
    fn test_heuristic_deployment_names() {
        assert_eq!(
            heuristic_pod_type("api-7f9c8b-xkjdq"),
            PodType::DeploymentManaged
        );
        assert_eq!(
            heuristic_pod_type("nginx-deployment-abc123-xyz789"),
            PodType::DeploymentManaged
        );
    }

    #[test]
    fn test_deployment_name_strips_hash_segments() {
        assert_eq!(deployment_name("api-7f9c8b-xkjdq"), "api");
        assert_eq!(
            deployment_name("nginx-deployment-abc123-xyz789"),
            "nginx-deployment"
        );
        assert_eq!(deployment_name("nginx"), "nginx");
    }

    #[test]
    fn test_scale_memory_quantity() {
        assert_eq!(scale_memory_quantity("50Mi", 2).as_deref(), Some("100Mi"));
        assert_eq!(scale_memory_quantity("1Gi", 2).as_deref(), Some("2Gi"));
        assert_eq!(scale_memory_quantity("bogus", 2), None);
        assert_eq!(scale_memory_quantity("128", 2), None);
    }

    #[tokio::test]
    async fn test_detect_pod_type_prefers_owner_lookup() {
        let mut driver = MockClusterDriver::new();
        driver.expect_run().returning(|cmd, _| {
            Ok(CommandResult {
                command: cmd.to_string(),
                success: true,
                stdout: r#"{"metadata": {"ownerReferences": [{"kind": "ReplicaSet"}]}}"#
                    .to_string(),
                stderr: String::new(),
                exit_code: 0,
                execution_time: 0.1,
                timestamp: Utc::now(),
            })
        });

        // The heuristic alone would call this standalone.
        let pod_type =
            detect_pod_type(&driver, "nginx-test", "default", Duration::from_secs(5)).await;
        assert_eq!(pod_type, PodType::DeploymentManaged);
    }

    #[tokio::test]
    async fn test_detect_pod_type_falls_back_to_heuristic() {
        let mut driver = MockClusterDriver::new();
        driver.expect_run().returning(|cmd, _| {
            Ok(CommandResult {
                command: cmd.to_string(),
                success: false,
                stdout: String::new(),
                stderr: "connection refused".to_string(),
                exit_code: 1,
                execution_time: 0.1,
                timestamp: Utc::now(),
            })
        });

        let pod_type = detect_pod_type(
            &driver,
            "api-7f9c8b-xkjdq",
            "default",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(pod_type, PodType::DeploymentManaged);
    }
}
