use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    ImagePullBackOff,
    CrashLoopBackOff,
    OomKilled,
    CreateContainerConfigError,
    ErrImagePull,
    Other,
}

impl ErrorClass {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ImagePullBackOff" => ErrorClass::ImagePullBackOff,
            "CrashLoopBackOff" => ErrorClass::CrashLoopBackOff,
            "OOMKilled" => ErrorClass::OomKilled,
            "CreateContainerConfigError" => ErrorClass::CreateContainerConfigError,
            "ErrImagePull" => ErrorClass::ErrImagePull,
            _ => ErrorClass::Other,
        }
    }

    /// Classes the loop has dedicated strategies for. `Other` routes to
    /// deep analysis instead of retrying blind.
    pub fn is_known(&self) -> bool {
        !matches!(self, ErrorClass::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ImagePullBackOff => "ImagePullBackOff",
            ErrorClass::CrashLoopBackOff => "CrashLoopBackOff",
            ErrorClass::OomKilled => "OOMKilled",
            ErrorClass::CreateContainerConfigError => "CreateContainerConfigError",
            ErrorClass::ErrImagePull => "ErrImagePull",
            ErrorClass::Other => "Other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Incident {
    pub pod_name: String,
    pub namespace: String,
    pub error_class: ErrorClass,
    pub snapshot: Option<ClusterSnapshot>,
    pub detected_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(pod_name: &str, namespace: &str, error_class: ErrorClass) -> Self {
        Self {
            pod_name: pod_name.to_string(),
            namespace: namespace.to_string(),
            error_class,
            snapshot: None,
            detected_at: Utc::now(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: ClusterSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Flat context used for strategy condition matching and episode
    /// similarity.
    pub fn context(&self) -> HashMap<String, String> {
        let mut ctx = HashMap::new();
        ctx.insert("pod_name".to_string(), self.pod_name.clone());
        ctx.insert("namespace".to_string(), self.namespace.clone());
        ctx.insert("error_type".to_string(), self.error_class.to_string());
        ctx
    }
}

/// Raw cluster state shipped with an incident. All fields optional; a missing
/// snapshot means synthetic analysis.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub pod_spec: serde_json::Value,
    #[serde(default)]
    pub events: Vec<PodEvent>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl ClusterSnapshot {
    pub fn container_images(&self) -> Vec<String> {
        self.pod_spec
            .pointer("/spec/containers")
            .and_then(|c| c.as_array())
            .map(|containers| {
                containers
                    .iter()
                    .filter_map(|c| c.get("image").and_then(|i| i.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn memory_limit(&self) -> Option<String> {
        self.pod_spec
            .pointer("/spec/containers/0/resources/limits/memory")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
    }

    pub fn pod_phase(&self) -> Option<String> {
        self.pod_spec
            .pointer("/status/phase")
            .and_then(|p| p.as_str())
            .map(|s| s.to_string())
    }
}

/// One completed attempt on an incident, kept in the per-incident context
/// for comparative observation and confidence refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy_id: String,
    pub action: String,
    pub success: bool,
    pub resolution_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Patterns scraped out of a snapshot before the loop starts; used to boost
/// analysis confidence when real cluster data is present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotAnalysis {
    pub error_patterns: Vec<String>,
    pub critical_events: Vec<PodEvent>,
    pub exit_codes: Vec<i32>,
    pub confidence: f64,
    pub used_real_cluster_data: bool,
}

impl SnapshotAnalysis {
    pub fn synthetic(error_class: ErrorClass) -> Self {
        Self {
            error_patterns: vec![format!("synthetic:{}", error_class)],
            critical_events: Vec::new(),
            exit_codes: Vec::new(),
            confidence: 0.9,
            used_real_cluster_data: false,
        }
    }

    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        let mut patterns = Vec::new();
        let mut critical = Vec::new();

        for event in snapshot.events.iter().rev().take(10) {
            let message = event.message.to_lowercase();
            if message.contains("pull")
                && (message.contains("denied") || message.contains("failed"))
            {
                patterns.push("image_pull_failure".to_string());
            } else if message.contains("crashloopbackoff") {
                patterns.push("crash_loop".to_string());
            } else if message.contains("oomkilled") {
                patterns.push("out_of_memory".to_string());
            }

            if event.event_type == "Warning" {
                critical.push(event.clone());
            }
        }

        let mut exit_codes = Vec::new();
        for line in snapshot.logs.iter().rev().take(50) {
            if let Some(code) = extract_exit_code(line) {
                exit_codes.push(code);
            }
        }
        for status in &snapshot.container_statuses {
            if let Some(code) = status.exit_code {
                exit_codes.push(code);
            }
        }

        Self {
            error_patterns: patterns,
            critical_events: critical,
            exit_codes,
            // Real cluster data short-circuits synthetic analysis.
            confidence: 0.95,
            used_real_cluster_data: true,
        }
    }
}

fn extract_exit_code(line: &str) -> Option<i32> {
    let lower = line.to_lowercase();
    let idx = lower.find("exit code")?;
    lower[idx + "exit code".len()..]
        .trim_start_matches([':', ' '])
        .split_whitespace()
        .next()
        .and_then(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_parse_roundtrip() {
        assert_eq!(ErrorClass::parse("OOMKilled"), ErrorClass::OomKilled);
        assert_eq!(ErrorClass::parse("nonsense"), ErrorClass::Other);
        assert_eq!(ErrorClass::OomKilled.to_string(), "OOMKilled");
    }

    #[test]
    fn test_snapshot_memory_limit() {
        let snapshot = ClusterSnapshot {
            pod_spec: serde_json::json!({
                "spec": {
                    "containers": [{
                        "name": "app",
                        "image": "nginx:doesnotexist",
                        "resources": {"limits": {"memory": "50Mi"}}
                    }]
                }
            }),
            ..Default::default()
        };

        assert_eq!(snapshot.memory_limit().as_deref(), Some("50Mi"));
        assert_eq!(snapshot.container_images(), vec!["nginx:doesnotexist"]);
    }

    #[test]
    fn test_snapshot_analysis_marks_real_data() {
        let snapshot = ClusterSnapshot {
            events: vec![PodEvent {
                event_type: "Warning".to_string(),
                reason: "Failed".to_string(),
                message: "Back-off pulling image, pull failed".to_string(),
                timestamp: None,
            }],
            logs: vec!["container terminated with exit code: 137".to_string()],
            ..Default::default()
        };

        let analysis = SnapshotAnalysis::from_snapshot(&snapshot);
        assert!(analysis.used_real_cluster_data);
        assert!(analysis.confidence >= 0.95);
        assert!(analysis
            .error_patterns
            .contains(&"image_pull_failure".to_string()));
        assert_eq!(analysis.exit_codes, vec![137]);
        assert_eq!(analysis.critical_events.len(), 1);
    }

    #[test]
    fn test_incident_context_keys() {
        let incident = Incident::new("nginx-test", "default", ErrorClass::ImagePullBackOff);
        let ctx = incident.context();
        assert_eq!(ctx.get("namespace").map(String::as_str), Some("default"));
        assert_eq!(
            ctx.get("error_type").map(String::as_str),
            Some("ImagePullBackOff")
        );
    }
}
