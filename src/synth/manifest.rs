use super::{error_context_section, lessons_section, scale_memory_quantity, PodType};
use crate::clients::LlmClient;
use crate::error::{KubemendError, Result};
use crate::models::{ClusterSnapshot, ErrorClass, Incident, ManifestPlan, SelectedStrategy};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

const MANIFEST_SYSTEM_PROMPT: &str = r#"You are a Kubernetes expert specializing in manifest generation.
Generate complete, valid YAML manifests to fix Kubernetes pod errors.

ERROR-SPECIFIC FIX STRATEGIES:

1. ImagePullBackOff:
   - Change the image to a valid public one (nginx:latest, busybox:latest)
   - Keep all other specifications intact

2. OOMKilled:
   - Increase memory limits significantly (2x-5x the original)
   - If no limits exist, add reasonable ones (memory: 256Mi, cpu: 200m)
   - Keep resource requests lower than limits

3. CrashLoopBackOff:
   - Fix command/args if they cause crashes
   - Increase resource limits if needed

4. CreateContainerConfigError:
   - Fix volume mounts, environment variables and config/secret references

5. ErrImagePull:
   - Use public images that do not require authentication

MANIFEST GENERATION RULES:
1. Generate COMPLETE pod manifests, never patches
2. Include apiVersion, kind, metadata, and spec
3. Preserve existing good configuration; fix ONLY the faulty parts
4. labels and annotations belong under metadata ONLY, never under spec
5. Output ONLY the YAML manifest, no surrounding text or markdown fences"#;

/// Manifest-mode plan generation. Model output must parse as a document with
/// labels/annotations only under metadata; anything else falls back to a
/// deterministic per-class manifest.
pub struct ManifestSynthesiser {
    llm: Arc<dyn LlmClient>,
}

impl ManifestSynthesiser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        incident: &Incident,
        strategy: &SelectedStrategy,
        pod_type: PodType,
        lessons: &[String],
    ) -> ManifestPlan {
        let prompt = build_user_prompt(incident, strategy, pod_type, lessons);

        let manifest = match self.llm.chat(MANIFEST_SYSTEM_PROMPT, &prompt).await {
            Ok(response) => {
                let candidate = strip_code_fences(&response);
                match validate_manifest(&candidate, incident) {
                    Ok(()) => Some(candidate),
                    Err(e) => {
                        warn!("Generated manifest rejected ({}), using fallback", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("Manifest generation failed ({}), using fallback", e);
                None
            }
        };

        let manifest = manifest.unwrap_or_else(|| {
            fallback_manifest(
                incident.error_class,
                &incident.pod_name,
                &incident.namespace,
                incident.snapshot.as_ref(),
            )
        });

        info!(
            "Manifest ready for {}/{} ({} bytes)",
            incident.namespace,
            incident.pod_name,
            manifest.len()
        );

        ManifestPlan {
            manifest,
            manifest_filename: format!(
                "{}-fixed-{}.yaml",
                incident.pod_name,
                Utc::now().format("%Y%m%d-%H%M%S")
            ),
            delete_command: format!(
                "kubectl delete pod {} -n {} --ignore-not-found=true",
                incident.pod_name, incident.namespace
            ),
            validation_commands: vec![
                format!(
                    "kubectl get pod {} -n {}",
                    incident.pod_name, incident.namespace
                ),
                format!(
                    "kubectl describe pod {} -n {}",
                    incident.pod_name, incident.namespace
                ),
                format!(
                    "kubectl logs {} -n {} --tail=50",
                    incident.pod_name, incident.namespace
                ),
            ],
        }
    }
}

fn build_user_prompt(
    incident: &Incident,
    strategy: &SelectedStrategy,
    pod_type: PodType,
    lessons: &[String],
) -> String {
    let deployment_note = match pod_type {
        PodType::DeploymentManaged => {
            "\nNOTE: This pod is deployment-managed; generate a Deployment manifest rather than a bare Pod.\n"
        }
        PodType::Standalone => "",
    };

    let current = incident
        .snapshot
        .as_ref()
        .map(|s| serde_yaml::to_string(&s.pod_spec).unwrap_or_default())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Generate a complete Kubernetes manifest to fix this error:\n\n\
         ERROR TYPE: {}\nPOD NAME: {}\nNAMESPACE: {}\n{}\n\
         CURRENT POD CONFIGURATION:\n{}\n\n\
         {}\n{}\n\
         SELECTED STRATEGY: {} (confidence: {:.2})\n\n\
         Generate the complete, fixed manifest that resolves the {} error.",
        incident.error_class,
        incident.pod_name,
        incident.namespace,
        deployment_note,
        current,
        error_context_section(incident),
        lessons_section(lessons),
        strategy.action,
        strategy.confidence,
        incident.error_class,
    )
}

fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = body.strip_prefix("yaml").unwrap_or(body);
    body.trim_end_matches("```").trim().to_string()
}

/// Hard rules on generated manifests: must parse, must be a complete
/// document, labels/annotations must live under metadata only, and an OOM
/// fix must actually raise the memory limit to at least double.
fn validate_manifest(manifest: &str, incident: &Incident) -> Result<()> {
    let doc: serde_yaml::Value = serde_yaml::from_str(manifest)?;

    let mapping = doc
        .as_mapping()
        .ok_or_else(|| KubemendError::Validation("Manifest is not a mapping".to_string()))?;

    for key in ["apiVersion", "kind", "metadata", "spec"] {
        if !mapping.contains_key(serde_yaml::Value::String(key.to_string())) {
            return Err(KubemendError::Validation(format!(
                "Manifest missing required field: {}",
                key
            )));
        }
    }

    if let Some(spec) = doc.get("spec").and_then(|s| s.as_mapping()) {
        for forbidden in ["labels", "annotations"] {
            if spec.contains_key(serde_yaml::Value::String(forbidden.to_string())) {
                return Err(KubemendError::Validation(format!(
                    "{} must appear under metadata, not spec",
                    forbidden
                )));
            }
        }
    }

    if incident.error_class == ErrorClass::OomKilled {
        verify_memory_raised(&doc, incident)?;
    }

    Ok(())
}

fn verify_memory_raised(doc: &serde_yaml::Value, incident: &Incident) -> Result<()> {
    let Some(original) = incident
        .snapshot
        .as_ref()
        .and_then(|s| s.memory_limit())
    else {
        return Ok(());
    };
    let Some(required) = scale_memory_quantity(&original, 2).and_then(|q| memory_to_bytes(&q))
    else {
        return Ok(());
    };

    let new_limit = doc
        .get("spec")
        .and_then(|s| s.get("containers"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("resources"))
        .and_then(|r| r.get("limits"))
        .and_then(|l| l.get("memory"))
        .and_then(|m| m.as_str());

    match new_limit.and_then(memory_to_bytes) {
        Some(bytes) if bytes >= required => Ok(()),
        _ => Err(KubemendError::Validation(format!(
            "OOMKilled fix must at least double the {} memory limit",
            original
        ))),
    }
}

fn memory_to_bytes(quantity: &str) -> Option<u64> {
    let split = quantity.find(|c: char| !c.is_ascii_digit())?;
    let (number, unit) = quantity.split_at(split);
    let value: u64 = number.parse().ok()?;
    let multiplier: u64 = match unit {
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        _ => return None,
    };
    Some(value * multiplier)
}

/// Deterministic replacement manifest. For OOMKilled the memory limit is the
/// doubled original (2x rule), falling back to 512Mi when the original is
/// unknown.
pub fn fallback_manifest(
    error_class: ErrorClass,
    pod_name: &str,
    namespace: &str,
    snapshot: Option<&ClusterSnapshot>,
) -> String {
    let (memory_limit, memory_request) = if error_class == ErrorClass::OomKilled {
        let doubled = snapshot
            .and_then(|s| s.memory_limit())
            .and_then(|limit| scale_memory_quantity(&limit, 2));
        match doubled {
            Some(limit) => {
                let request = snapshot
                    .and_then(|s| s.memory_limit())
                    .unwrap_or_else(|| "256Mi".to_string());
                (limit, request)
            }
            None => ("512Mi".to_string(), "256Mi".to_string()),
        }
    } else {
        ("256Mi".to_string(), "128Mi".to_string())
    };

    let image = match error_class {
        // Invalid tags get a known-good public image.
        ErrorClass::ImagePullBackOff | ErrorClass::ErrImagePull => "nginx:latest".to_string(),
        _ => snapshot
            .and_then(|s| s.container_images().into_iter().next())
            .unwrap_or_else(|| "nginx:latest".to_string()),
    };

    let manifest = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": pod_name,
            "namespace": namespace,
            "labels": {
                "app": pod_name,
                "fixed-by": "kubemend",
            }
        },
        "spec": {
            "containers": [{
                "name": pod_name,
                "image": image,
                "resources": {
                    "limits": {"memory": memory_limit, "cpu": "200m"},
                    "requests": {"memory": memory_request, "cpu": "100m"},
                }
            }],
            "restartPolicy": "Always",
        }
    });

    serde_yaml::to_string(&manifest).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Incident;

    fn oom_incident() -> Incident {
        Incident::new("memory-hog", "default", ErrorClass::OomKilled).with_snapshot(
            ClusterSnapshot {
                pod_spec: serde_json::json!({
                    "spec": {
                        "containers": [{
                            "name": "memory-hog",
                            "image": "stress:latest",
                            "resources": {"limits": {"memory": "50Mi"}}
                        }]
                    }
                }),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_fallback_oom_doubles_memory_limit() {
        let incident = oom_incident();
        let manifest = fallback_manifest(
            ErrorClass::OomKilled,
            "memory-hog",
            "default",
            incident.snapshot.as_ref(),
        );
        assert!(manifest.contains("100Mi"));
        // The fallback must pass its own validation.
        validate_manifest(&manifest, &incident).unwrap();
    }

    #[test]
    fn test_fallback_oom_without_snapshot_uses_512mi() {
        let manifest = fallback_manifest(ErrorClass::OomKilled, "memory-hog", "default", None);
        assert!(manifest.contains("512Mi"));
    }

    #[test]
    fn test_validate_rejects_labels_under_spec() {
        let incident = Incident::new("x", "default", ErrorClass::ImagePullBackOff);
        let manifest = r#"
apiVersion: v1
kind: Pod
metadata:
  name: x
spec:
  labels:
    app: x
  containers:
    - name: x
      image: nginx:latest
"#;
        let err = validate_manifest(manifest, &incident).unwrap_err();
        assert!(matches!(err, KubemendError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_incomplete_document() {
        let incident = Incident::new("x", "default", ErrorClass::ImagePullBackOff);
        let err = validate_manifest("apiVersion: v1\nkind: Pod\n", &incident).unwrap_err();
        assert!(matches!(err, KubemendError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_oom_manifest_without_doubled_memory() {
        let incident = oom_incident();
        let manifest = r#"
apiVersion: v1
kind: Pod
metadata:
  name: memory-hog
  namespace: default
spec:
  containers:
    - name: memory-hog
      image: stress:latest
      resources:
        limits:
          memory: 60Mi
"#;
        assert!(validate_manifest(manifest, &incident).is_err());
    }

    #[test]
    fn test_validate_accepts_oom_manifest_with_doubled_memory() {
        let incident = oom_incident();
        let manifest = r#"
apiVersion: v1
kind: Pod
metadata:
  name: memory-hog
  namespace: default
spec:
  containers:
    - name: memory-hog
      image: stress:latest
      resources:
        limits:
          memory: 200Mi
"#;
        validate_manifest(manifest, &incident).unwrap();
    }

    #[test]
    fn test_strip_code_fences() {
        let fenced = "```yaml\napiVersion: v1\nkind: Pod\n```";
        assert_eq!(strip_code_fences(fenced), "apiVersion: v1\nkind: Pod");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn test_memory_to_bytes() {
        assert_eq!(memory_to_bytes("1Ki"), Some(1024));
        assert_eq!(memory_to_bytes("50Mi"), Some(50 * 1024 * 1024));
        assert_eq!(memory_to_bytes("nope"), None);
    }
}
