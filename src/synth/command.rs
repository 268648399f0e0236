use super::{deployment_name, error_context_section, lessons_section, PodType};
use crate::clients::{extract_json, LlmClient};
use crate::models::{CommandPlan, ErrorClass, Incident, SelectedStrategy};
use std::sync::Arc;
use tracing::{info, warn};

const COMMAND_SYSTEM_PROMPT: &str = r#"You are a Kubernetes expert specializing in error resolution.
Generate kubectl commands to fix pod errors safely and effectively.

CRITICAL RULES FOR PORTABLE EXECUTION:
1. NEVER use pipe commands (|) - they are not available to the executor
2. NEVER use shell redirections (>) - they are not available to the executor
3. Use only direct kubectl commands without shell operators

CRITICAL POD TYPE RULES:
- STANDALONE PODS (simple names like "test-pod", "nginx-app"):
  use ONLY kubectl delete pod + kubectl run
- DEPLOYMENT PODS (names with hash suffixes like "nginx-deployment-abc123-xyz789"):
  use ONLY deployment-level operations (kubectl patch deployment, kubectl scale)

ERROR-SPECIFIC STRATEGIES:

For ImagePullBackOff on STANDALONE PODS:
- Root cause: invalid or nonexistent image tag
- NEVER use kubectl patch deployment (it will fail with "not found")
- Fix: ["kubectl delete pod {pod} -n {ns}", "kubectl run {pod} --image=nginx:latest --restart=Never -n {ns}"]

For OOMKilled:
- Root cause: memory limit exceeded (exit code 137)
- ALWAYS raise the memory limit to 2x-5x the original

For CrashLoopBackOff:
- Adjust resource limits or restart policy

MANDATORY OUTPUT FORMAT (JSON, exactly these four keys):
{
    "backup_commands": ["kubectl get pod {pod} -n {ns} -o yaml"],
    "fix_commands": ["..."],
    "validation_commands": ["kubectl get pod {pod} -n {ns}", "kubectl describe pod {pod} -n {ns}"],
    "rollback_commands": ["..."]
}"#;

/// Command-mode plan generation with a deterministic per-class fallback when
/// the model output cannot be parsed.
pub struct CommandSynthesiser {
    llm: Arc<dyn LlmClient>,
}

impl CommandSynthesiser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        incident: &Incident,
        strategy: &SelectedStrategy,
        pod_type: PodType,
        lessons: &[String],
    ) -> CommandPlan {
        let prompt = build_user_prompt(incident, strategy, pod_type, lessons);

        match self.llm.chat(COMMAND_SYSTEM_PROMPT, &prompt).await {
            Ok(response) => match parse_command_plan(&response) {
                Some(plan) => {
                    info!(
                        "Generated command plan: {} commands",
                        plan.total_commands()
                    );
                    plan
                }
                None => {
                    warn!("Unparseable command plan, using fallback");
                    fallback_plan(
                        incident.error_class,
                        &incident.pod_name,
                        &incident.namespace,
                        pod_type,
                    )
                }
            },
            Err(e) => {
                warn!("Command generation failed ({}), using fallback", e);
                fallback_plan(
                    incident.error_class,
                    &incident.pod_name,
                    &incident.namespace,
                    pod_type,
                )
            }
        }
    }
}

fn build_user_prompt(
    incident: &Incident,
    strategy: &SelectedStrategy,
    pod_type: PodType,
    lessons: &[String],
) -> String {
    let pod_type_note = match pod_type {
        PodType::DeploymentManaged => format!(
            "IMPORTANT: This pod is managed by a Deployment ({}).\n\
             DO NOT create new pods with the same name - they will conflict.\n\
             Use deployment-level fixes: kubectl scale, kubectl patch deployment.",
            deployment_name(&incident.pod_name)
        ),
        PodType::Standalone => "IMPORTANT: This is a STANDALONE pod (no controller).\n\
             Use pod-level fixes ONLY: kubectl delete pod, kubectl run.\n\
             NEVER patch deployments for standalone pods."
            .to_string(),
    };

    let phase = incident
        .snapshot
        .as_ref()
        .and_then(|s| s.pod_phase())
        .unwrap_or_else(|| "Unknown".to_string());

    format!(
        "Generate kubectl commands to fix this Kubernetes error:\n\n\
         ERROR TYPE: {}\nPOD NAME: {}\nNAMESPACE: {}\nPOD PHASE: {}\n\n\
         {}\n\n\
         STRATEGY: {} (confidence: {:.2})\n\n\
         {}\n{}\n\
         Respond with the exact JSON format from the system prompt.",
        incident.error_class,
        incident.pod_name,
        incident.namespace,
        phase,
        pod_type_note,
        strategy.action,
        strategy.confidence,
        error_context_section(incident),
        lessons_section(lessons),
    )
}

fn parse_command_plan(response: &str) -> Option<CommandPlan> {
    let value = extract_json(response)?;
    let plan: CommandPlan = serde_json::from_value(value).ok()?;
    if plan.fix.is_empty() {
        return None;
    }
    Some(plan)
}

/// Deterministic per-class plans used when the model fails. Managed pods get
/// deployment-level operations only.
pub fn fallback_plan(
    error_class: ErrorClass,
    pod_name: &str,
    namespace: &str,
    pod_type: PodType,
) -> CommandPlan {
    if pod_type == PodType::DeploymentManaged {
        let deployment = deployment_name(pod_name);
        return CommandPlan {
            backup: vec![format!(
                "kubectl get deployment {} -n {} -o yaml",
                deployment, namespace
            )],
            fix: vec![format!(
                "kubectl rollout restart deployment {} -n {}",
                deployment, namespace
            )],
            validation: vec![format!(
                "kubectl get deployment {} -n {}",
                deployment, namespace
            )],
            rollback: vec![],
        };
    }

    let backup = vec![format!(
        "kubectl get pod {} -n {} -o yaml",
        pod_name, namespace
    )];
    let validation = vec![
        format!("kubectl get pod {} -n {}", pod_name, namespace),
        format!("kubectl describe pod {} -n {}", pod_name, namespace),
    ];
    let rollback = vec![format!("kubectl delete pod {} -n {}", pod_name, namespace)];

    let fix = match error_class {
        ErrorClass::CrashLoopBackOff => vec![
            format!("kubectl delete pod {} -n {}", pod_name, namespace),
            format!(
                "kubectl run {} --image=nginx:latest --limits=memory=512Mi,cpu=200m --restart=Never -n {}",
                pod_name, namespace
            ),
        ],
        // Invalid image tags and OOM both recover with a clean recreate.
        _ => vec![
            format!("kubectl delete pod {} -n {}", pod_name, namespace),
            format!(
                "kubectl run {} --image=nginx:latest --restart=Never -n {}",
                pod_name, namespace
            ),
        ],
    };

    CommandPlan {
        backup,
        fix,
        validation,
        rollback,
    }
}
