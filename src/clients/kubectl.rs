use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{KubemendError, Result};
use crate::models::CommandResult;

/// The single capability the core needs from the cluster: run a command
/// string and report what happened. The loop treats the driver as opaque so
/// tests and dry runs can swap it out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult>;
}

/// Subprocess-backed kubectl driver. Commands are split on whitespace and
/// executed directly; shell operators never reach a shell.
pub struct KubectlDriver {
    kubectl_path: String,
}

impl KubectlDriver {
    pub fn new() -> Self {
        Self {
            kubectl_path: "kubectl".to_string(),
        }
    }

    pub fn with_path(kubectl_path: &str) -> Self {
        Self {
            kubectl_path: kubectl_path.to_string(),
        }
    }

    /// Verify the CLI is reachable; missing kubectl is a refuse-to-start
    /// condition.
    pub async fn probe(&self) -> Result<()> {
        let result = self
            .run("kubectl version --client", Duration::from_secs(10))
            .await?;
        if result.success {
            Ok(())
        } else {
            Err(KubemendError::FatalConfiguration(format!(
                "kubectl probe failed: {}",
                result.stderr
            )))
        }
    }
}

impl Default for KubectlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterDriver for KubectlDriver {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| KubemendError::Validation("Empty command".to_string()))?;
        let program = if program == "kubectl" {
            self.kubectl_path.as_str()
        } else {
            program
        };
        let args: Vec<&str> = parts.collect();

        debug!("Executing: {}", command);

        let child = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(CommandResult {
                    command: command.to_string(),
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code,
                    execution_time: started.elapsed().as_secs_f64(),
                    timestamp,
                })
            }
            Ok(Err(e)) => Err(KubemendError::Cluster(format!(
                "Failed to spawn '{}': {}",
                command, e
            ))),
            // Dropping the future kills the child via kill_on_drop.
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, command);
                Ok(CommandResult {
                    command: command.to_string(),
                    success: false,
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", timeout.as_secs()),
                    exit_code: -2,
                    execution_time: timeout.as_secs_f64(),
                    timestamp,
                })
            }
        }
    }
}

/// Look up the kind of the pod's controller through the driver. Returns
/// `None` when the pod has no owner or the lookup fails; callers fall back
/// to the name heuristic.
pub async fn owner_kind(
    driver: &dyn ClusterDriver,
    pod_name: &str,
    namespace: &str,
    timeout: Duration,
) -> Option<String> {
    let command = format!("kubectl get pod {} -n {} -o json", pod_name, namespace);
    let result = driver.run(&command, timeout).await.ok()?;
    if !result.success {
        return None;
    }

    let pod: serde_json::Value = serde_json::from_str(&result.stdout).ok()?;
    pod.pointer("/metadata/ownerReferences/0/kind")
        .and_then(|k| k.as_str())
        .map(|k| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_result(command: &str, stdout: &str, success: bool) -> CommandResult {
        CommandResult {
            command: command.to_string(),
            success,
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: if success { 0 } else { 1 },
            execution_time: 0.1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_owner_kind_reads_owner_references() {
        let mut driver = MockClusterDriver::new();
        driver.expect_run().returning(|cmd, _| {
            Ok(json_result(
                cmd,
                r#"{"metadata": {"ownerReferences": [{"kind": "ReplicaSet", "name": "api-7f9c8b"}]}}"#,
                true,
            ))
        });

        let kind = owner_kind(&driver, "api-7f9c8b-xkjdq", "default", Duration::from_secs(5))
            .await;
        assert_eq!(kind.as_deref(), Some("ReplicaSet"));
    }

    #[tokio::test]
    async fn test_owner_kind_none_for_standalone_pod() {
        let mut driver = MockClusterDriver::new();
        driver
            .expect_run()
            .returning(|cmd, _| Ok(json_result(cmd, r#"{"metadata": {"name": "nginx-test"}}"#, true)));

        let kind = owner_kind(&driver, "nginx-test", "default", Duration::from_secs(5)).await;
        assert!(kind.is_none());
    }

    #[tokio::test]
    async fn test_owner_kind_none_when_lookup_fails() {
        let mut driver = MockClusterDriver::new();
        driver
            .expect_run()
            .returning(|cmd, _| Ok(json_result(cmd, "", false)));

        let kind = owner_kind(&driver, "nginx-test", "default", Duration::from_secs(5)).await;
        assert!(kind.is_none());
    }
}
