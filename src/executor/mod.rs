mod validator;

pub use validator::{CommandValidator, RiskLevel, ValidatedCommand};

use crate::clients::ClusterDriver;
use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::models::{
    CommandPlan, CommandResult, ExecutionReport, ManifestPlan, PhaseResult, PlanPhase,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pause between commands in a sequence so the API server sees state settle.
const INTER_COMMAND_DELAY: Duration = Duration::from_millis(500);
/// Grace period after deleting a pod before applying its replacement.
const POST_DELETE_DELAY: Duration = Duration::from_secs(2);

/// Validated, retried, rollback-aware execution of plans against the
/// cluster driver.
pub struct SafeExecutor {
    driver: Arc<dyn ClusterDriver>,
    validator: CommandValidator,
    config: ExecutorConfig,
}

impl SafeExecutor {
    pub fn new(driver: Arc<dyn ClusterDriver>, config: ExecutorConfig) -> Self {
        Self {
            driver,
            validator: CommandValidator::new(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_seconds)
    }

    /// Run one command with validation, dry-run short-circuit and retries.
    /// Non-zero exits retry with `2^k` second backoff; a timeout is returned
    /// as-is without retrying.
    pub async fn execute_command(
        &self,
        command: &str,
        retry_on_failure: bool,
    ) -> Result<CommandResult> {
        let validated = self.validator.validate(command)?;

        match validated.risk_level {
            RiskLevel::High => {
                warn!("High risk command: {}", command);
                for warning in &validated.warnings {
                    warn!("  {}", warning);
                }
            }
            RiskLevel::Medium => info!("Medium risk command: {}", command),
            RiskLevel::Low => {}
        }

        if self.config.dry_run {
            info!("Dry run, skipping: {}", command);
            return Ok(CommandResult {
                command: command.to_string(),
                success: true,
                stdout: format!("[DRY RUN] Would execute: {}", command),
                stderr: String::new(),
                exit_code: 0,
                execution_time: 0.0,
                timestamp: Utc::now(),
            });
        }

        let mut attempt: u32 = 0;
        loop {
            let result = self.driver.run(command, self.timeout()).await?;

            if result.success {
                info!(
                    "Command succeeded in {:.2}s: {}",
                    result.execution_time, command
                );
                return Ok(result);
            }

            // Timeouts already consumed the full budget; hand them back.
            if result.exit_code == -2 {
                error!("Command timed out: {}", command);
                return Ok(result);
            }

            error!(
                "Command failed (exit {}): {} - {}",
                result.exit_code, command, result.stderr
            );

            if !retry_on_failure || attempt >= self.config.max_retries {
                return Ok(result);
            }

            attempt += 1;
            let backoff = Duration::from_secs(2u64.pow(attempt));
            info!(
                "Retrying ({}/{}) after {:?}: {}",
                attempt, self.config.max_retries, backoff, command
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Run a phase's commands in order. `stop_on_failure` is true for backup
    /// and fix, false for validation and rollback.
    pub async fn execute_sequence(
        &self,
        commands: &[String],
        phase: PlanPhase,
        stop_on_failure: bool,
    ) -> Result<PhaseResult> {
        info!("Executing {} phase: {} commands", phase, commands.len());

        let mut results = Vec::new();
        for (i, command) in commands.iter().enumerate() {
            let result = self.execute_command(command, true).await?;
            let failed = !result.success;
            results.push(result);

            if failed && stop_on_failure {
                warn!("{} phase stopped at command {}", phase, i + 1);
                break;
            }
            if i + 1 < commands.len() && !self.config.dry_run {
                tokio::time::sleep(INTER_COMMAND_DELAY).await;
            }
        }

        Ok(PhaseResult { phase, results })
    }

    /// backup → fix → validation; a failed fix runs rollback (when present)
    /// and skips validation.
    pub async fn execute_command_plan(&self, plan: &CommandPlan) -> Result<ExecutionReport> {
        let mut phases = Vec::new();

        let backup = self
            .execute_sequence(&plan.backup, PlanPhase::Backup, true)
            .await?;
        phases.push(backup);

        let fix = self
            .execute_sequence(&plan.fix, PlanPhase::Fix, true)
            .await?;
        let fix_failed = !fix.all_succeeded();
        phases.push(fix);

        if fix_failed {
            if !plan.rollback.is_empty() {
                warn!("Fix failed, executing rollback");
                let rollback = self
                    .execute_sequence(&plan.rollback, PlanPhase::Rollback, false)
                    .await?;
                phases.push(rollback);
            }
        } else {
            let validation = self
                .execute_sequence(&plan.validation, PlanPhase::Validation, false)
                .await?;
            phases.push(validation);
        }

        let report = ExecutionReport::from_phases(phases);
        info!("Plan execution complete: {}", report.summary());
        Ok(report)
    }

    /// Write the manifest into a scoped temp directory, run the pre-delete,
    /// apply it, then validate. The directory is removed on every exit path
    /// when the guard drops.
    pub async fn execute_manifest_plan(&self, plan: &ManifestPlan) -> Result<ExecutionReport> {
        let temp_dir = tempfile::Builder::new()
            .prefix("kubemend-manifest-")
            .tempdir()?;
        let manifest_path = temp_dir.path().join(&plan.manifest_filename);
        tokio::fs::write(&manifest_path, &plan.manifest).await?;
        info!("Wrote manifest to {}", manifest_path.display());

        let mut phases = Vec::new();

        let delete = self
            .execute_command(&plan.delete_command, true)
            .await?;
        let delete_succeeded = delete.success;
        phases.push(PhaseResult {
            phase: PlanPhase::Backup,
            results: vec![delete],
        });
        if delete_succeeded {
            if !self.config.dry_run {
                tokio::time::sleep(POST_DELETE_DELAY).await;
            }
        } else {
            warn!("Pod deletion failed, continuing with apply");
        }

        let apply_command = format!("kubectl apply -f {}", manifest_path.display());
        let apply = self.execute_command(&apply_command, true).await?;
        let applied = apply.success;
        phases.push(PhaseResult {
            phase: PlanPhase::Fix,
            results: vec![apply],
        });

        if applied {
            let validation = self
                .execute_sequence(&plan.validation_commands, PlanPhase::Validation, false)
                .await?;
            phases.push(validation);
        } else {
            error!("Failed to apply manifest");
        }

        let report = ExecutionReport::from_phases(phases);
        info!("Manifest execution complete: {}", report.summary());
        Ok(report)
    }
}
