use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Concrete cluster mutation chosen for an incident. The synthesiser only
/// produces plans; the safe executor is the only component that runs them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ExecutionPlan {
    Command(CommandPlan),
    Manifest(ManifestPlan),
}

impl ExecutionPlan {
    pub fn fix_commands(&self) -> Vec<String> {
        match self {
            ExecutionPlan::Command(plan) => plan.fix.clone(),
            ExecutionPlan::Manifest(plan) => vec![plan.delete_command.clone()],
        }
    }
}

/// Four ordered phases of kubectl commands.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandPlan {
    #[serde(default, alias = "backup_commands")]
    pub backup: Vec<String>,
    #[serde(default, alias = "fix_commands")]
    pub fix: Vec<String>,
    #[serde(default, alias = "validation_commands")]
    pub validation: Vec<String>,
    #[serde(default, alias = "rollback_commands")]
    pub rollback: Vec<String>,
}

impl CommandPlan {
    pub fn total_commands(&self) -> usize {
        self.backup.len() + self.fix.len() + self.validation.len() + self.rollback.len()
    }

    pub fn all_commands(&self) -> impl Iterator<Item = &String> {
        self.backup
            .iter()
            .chain(self.fix.iter())
            .chain(self.validation.iter())
            .chain(self.rollback.iter())
    }
}

/// A full replacement document plus the commands around it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestPlan {
    pub manifest: String,
    pub manifest_filename: String,
    pub delete_command: String,
    pub validation_commands: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlanPhase {
    Backup,
    Fix,
    Validation,
    Rollback,
}

impl std::fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanPhase::Backup => write!(f, "backup"),
            PlanPhase::Fix => write!(f, "fix"),
            PlanPhase::Validation => write!(f, "validation"),
            PlanPhase::Rollback => write!(f, "rollback"),
        }
    }
}

/// Result of one command against the cluster driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandFailure {
    pub phase: PlanPhase,
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: PlanPhase,
    pub results: Vec<CommandResult>,
}

impl PhaseResult {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// What the executor hands back to the loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub overall_success: bool,
    pub fix_success: bool,
    pub validation_success: bool,
    pub rollback_performed: bool,
    pub total_commands: usize,
    pub successful_commands: usize,
    pub success_rate: f64,
    pub total_execution_time: f64,
    pub errors: Vec<CommandFailure>,
    pub phases: Vec<PhaseResult>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn from_phases(phases: Vec<PhaseResult>) -> Self {
        let total_commands: usize = phases.iter().map(|p| p.results.len()).sum();
        let successful_commands: usize = phases
            .iter()
            .map(|p| p.results.iter().filter(|r| r.success).count())
            .sum();
        let total_execution_time: f64 = phases
            .iter()
            .flat_map(|p| p.results.iter())
            .map(|r| r.execution_time)
            .sum();

        let phase_success = |phase: PlanPhase| {
            phases
                .iter()
                .filter(|p| p.phase == phase)
                .all(|p| p.all_succeeded())
        };

        let fix_success = phase_success(PlanPhase::Fix);
        let validation_success = phase_success(PlanPhase::Validation);
        let rollback_performed = phases.iter().any(|p| p.phase == PlanPhase::Rollback);

        let errors = phases
            .iter()
            .flat_map(|p| {
                p.results.iter().filter(|r| !r.success).map(|r| CommandFailure {
                    phase: p.phase,
                    command: r.command.clone(),
                    exit_code: r.exit_code,
                    stderr: r.stderr.clone(),
                })
            })
            .collect();

        Self {
            overall_success: fix_success && validation_success,
            fix_success,
            validation_success,
            rollback_performed,
            total_commands,
            successful_commands,
            success_rate: if total_commands > 0 {
                successful_commands as f64 / total_commands as f64
            } else {
                0.0
            },
            total_execution_time,
            errors,
            phases,
            timestamp: Utc::now(),
        }
    }

    /// Report for an attempt that never produced phase results (synthesis or
    /// validation error before execution).
    pub fn failed(error: &str) -> Self {
        Self {
            overall_success: false,
            fix_success: false,
            validation_success: false,
            rollback_performed: false,
            total_commands: 0,
            successful_commands: 0,
            success_rate: 0.0,
            total_execution_time: 0.0,
            errors: vec![CommandFailure {
                phase: PlanPhase::Fix,
                command: String::new(),
                exit_code: -1,
                stderr: error.to_string(),
            }],
            phases: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} commands successful in {:.2}s (fix: {}, validation: {})",
            self.successful_commands,
            self.total_commands,
            self.total_execution_time,
            self.fix_success,
            self.validation_success
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(command: &str, success: bool) -> CommandResult {
        CommandResult {
            command: command.to_string(),
            success,
            stdout: String::new(),
            stderr: if success { String::new() } else { "boom".to_string() },
            exit_code: if success { 0 } else { 1 },
            execution_time: 0.5,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_overall_success_requires_fix_and_validation() {
        let report = ExecutionReport::from_phases(vec![
            PhaseResult {
                phase: PlanPhase::Fix,
                results: vec![result("kubectl delete pod x -n default", true)],
            },
            PhaseResult {
                phase: PlanPhase::Validation,
                results: vec![result("kubectl get pod x -n default", false)],
            },
        ]);

        assert!(report.fix_success);
        assert!(!report.validation_success);
        assert!(!report.overall_success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].phase, PlanPhase::Validation);
    }

    #[test]
    fn test_success_rate() {
        let report = ExecutionReport::from_phases(vec![PhaseResult {
            phase: PlanPhase::Fix,
            results: vec![result("a", true), result("b", true), result("c", false)],
        }]);
        assert!((report.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_command_plan_alias_keys_deserialize() {
        let raw = r#"{
            "backup_commands": ["kubectl get pod x -n default -o yaml"],
            "fix_commands": ["kubectl delete pod x -n default"],
            "validation_commands": [],
            "rollback_commands": []
        }"#;
        let plan: CommandPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.backup.len(), 1);
        assert_eq!(plan.fix.len(), 1);
        assert_eq!(plan.total_commands(), 2);
    }
}
