use crate::error::{KubemendError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Operations on cluster-scoped resources that must never execute.
const FORBIDDEN_OPERATIONS: &[&str] = &[
    "delete namespace",
    "delete node",
    "delete persistentvolume",
    "delete pv",
    "delete clusterrole",
    "delete clusterrolebinding",
    "delete customresourcedefinition",
    "delete crd",
];

/// Shell metacharacters that would change meaning under a shell. Commands are
/// exec'd directly so these only warn, but a plan carrying them is suspect.
const DANGEROUS_CHARS: &[char] = &[';', '&', '|', '>', '<', '$', '`'];

const SAFE_VERBS: &[&str] = &[
    "get",
    "describe",
    "logs",
    "top",
    "version",
    "cluster-info",
    "api-resources",
    "api-versions",
];

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug)]
pub struct ValidatedCommand {
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
}

/// Pre-execution gate for every command the loop wants to run.
pub struct CommandValidator {
    high_risk: Vec<Regex>,
    medium_risk: Vec<Regex>,
}

impl CommandValidator {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static risk pattern"))
                .collect()
        };

        Self {
            high_risk: compile(&[
                r"delete\s+deployment",
                r"delete\s+service",
                r"delete\s+configmap",
                r"delete\s+secret",
                r"scale\s+.*--replicas=0",
                r"patch\s+.*security",
                r"exec\s+",
                r"port-forward\s+",
            ]),
            medium_risk: compile(&[
                r"delete\s+pod",
                r"rollout\s+restart",
                r"patch\s+",
                r"scale\s+",
                r"annotate\s+",
                r"label\s+",
            ]),
        }
    }

    /// Reject forbidden commands outright, classify the rest into risk
    /// tiers, and warn on shell metacharacters.
    pub fn validate(&self, command: &str) -> Result<ValidatedCommand> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(KubemendError::Validation("Empty command".to_string()));
        }

        let lower = trimmed.to_lowercase();
        if !lower.starts_with("kubectl") {
            return Err(KubemendError::Validation(format!(
                "Only kubectl commands are allowed: {}",
                command
            )));
        }

        for forbidden in FORBIDDEN_OPERATIONS {
            if lower.contains(forbidden) {
                return Err(KubemendError::Validation(format!(
                    "Forbidden operation '{}' in command: {}",
                    forbidden, command
                )));
            }
        }

        let mut warnings = Vec::new();
        for ch in DANGEROUS_CHARS {
            if trimmed.contains(*ch) {
                warnings.push(format!("Potentially dangerous character: {}", ch));
            }
        }

        let mut risk_level = RiskLevel::Low;
        for pattern in &self.high_risk {
            if pattern.is_match(&lower) {
                risk_level = RiskLevel::High;
                warnings.push(format!("High risk pattern: {}", pattern.as_str()));
            }
        }
        if risk_level == RiskLevel::Low {
            for pattern in &self.medium_risk {
                if pattern.is_match(&lower) {
                    risk_level = RiskLevel::Medium;
                    break;
                }
            }
        }

        // Read-only verbs stay low regardless of substring hits.
        if let Some(verb) = lower.split_whitespace().nth(1) {
            if SAFE_VERBS.contains(&verb) {
                risk_level = RiskLevel::Low;
            }
        }

        Ok(ValidatedCommand {
            risk_level,
            warnings,
        })
    }
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_command_rejected() {
        let validator = CommandValidator::new();
        assert!(matches!(
            validator.validate("   "),
            Err(KubemendError::Validation(_))
        ));
    }

    #[test]
    fn test_non_kubectl_rejected() {
        let validator = CommandValidator::new();
        assert!(matches!(
            validator.validate("rm -rf /"),
            Err(KubemendError::Validation(_))
        ));
    }

    #[rstest]
    #[case("kubectl delete namespace prod")]
    #[case("kubectl delete node worker-1")]
    #[case("kubectl delete persistentvolume data-pv")]
    #[case("kubectl delete clusterrole admin")]
    #[case("kubectl delete clusterrolebinding admin-binding")]
    #[case("kubectl delete customresourcedefinition foo.example.com")]
    fn test_forbidden_operations_rejected(#[case] command: &str) {
        let validator = CommandValidator::new();
        assert!(matches!(
            validator.validate(command),
            Err(KubemendError::Validation(_))
        ));
    }

    #[rstest]
    #[case("kubectl delete deployment api -n prod", RiskLevel::High)]
    #[case("kubectl scale deployment api --replicas=0 -n prod", RiskLevel::High)]
    #[case("kubectl exec api-pod -n prod -- ls", RiskLevel::High)]
    #[case("kubectl delete pod nginx-test -n default", RiskLevel::Medium)]
    #[case("kubectl rollout restart deployment api -n default", RiskLevel::Medium)]
    #[case("kubectl patch pod nginx-test -n default --type=merge", RiskLevel::Medium)]
    #[case("kubectl get pods -n default", RiskLevel::Low)]
    #[case("kubectl describe pod nginx-test -n default", RiskLevel::Low)]
    #[case("kubectl logs nginx-test -n default --tail=50", RiskLevel::Low)]
    fn test_risk_classification(#[case] command: &str, #[case] expected: RiskLevel) {
        let validator = CommandValidator::new();
        let validated = validator.validate(command).unwrap();
        assert_eq!(validated.risk_level, expected, "command: {}", command);
    }

    #[test]
    fn test_dangerous_characters_warn_but_pass() {
        let validator = CommandValidator::new();
        let validated = validator
            .validate("kubectl get pods -o jsonpath=$..name")
            .unwrap();
        assert!(validated
            .warnings
            .iter()
            .any(|w| w.contains("dangerous character")));
    }
}
