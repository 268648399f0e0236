use crate::error::{KubemendError, Result};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub stores: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            command_timeout_seconds: default_command_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_command_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_plan_mode")]
    pub mode: PlanMode,
    #[serde(default = "default_reflection_depth")]
    pub reflection_depth: ReflectionDepth,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,
    #[serde(default = "default_hard_retry_cap")]
    pub hard_retry_cap: u32,
    #[serde(default = "default_reflect_on_success_probability")]
    pub reflect_on_success_probability: f64,
    #[serde(default = "default_prefer_persistent_probability")]
    pub prefer_persistent_probability: f64,
    #[serde(default = "default_pattern_detection_threshold")]
    pub pattern_detection_threshold: usize,
    #[serde(default = "default_strategy_confidence_threshold")]
    pub strategy_confidence_threshold: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            mode: default_plan_mode(),
            reflection_depth: default_reflection_depth(),
            recursion_limit: default_recursion_limit(),
            hard_retry_cap: default_hard_retry_cap(),
            reflect_on_success_probability: default_reflect_on_success_probability(),
            prefer_persistent_probability: default_prefer_persistent_probability(),
            pattern_detection_threshold: default_pattern_detection_threshold(),
            strategy_confidence_threshold: default_strategy_confidence_threshold(),
        }
    }
}

fn default_plan_mode() -> PlanMode {
    PlanMode::Manifest
}

fn default_reflection_depth() -> ReflectionDepth {
    ReflectionDepth::Medium
}

fn default_recursion_limit() -> u32 {
    50
}

fn default_hard_retry_cap() -> u32 {
    5
}

fn default_reflect_on_success_probability() -> f64 {
    0.8
}

fn default_prefer_persistent_probability() -> f64 {
    0.8
}

fn default_pattern_detection_threshold() -> usize {
    3
}

fn default_strategy_confidence_threshold() -> f64 {
    0.7
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    Command,
    Manifest,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionDepth {
    Shallow,
    Medium,
    Deep,
}

impl ReflectionDepth {
    pub fn prompt_modifier(&self) -> &'static str {
        match self {
            ReflectionDepth::Shallow => "Focus on immediate factors and obvious patterns.",
            ReflectionDepth::Medium => {
                "Include second-order effects and cross-domain analogies."
            }
            ReflectionDepth::Deep => {
                "Examine fundamental assumptions and paradigm-level insights."
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_strategy_db_path")]
    pub strategy_db_path: String,
    #[serde(default = "default_episode_db_path")]
    pub episode_db_path: String,
    #[serde(default = "default_performance_db_path")]
    pub performance_db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strategy_db_path: default_strategy_db_path(),
            episode_db_path: default_episode_db_path(),
            performance_db_path: default_performance_db_path(),
        }
    }
}

fn default_strategy_db_path() -> String {
    "kubemend_strategies.redb".to_string()
}

fn default_episode_db_path() -> String {
    "kubemend_episodes.redb".to_string()
}

fn default_performance_db_path() -> String {
    "kubemend_performance.redb".to_string()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("KUBEMEND_LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .unwrap_or_default();

        let dry_run = env_bool("KUBEMEND_DRY_RUN", false);

        if api_key.is_empty() && !dry_run {
            return Err(KubemendError::FatalConfiguration(
                "No LLM API key configured (set KUBEMEND_LLM_API_KEY)".to_string(),
            ));
        }

        Ok(Self {
            llm: LlmConfig {
                provider: std::env::var("KUBEMEND_LLM_PROVIDER")
                    .unwrap_or_else(|_| default_llm_provider()),
                api_key,
                model: std::env::var("KUBEMEND_LLM_MODEL")
                    .unwrap_or_else(|_| default_llm_model()),
                timeout_seconds: env_u64("KUBEMEND_LLM_TIMEOUT", default_llm_timeout()),
            },
            executor: ExecutorConfig {
                dry_run,
                command_timeout_seconds: env_u64(
                    "KUBEMEND_COMMAND_TIMEOUT",
                    default_command_timeout(),
                ),
                max_retries: env_u64("KUBEMEND_MAX_RETRIES", default_max_retries() as u64)
                    as u32,
            },
            workflow: WorkflowConfig {
                mode: match std::env::var("KUBEMEND_PLAN_MODE").as_deref() {
                    Ok("command") => PlanMode::Command,
                    _ => PlanMode::Manifest,
                },
                reflection_depth: match std::env::var("KUBEMEND_REFLECTION_DEPTH").as_deref() {
                    Ok("shallow") => ReflectionDepth::Shallow,
                    Ok("deep") => ReflectionDepth::Deep,
                    _ => ReflectionDepth::Medium,
                },
                recursion_limit: env_u64(
                    "KUBEMEND_RECURSION_LIMIT",
                    default_recursion_limit() as u64,
                ) as u32,
                hard_retry_cap: env_u64(
                    "KUBEMEND_HARD_RETRY_CAP",
                    default_hard_retry_cap() as u64,
                ) as u32,
                reflect_on_success_probability: env_f64(
                    "KUBEMEND_REFLECT_ON_SUCCESS_PROBABILITY",
                    default_reflect_on_success_probability(),
                ),
                prefer_persistent_probability: env_f64(
                    "KUBEMEND_PREFER_PERSISTENT_PROBABILITY",
                    default_prefer_persistent_probability(),
                ),
                pattern_detection_threshold: env_u64(
                    "KUBEMEND_PATTERN_THRESHOLD",
                    default_pattern_detection_threshold() as u64,
                ) as usize,
                strategy_confidence_threshold: env_f64(
                    "KUBEMEND_CONFIDENCE_THRESHOLD",
                    default_strategy_confidence_threshold(),
                ),
            },
            stores: StoreConfig {
                strategy_db_path: std::env::var("KUBEMEND_STRATEGY_DB")
                    .unwrap_or_else(|_| default_strategy_db_path()),
                episode_db_path: std::env::var("KUBEMEND_EPISODE_DB")
                    .unwrap_or_else(|_| default_episode_db_path()),
                performance_db_path: std::env::var("KUBEMEND_PERFORMANCE_DB")
                    .unwrap_or_else(|_| default_performance_db_path()),
            },
            logging: LoggingConfig::default(),
        })
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KubemendError::FatalConfiguration(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            KubemendError::FatalConfiguration(format!("Failed to parse config: {}", e))
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::default();
        assert_eq!(config.mode, PlanMode::Manifest);
        assert_eq!(config.hard_retry_cap, 5);
        assert_eq!(config.recursion_limit, 50);
        assert!((config.prefer_persistent_probability - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_depth_modifiers_differ() {
        assert_ne!(
            ReflectionDepth::Shallow.prompt_modifier(),
            ReflectionDepth::Deep.prompt_modifier()
        );
    }
}
