pub mod kubectl;
pub mod llm;

pub use kubectl::{owner_kind, ClusterDriver, KubectlDriver};
pub use llm::{create_llm_client, extract_json, ClaudeClient, LlmClient, OpenAiClient};

#[cfg(test)]
pub use kubectl::MockClusterDriver;
