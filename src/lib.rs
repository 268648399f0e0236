pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod stores;
pub mod synth;
pub mod workflow;

pub use config::AppConfig;
pub use error::{KubemendError, Result};
pub use workflow::{ExecutionFeedback, ReflexiveWorkflow, RemediationResult};
