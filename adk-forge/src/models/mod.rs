//! Data models for Forge.
//!
//! This module contains:
//! - Task records and the markdown task parser
//! - Artifact kinds inferred from step text
//! - Per-task execution results and the run report
//! - Configuration management

pub mod artifact;
pub mod config;
pub mod result;
pub mod tasks;

// Re-export public API
pub use artifact::ArtifactKind;
pub use config::{
    DebugLevel, ForgeConfig, ForgeConfigBuilder, LlmConfig, ProviderKind, RequestStyle,
    TelemetryConfig, ValidationError, DEFAULT_CONFIG_FILE, MAX_ATTEMPTS, MAX_TIMEOUT_SECONDS,
    MAX_TOKENS_LIMIT,
};
pub use result::{ExecutionResult, RunReport, RunSummary};
pub use tasks::{parse_tasks, Task, TaskParser};
