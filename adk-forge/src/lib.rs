//! # adk-forge
//!
//! Forge turns a markdown task list into project files. Each task heading
//! becomes a task, each bullet a step, and every step is one LLM call whose
//! fenced code blocks are written under a project root.
//!
//! ## Features
//!
//! - **Markdown Tasks**: `## Task 1: Title` headings with bullet or numbered steps
//! - **Provider Adapters**: OpenAI-compatible endpoints (LM Studio, OpenAI, Groq, Azure,
//!   Hugging Face, vLLM) and Anthropic behind one `LlmClient` trait
//! - **Safe Writes**: generated paths are sanitized and never leave the project root
//! - **Partial Success**: a failing step is reported, not fatal
//! - **Git Commits**: optionally commit each task's files under the project root
//! - **Telemetry Integration**: tracing spans plus OpenTelemetry counters
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use adk_forge::{build_client, DispatchConfig, ForgeConfig, TaskDispatcher, TaskParser};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForgeConfig::load(None)?;
//!     let tasks = TaskParser::new().load(&config.tasks_path)?;
//!     let dispatcher = TaskDispatcher::new(
//!         build_client(&config.llm)?,
//!         DispatchConfig::from_forge_config(&config),
//!     );
//!     println!("{}", dispatcher.run(&tasks).await);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! tasks.md → TaskParser → [Task]
//!                           ↓
//!            TaskDispatcher, per step:
//!              ArtifactKind::classify → PromptBuilder → LlmClient
//!                → ResponseExtractor → FileWriter
//!                           ↓
//!                       RunReport
//! ```

pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod git;
pub mod llm;
pub mod models;
pub mod output;
pub mod prompts;
pub mod telemetry;
pub mod writer;

pub use error::{FileWriteError, ForgeError, GitError, LlmError, ParseError, Result};
pub use models::{
    // Config types
    DebugLevel,
    ForgeConfig,
    ForgeConfigBuilder,
    LlmConfig,
    ProviderKind,
    RequestStyle,
    TelemetryConfig,
    ValidationError,
    DEFAULT_CONFIG_FILE,
    MAX_ATTEMPTS,
    MAX_TIMEOUT_SECONDS,
    MAX_TOKENS_LIMIT,
    // Task types
    parse_tasks,
    Task,
    TaskParser,
    // Result types
    ExecutionResult,
    RunReport,
    RunSummary,
    ArtifactKind,
};

pub use llm::{
    build_client, AnthropicClient, ChatMessage, CompletionOptions, CompletionResult, LlmClient,
    MockLlmClient, OpenAiCompatibleClient, RetryConfig, Role, TokenUsage,
};

pub use extract::{extract_files, sanitize_path, ExtractedFile, ResponseExtractor};
pub use writer::{write_file, FileWriter, WriteStatus, WrittenFile};
pub use git::{CommitOutcome, GitCommitter};
pub use prompts::{PromptBuilder, PromptRequest, DEFAULT_SYSTEM_PROMPT};

pub use dispatcher::{
    run, DispatchConfig, DispatchObserver, NoopObserver, StepOutcome, TaskDispatcher,
    TaskDispatcherBuilder,
};

pub use output::ForgeOutput;
