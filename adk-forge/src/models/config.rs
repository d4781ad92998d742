//! Configuration management for Forge.
//!
//! This module provides configuration structures for:
//! - LLM provider selection and request settings
//! - Telemetry and console verbosity
//! - Overall run configuration (project root, task file, overwrite policy)
//!
//! ## Loading
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `FORGE_*` environment variables. The CLI applies its flags last.
//! Every layer ends in [`ForgeConfig::validate`] so a bad value fails fast with
//! a descriptive error and a suggestion.
//!
//! ```yaml
//! llm:
//!   provider: groq
//!   temperature: 0.2
//!   max_tokens: 2000
//! project_path: project-code
//! overwrite: false
//! ```

use crate::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "forge.yaml";

/// Maximum allowed value for max_tokens.
pub const MAX_TOKENS_LIMIT: u32 = 1_000_000;

/// Maximum allowed request timeout in seconds.
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// Maximum number of attempts for a single LLM call, first try included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Validation error with context and suggestions.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Description of the error
    pub message: String,
    /// Suggested fix or valid values
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion to the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::error::Error for ValidationError {}

/// Console verbosity.
///
/// - `Minimal`: only errors and the final summary
/// - `Normal`: task and step progress (default)
/// - `Verbose`: prompts sizes, written files and warnings from tracing
/// - `Debug`: everything, including the configured tracing level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugLevel {
    Minimal,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl DebugLevel {
    pub fn is_minimal(&self) -> bool {
        matches!(self, DebugLevel::Minimal)
    }

    /// True at Normal and above.
    pub fn is_normal(&self) -> bool {
        !self.is_minimal()
    }

    /// True at Verbose and above.
    pub fn is_verbose(&self) -> bool {
        matches!(self, DebugLevel::Verbose | DebugLevel::Debug)
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, DebugLevel::Debug)
    }
}

impl fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebugLevel::Minimal => "minimal",
            DebugLevel::Normal => "normal",
            DebugLevel::Verbose => "verbose",
            DebugLevel::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DebugLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(DebugLevel::Minimal),
            "normal" => Ok(DebugLevel::Normal),
            "verbose" => Ok(DebugLevel::Verbose),
            "debug" => Ok(DebugLevel::Debug),
            other => Err(ValidationError::new(
                "debug_level",
                format!("Unknown debug level '{}'", other),
            )
            .with_suggestion("Use one of: minimal, normal, verbose, debug")),
        }
    }
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    LmStudio,
    OpenAi,
    Anthropic,
    Groq,
    Azure,
    HuggingFace,
    Vllm,
}

impl ProviderKind {
    /// Every provider, in display order.
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::LmStudio,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Groq,
        ProviderKind::Azure,
        ProviderKind::HuggingFace,
        ProviderKind::Vllm,
    ];

    /// Identifier used in config files and env vars.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::LmStudio => "lmstudio",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Groq => "groq",
            ProviderKind::Azure => "azure",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::Vllm => "vllm",
        }
    }

    /// Endpoint used when `api_base` is not configured.
    ///
    /// Azure has no default: each resource has its own host.
    pub fn default_api_base(&self) -> Option<&'static str> {
        match self {
            ProviderKind::LmStudio => Some("http://localhost:1234/v1"),
            ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
            ProviderKind::Anthropic => Some("https://api.anthropic.com"),
            ProviderKind::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderKind::Azure => None,
            ProviderKind::HuggingFace => Some("https://router.huggingface.co/v1"),
            ProviderKind::Vllm => Some("http://localhost:8000/v1"),
        }
    }

    /// Model used when `model` is not configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::LmStudio => "default",
            ProviderKind::OpenAi => "gpt-4",
            ProviderKind::Anthropic => "claude-3-sonnet-20240229",
            ProviderKind::Groq => "llama-3.1-70b-versatile",
            ProviderKind::Azure => "gpt-4",
            ProviderKind::HuggingFace => "meta-llama/Llama-2-70b-chat-hf",
            ProviderKind::Vllm => "local-model",
        }
    }

    /// Environment variable holding the API key when `api_key_env` is not configured.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::LmStudio => "LMSTUDIO_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Azure => "AZURE_OPENAI_API_KEY",
            ProviderKind::HuggingFace => "HUGGINGFACE_API_TOKEN",
            ProviderKind::Vllm => "VLLM_API_KEY",
        }
    }

    /// Local servers accept unauthenticated requests.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::LmStudio | ProviderKind::Vllm)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                ValidationError::new("provider", format!("Unsupported provider '{}'", s))
                    .with_suggestion(format!(
                        "Supported providers: {}",
                        ProviderKind::ALL.map(|p| p.as_str()).join(", ")
                    ))
            })
    }
}

/// Shape of the request sent for each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStyle {
    /// Role-tagged system and user messages
    #[default]
    Chat,
    /// A single prompt string with the system prompt prepended
    Completion,
}

impl fmt::Display for RequestStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStyle::Chat => write!(f, "chat"),
            RequestStyle::Completion => write!(f, "completion"),
        }
    }
}

impl FromStr for RequestStyle {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(RequestStyle::Chat),
            "completion" | "base" => Ok(RequestStyle::Completion),
            other => Err(ValidationError::new(
                "request_style",
                format!("Unknown request style '{}'", other),
            )
            .with_suggestion("Use 'chat' or 'completion'")),
        }
    }
}

/// LLM provider and request settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Backend to talk to
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model identifier (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint base URL (provider default when unset)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Name of the env var holding the API key (provider default when unset)
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Azure `api-version` query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Chat messages or a single completion prompt
    #[serde(default)]
    pub request_style: RequestStyle,
    /// System prompt with `{project_type}` and `{artifact}` placeholders
    #[serde(default)]
    pub system_prompt_template: Option<String>,
}

fn default_api_version() -> String {
    "2023-05-15".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    MAX_ATTEMPTS - 1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            api_base: None,
            api_key_env: None,
            api_version: default_api_version(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            request_style: RequestStyle::default(),
            system_prompt_template: None,
        }
    }
}

impl LlmConfig {
    /// Create a config for a provider with its defaults.
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the endpoint base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set the env var holding the API key.
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set retries after the first attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the request style.
    pub fn with_request_style(mut self, style: RequestStyle) -> Self {
        self.request_style = style;
        self
    }

    /// Set the system prompt template.
    pub fn with_system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }

    /// Model identifier after applying the provider default.
    pub fn resolved_model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Endpoint after applying the provider default, without a trailing slash.
    pub fn resolved_api_base(&self) -> Option<String> {
        self.api_base
            .as_deref()
            .or_else(|| self.provider.default_api_base())
            .map(|base| base.trim_end_matches('/').to_string())
    }

    /// Env var name after applying the provider default.
    pub fn resolved_api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Read the API key from the environment. Empty values count as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.resolved_api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate the LLM config.
    ///
    /// Checks:
    /// - Model name, when set, is non-empty and printable
    /// - An endpoint exists and is an http(s) URL
    /// - Max tokens, temperature, timeout and retries are within bounds
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                return Err(ValidationError::new("model", "Model name cannot be empty")
                    .with_suggestion(format!(
                        "Remove the field to use the provider default '{}'",
                        self.provider.default_model()
                    )));
            }

            if model.len() > 256 {
                return Err(ValidationError::new(
                    "model",
                    format!("Model name is too long ({} chars)", model.len()),
                )
                .with_suggestion("Model names should be under 256 characters"));
            }

            if model.contains(char::is_control) {
                return Err(ValidationError::new(
                    "model",
                    "Model name contains invalid control characters",
                )
                .with_suggestion("Use only printable characters in model names"));
            }
        }

        match self.resolved_api_base() {
            None => {
                return Err(ValidationError::new(
                    "api_base",
                    format!("Provider '{}' has no default endpoint", self.provider),
                )
                .with_suggestion(
                    "Set api_base to your resource URL, e.g. https://my-resource.openai.azure.com",
                ));
            }
            Some(base) if !(base.starts_with("http://") || base.starts_with("https://")) => {
                return Err(ValidationError::new(
                    "api_base",
                    format!("Endpoint '{}' is not an http(s) URL", base),
                )
                .with_suggestion("Use a URL like http://localhost:1234/v1"));
            }
            Some(_) => {}
        }

        if let Some(ref name) = self.api_key_env {
            if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '=') {
                return Err(ValidationError::new(
                    "api_key_env",
                    format!("'{}' is not a valid environment variable name", name),
                )
                .with_suggestion("Use a name like OPENAI_API_KEY"));
            }
        }

        if self.max_tokens == 0 {
            return Err(ValidationError::new("max_tokens", "Max tokens must be greater than 0")
                .with_suggestion("Set max_tokens to at least 1 (recommended: 2000)"));
        }

        if self.max_tokens > MAX_TOKENS_LIMIT {
            return Err(ValidationError::new(
                "max_tokens",
                format!("Max tokens {} exceeds limit of {}", self.max_tokens, MAX_TOKENS_LIMIT),
            )
            .with_suggestion(format!("Use a value between 1 and {}", MAX_TOKENS_LIMIT)));
        }

        if self.temperature.is_nan() || self.temperature.is_infinite() {
            return Err(ValidationError::new(
                "temperature",
                "Temperature must be a valid finite number",
            )
            .with_suggestion("Use a value between 0.0 and 2.0"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::new(
                "temperature",
                format!("Temperature {} is out of range", self.temperature),
            )
            .with_suggestion("Temperature must be between 0.0 and 2.0 (recommended: 0.2)"));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ValidationError::new(
                "timeout_seconds",
                format!("Timeout {}s is out of range", self.timeout_seconds),
            )
            .with_suggestion(format!("Use a value between 1 and {}", MAX_TIMEOUT_SECONDS)));
        }

        if self.max_retries >= MAX_ATTEMPTS {
            return Err(ValidationError::new(
                "max_retries",
                format!("Max retries {} allows more than {} attempts", self.max_retries, MAX_ATTEMPTS),
            )
            .with_suggestion(format!("Use a value between 0 and {}", MAX_ATTEMPTS - 1)));
        }

        if let Some(ref template) = self.system_prompt_template {
            if template.len() > 10_000 {
                return Err(ValidationError::new(
                    "system_prompt_template",
                    format!("Template is too long ({} chars)", template.len()),
                )
                .with_suggestion("Keep the system prompt under 10000 characters"));
            }
        }

        Ok(())
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Service name reported on spans and metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Tracing filter used at `debug` verbosity (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_name() -> String {
    "adk-forge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl TelemetryConfig {
    /// Validate the telemetry config.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.service_name.trim().is_empty() {
            return Err(ValidationError::new("service_name", "Service name cannot be empty")
                .with_suggestion("Use a name like 'adk-forge'"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.log_level.to_lowercase();
        // Directive strings like "adk_forge=debug" are passed straight to EnvFilter.
        if !level.contains('=') && !valid_levels.contains(&level.as_str()) {
            return Err(ValidationError::new(
                "log_level",
                format!("Invalid log level '{}'", self.log_level),
            )
            .with_suggestion(format!("Use one of: {}", valid_levels.join(", "))));
        }

        Ok(())
    }
}

/// Main configuration for a Forge run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForgeConfig {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Directory receiving generated files
    #[serde(default = "default_project_path")]
    pub project_path: String,
    /// Markdown task document
    #[serde(default = "default_tasks_path")]
    pub tasks_path: String,
    /// Replace files that already exist
    #[serde(default)]
    pub overwrite: bool,
    /// Free-form project kind mentioned in prompts ("web", "python", ...)
    #[serde(default = "default_project_type")]
    pub project_type: String,
    /// Ask the model for a README.md after all tasks
    #[serde(default)]
    pub generate_readme: bool,
    /// Console verbosity
    #[serde(default)]
    pub debug_level: DebugLevel,
    /// Commit each task's written files to git under the project root
    #[serde(default)]
    pub git_integration: bool,
}

fn default_project_path() -> String {
    "project-code".to_string()
}

fn default_tasks_path() -> String {
    "tasks.md".to_string()
}

fn default_project_type() -> String {
    "web".to_string()
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            telemetry: TelemetryConfig::default(),
            project_path: default_project_path(),
            tasks_path: default_tasks_path(),
            overwrite: false,
            project_type: default_project_type(),
            generate_readme: false,
            debug_level: DebugLevel::default(),
            git_integration: false,
        }
    }
}

impl ForgeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ForgeConfigBuilder {
        ForgeConfigBuilder::default()
    }

    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load and validate configuration.
    ///
    /// An explicit `path` must exist. Without one, `forge.yaml` in the
    /// working directory is used when present. Environment variables are
    /// applied on top of the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| ForgeError::file(path.display().to_string(), e.to_string()))?;
                Self::from_yaml_str(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                let content = std::fs::read_to_string(DEFAULT_CONFIG_FILE)
                    .map_err(|e| ForgeError::file(DEFAULT_CONFIG_FILE, e.to_string()))?;
                Self::from_yaml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> std::result::Result<Self, ValidationError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FORGE_*` environment overrides.
    pub fn apply_env(&mut self) -> std::result::Result<(), ValidationError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    ///
    /// ## Environment Variables
    ///
    /// - `FORGE_PROVIDER` - lmstudio, openai, anthropic, groq, azure, huggingface, vllm
    /// - `FORGE_MODEL` - Model identifier
    /// - `FORGE_API_BASE` - Endpoint base URL
    /// - `FORGE_API_KEY_ENV` - Name of the env var holding the API key
    /// - `FORGE_TEMPERATURE` - Sampling temperature (default: 0.2)
    /// - `FORGE_MAX_TOKENS` - Max tokens per response (default: 2000)
    /// - `FORGE_TIMEOUT_SECONDS` - Per-request timeout (default: 60)
    /// - `FORGE_REQUEST_STYLE` - chat or completion
    /// - `FORGE_PROJECT_PATH` - Output directory (default: project-code)
    /// - `FORGE_TASKS_PATH` - Task document (default: tasks.md)
    /// - `FORGE_PROJECT_TYPE` - Project kind used in prompts (default: web)
    /// - `FORGE_OVERWRITE` - Replace existing files (true/false)
    /// - `FORGE_GIT_INTEGRATION` - Commit written files after each task (true/false)
    /// - `FORGE_LOG_LEVEL` - Tracing filter at debug verbosity
    /// - `FORGE_DEBUG_LEVEL` - minimal, normal, verbose, debug
    pub fn apply_env_with<F>(&mut self, lookup: F) -> std::result::Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("FORGE_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }

        if let Some(model) = lookup("FORGE_MODEL") {
            self.llm.model = Some(model);
        }

        if let Some(base) = lookup("FORGE_API_BASE") {
            self.llm.api_base = Some(base);
        }

        if let Some(name) = lookup("FORGE_API_KEY_ENV") {
            self.llm.api_key_env = Some(name);
        }

        if let Some(temp) = lookup("FORGE_TEMPERATURE") {
            self.llm.temperature = temp.parse().map_err(|e| {
                ValidationError::new(
                    "temperature",
                    format!("Invalid FORGE_TEMPERATURE '{}': {}", temp, e),
                )
                .with_suggestion("Use a number between 0.0 and 2.0")
            })?;
        }

        if let Some(tokens) = lookup("FORGE_MAX_TOKENS") {
            self.llm.max_tokens = tokens.parse().map_err(|e| {
                ValidationError::new(
                    "max_tokens",
                    format!("Invalid FORGE_MAX_TOKENS '{}': {}", tokens, e),
                )
                .with_suggestion("Use a positive integer like 2000")
            })?;
        }

        if let Some(timeout) = lookup("FORGE_TIMEOUT_SECONDS") {
            self.llm.timeout_seconds = timeout.parse().map_err(|e| {
                ValidationError::new(
                    "timeout_seconds",
                    format!("Invalid FORGE_TIMEOUT_SECONDS '{}': {}", timeout, e),
                )
                .with_suggestion("Use a positive integer like 60")
            })?;
        }

        if let Some(style) = lookup("FORGE_REQUEST_STYLE") {
            self.llm.request_style = style.parse()?;
        }

        if let Some(path) = lookup("FORGE_PROJECT_PATH") {
            self.project_path = path;
        }

        if let Some(path) = lookup("FORGE_TASKS_PATH") {
            self.tasks_path = path;
        }

        if let Some(kind) = lookup("FORGE_PROJECT_TYPE") {
            self.project_type = kind;
        }

        if let Some(flag) = lookup("FORGE_OVERWRITE") {
            self.overwrite = parse_bool("overwrite", "FORGE_OVERWRITE", &flag)?;
        }

        if let Some(flag) = lookup("FORGE_GIT_INTEGRATION") {
            self.git_integration = parse_bool("git_integration", "FORGE_GIT_INTEGRATION", &flag)?;
        }

        if let Some(level) = lookup("FORGE_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        if let Some(level) = lookup("FORGE_DEBUG_LEVEL") {
            self.debug_level = level.parse()?;
        }

        Ok(())
    }

    /// Validate the configuration settings.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        self.llm.validate()?;
        self.telemetry.validate()?;

        validate_path("project_path", &self.project_path)?;
        validate_path("tasks_path", &self.tasks_path)?;

        if self.project_type.trim().is_empty() {
            return Err(ValidationError::new("project_type", "Project type cannot be empty")
                .with_suggestion("Use a short description like 'web' or 'python'"));
        }

        Ok(())
    }
}

fn parse_bool(field: &str, var: &str, value: &str) -> std::result::Result<bool, ValidationError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::new(field, format!("Invalid {} '{}'", var, value))
            .with_suggestion("Use true or false")),
    }
}

/// Validate a file path configuration value.
///
/// Checks:
/// - Path is not empty
/// - Path doesn't contain null bytes or control characters
/// - Path length stays under common filesystem limits
fn validate_path(field: &str, path: &str) -> std::result::Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::new(field, format!("{} cannot be empty", field))
            .with_suggestion(format!("Set FORGE_{} to a valid path", field.to_uppercase())));
    }

    if path.contains('\0') {
        return Err(ValidationError::new(
            field,
            format!("{} contains invalid null byte", field),
        )
        .with_suggestion("Remove null characters from the path"));
    }

    if path.chars().any(|c| c.is_control() && c != '\t') {
        return Err(ValidationError::new(
            field,
            format!("{} contains invalid control characters", field),
        )
        .with_suggestion("Use only printable characters in paths"));
    }

    if path.len() > 4096 {
        return Err(ValidationError::new(
            field,
            format!("{} is too long ({} chars)", field, path.len()),
        )
        .with_suggestion("Path should be under 4096 characters"));
    }

    Ok(())
}

/// Builder for ForgeConfig with fluent API.
#[derive(Debug, Clone, Default)]
pub struct ForgeConfigBuilder {
    config: ForgeConfig,
}

impl ForgeConfigBuilder {
    /// Set the LLM configuration.
    pub fn llm(mut self, llm: LlmConfig) -> Self {
        self.config.llm = llm;
        self
    }

    /// Set the telemetry configuration.
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Set the output directory.
    pub fn project_path(mut self, path: impl Into<String>) -> Self {
        self.config.project_path = path.into();
        self
    }

    /// Set the task document path.
    pub fn tasks_path(mut self, path: impl Into<String>) -> Self {
        self.config.tasks_path = path.into();
        self
    }

    /// Replace existing files.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    /// Set the project type mentioned in prompts.
    pub fn project_type(mut self, kind: impl Into<String>) -> Self {
        self.config.project_type = kind.into();
        self
    }

    /// Generate a README after all tasks.
    pub fn generate_readme(mut self, enabled: bool) -> Self {
        self.config.generate_readme = enabled;
        self
    }

    /// Set the console verbosity.
    pub fn debug_level(mut self, level: DebugLevel) -> Self {
        self.config.debug_level = level;
        self
    }

    /// Commit written files after each task.
    pub fn git_integration(mut self, enabled: bool) -> Self {
        self.config.git_integration = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> std::result::Result<ForgeConfig, ValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> ForgeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.llm.provider, ProviderKind::LmStudio);
        assert_eq!(config.llm.resolved_model(), "default");
        assert_eq!(
            config.llm.resolved_api_base().as_deref(),
            Some("http://localhost:1234/v1")
        );
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.project_path, "project-code");
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("groq".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("HuggingFace".parse::<ProviderKind>().unwrap(), ProviderKind::HuggingFace);
        let err = "gemini".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.field, "provider");
        assert!(err.suggestion.unwrap().contains("lmstudio"));
    }

    #[test]
    fn test_provider_defaults() {
        for provider in ProviderKind::ALL {
            assert!(!provider.default_model().is_empty());
            assert!(provider.default_api_key_env().ends_with("_KEY") || provider.default_api_key_env().ends_with("_TOKEN"));
        }
        assert!(ProviderKind::Azure.default_api_base().is_none());
        assert!(!ProviderKind::LmStudio.requires_api_key());
        assert!(ProviderKind::OpenAi.requires_api_key());
    }

    #[test]
    fn test_llm_config_validation() {
        assert!(LlmConfig::default().validate().is_ok());

        let err = LlmConfig::default().with_model("").validate().unwrap_err();
        assert_eq!(err.field, "model");

        let err = LlmConfig::default().with_max_tokens(0).validate().unwrap_err();
        assert_eq!(err.field, "max_tokens");

        let err = LlmConfig::default().with_timeout_seconds(0).validate().unwrap_err();
        assert_eq!(err.field, "timeout_seconds");

        let err = LlmConfig::default().with_max_retries(3).validate().unwrap_err();
        assert_eq!(err.field, "max_retries");

        let err = LlmConfig::default().with_api_base("localhost:1234").validate().unwrap_err();
        assert_eq!(err.field, "api_base");
    }

    #[test]
    fn test_temperature_validation() {
        assert!(LlmConfig::default().with_temperature(0.0).validate().is_ok());
        assert!(LlmConfig::default().with_temperature(2.0).validate().is_ok());
        assert!(LlmConfig::default().with_temperature(-0.1).validate().is_err());
        assert!(LlmConfig::default().with_temperature(2.1).validate().is_err());
        assert!(LlmConfig::default().with_temperature(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_azure_requires_api_base() {
        let err = LlmConfig::new(ProviderKind::Azure).validate().unwrap_err();
        assert_eq!(err.field, "api_base");

        let config = LlmConfig::new(ProviderKind::Azure).with_api_base("https://res.openai.azure.com/");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.resolved_api_base().as_deref(),
            Some("https://res.openai.azure.com")
        );
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = ForgeConfig::default();
        config
            .apply_env_with(lookup(&[
                ("FORGE_PROVIDER", "groq"),
                ("FORGE_MODEL", "llama3-8b-8192"),
                ("FORGE_TEMPERATURE", "0.7"),
                ("FORGE_MAX_TOKENS", "512"),
                ("FORGE_OVERWRITE", "yes"),
                ("FORGE_PROJECT_PATH", "out"),
                ("FORGE_DEBUG_LEVEL", "verbose"),
            ]))
            .unwrap();

        assert_eq!(config.llm.provider, ProviderKind::Groq);
        assert_eq!(config.llm.resolved_model(), "llama3-8b-8192");
        assert_eq!(config.llm.temperature, 0.7);
        assert_eq!(config.llm.max_tokens, 512);
        assert!(config.overwrite);
        assert_eq!(config.project_path, "out");
        assert_eq!(config.debug_level, DebugLevel::Verbose);
    }

    #[test]
    fn test_apply_env_invalid_number() {
        let mut config = ForgeConfig::default();
        let err = config
            .apply_env_with(lookup(&[("FORGE_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert_eq!(err.field, "max_tokens");
        assert!(err.message.contains("FORGE_MAX_TOKENS"));
        assert!(err.suggestion.is_some());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
llm:
  provider: anthropic
  max_tokens: 4096
  system_prompt_template: "You build {project_type} projects."
project_path: site
overwrite: true
"#;
        let config = ForgeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.llm.provider, ProviderKind::Anthropic);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.project_path, "site");
        assert!(config.overwrite);
        assert_eq!(config.tasks_path, "tasks.md");
    }

    #[test]
    fn test_from_yaml_empty_is_default() {
        assert_eq!(ForgeConfig::from_yaml_str("  \n").unwrap(), ForgeConfig::default());
    }

    #[test]
    fn test_from_yaml_unknown_provider() {
        let err = ForgeConfig::from_yaml_str("llm:\n  provider: gemini\n").unwrap_err();
        assert!(matches!(err, ForgeError::Serialization(_)));
    }

    #[test]
    fn test_builder_validation() {
        let result = ForgeConfig::builder().project_path("").build();
        assert_eq!(result.unwrap_err().field, "project_path");

        let config = ForgeConfig::builder()
            .project_path("out")
            .overwrite(true)
            .debug_level(DebugLevel::Minimal)
            .build()
            .unwrap();
        assert!(config.overwrite);
        assert!(config.debug_level.is_minimal());

        let unchecked = ForgeConfig::builder().project_path("").build_unchecked();
        assert_eq!(unchecked.project_path, "");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("temperature", "out of range")
            .with_suggestion("Use 0.0 - 2.0");
        assert_eq!(err.to_string(), "temperature: out of range. Use 0.0 - 2.0");
    }

    #[test]
    fn test_debug_level_parse() {
        assert_eq!("Debug".parse::<DebugLevel>().unwrap(), DebugLevel::Debug);
        assert!("loud".parse::<DebugLevel>().is_err());
        assert_eq!(DebugLevel::Verbose.to_string(), "verbose");
    }
}
