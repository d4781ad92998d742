//! Sequential task dispatcher.
//!
//! Tasks run one at a time in document order, and steps in listed order. Each
//! step is classified into an [`ArtifactKind`], turned into a prompt and sent as
//! exactly one LLM call. The response is split into files and written under the
//! project root.
//!
//! Failures stay at step granularity. An LLM error, an empty response or a
//! write error becomes a line in the task's message, and a task only fails
//! when none of its steps produced a file. Nothing short of cancellation
//! stops the run early.
//!
//! With git integration on, each task's written files are committed after its
//! last step. A failed commit is a note on the task, never a task failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_forge::{build_client, DispatchConfig, TaskDispatcher, TaskParser};
//!
//! let tasks = TaskParser::new().load("tasks.md")?;
//! let dispatcher = TaskDispatcher::builder()
//!     .client(build_client(&config.llm)?)
//!     .config(DispatchConfig::from_forge_config(&config))
//!     .build()?;
//! let report = dispatcher.run(&tasks).await;
//! println!("{report}");
//! ```

use crate::error::{ForgeError, LlmError, Result};
use crate::extract::ResponseExtractor;
use crate::git::{commit_message, CommitOutcome, GitCommitter};
use crate::llm::{build_client, CompletionOptions, LlmClient};
use crate::models::{ArtifactKind, ExecutionResult, ForgeConfig, LlmConfig, RequestStyle, RunReport, Task};
use crate::prompts::{PromptBuilder, PromptRequest};
use crate::telemetry::{
    llm_request_span, log_error, log_run_complete, log_run_start, log_step_complete,
    log_task_complete, log_task_start, record_files, record_llm_latency, record_tokens_used,
    run_span, start_timing, step_span, task_execution_span,
};
use crate::writer::FileWriter;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

const README_FILENAME: &str = "README.md";
const README_TITLE: &str = "README";

/// Run settings threaded through the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub project_root: PathBuf,
    /// Replace files that already exist
    pub overwrite: bool,
    /// Substituted for `{project_type}` in the system prompt
    pub project_type: String,
    pub request_style: RequestStyle,
    /// Per-call overrides on top of the client's defaults
    pub options: CompletionOptions,
    pub system_prompt_template: Option<String>,
    /// Ask for a README after the last task
    pub generate_readme: bool,
    /// Commit each task's written files
    pub git_integration: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("project-code"),
            overwrite: false,
            project_type: "web".to_string(),
            request_style: RequestStyle::default(),
            options: CompletionOptions::default(),
            system_prompt_template: None,
            generate_readme: false,
            git_integration: false,
        }
    }
}

impl DispatchConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    pub fn from_forge_config(config: &ForgeConfig) -> Self {
        Self {
            project_root: PathBuf::from(&config.project_path),
            overwrite: config.overwrite,
            project_type: config.project_type.clone(),
            request_style: config.llm.request_style,
            options: CompletionOptions::default(),
            system_prompt_template: config.llm.system_prompt_template.clone(),
            generate_readme: config.generate_readme,
            git_integration: config.git_integration,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_project_type(mut self, project_type: impl Into<String>) -> Self {
        self.project_type = project_type.into();
        self
    }

    pub fn with_request_style(mut self, style: RequestStyle) -> Self {
        self.request_style = style;
        self
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }

    pub fn with_readme(mut self, enabled: bool) -> Self {
        self.generate_readme = enabled;
        self
    }

    pub fn with_git_integration(mut self, enabled: bool) -> Self {
        self.git_integration = enabled;
        self
    }
}

/// What one step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// 1-based position within the task
    pub index: usize,
    pub artifact: ArtifactKind,
    pub files_written: Vec<String>,
    pub files_skipped: Vec<String>,
    /// Failure or warning lines for the task message
    pub notes: Vec<String>,
}

impl StepOutcome {
    fn new(index: usize, artifact: ArtifactKind) -> Self {
        Self {
            index,
            artifact,
            files_written: Vec::new(),
            files_skipped: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn failed(index: usize, artifact: ArtifactKind, note: String) -> Self {
        let mut outcome = Self::new(index, artifact);
        outcome.notes.push(note);
        outcome
    }

    /// A step succeeds when at least one file was written or deliberately
    /// left in place.
    pub fn success(&self) -> bool {
        !self.files_written.is_empty() || !self.files_skipped.is_empty()
    }
}

/// Progress hooks. Every method defaults to doing nothing.
pub trait DispatchObserver: Send + Sync {
    fn on_task_start(&self, _index: usize, _total: usize, _task: &Task) {}

    fn on_step_complete(&self, _task: &Task, _outcome: &StepOutcome) {}

    fn on_task_complete(&self, _task: &Task, _result: &ExecutionResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Runs tasks against one LLM client and one project root.
pub struct TaskDispatcher {
    client: Arc<dyn LlmClient>,
    config: DispatchConfig,
    writer: FileWriter,
    prompts: PromptBuilder,
    extractor: ResponseExtractor,
    git: Option<GitCommitter>,
    observer: Arc<dyn DispatchObserver>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("provider", &self.client.provider())
            .field("model", &self.client.model())
            .field("config", &self.config)
            .finish()
    }
}

impl TaskDispatcher {
    pub fn new(client: Arc<dyn LlmClient>, config: DispatchConfig) -> Self {
        Self::builder().config(config).assemble(client)
    }

    pub fn builder() -> TaskDispatcherBuilder {
        TaskDispatcherBuilder::default()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Token that stops the run between steps when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every task in order and collect the outcomes.
    pub async fn run(&self, tasks: &[Task]) -> RunReport {
        let span = run_span(tasks.len(), &self.config.project_root.display().to_string());
        self.run_inner(tasks).instrument(span).await
    }

    async fn run_inner(&self, tasks: &[Task]) -> RunReport {
        let started_at = Utc::now();
        let _timing = start_timing("forge.run");
        log_run_start(tasks.len(), self.client.provider().as_str(), self.client.model());

        if let Err(e) = self.writer.ensure_root() {
            // Each write reports the same error again; the run still proceeds.
            log_error("project_root", &e.to_string());
        }

        let mut results = Vec::with_capacity(tasks.len());
        let mut cancelled = false;

        for (index, task) in tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.observer.on_task_start(index + 1, tasks.len(), task);
            let (result, interrupted) = self.run_task(task).await;
            self.observer.on_task_complete(task, &result);
            results.push(result);
            if interrupted {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            warn!(completed = results.len(), total = tasks.len(), "Run cancelled");
        }

        let readme = if self.config.generate_readme && !cancelled {
            Some(self.generate_readme(&results).await)
        } else {
            None
        };

        let report = RunReport {
            results,
            cancelled,
            readme,
            started_at,
            finished_at: Utc::now(),
        };
        let summary = report.summary();
        log_run_complete(summary.successful, summary.failed, cancelled);
        report
    }

    /// Returns the result and whether cancellation cut the task short.
    async fn run_task(&self, task: &Task) -> (ExecutionResult, bool) {
        let label = task.label().to_string();
        let span = task_execution_span(&label, task.steps.len());
        async {
            let timing = start_timing(format!("task:{label}"));
            log_task_start(&label, task.steps.len());

            let mut result = ExecutionResult::new(&task.title);
            if task.steps.is_empty() {
                result.add_note("Task has no steps");
                log_task_complete(&label, false, timing.elapsed_ms());
                return (result, false);
            }

            let mut notes = Vec::new();
            let mut interrupted = false;
            for (i, step) in task.steps.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    notes.push(format!("Cancelled before step {}", i + 1));
                    interrupted = true;
                    break;
                }

                let outcome = self
                    .run_step(task, i + 1, step)
                    .instrument(step_span(i + 1, ArtifactKind::classify(step).as_str()))
                    .await;
                log_step_complete(
                    &label,
                    outcome.index,
                    outcome.artifact.as_str(),
                    outcome.success(),
                    outcome.files_written.len() + outcome.files_skipped.len(),
                );
                self.observer.on_step_complete(task, &outcome);

                if outcome.success() {
                    result.steps_succeeded += 1;
                } else {
                    result.steps_failed += 1;
                }
                result.files_written.extend(outcome.files_written);
                result.files_skipped.extend(outcome.files_skipped);
                notes.extend(outcome.notes);
            }

            if let Some(note) = self.commit_written(&task.heading(), &mut result) {
                notes.push(note);
            }

            result.success = result.steps_succeeded > 0;
            result.add_note(status_line(&result, task.steps.len()));
            for note in notes {
                result.add_note(note);
            }

            log_task_complete(&label, result.success, timing.elapsed_ms());
            (result, interrupted)
        }
        .instrument(span)
        .await
    }

    async fn run_step(&self, task: &Task, index: usize, step: &str) -> StepOutcome {
        let kind = ArtifactKind::classify(step);
        debug!(step = %step, artifact = %kind, "Dispatching step");

        let existing_markup = match kind {
            ArtifactKind::Stylesheet => self.writer.read(ArtifactKind::Markup.default_filename()),
            _ => None,
        };
        let user_prompt = self.prompts.step_prompt(task, step, kind, existing_markup.as_deref());
        let request = self.prompts.request(self.config.request_style, kind, user_prompt);

        let text = match self.call_llm(request).await {
            Ok(text) => text,
            Err(e) => return StepOutcome::failed(index, kind, format!("Step {index}: {e}")),
        };

        let files = self.extractor.extract(&text, kind.default_filename());
        if files.is_empty() {
            let note = format!("Step {index}: {}", no_files_reason(&text));
            return StepOutcome::failed(index, kind, note);
        }

        let mut outcome = StepOutcome::new(index, kind);
        for file in files {
            match self.writer.write(&file.path, &file.content) {
                Ok(written) if written.is_skipped() => {
                    info!(path = %written.path, "File exists, skipped");
                    outcome.files_skipped.push(written.path);
                }
                Ok(written) => outcome.files_written.push(written.path),
                Err(e) => {
                    log_error("file_write", &e.to_string());
                    outcome.notes.push(format!("Step {index}: {e}"));
                }
            }
        }
        record_files(outcome.files_written.len() as u64, outcome.files_skipped.len() as u64);
        outcome
    }

    /// Commit the result's written files when git integration is on.
    /// Returns a note when the commit failed.
    fn commit_written(&self, heading: &str, result: &mut ExecutionResult) -> Option<String> {
        let git = self.git.as_ref()?;
        if result.files_written.is_empty() {
            return None;
        }
        let message = commit_message(heading, &result.files_written);
        match git.commit_files(&result.files_written, &message) {
            Ok(CommitOutcome::Committed(hash)) => {
                result.commit = Some(hash);
                None
            }
            Ok(CommitOutcome::NothingToCommit) => None,
            Err(e) => {
                log_error("git_commit", &e.to_string());
                Some(format!("Git commit failed: {e}"))
            }
        }
    }

    /// One LLM call, timed and traced.
    async fn call_llm(&self, request: PromptRequest) -> std::result::Result<String, LlmError> {
        let provider = self.client.provider().as_str();
        let model = self.client.model().to_string();
        let options = &self.config.options;
        let started = Instant::now();

        let result = async {
            match request {
                PromptRequest::Chat(messages) => self.client.chat(&messages, options).await,
                PromptRequest::Completion(prompt) => self.client.complete(&prompt, options).await,
            }
        }
        .instrument(llm_request_span(&model, provider))
        .await;

        record_llm_latency(started.elapsed().as_secs_f64(), &model, provider);
        let completion = result?;
        if let Some(usage) = completion.usage {
            record_tokens_used(usage.prompt_tokens + usage.completion_tokens, &completion.model);
        }
        Ok(completion.text)
    }

    /// One extra call listing the written files. Reported on its own.
    async fn generate_readme(&self, results: &[ExecutionResult]) -> ExecutionResult {
        let mut files: Vec<String> = Vec::new();
        for path in results.iter().flat_map(|r| r.files_written.iter().chain(&r.files_skipped)) {
            if !files.contains(path) {
                files.push(path.clone());
            }
        }

        let mut result = ExecutionResult::new(README_TITLE);
        let kind = ArtifactKind::Generic;
        let prompt = self.prompts.readme_prompt(&files);
        let request = self.prompts.request(self.config.request_style, kind, prompt);

        let text = match self.call_llm(request).await {
            Ok(text) => text,
            Err(e) => {
                result.steps_failed = 1;
                result.add_note(format!("README generation failed: {e}"));
                return result;
            }
        };

        let extracted = self.extractor.extract(&text, README_FILENAME);
        if extracted.is_empty() {
            result.steps_failed = 1;
            result.add_note(format!("README generation failed: {}", no_files_reason(&text)));
            return result;
        }

        for file in extracted {
            match self.writer.write(&file.path, &file.content) {
                Ok(written) if written.is_skipped() => result.files_skipped.push(written.path),
                Ok(written) => result.files_written.push(written.path),
                Err(e) => result.add_note(e.to_string()),
            }
        }
        if let Some(note) = self.commit_written(README_TITLE, &mut result) {
            result.add_note(note);
        }
        result.success = !result.files_written.is_empty() || !result.files_skipped.is_empty();
        if result.success {
            result.steps_succeeded = 1;
        } else {
            result.steps_failed = 1;
        }
        record_files(result.files_written.len() as u64, result.files_skipped.len() as u64);
        result
    }
}

/// Why a non-error reply produced no files.
fn no_files_reason(text: &str) -> &'static str {
    if text.trim().is_empty() {
        "LLM returned an empty response"
    } else {
        "response contained only empty code blocks"
    }
}

fn status_line(result: &ExecutionResult, total: usize) -> String {
    let done = result.steps_succeeded;
    if result.steps_attempted() < total {
        format!("Completed {done} of {total} steps before cancellation")
    } else if done == total {
        format!("Completed {done} of {total} steps")
    } else if done > 0 {
        format!("Completed {done} of {total} steps with warnings")
    } else {
        format!("All {total} steps failed")
    }
}

/// Builder for [`TaskDispatcher`].
#[derive(Default)]
pub struct TaskDispatcherBuilder {
    client: Option<Arc<dyn LlmClient>>,
    config: Option<DispatchConfig>,
    observer: Option<Arc<dyn DispatchObserver>>,
    cancel: Option<CancellationToken>,
}

impl TaskDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        config.project_root = root.into();
        self.config = Some(config);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the dispatcher. Fails when no client was given.
    pub fn build(mut self) -> Result<TaskDispatcher> {
        let client = self
            .client
            .take()
            .ok_or_else(|| ForgeError::config("TaskDispatcher requires an LLM client"))?;
        Ok(self.assemble(client))
    }

    fn assemble(self, client: Arc<dyn LlmClient>) -> TaskDispatcher {
        let config = self.config.unwrap_or_default();
        TaskDispatcher {
            writer: FileWriter::new(&config.project_root, config.overwrite),
            prompts: PromptBuilder::new(&config.project_type, config.system_prompt_template.clone()),
            extractor: ResponseExtractor::new(),
            git: config.git_integration.then(|| GitCommitter::new(&config.project_root)),
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            cancel: self.cancel.unwrap_or_default(),
            client,
            config,
        }
    }
}

/// Run tasks with a client built from `llm_config`.
///
/// Only a client construction failure is returned as an error. Task and step
/// failures are reported in the results.
pub async fn run(
    tasks: &[Task],
    llm_config: &LlmConfig,
    project_root: impl AsRef<Path>,
) -> Result<Vec<ExecutionResult>> {
    let client = build_client(llm_config)?;
    let config = DispatchConfig::new(project_root.as_ref())
        .with_request_style(llm_config.request_style);
    let config = match &llm_config.system_prompt_template {
        Some(template) => config.with_system_prompt_template(template.clone()),
        None => config,
    };
    Ok(TaskDispatcher::new(client, config).run(tasks).await.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn dispatcher(client: MockLlmClient, root: &Path) -> TaskDispatcher {
        TaskDispatcher::builder()
            .client(Arc::new(client))
            .config(DispatchConfig::new(root))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_client() {
        let err = TaskDispatcher::builder().build().unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)));
    }

    #[test]
    fn test_status_line() {
        let mut result = ExecutionResult::new("t");
        result.steps_succeeded = 2;
        assert_eq!(status_line(&result, 2), "Completed 2 of 2 steps");
        result.steps_failed = 1;
        assert_eq!(status_line(&result, 3), "Completed 2 of 3 steps with warnings");
        result.steps_succeeded = 0;
        assert_eq!(status_line(&result, 1), "All 1 steps failed");
        assert_eq!(status_line(&result, 4), "Completed 0 of 4 steps before cancellation");
    }

    #[tokio::test]
    async fn test_zero_step_task_fails() {
        let dir = TempDir::new().unwrap();
        let client = MockLlmClient::new();
        let d = dispatcher(client, dir.path());
        let report = d.run(&[Task::new("Empty")]).await;

        assert_eq!(report.results.len(), 1);
        assert!(!report.results[0].success);
        assert_eq!(report.results[0].message, "Task has no steps");
    }

    #[tokio::test]
    async fn test_stylesheet_step_sees_existing_markup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<nav class=\"top\"></nav>").unwrap();
        let client = Arc::new(MockLlmClient::new().with_response("```css\nnav{}\n```"));
        let d = TaskDispatcher::new(client.clone(), DispatchConfig::new(dir.path()));

        let task = Task::new("Style").with_step("Add CSS styling");
        let report = d.run(&[task]).await;

        assert!(report.results[0].success);
        assert_eq!(report.results[0].files_written, vec!["styles.css"]);
        assert!(client.prompts()[0].contains("<nav class=\"top\"></nav>"));
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DispatchObserver for Recorder {
        fn on_task_start(&self, index: usize, total: usize, task: &Task) {
            self.events.lock().unwrap().push(format!("start {index}/{total} {}", task.title));
        }

        fn on_step_complete(&self, _task: &Task, outcome: &StepOutcome) {
            self.events.lock().unwrap().push(format!("step {} {}", outcome.index, outcome.success()));
        }

        fn on_task_complete(&self, task: &Task, result: &ExecutionResult) {
            self.events.lock().unwrap().push(format!("done {} {}", task.title, result.success));
        }
    }

    #[tokio::test]
    async fn test_observer_sees_events_in_order() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let client = MockLlmClient::new().with_response("hello").with_response("");
        let d = TaskDispatcher::builder()
            .client(Arc::new(client))
            .project_root(dir.path())
            .observer(recorder.clone())
            .build()
            .unwrap();

        let task = Task::new("Notes").with_step("write notes").with_step("write more");
        d.run(&[task]).await;

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start 1/1 Notes", "step 1 true", "step 2 false", "done Notes true"]);
    }

    #[tokio::test]
    async fn test_completion_style_uses_complete() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(MockLlmClient::new().with_response("text"));
        let config = DispatchConfig::new(dir.path())
            .with_request_style(RequestStyle::Completion)
            .with_system_prompt_template("SYSTEM {project_type}");
        let d = TaskDispatcher::new(client.clone(), config);

        d.run(&[Task::new("T").with_step("write notes")]).await;
        // complete() records the whole prompt, system part included
        assert!(client.prompts()[0].starts_with("SYSTEM web\n\n"));
    }

    #[tokio::test]
    async fn test_readme_generation() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(
            MockLlmClient::new()
                .with_response("```html filepath:index.html\n<p/>\n```")
                .with_response("# Site\n\nA page."),
        );
        let config = DispatchConfig::new(dir.path()).with_readme(true);
        let d = TaskDispatcher::new(client.clone(), config);

        let report = d.run(&[Task::new("Page").with_step("Create html page")]).await;
        let readme = report.readme.as_ref().expect("readme result");
        assert!(readme.success);
        assert_eq!(readme.files_written, vec!["README.md"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "# Site\n\nA page."
        );
        assert!(client.prompts()[1].contains("- index.html"));
        assert_eq!(report.summary().total, 1);
    }
}
