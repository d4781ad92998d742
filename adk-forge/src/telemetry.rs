//! Telemetry instrumentation for forge runs.
//!
//! ## Spans
//!
//! - `forge.run` - one dispatcher run over a task list
//! - `forge.task_execution` - one task
//! - `forge.step` - one step of a task
//! - `forge.llm_request` - each call to the language model
//!
//! ## Metrics
//!
//! - `forge_tasks_completed` / `forge_tasks_failed` (counters)
//! - `forge_steps_total` (counter, `outcome` attribute)
//! - `forge_files_written` / `forge_files_skipped` (counters)
//! - `forge_llm_latency_seconds` (histogram)
//! - `forge_tokens_used` (counter)
//!
//! Event logs use the `forge.events` target, metric logs `forge.metrics` and
//! timing logs `forge.timing`, so each can be filtered on its own.

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info_span, Span};

static METRICS: OnceLock<ForgeMetrics> = OnceLock::new();

static OTEL_METRICS: OnceLock<ForgeOtelMetrics> = OnceLock::new();

/// Process-wide local counters.
pub fn metrics() -> &'static ForgeMetrics {
    METRICS.get_or_init(ForgeMetrics::new)
}

/// Process-wide OpenTelemetry instruments. Without an installed meter
/// provider these are no-ops.
pub fn otel_metrics() -> &'static ForgeOtelMetrics {
    OTEL_METRICS.get_or_init(|| {
        let meter = opentelemetry::global::meter("adk-forge");
        ForgeOtelMetrics::new(meter)
    })
}

/// OpenTelemetry instruments for a run.
pub struct ForgeOtelMetrics {
    pub tasks_completed_counter: Counter<u64>,
    pub tasks_failed_counter: Counter<u64>,
    pub steps_counter: Counter<u64>,
    pub files_written_counter: Counter<u64>,
    pub files_skipped_counter: Counter<u64>,
    pub llm_latency_histogram: Histogram<f64>,
    pub tokens_counter: Counter<u64>,
}

impl ForgeOtelMetrics {
    pub fn new(meter: Meter) -> Self {
        let tasks_completed_counter = meter
            .u64_counter("forge_tasks_completed")
            .with_description("Tasks with at least one successful step")
            .init();

        let tasks_failed_counter = meter
            .u64_counter("forge_tasks_failed")
            .with_description("Tasks where no step succeeded")
            .init();

        let steps_counter = meter
            .u64_counter("forge_steps_total")
            .with_description("Steps executed, by outcome")
            .init();

        let files_written_counter = meter
            .u64_counter("forge_files_written")
            .with_description("Files created or overwritten")
            .init();

        let files_skipped_counter = meter
            .u64_counter("forge_files_skipped")
            .with_description("Files left alone because they already existed")
            .init();

        let llm_latency_histogram = meter
            .f64_histogram("forge_llm_latency_seconds")
            .with_description("LLM response latency in seconds")
            .init();

        let tokens_counter = meter
            .u64_counter("forge_tokens_used")
            .with_description("Tokens reported by the LLM")
            .init();

        Self {
            tasks_completed_counter,
            tasks_failed_counter,
            steps_counter,
            files_written_counter,
            files_skipped_counter,
            llm_latency_histogram,
            tokens_counter,
        }
    }

    pub fn record_task(&self, task: &str, success: bool) {
        let attrs = [KeyValue::new("task", task.to_string())];
        if success {
            self.tasks_completed_counter.add(1, &attrs);
        } else {
            self.tasks_failed_counter.add(1, &attrs);
        }
    }

    pub fn record_step(&self, artifact: &str, success: bool) {
        self.steps_counter.add(
            1,
            &[
                KeyValue::new("artifact", artifact.to_string()),
                KeyValue::new("outcome", if success { "success" } else { "failure" }),
            ],
        );
    }

    pub fn record_files(&self, written: u64, skipped: u64) {
        if written > 0 {
            self.files_written_counter.add(written, &[]);
        }
        if skipped > 0 {
            self.files_skipped_counter.add(skipped, &[]);
        }
    }

    pub fn record_llm_latency(&self, duration_secs: f64, model: &str, provider: &str) {
        self.llm_latency_histogram.record(
            duration_secs,
            &[
                KeyValue::new("model", model.to_string()),
                KeyValue::new("provider", provider.to_string()),
            ],
        );
    }

    pub fn record_tokens(&self, tokens: u64, model: &str) {
        self.tokens_counter
            .add(tokens, &[KeyValue::new("model", model.to_string())]);
    }
}

/// Simple atomic counters for local tracking.
#[derive(Debug)]
pub struct ForgeMetrics {
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub steps_succeeded: AtomicU64,
    pub steps_failed: AtomicU64,
    pub files_written: AtomicU64,
    pub files_skipped: AtomicU64,
    pub llm_requests: AtomicU64,
    pub tokens_used: AtomicU64,
}

impl ForgeMetrics {
    pub fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            steps_succeeded: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            files_written: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            llm_requests: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
        }
    }

    pub fn inc_tasks(&self, success: bool) {
        let counter = if success { &self.tasks_completed } else { &self.tasks_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_steps(&self, success: bool) {
        let counter = if success { &self.steps_succeeded } else { &self.steps_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_files(&self, written: u64, skipped: u64) {
        self.files_written.fetch_add(written, Ordering::Relaxed);
        self.files_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn inc_llm_requests(&self) {
        self.llm_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tokens(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn get_tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn get_tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn get_files_written(&self) -> u64 {
        self.files_written.load(Ordering::Relaxed)
    }

    pub fn get_llm_requests(&self) -> u64 {
        self.llm_requests.load(Ordering::Relaxed)
    }

    pub fn get_tokens(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    /// Reset all counters (useful for testing).
    pub fn reset(&self) {
        for counter in [
            &self.tasks_completed,
            &self.tasks_failed,
            &self.steps_succeeded,
            &self.steps_failed,
            &self.files_written,
            &self.files_skipped,
            &self.llm_requests,
            &self.tokens_used,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ForgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Span Helpers
// ============================================================================

pub fn run_span(task_count: usize, project_root: &str) -> Span {
    info_span!(
        "forge.run",
        otel.name = "Forge Run",
        task_count = %task_count,
        project_root = %project_root
    )
}

pub fn task_execution_span(task: &str, step_count: usize) -> Span {
    info_span!(
        "forge.task_execution",
        otel.name = "Task Execution",
        task = %task,
        step_count = %step_count
    )
}

pub fn step_span(index: usize, artifact: &str) -> Span {
    info_span!(
        "forge.step",
        otel.name = "Step",
        step = %index,
        artifact = %artifact
    )
}

pub fn llm_request_span(model: &str, provider: &str) -> Span {
    info_span!(
        "forge.llm_request",
        otel.name = "LLM Request",
        model = %model,
        provider = %provider
    )
}

// ============================================================================
// Timing Helpers
// ============================================================================

/// Logs the elapsed time on drop.
pub struct TimingGuard {
    start: Instant,
    name: String,
}

impl TimingGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        tracing::debug!(
            target: "forge.timing",
            name = %self.name,
            duration_ms = %self.start.elapsed().as_millis(),
            "Operation completed"
        );
    }
}

pub fn start_timing(name: impl Into<String>) -> TimingGuard {
    TimingGuard::new(name)
}

// ============================================================================
// Event Logging Helpers
// ============================================================================

pub fn log_run_start(task_count: usize, provider: &str, model: &str) {
    tracing::info!(
        target: "forge.events",
        event = "run_start",
        task_count = %task_count,
        provider = %provider,
        model = %model,
        "Starting run"
    );
}

pub fn log_task_start(task: &str, step_count: usize) {
    tracing::info!(
        target: "forge.events",
        event = "task_start",
        task = %task,
        step_count = %step_count,
        "Starting task"
    );
}

pub fn log_step_complete(task: &str, index: usize, artifact: &str, success: bool, files: usize) {
    metrics().inc_steps(success);
    otel_metrics().record_step(artifact, success);
    if success {
        tracing::debug!(
            target: "forge.events",
            event = "step_complete",
            task = %task,
            step = %index,
            artifact = %artifact,
            files = %files,
            "Step completed"
        );
    } else {
        tracing::warn!(
            target: "forge.events",
            event = "step_failed",
            task = %task,
            step = %index,
            artifact = %artifact,
            "Step failed"
        );
    }
}

pub fn log_task_complete(task: &str, success: bool, duration_ms: u64) {
    metrics().inc_tasks(success);
    otel_metrics().record_task(task, success);
    if success {
        tracing::info!(
            target: "forge.events",
            event = "task_complete",
            task = %task,
            duration_ms = %duration_ms,
            "Task completed successfully"
        );
    } else {
        tracing::warn!(
            target: "forge.events",
            event = "task_failed",
            task = %task,
            duration_ms = %duration_ms,
            "Task failed"
        );
    }
}

pub fn log_run_complete(successful: usize, failed: usize, cancelled: bool) {
    tracing::info!(
        target: "forge.events",
        event = "run_complete",
        successful = %successful,
        failed = %failed,
        cancelled = %cancelled,
        "Run completed"
    );
}

pub fn log_error(context: &str, error: &str) {
    tracing::error!(
        target: "forge.events",
        event = "error",
        context = %context,
        error = %error,
        "Error occurred"
    );
}

pub fn record_files(written: u64, skipped: u64) {
    metrics().add_files(written, skipped);
    otel_metrics().record_files(written, skipped);
}

pub fn record_llm_latency(duration_secs: f64, model: &str, provider: &str) {
    metrics().inc_llm_requests();
    otel_metrics().record_llm_latency(duration_secs, model, provider);
    tracing::debug!(
        target: "forge.metrics",
        metric = "llm_latency",
        duration_secs = %duration_secs,
        model = %model,
        provider = %provider,
        "LLM latency recorded"
    );
}

pub fn record_tokens_used(tokens: u64, model: &str) {
    metrics().add_tokens(tokens);
    otel_metrics().record_tokens(tokens, model);
    tracing::debug!(
        target: "forge.metrics",
        metric = "tokens_used",
        tokens = %tokens,
        model = %model,
        "Tokens recorded"
    );
}
