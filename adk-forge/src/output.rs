//! Human-readable progress output.
//!
//! ## Debug Levels
//!
//! - `Minimal`: only errors and the final line
//! - `Normal`: task progress and the run summary (default)
//! - `Verbose`: per-step results and warnings from step notes
//! - `Debug`: everything, including skipped files

use crate::dispatcher::{DispatchObserver, StepOutcome};
use crate::models::{DebugLevel, ExecutionResult, RunReport, Task};
use colored::Colorize;

/// Console output gated by a debug level.
#[derive(Debug, Clone)]
pub struct ForgeOutput {
    level: DebugLevel,
}

impl Default for ForgeOutput {
    fn default() -> Self {
        Self::new(DebugLevel::Normal)
    }
}

impl ForgeOutput {
    pub fn new(level: DebugLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> DebugLevel {
        self.level
    }

    /// Section header (shown at Normal and above).
    pub fn phase(&self, name: &str) {
        if self.level.is_normal() {
            println!("\n{} {}", "▶".bright_cyan(), name.bright_white().bold());
        }
    }

    pub fn status(&self, message: &str) {
        if self.level.is_normal() {
            println!("  {} {}", "•".bright_black(), message);
        }
    }

    pub fn list_item(&self, message: &str) {
        if self.level.is_normal() {
            println!("    {} {}", "─".bright_black(), message);
        }
    }

    pub fn task_start(&self, index: usize, total: usize, title: &str) {
        if self.level.is_normal() {
            println!(
                "  {} [{}/{}] {}",
                "→".bright_blue(),
                index,
                total,
                title.cyan()
            );
        }
    }

    /// Step result (shown at Verbose and above).
    pub fn step(&self, outcome: &StepOutcome) {
        if !self.level.is_verbose() {
            return;
        }
        let mark = if outcome.success() {
            "✓".bright_green()
        } else {
            "✗".bright_red()
        };
        println!(
            "     {} step {} ({})",
            mark,
            outcome.index,
            outcome.artifact.as_str().bright_black()
        );
        for path in &outcome.files_written {
            println!("       {} {}", "+".green(), path);
        }
        if self.level.is_debug() {
            for path in &outcome.files_skipped {
                println!("       {} {} (exists)", "=".bright_black(), path.bright_black());
            }
        }
        for note in &outcome.notes {
            println!("       {} {}", "⚠".bright_yellow(), note.yellow());
        }
    }

    pub fn task_complete(&self, result: &ExecutionResult) {
        if !self.level.is_normal() {
            return;
        }
        if result.success {
            println!(
                "  {} {} ({} files)",
                "✓".bright_green(),
                result.task_title.green(),
                result.files_written.len()
            );
        } else {
            println!("  {} {} failed", "✗".bright_red(), result.task_title.red());
            for line in result.message.lines() {
                println!("     {}", line.bright_black());
            }
        }
    }

    /// Always shown.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗ Error:".bright_red().bold(), message);
    }

    pub fn warn(&self, message: &str) {
        if self.level.is_normal() {
            println!("{} {}", "⚠".bright_yellow(), message.yellow());
        }
    }

    /// Always shown.
    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".bright_green(), message.green());
    }

    pub fn banner(&self) {
        if self.level.is_normal() {
            println!("{}", "adk-forge".cyan().bold());
            println!("{}", "Markdown tasks in, project files out".bright_white());
            println!();
        }
    }

    /// Final summary. Minimal prints a single line.
    pub fn summary(&self, report: &RunReport) {
        let summary = report.summary();
        if self.level.is_minimal() {
            let mark = if report.all_succeeded() { "✓" } else { "✗" };
            println!("{} {}", mark, summary);
            return;
        }

        println!();
        println!("{}", "─".repeat(50).bright_black());
        if report.all_succeeded() && !report.cancelled {
            println!("{} {}", "✓".bright_green(), summary.to_string().green());
        } else {
            println!("{} {}", "⚠".bright_yellow(), summary);
        }
        if let Some(readme) = &report.readme {
            if readme.success {
                println!("  {} README written", "✓".bright_green());
            } else {
                println!("  {} {}", "✗".bright_red(), readme.message);
            }
        }
        if report.cancelled {
            println!("  {} run cancelled", "⚠".bright_yellow());
        }
        println!(
            "  {} {:.1}s",
            "⏱".bright_black(),
            report.duration_ms() as f64 / 1000.0
        );
        println!("{}", "─".repeat(50).bright_black());
    }
}

impl DispatchObserver for ForgeOutput {
    fn on_task_start(&self, index: usize, total: usize, task: &Task) {
        self.task_start(index, total, &task.title);
    }

    fn on_step_complete(&self, _task: &Task, outcome: &StepOutcome) {
        self.step(outcome);
    }

    fn on_task_complete(&self, _task: &Task, result: &ExecutionResult) {
        self.task_complete(result);
    }
}
