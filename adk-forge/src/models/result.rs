//! Per-task outcomes and the run report.

use crate::error::{ForgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Outcome of running one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Title of the originating task
    pub task_title: String,
    /// False only when every step failed
    pub success: bool,
    /// Step notes, newline-joined
    pub message: String,
    /// Paths written, relative to the project root, in write order
    #[serde(default)]
    pub files_written: Vec<String>,
    /// Paths left untouched because they already existed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_skipped: Vec<String>,
    /// Steps that produced at least one file
    #[serde(default)]
    pub steps_succeeded: usize,
    /// Steps that produced nothing
    #[serde(default)]
    pub steps_failed: usize,
    /// Abbreviated hash of the commit holding this task's files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl ExecutionResult {
    /// Create an empty result for a task.
    pub fn new(task_title: impl Into<String>) -> Self {
        Self {
            task_title: task_title.into(),
            success: false,
            message: String::new(),
            files_written: Vec::new(),
            files_skipped: Vec::new(),
            steps_succeeded: 0,
            steps_failed: 0,
            commit: None,
        }
    }

    /// Append a line to the message.
    pub fn add_note(&mut self, note: impl AsRef<str>) {
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(note.as_ref());
    }

    /// Steps attempted so far.
    pub fn steps_attempted(&self) -> usize {
        self.steps_succeeded + self.steps_failed
    }
}

/// Counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub files_written: usize,
    pub files_skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks: {} successful, {} failed, {} files written",
            self.total, self.successful, self.failed, self.files_written
        )?;
        if self.files_skipped > 0 {
            write!(f, ", {} skipped", self.files_skipped)?;
        }
        Ok(())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// One result per executed task, in document order
    pub results: Vec<ExecutionResult>,
    /// The run stopped early on a cancellation request
    #[serde(default)]
    pub cancelled: bool,
    /// README generation outcome, when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<ExecutionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Counts over the task results. README generation is not counted.
    pub fn summary(&self) -> RunSummary {
        let successful = self.results.iter().filter(|r| r.success).count();
        RunSummary {
            total: self.results.len(),
            successful,
            failed: self.results.len() - successful,
            files_written: self.results.iter().map(|r| r.files_written.len()).sum(),
            files_skipped: self.results.iter().map(|r| r.files_skipped.len()).sum(),
        }
    }

    /// True when every task succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| ForgeError::file(path.display().to_string(), e.to_string()))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for result in &self.results {
            let mark = if result.success { "✅" } else { "❌" };
            write!(f, "{} {}", mark, result.task_title)?;
            if !result.files_written.is_empty() {
                write!(f, " [{}]", result.files_written.join(", "))?;
            }
            writeln!(f)?;
        }
        if self.cancelled {
            writeln!(f, "Run cancelled before all tasks completed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, success: bool, files: &[&str]) -> ExecutionResult {
        let mut r = ExecutionResult::new(title);
        r.success = success;
        r.files_written = files.iter().map(|f| f.to_string()).collect();
        r
    }

    fn report(results: Vec<ExecutionResult>) -> RunReport {
        let now = Utc::now();
        RunReport {
            results,
            cancelled: false,
            readme: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_add_note_joins_lines() {
        let mut r = ExecutionResult::new("Page");
        r.add_note("first");
        r.add_note("second");
        assert_eq!(r.message, "first\nsecond");
    }

    #[test]
    fn test_summary_counts() {
        let report = report(vec![
            result("A", true, &["index.html", "styles.css"]),
            result("B", false, &[]),
            result("C", true, &["script.js"]),
        ]);
        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.files_written, 3);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_report_display() {
        let text = report(vec![result("A", true, &["index.html"]), result("B", false, &[])]).to_string();
        assert!(text.contains("✅ A [index.html]"));
        assert!(text.contains("❌ B"));
        assert!(text.starts_with("2 tasks: 1 successful, 1 failed"));
    }

    #[test]
    fn test_report_json() {
        let json = report(vec![result("A", true, &["index.html"])]).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][0]["files_written"][0], "index.html");
        assert_eq!(value["cancelled"], false);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = report(vec![result("A", true, &["index.html"])]);

        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["results"][0]["task_title"], "A");

        let err = report.write_json(&dir.path().join("missing/report.json")).unwrap_err();
        assert!(matches!(err, ForgeError::File { .. }), "{err:?}");
    }
}
