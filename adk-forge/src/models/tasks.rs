//! Task document parsing.
//!
//! A task document is plain markdown:
//!
//! ```markdown
//! # Landing page
//!
//! ## Task 1: Make page
//! A single-page site for the bakery.
//! - Create an html file with a header and a menu section
//! - Add CSS styling for the menu
//!
//! ## Task 2: Interactivity
//! - Add javascript to toggle the menu
//! ```
//!
//! Each level-2 heading opens a task and closes the previous one. List items
//! beneath it are the task's steps, in order. Other text under a heading is
//! kept as the task description. Everything else is ignored.

use crate::error::ParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// `Task 3: Title`, `task A-1 - Title`, `TASK 2. Title`
static TASK_PREFIX: OnceLock<Regex> = OnceLock::new();

/// `1. step` or `1) step`
static ORDERED_ITEM: OnceLock<Regex> = OnceLock::new();

fn task_prefix_regex() -> &'static Regex {
    TASK_PREFIX.get_or_init(|| {
        Regex::new(r"(?i)^task\s+([A-Za-z0-9._-]*\d[A-Za-z0-9._-]*)\s*[:.\-]\s*(.*)$")
            .expect("task prefix pattern is valid")
    })
}

fn ordered_item_regex() -> &'static Regex {
    ORDERED_ITEM.get_or_init(|| {
        Regex::new(r"^\d+[.)]\s+(.*)$").expect("ordered item pattern is valid")
    })
}

/// One unit of work parsed from the task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier from a `Task N:` prefix, if the heading had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Heading text without the prefix
    pub title: String,
    /// Free text found under the heading
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Instructions, one LLM call each
    #[serde(default)]
    pub steps: Vec<String>,
}

impl Task {
    /// Create a task with no steps.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    /// Add a step.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Label used in logs and summaries: the id when present, else the title.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.title)
    }

    /// Heading text as written: `Task 1: Page`, or the bare title.
    pub fn heading(&self) -> String {
        match self.id {
            Some(ref id) => format!("Task {}: {}", id, self.title),
            None => self.title.clone(),
        }
    }

    fn push_description_line(&mut self, line: &str) {
        if !self.description.is_empty() {
            self.description.push('\n');
        }
        self.description.push_str(line);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} steps)", self.heading(), self.steps.len())
    }
}

/// Markdown task parser.
#[derive(Debug, Clone, Default)]
pub struct TaskParser;

impl TaskParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a task document.
    ///
    /// A document without headings yields an empty list. Every heading yields
    /// a task, including headings that repeat an earlier title.
    pub fn parse(&self, markdown: &str) -> Result<Vec<Task>, ParseError> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, raw) in markdown.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(heading) = task_heading(line) {
                if heading.is_empty() {
                    continue;
                }
                let (id, title) = split_title(heading);
                if let Some(&first_line) = seen.get(&title) {
                    warn!(line = line_no, first_line, title = %title, "Task title repeats an earlier heading");
                } else {
                    seen.insert(title.clone(), line_no);
                }
                tasks.push(Task {
                    id,
                    title,
                    description: String::new(),
                    steps: Vec::new(),
                });
                continue;
            }

            // Other heading levels are document structure, not tasks.
            if line.starts_with('#') {
                continue;
            }

            match (list_item(line), tasks.last_mut()) {
                (Some(step), Some(task)) => {
                    if !step.is_empty() {
                        task.steps.push(step.to_string());
                    }
                }
                (Some(step), None) => {
                    warn!(line = line_no, step = %step, "Ignoring list item before the first task heading");
                }
                (None, Some(task)) => task.push_description_line(line),
                (None, None) => {}
            }
        }

        Ok(tasks)
    }

    /// Read and parse a task file.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<Task>, ParseError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.parse(&content)
    }
}

/// Parse a task document with the default parser.
pub fn parse_tasks(markdown: &str) -> Result<Vec<Task>, ParseError> {
    TaskParser::new().parse(markdown)
}

/// Heading text of a level-2 heading line.
fn task_heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("##")?;
    if rest.starts_with('#') {
        return None;
    }
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    // Closing hashes are optional in ATX headings.
    let text = rest.trim().trim_end_matches('#').trim_end();
    Some(text)
}

fn split_title(heading: &str) -> (Option<String>, String) {
    if let Some(caps) = task_prefix_regex().captures(heading) {
        let id = caps[1].to_string();
        let title = caps[2].trim();
        if !title.is_empty() {
            return (Some(id), title.to_string());
        }
        return (Some(id), heading.to_string());
    }
    (None, heading.to_string())
}

/// Text of a list item line, without its marker.
fn list_item(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(strip_checkbox(rest.trim()));
        }
    }
    if matches!(line, "-" | "*" | "+") {
        return Some("");
    }
    ordered_item_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_checkbox(m.as_str().trim()))
}

fn strip_checkbox(item: &str) -> &str {
    for box_marker in ["[ ] ", "[x] ", "[X] "] {
        if let Some(rest) = item.strip_prefix(box_marker) {
            return rest.trim_start();
        }
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_document() {
        let doc = "# Site\n\n## Task 1: Make page\n- Create an html file\n- Add a footer\n\n## Task 2: Style\n* Add CSS\n";
        let tasks = parse_tasks(doc).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_deref(), Some("1"));
        assert_eq!(tasks[0].title, "Make page");
        assert_eq!(tasks[0].steps, vec!["Create an html file", "Add a footer"]);
        assert_eq!(tasks[1].title, "Style");
        assert_eq!(tasks[1].steps, vec!["Add CSS"]);
    }

    #[test]
    fn test_heading_without_prefix() {
        let tasks = parse_tasks("## Setup\n- init").unwrap();
        assert_eq!(tasks[0].id, None);
        assert_eq!(tasks[0].title, "Setup");
        assert_eq!(tasks[0].label(), "Setup");
    }

    #[test]
    fn test_prefix_without_title_keeps_heading() {
        let tasks = parse_tasks("## Task 3:\n- step").unwrap();
        assert_eq!(tasks[0].id.as_deref(), Some("3"));
        assert_eq!(tasks[0].title, "Task 3:");
    }

    #[test]
    fn test_task_word_without_number_is_title() {
        let tasks = parse_tasks("## Task management: overview\n- a").unwrap();
        assert_eq!(tasks[0].id, None);
        assert_eq!(tasks[0].title, "Task management: overview");
    }

    #[test]
    fn test_zero_headings_is_empty() {
        assert!(parse_tasks("").unwrap().is_empty());
        assert!(parse_tasks("just prose\n- orphan bullet\n# Title only").unwrap().is_empty());
    }

    #[test]
    fn test_other_heading_levels_ignored() {
        let doc = "## One\n### Details\n- a\n#### deeper\n- b\n##Two\n## Three ##\n- c";
        let tasks = parse_tasks(doc).unwrap();
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Three"]);
        assert_eq!(tasks[0].steps, vec!["a", "b"]);
        assert_eq!(tasks[1].steps, vec!["c"]);
    }

    #[test]
    fn test_ordered_and_checkbox_items() {
        let doc = "## Build\n1. first\n2) second\n- [ ] third\n- [x] fourth";
        let tasks = parse_tasks(doc).unwrap();
        assert_eq!(tasks[0].steps, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_description_lines() {
        let doc = "## Page\nA bakery site.\nKeep it simple.\n- Create html";
        let tasks = parse_tasks(doc).unwrap();
        assert_eq!(tasks[0].description, "A bakery site.\nKeep it simple.");
        assert_eq!(tasks[0].steps.len(), 1);
    }

    #[test]
    fn test_duplicate_titles_kept() {
        let tasks = parse_tasks("## Task 1: Page\n- a\n## Task 2: Page\n- b").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_deref(), Some("1"));
        assert_eq!(tasks[0].steps, vec!["a"]);
        assert_eq!(tasks[1].id.as_deref(), Some("2"));
        assert_eq!(tasks[1].steps, vec!["b"]);
        assert!(tasks.iter().all(|t| t.title == "Page"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TaskParser::new().load("/definitely/not/here.md").unwrap_err();
        assert!(matches!(err, ParseError::Unreadable { .. }));
    }

    #[test]
    fn test_task_display() {
        let task = Task::new("Page").with_step("a").with_step("b");
        assert_eq!(task.to_string(), "Page (2 steps)");
    }
}
