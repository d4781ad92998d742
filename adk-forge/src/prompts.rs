//! Prompt templates per artifact kind.

use crate::llm::ChatMessage;
use crate::models::{ArtifactKind, RequestStyle, Task};
use regex::Regex;
use std::sync::OnceLock;

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert software developer working on a {project_type} project. \
You are currently producing {artifact} files. Write complete, working file contents, never placeholders or \
partial snippets. Put every file in its own fenced code block and name it with a filepath tag on the opening fence.";

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Replace `{name}` placeholders. Unknown names are left as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Builds the request for one step.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_template: String,
    project_type: String,
}

impl PromptBuilder {
    pub fn new(project_type: impl Into<String>, system_template: Option<String>) -> Self {
        Self {
            system_template: system_template
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            project_type: project_type.into(),
        }
    }

    pub fn system_prompt(&self, kind: ArtifactKind) -> String {
        render_template(
            &self.system_template,
            &[("project_type", &self.project_type), ("artifact", kind.as_str())],
        )
    }

    /// User prompt for one step. `existing_markup` is the current page, sent
    /// with stylesheet steps so selectors match.
    pub fn step_prompt(
        &self,
        task: &Task,
        step: &str,
        kind: ArtifactKind,
        existing_markup: Option<&str>,
    ) -> String {
        let mut prompt = format!("Task: {}\n", task.title);
        if !task.description.is_empty() {
            prompt.push_str(&format!("Context: {}\n", task.description));
        }
        prompt.push_str(&format!("Step: {}\n\n", step));
        prompt.push_str(kind_instructions(kind));
        prompt.push_str("\n\n");

        if let Some(markup) = existing_markup.filter(|_| kind == ArtifactKind::Stylesheet) {
            prompt.push_str("Current index.html:\n```html\n");
            prompt.push_str(markup.trim_end());
            prompt.push_str("\n```\n\n");
        }

        prompt.push_str(&format_instructions(kind.fence_language(), kind.default_filename()));
        prompt
    }

    /// Prompt asking for a README over the files produced by a run.
    pub fn readme_prompt(&self, files: &[String]) -> String {
        let listing = if files.is_empty() {
            "(no files were generated)".to_string()
        } else {
            files.iter().map(|f| format!("- {}", f)).collect::<Vec<_>>().join("\n")
        };
        format!(
            "Write a README.md for this {} project.\n\nFiles:\n{}\n\n\
             Describe what the project does, how the files fit together and how to run it.\n\n{}",
            self.project_type,
            listing,
            format_instructions("markdown", "README.md")
        )
    }

    /// Messages for a chat request.
    pub fn messages(&self, kind: ArtifactKind, user_prompt: String) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system_prompt(kind)), ChatMessage::user(user_prompt)]
    }

    /// Single prompt for a completion request.
    pub fn completion_prompt(&self, kind: ArtifactKind, user_prompt: &str) -> String {
        format!("{}\n\n{}", self.system_prompt(kind), user_prompt)
    }

    /// Request payload in the configured style.
    pub fn request(&self, style: RequestStyle, kind: ArtifactKind, user_prompt: String) -> PromptRequest {
        match style {
            RequestStyle::Chat => PromptRequest::Chat(self.messages(kind, user_prompt)),
            RequestStyle::Completion => PromptRequest::Completion(self.completion_prompt(kind, &user_prompt)),
        }
    }
}

/// A rendered request.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptRequest {
    Chat(Vec<ChatMessage>),
    Completion(String),
}

fn kind_instructions(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Markup => {
            "Create a complete HTML5 document with semantic structure. \
             Link styles.css and script.js when styling or behaviour is involved."
        }
        ArtifactKind::Stylesheet => {
            "Write the CSS for this step. If the page needs new classes or a stylesheet link, \
             also return the full updated index.html as a second block."
        }
        ArtifactKind::Script => {
            "Write plain browser JavaScript for this step. Wait for DOMContentLoaded before touching the page \
             and do not pull in frameworks unless the step asks for one."
        }
        ArtifactKind::Generic => {
            "Produce the file this step asks for. Choose a sensible relative file path."
        }
    }
}

fn format_instructions(language: &str, filename: &str) -> String {
    format!(
        "Return each file in its own fenced code block. The opening fence carries the language and \
         the relative path, for example:\n```{language} filepath:{filename}\n...\n```\n\
         Keep explanations outside the code blocks."
    )
}
