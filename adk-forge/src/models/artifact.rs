//! Artifact kinds inferred from step text.
//!
//! The kind picks the prompt template, the default filename and the fence
//! language requested from the model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a step is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Markup,
    Stylesheet,
    Script,
    Generic,
}

const MARKUP_KEYWORDS: &[&str] = &["html", "htm", "markup", "webpage"];

const STYLESHEET_KEYWORDS: &[&str] = &[
    "css",
    "style",
    "styles",
    "styling",
    "stylesheet",
    "design",
    "appearance",
    "theme",
];

const SCRIPT_KEYWORDS: &[&str] = &[
    "javascript",
    "js",
    "script",
    "scripts",
    "interactive",
    "interactivity",
];

impl ArtifactKind {
    /// Classify a step by keyword hits.
    ///
    /// The kind with the most hits wins; ties go to markup, then stylesheet,
    /// then script. No hits means [`ArtifactKind::Generic`].
    pub fn classify(step: &str) -> Self {
        let lower = step.to_lowercase();
        let mut counts = [0usize; 3];
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            if MARKUP_KEYWORDS.contains(&token) {
                counts[0] += 1;
            }
            if STYLESHEET_KEYWORDS.contains(&token) {
                counts[1] += 1;
            }
            if SCRIPT_KEYWORDS.contains(&token) {
                counts[2] += 1;
            }
        }

        let kinds = [ArtifactKind::Markup, ArtifactKind::Stylesheet, ArtifactKind::Script];
        let mut best = ArtifactKind::Generic;
        let mut best_count = 0;
        for (kind, count) in kinds.into_iter().zip(counts) {
            if count > best_count {
                best = kind;
                best_count = count;
            }
        }
        best
    }

    /// Filename used for blocks that carry no path.
    pub fn default_filename(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "index.html",
            ArtifactKind::Stylesheet => "styles.css",
            ArtifactKind::Script => "script.js",
            ArtifactKind::Generic => "generated_file.txt",
        }
    }

    /// Fence language requested in prompts.
    pub fn fence_language(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "html",
            ArtifactKind::Stylesheet => "css",
            ArtifactKind::Script => "javascript",
            ArtifactKind::Generic => "text",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Markup => "markup",
            ArtifactKind::Stylesheet => "stylesheet",
            ArtifactKind::Script => "script",
            ArtifactKind::Generic => "generic",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_single_kind() {
        assert_eq!(ArtifactKind::classify("Create an HTML file"), ArtifactKind::Markup);
        assert_eq!(ArtifactKind::classify("Improve the design"), ArtifactKind::Stylesheet);
        assert_eq!(ArtifactKind::classify("Add JavaScript for the menu"), ArtifactKind::Script);
        assert_eq!(ArtifactKind::classify("Write a license file"), ArtifactKind::Generic);
    }

    #[test]
    fn test_classify_matches_whole_words() {
        // "jsonify" and "stylish" are not keywords
        assert_eq!(ArtifactKind::classify("jsonify the stylish data"), ArtifactKind::Generic);
        assert_eq!(ArtifactKind::classify("update main.js"), ArtifactKind::Script);
    }

    #[test]
    fn test_classify_most_hits_wins() {
        assert_eq!(
            ArtifactKind::classify("Add CSS styling to the HTML page"),
            ArtifactKind::Stylesheet
        );
        assert_eq!(
            ArtifactKind::classify("Add interactive JavaScript to the html"),
            ArtifactKind::Script
        );
    }

    #[test]
    fn test_classify_tie_prefers_markup() {
        assert_eq!(ArtifactKind::classify("html and css"), ArtifactKind::Markup);
        assert_eq!(ArtifactKind::classify("css and js"), ArtifactKind::Stylesheet);
    }

    #[test]
    fn test_default_filenames() {
        assert_eq!(ArtifactKind::Markup.default_filename(), "index.html");
        assert_eq!(ArtifactKind::Stylesheet.default_filename(), "styles.css");
        assert_eq!(ArtifactKind::Script.default_filename(), "script.js");
        assert_eq!(ArtifactKind::Generic.default_filename(), "generated_file.txt");
    }
}
