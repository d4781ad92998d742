//! Recover files from raw LLM response text.
//!
//! Fenced code blocks become files. A block is named by, in order:
//! 1. a `filepath:` tag on the opening fence (```` ```html filepath:site/index.html ````)
//! 2. a `filename: x` / `filepath: x` line directly above the fence
//! 3. the default filename hint
//!
//! Untagged blocks share the hint, so the second one becomes `index-2.html`,
//! the third `index-3.html`, skipping any name already claimed in the same
//! response. A response with no fences at all is written whole, trimmed, under
//! the hint. An empty response, or one whose fences are all blank, yields no
//! files.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// Fallback when the hint itself does not survive sanitizing.
const LAST_RESORT_FILENAME: &str = "generated_file.txt";

static NAME_LINE: OnceLock<Regex> = OnceLock::new();

fn name_line_regex() -> &'static Regex {
    NAME_LINE.get_or_init(|| {
        Regex::new(r#"(?i)^[\s#>*_-]*(?:file\s*name|file\s*path|filename|filepath|file|path)\s*[:=]\s*[*_`'"]*([^*`'"\s]+)[*_`'"]*\s*$"#)
            .expect("name line pattern is valid")
    })
}

/// One file recovered from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    /// Sanitized path relative to the project root
    pub path: String,
    pub content: String,
    /// Language tag from the fence, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// The path came from the response rather than the hint
    #[serde(default)]
    pub tagged: bool,
}

/// A fenced block before path assignment.
#[derive(Debug)]
struct RawBlock {
    language: Option<String>,
    tag: Option<String>,
    content: String,
}

/// Splits LLM responses into files.
#[derive(Debug, Clone, Default)]
pub struct ResponseExtractor;

impl ResponseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract files from `response`, naming untagged content after `default_hint`.
    pub fn extract(&self, response: &str, default_hint: &str) -> Vec<ExtractedFile> {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let hint = sanitize_path(default_hint).unwrap_or_else(|| LAST_RESORT_FILENAME.to_string());
        let blocks = scan_blocks(response);

        if blocks.is_empty() {
            debug!(hint = %hint, "No fenced blocks; using whole response");
            return vec![ExtractedFile {
                path: hint,
                content: trimmed.to_string(),
                language: None,
                tagged: false,
            }];
        }

        let blocks: Vec<RawBlock> = blocks
            .into_iter()
            .filter(|b| !b.content.trim().is_empty())
            .collect();

        let sanitized: Vec<Option<String>> = blocks
            .iter()
            .map(|b| b.tag.as_deref().and_then(sanitize_path))
            .collect();

        let mut used: HashSet<String> = sanitized.iter().flatten().cloned().collect();
        let mut untagged_seen = 0usize;

        blocks
            .into_iter()
            .zip(sanitized)
            .map(|(block, path)| {
                let (path, tagged) = match path {
                    Some(path) => (path, true),
                    None => {
                        untagged_seen += 1;
                        (next_free_name(&hint, untagged_seen, &mut used), false)
                    }
                };
                ExtractedFile {
                    path,
                    content: block.content,
                    language: block.language,
                    tagged,
                }
            })
            .collect()
    }
}

/// Extract files with the default extractor.
pub fn extract_files(response: &str, default_hint: &str) -> Vec<ExtractedFile> {
    ResponseExtractor::new().extract(response, default_hint)
}

/// Rewrite a model-supplied path so it stays inside the project root.
///
/// Separators are normalized to `/`, drive prefixes and leading slashes are
/// dropped, `.` is removed and `..` pops the previous component (never past
/// the root). Control characters are stripped. Returns `None` when nothing
/// usable remains.
pub fn sanitize_path(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '\\' { '/' } else { c })
        .collect();

    let without_drive = match cleaned.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => &cleaned[2..],
        _ => cleaned.as_str(),
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in without_drive.split('/') {
        match component.trim() {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(component),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// `hint` for the first untagged block, then `stem-N.ext`, skipping taken names.
fn next_free_name(hint: &str, ordinal: usize, used: &mut HashSet<String>) -> String {
    let mut n = ordinal;
    loop {
        let candidate = if n <= 1 {
            hint.to_string()
        } else {
            with_suffix(hint, n)
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n = n.max(1) + 1;
    }
}

fn with_suffix(path: &str, n: usize) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    match file.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}-{}{}", dir, &file[..dot], n, &file[dot..]),
        _ => format!("{}{}-{}", dir, file, n),
    }
}

/// Collect fenced blocks in order. An unterminated final fence runs to the end.
fn scan_blocks(response: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut pending_name: Option<String> = None;
    let mut current: Option<(usize, RawBlock, Vec<&str>)> = None;

    for line in response.lines() {
        if let Some((fence_len, _, ref mut body)) = current {
            if is_closing_fence(line, fence_len) {
                if let Some((_, mut block, body)) = current.take() {
                    block.content = body.join("\n");
                    blocks.push(block);
                }
            } else {
                body.push(line);
            }
            continue;
        }

        if let Some((fence_len, info)) = opening_fence(line) {
            let (language, tag) = parse_info(info);
            let block = RawBlock {
                language,
                tag: tag.or_else(|| pending_name.take()),
                content: String::new(),
            };
            pending_name = None;
            current = Some((fence_len, block, Vec::new()));
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }
        pending_name = name_line_regex()
            .captures(line.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(':').to_string());
    }

    if let Some((_, mut block, body)) = current {
        debug!("Unterminated code fence; keeping content to end of response");
        block.content = body.join("\n");
        blocks.push(block);
    }

    blocks
}

/// Backtick count and info string of an opening fence.
fn opening_fence(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let fence_len = trimmed.chars().take_while(|&c| c == '`').count();
    if fence_len < 3 {
        return None;
    }
    let info = &trimmed[fence_len..];
    // Inline code like ```x``` on one line is not a fence.
    if info.contains('`') {
        return None;
    }
    Some((fence_len, info.trim()))
}

fn is_closing_fence(line: &str, fence_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence_len && trimmed.chars().all(|c| c == '`')
}

/// Language tag and path tag from a fence info string.
fn parse_info(info: &str) -> (Option<String>, Option<String>) {
    let mut language = None;
    let mut tag = None;
    let mut tokens = info.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let lower = token.to_lowercase();
        let key = ["filepath", "filename", "file", "path"]
            .into_iter()
            .find(|k| lower.starts_with(&format!("{k}:")) || lower.starts_with(&format!("{k}=")));

        match key {
            Some(k) => {
                let value = &token[k.len() + 1..];
                if value.is_empty() {
                    // "filepath: index.html"
                    tag = tokens.next().map(str::to_string);
                } else {
                    tag = Some(value.to_string());
                }
            }
            None if language.is_none() && tag.is_none() => {
                // "html:index.html" style
                match token.split_once(':') {
                    Some((lang, path)) if !lang.is_empty() && path.contains('.') => {
                        language = Some(lang.to_string());
                        tag = Some(path.to_string());
                    }
                    _ => language = Some(token.to_string()),
                }
            }
            None => {}
        }
    }

    (language, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_block() {
        let files = extract_files("```html filepath:index.html\n<html></html>\n```", "page.html");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "index.html");
        assert_eq!(files[0].content, "<html></html>");
        assert_eq!(files[0].language.as_deref(), Some("html"));
        assert!(files[0].tagged);
    }

    #[test]
    fn test_language_tag_not_in_content() {
        let files = extract_files("Here:\n```javascript\nconsole.log(1);\n```\nDone.", "script.js");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "script.js");
        assert_eq!(files[0].content, "console.log(1);");
    }

    #[test]
    fn test_untagged_collisions_get_suffixes() {
        let response = "```html\n<a/>\n```\n```html\n<b/>\n```\n```html\n<c/>\n```";
        let paths: Vec<_> = extract_files(response, "index.html").into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["index.html", "index-2.html", "index-3.html"]);
    }

    #[test]
    fn test_untagged_skips_tagged_names() {
        let response = "```css\na{}\n```\n```css filepath:styles.css\nb{}\n```";
        let paths: Vec<_> = extract_files(response, "styles.css").into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["styles-2.css", "styles.css"]);
    }

    #[test]
    fn test_fallback_whole_response() {
        let files = extract_files("  Just some prose.\n", "notes.txt");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "notes.txt");
        assert_eq!(files[0].content, "Just some prose.");
        assert!(!files[0].tagged);
    }

    #[test]
    fn test_empty_response() {
        assert!(extract_files("", "index.html").is_empty());
        assert!(extract_files(" \n\t ", "index.html").is_empty());
    }

    #[test]
    fn test_filename_line_above_fence() {
        let response = "filename: css/site.css\n\n```css\nbody{}\n```";
        let files = extract_files(response, "styles.css");
        assert_eq!(files[0].path, "css/site.css");
        assert!(files[0].tagged);

        let response = "**File: `app.js`**\n```js\nlet a;\n```";
        assert_eq!(extract_files(response, "script.js")[0].path, "app.js");
    }

    #[test]
    fn test_name_line_not_carried_past_prose() {
        let response = "filename: a.css\nSome explanation.\n```css\nx{}\n```";
        assert_eq!(extract_files(response, "styles.css")[0].path, "styles.css");
    }

    #[test]
    fn test_fence_tag_wins_over_name_line() {
        let response = "filename: a.html\n```html filepath:b.html\n<p/>\n```";
        assert_eq!(extract_files(response, "index.html")[0].path, "b.html");
    }

    #[test]
    fn test_separated_tag_and_colon_style() {
        assert_eq!(
            extract_files("```html filepath: docs/a.html\n<p/>\n```", "index.html")[0].path,
            "docs/a.html"
        );
        assert_eq!(
            extract_files("```html:pages/b.html\n<p/>\n```", "index.html")[0].path,
            "pages/b.html"
        );
    }

    #[test]
    fn test_unterminated_fence() {
        let files = extract_files("```js filepath:app.js\nlet a = 1;\nlet b", "script.js");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "let a = 1;\nlet b");
    }

    #[test]
    fn test_longer_fence_allows_inner_backticks() {
        let response = "````markdown filepath:README.md\n```sh\ncargo run\n```\n````";
        let files = extract_files(response, "generated_file.txt");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "```sh\ncargo run\n```");
    }

    #[test]
    fn test_empty_blocks_dropped() {
        assert!(extract_files("```html\n\n```", "index.html").is_empty());
    }

    #[test]
    fn test_traversal_tag_is_contained() {
        let files = extract_files("```text filepath:../../etc/passwd\nx\n```", "a.txt");
        assert_eq!(files[0].path, "etc/passwd");

        let files = extract_files("```text filepath:../..\nx\n```", "a.txt");
        assert_eq!(files[0].path, "a.txt");
        assert!(!files[0].tagged);
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("index.html").as_deref(), Some("index.html"));
        assert_eq!(sanitize_path("/etc/passwd").as_deref(), Some("etc/passwd"));
        assert_eq!(sanitize_path("a/../../b").as_deref(), Some("b"));
        assert_eq!(sanitize_path("./src/./main.rs").as_deref(), Some("src/main.rs"));
        assert_eq!(sanitize_path("C:\\Users\\x\\a.txt").as_deref(), Some("Users/x/a.txt"));
        assert_eq!(sanitize_path("`styles.css`").as_deref(), Some("styles.css"));
        assert_eq!(sanitize_path("a\u{0}b.txt").as_deref(), Some("ab.txt"));
        assert_eq!(sanitize_path(".."), None);
        assert_eq!(sanitize_path(""), None);
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("index.html", 2), "index-2.html");
        assert_eq!(with_suffix("js/app.min.js", 3), "js/app.min-3.js");
        assert_eq!(with_suffix("Makefile", 2), "Makefile-2");
        assert_eq!(with_suffix(".env", 2), ".env-2");
    }
}
