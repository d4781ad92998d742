//! Optional git commits of generated files.
//!
//! With `git_integration` enabled, the files a task wrote are committed once
//! the task finishes. The project root becomes a repository unless it already
//! sits inside one. Only the written paths go into the commit, so anything
//! else staged in the repository stays staged.

use crate::error::GitError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Identity used when the repository has no `user.email` configured.
const FALLBACK_IDENTITY: [&str; 4] = ["-c", "user.name=Forge", "-c", "user.email=forge@localhost"];

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Abbreviated hash of the new commit
    Committed(String),
    /// The files already match what is committed
    NothingToCommit,
}

/// Runs git inside the project root.
#[derive(Debug, Clone)]
pub struct GitCommitter {
    repo: PathBuf,
}

impl GitCommitter {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn run_git(&self, command: &str, args: &[&str]) -> Result<String, GitError> {
        self.run_git_with(&[], command, args)
    }

    fn run_git_with(&self, overrides: &[&str], command: &str, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(overrides)
            .arg(command)
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|e| GitError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(GitError::Command {
                command: command.to_string(),
                message: message.to_string(),
            });
        }
        Ok(stdout)
    }

    /// Initialize a repository at the root unless one already covers it.
    /// Returns true when a new repository was created.
    pub fn ensure_repository(&self) -> Result<bool, GitError> {
        match self.run_git("rev-parse", &["--is-inside-work-tree"]) {
            Ok(_) => return Ok(false),
            Err(GitError::Spawn(e)) => return Err(GitError::Spawn(e)),
            Err(GitError::Command { .. }) => {}
        }
        self.run_git("init", &[])?;
        info!(path = %self.repo.display(), "Initialized git repository");
        Ok(true)
    }

    fn has_identity(&self) -> bool {
        self.run_git("config", &["user.email"])
            .map(|email| !email.trim().is_empty())
            .unwrap_or(false)
    }

    /// Stage and commit `files`, given relative to the project root.
    pub fn commit_files(&self, files: &[String], message: &str) -> Result<CommitOutcome, GitError> {
        if files.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }
        self.ensure_repository()?;

        let mut paths: Vec<&str> = vec!["--"];
        paths.extend(files.iter().map(String::as_str));
        self.run_git("add", &paths)?;

        // Exit status 0 means the staged paths match HEAD
        let mut diff_args = vec!["--cached", "--quiet"];
        diff_args.extend(&paths);
        match self.run_git("diff", &diff_args) {
            Ok(_) => {
                debug!(files = files.len(), "Generated files unchanged, nothing to commit");
                return Ok(CommitOutcome::NothingToCommit);
            }
            Err(GitError::Spawn(e)) => return Err(GitError::Spawn(e)),
            Err(GitError::Command { .. }) => {}
        }

        let overrides: &[&str] = if self.has_identity() { &[] } else { &FALLBACK_IDENTITY };
        let mut commit_args = vec!["-m", message];
        commit_args.extend(&paths);
        self.run_git_with(overrides, "commit", &commit_args)?;

        let hash = self.run_git("rev-parse", &["--short", "HEAD"])?.trim().to_string();
        info!(commit = %hash, files = files.len(), "Committed generated files");
        Ok(CommitOutcome::Committed(hash))
    }
}

/// Commit message for a task: the heading, then one line per file.
pub fn commit_message(heading: &str, files: &[String]) -> String {
    let mut message = format!("Forge: {heading}\n");
    for file in files {
        message.push('\n');
        message.push_str(file);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn log(repo: &Path) -> String {
        let output = Command::new("git")
            .args(["log", "--format=%s", "--name-only"])
            .current_dir(repo)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    #[test]
    fn test_commit_message() {
        let files = vec!["index.html".to_string(), "styles.css".to_string()];
        assert_eq!(
            commit_message("Task 1: Page", &files),
            "Forge: Task 1: Page\n\nindex.html\nstyles.css"
        );
    }

    #[test]
    fn test_commit_files_initializes_and_commits() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<p>hi</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not generated").unwrap();

        let git = GitCommitter::new(dir.path());
        let files = vec!["index.html".to_string()];
        let outcome = git.commit_files(&files, &commit_message("Page", &files)).unwrap();

        let hash = match outcome {
            CommitOutcome::Committed(hash) => hash,
            other => panic!("expected a commit, got {other:?}"),
        };
        assert!(!hash.is_empty());
        assert!(dir.path().join(".git").exists());
        let log = log(dir.path());
        assert!(log.contains("Forge: Page"));
        assert!(log.contains("index.html"));
        assert!(!log.contains("notes.txt"));

        // Same content again
        let again = git.commit_files(&files, "Forge: Page").unwrap();
        assert_eq!(again, CommitOutcome::NothingToCommit);
        assert!(!git.ensure_repository().unwrap());
    }

    #[test]
    fn test_commit_missing_file_is_error() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = GitCommitter::new(dir.path());
        let err = git
            .commit_files(&["absent.js".to_string()], "Forge: Script")
            .unwrap_err();
        assert!(matches!(err, GitError::Command { ref command, .. } if command == "add"), "{err:?}");
    }

    #[test]
    fn test_missing_root_is_error() {
        let git = GitCommitter::new("/definitely/not/a/forge/root");
        assert!(git.commit_files(&["index.html".to_string()], "Forge: Page").is_err());
        assert!(git.commit_files(&[], "Forge: Page").is_ok());
    }
}
