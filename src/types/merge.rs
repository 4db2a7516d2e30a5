//! Structured merge failures.
//!
//! A failed merge is an expected, user-actionable outcome rather than a system
//! fault, so it carries everything needed to explain it: the command that ran,
//! its output, the conflicting files, and which branches conflict with the
//! newest member.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One file that could not be merged cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMergeConflict {
    /// Path of the conflicting file, relative to the repository root.
    pub path: String,

    /// Conflict category reported by git (e.g., `content`, `add/add`, `modify/delete`).
    pub conflict_type: String,

    /// `git diff` of the file in its conflicted state.
    pub conflict_detail: String,
}

/// A merge attempt that did not produce a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMergeFailResult {
    /// The command that failed.
    pub commandline: String,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Exit status or a short description of the failure.
    pub status: String,

    /// Files with textual conflicts. Empty when git reported none.
    #[serde(default)]
    pub failed_files: Vec<FileMergeConflict>,

    /// Branches involved in the conflict.
    ///
    /// When populated, the last entry is the newly added branch and the
    /// preceding entries are the branches it conflicts with, in merge order.
    #[serde(default)]
    pub conflict_branches: Vec<String>,
}

impl GitMergeFailResult {
    /// Returns the newly introduced branch, if conflict attribution ran.
    pub fn introduced_branch(&self) -> Option<&str> {
        self.conflict_branches.last().map(String::as_str)
    }

    /// Returns the branches the newly introduced branch conflicts with.
    pub fn conflicting_with(&self) -> &[String] {
        match self.conflict_branches.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }
}

impl fmt::Display for GitMergeFailResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` failed ({})", self.commandline, self.status)?;
        if !self.failed_files.is_empty() {
            let paths: Vec<_> = self.failed_files.iter().map(|c| c.path.as_str()).collect();
            write!(f, "; conflicts in {}", paths.join(", "))?;
        }
        if let Some(introduced) = self.introduced_branch() {
            let others = self.conflicting_with();
            if !others.is_empty() {
                write!(f, "; {} conflicts with {}", introduced, others.join(", "))?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for GitMergeFailResult {}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(path: &str) -> FileMergeConflict {
        FileMergeConflict {
            path: path.to_string(),
            conflict_type: "content".to_string(),
            conflict_detail: String::new(),
        }
    }

    #[test]
    fn attribution_accessors() {
        let fail = GitMergeFailResult {
            conflict_branches: vec!["x".into(), "y".into(), "z".into()],
            ..Default::default()
        };
        assert_eq!(fail.introduced_branch(), Some("z"));
        assert_eq!(fail.conflicting_with(), ["x".to_string(), "y".to_string()]);

        let empty = GitMergeFailResult::default();
        assert_eq!(empty.introduced_branch(), None);
        assert!(empty.conflicting_with().is_empty());
    }

    #[test]
    fn display_mentions_files_and_branches() {
        let fail = GitMergeFailResult {
            commandline: "git merge --no-ff -m msg abc".into(),
            status: "exit status: 1".into(),
            failed_files: vec![conflict("f.txt"), conflict("g.txt")],
            conflict_branches: vec!["x".into(), "z".into()],
            ..Default::default()
        };
        assert_eq!(
            fail.to_string(),
            "`git merge --no-ff -m msg abc` failed (exit status: 1); \
             conflicts in f.txt, g.txt; z conflicts with x"
        );
    }
}
