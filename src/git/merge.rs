//! Merge resolution for merge trains.
//!
//! [`Repo::merge`] turns a base commit and an ordered list of additions into a
//! single integration commit, or into a [`GitMergeFailResult`] that says which
//! files conflict and which branches the newest addition conflicts with.
//!
//! 1. **Direct attempt**: one octopus merge of every addition onto the base.
//!    This is the common case and costs a single git invocation.
//!
//! 2. **Two-phase diagnosis** (direct attempt failed, more than one addition):
//!    merge all but the last addition (a failure here predates the last
//!    addition and is returned as is), then merge the last addition onto that.
//!    If the second step still fails, each earlier addition is test-merged
//!    against the last one to attribute the conflict.
//!
//! Every attempt runs inside a [`WorkingCopyGuard`], so the working copy is
//! clean again whichever way the function returns.

use thiserror::Error;

use crate::types::{FileMergeConflict, GitMergeFailResult, GitRef, Sha};

use super::recovery::WorkingCopyGuard;
use super::{GitError, Repo, git_commit_command, run_git_stdout};

/// Commit message for the intermediate commit of a two-phase merge.
const PARTIAL_MERGE_MESSAGE: &str = "partial";

/// Label of refs produced by a merge.
const HEAD_LABEL: &str = "HEAD";

/// Why a merge produced no commit.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The branches do not merge cleanly. This is an expected outcome.
    #[error("merge failed: {0}")]
    Failed(Box<GitMergeFailResult>),

    /// Git itself could not be run or misbehaved.
    #[error(transparent)]
    Git(#[from] GitError),
}

impl MergeError {
    /// Returns the structured failure, if this is a merge conflict.
    pub fn as_failure(&self) -> Option<&GitMergeFailResult> {
        match self {
            MergeError::Failed(fail) => Some(fail),
            MergeError::Git(_) => None,
        }
    }
}

impl From<std::io::Error> for MergeError {
    fn from(e: std::io::Error) -> Self {
        MergeError::Git(GitError::Io(e))
    }
}

impl Repo {
    /// Merges `additions` onto `base` in order, committing with `message`.
    ///
    /// With no additions, an empty commit carrying `message` is stacked on
    /// `base`. The returned ref is labelled `HEAD`.
    pub fn merge(
        &self,
        message: &str,
        base: &GitRef,
        additions: &[GitRef],
    ) -> Result<GitRef, MergeError> {
        let direct_failure = match self.do_merge(message, base, additions) {
            Ok(merged) => return Ok(merged),
            Err(MergeError::Failed(fail)) => fail,
            Err(e) => return Err(e),
        };

        let Some((last, rest)) = additions.split_last() else {
            return Err(MergeError::Failed(direct_failure));
        };
        if rest.is_empty() {
            return Err(MergeError::Failed(direct_failure));
        }

        tracing::debug!(
            base = %base,
            additions = additions.len(),
            last = %last.name,
            "direct merge failed, diagnosing"
        );

        let partial = self.do_merge(PARTIAL_MERGE_MESSAGE, base, rest)?;

        match self.do_merge(message, &partial, std::slice::from_ref(last)) {
            Ok(merged) => Ok(merged),
            Err(MergeError::Failed(mut fail)) => {
                for other in rest {
                    if self.conflicts_with(last, other)? {
                        fail.conflict_branches.push(other.name.clone());
                    }
                }
                fail.conflict_branches.push(last.name.clone());

                tracing::info!(
                    branch = %last.name,
                    conflicts_with = ?fail.conflicting_with(),
                    "merge conflict attributed"
                );
                Err(MergeError::Failed(fail))
            }
            Err(e) => Err(e),
        }
    }

    /// One merge attempt from a clean checkout of `base`.
    fn do_merge(
        &self,
        message: &str,
        base: &GitRef,
        additions: &[GitRef],
    ) -> Result<GitRef, MergeError> {
        let _guard = WorkingCopyGuard::enter(self.path(), &base.commit)?;

        if additions.is_empty() {
            return Ok(self.commit_empty(message)?);
        }

        let mut args = vec!["merge", "--no-ff", "--no-edit", "-m", message];
        if self.identity().signing_key.is_some() {
            args.push("-S");
        }
        args.extend(additions.iter().map(|a| a.commit.as_str()));

        let output = git_commit_command(self.path(), self.identity())
            .args(&args)
            .output()?;

        if output.status.success() {
            let head = self.resolve(HEAD_LABEL)?;
            if head == base.commit {
                // Every addition was already contained in base; git made no
                // commit, but the message must still be recorded.
                return Ok(self.commit_empty(message)?);
            }
            return Ok(GitRef::new(HEAD_LABEL, head));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let mut failed_files = Vec::new();
        for (conflict_type, path) in stdout.lines().filter_map(parse_conflict_line) {
            let conflict_detail = run_git_stdout(self.path(), &["diff", "--", &path])?;
            failed_files.push(FileMergeConflict {
                path,
                conflict_type,
                conflict_detail,
            });
        }

        Err(MergeError::Failed(Box::new(GitMergeFailResult {
            commandline: format!("git {}", args.join(" ")),
            stdout,
            stderr,
            status: output.status.to_string(),
            failed_files,
            conflict_branches: Vec::new(),
        })))
    }

    /// Creates an empty commit on the current HEAD.
    fn commit_empty(&self, message: &str) -> Result<GitRef, GitError> {
        let mut args = vec!["commit", "--allow-empty", "-m", message];
        if self.identity().signing_key.is_some() {
            args.push("-S");
        }

        let output = git_commit_command(self.path(), self.identity())
            .args(&args)
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(GitRef::new(HEAD_LABEL, self.resolve(HEAD_LABEL)?))
    }

    /// Test-merges `other` into `base` without committing.
    fn conflicts_with(&self, base: &GitRef, other: &GitRef) -> Result<bool, GitError> {
        let clean = self.try_merge_no_commit(&base.commit, &other.commit)?;
        Ok(!clean)
    }

    fn try_merge_no_commit(&self, base: &Sha, other: &Sha) -> Result<bool, GitError> {
        let _guard = WorkingCopyGuard::enter(self.path(), base)?;
        let output = git_commit_command(self.path(), self.identity())
            .args(["merge", "--no-ff", "--no-commit", other.as_str()])
            .output()?;
        Ok(output.status.success())
    }
}

/// Extracts `(conflict_type, path)` from a `CONFLICT (...)` line of merge output.
///
/// ```text
/// CONFLICT (content): Merge conflict in src/lib.rs
/// CONFLICT (modify/delete): docs/a.md deleted in HEAD and modified in 1a2b3c.
/// ```
pub(crate) fn parse_conflict_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("CONFLICT ")?;
    let (kind, detail) = rest.split_once(": ")?;

    let conflict_type = kind
        .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
        .to_string();

    let path = match detail.split_once("Merge conflict in ") {
        Some((_, path)) => path.trim(),
        None => detail.split_whitespace().next()?,
    };
    if path.is_empty() {
        return None;
    }

    Some((conflict_type, path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::recovery::is_working_copy_dirty;
    use crate::test_utils::TestRepo;

    fn branch_names(fail: &GitMergeFailResult) -> Vec<&str> {
        fail.conflict_branches.iter().map(String::as_str).collect()
    }

    fn expect_failure(result: Result<GitRef, MergeError>) -> Box<GitMergeFailResult> {
        match result {
            Err(MergeError::Failed(fail)) => fail,
            other => panic!("expected merge failure, got {:?}", other),
        }
    }

    mod parse_conflict_line {
        use super::*;

        #[test]
        fn content_conflict() {
            assert_eq!(
                parse_conflict_line("CONFLICT (content): Merge conflict in src/lib.rs"),
                Some(("content".to_string(), "src/lib.rs".to_string()))
            );
        }

        #[test]
        fn add_add_conflict() {
            assert_eq!(
                parse_conflict_line("CONFLICT (add/add): Merge conflict in new file.txt"),
                Some(("add/add".to_string(), "new file.txt".to_string()))
            );
        }

        #[test]
        fn modify_delete_conflict() {
            let line = "CONFLICT (modify/delete): docs/a.md deleted in HEAD and modified in 1a2b3c. \
                        Version 1a2b3c of docs/a.md left in tree.";
            assert_eq!(
                parse_conflict_line(line),
                Some(("modify/delete".to_string(), "docs/a.md".to_string()))
            );
        }

        #[test]
        fn non_conflict_lines() {
            assert_eq!(parse_conflict_line("Auto-merging src/lib.rs"), None);
            assert_eq!(
                parse_conflict_line("Automatic merge failed; fix conflicts and then commit the result."),
                None
            );
            assert_eq!(parse_conflict_line("CONFLICT without separator"), None);
        }
    }

    #[test]
    fn zero_additions_stamps_empty_commit() {
        let test = TestRepo::new();
        let main = test.main();

        let merged = test.repo().merge("state", &main, &[]).unwrap();

        assert_eq!(merged.name, "HEAD");
        assert_ne!(merged.commit, main.commit);
        assert_eq!(test.parents(&merged.commit), vec![main.commit.clone()]);
        assert_eq!(test.repo().read_message(&merged.commit).unwrap(), "state");
    }

    #[test]
    fn single_addition_creates_merge_commit() {
        let test = TestRepo::new();
        let main = test.main();
        let a = test.create_branch(&main, "a", "a.txt", "a");

        let merged = test.repo().merge("msg", &main, &[a.clone()]).unwrap();

        assert_eq!(test.parents(&merged.commit), vec![main.commit, a.commit]);
        assert_eq!(test.repo().read_message(&merged.commit).unwrap(), "msg");
        assert_eq!(test.show_file(&merged.commit, "a.txt"), "a");
    }

    #[test]
    fn disjoint_additions_merge_in_one_octopus() {
        let test = TestRepo::new();
        let main = test.main();
        let a = test.create_branch(&main, "a", "a.txt", "a");
        let b = test.create_branch(&main, "b", "b.txt", "b");
        let c = test.create_branch(&main, "c", "c.txt", "c");

        let merged = test
            .repo()
            .merge("msg", &main, &[a.clone(), b.clone(), c.clone()])
            .unwrap();

        assert_eq!(
            test.parents(&merged.commit),
            vec![main.commit, a.commit, b.commit, c.commit]
        );
        assert!(!is_working_copy_dirty(test.path()).unwrap());
    }

    #[test]
    fn already_merged_addition_still_records_message() {
        let test = TestRepo::new();
        let main = test.main();

        let merged = test.repo().merge("msg", &main, &[main.clone()]).unwrap();

        assert_ne!(merged.commit, main.commit);
        assert_eq!(test.repo().read_message(&merged.commit).unwrap(), "msg");
    }

    #[test]
    fn single_addition_conflict_is_returned_directly() {
        let test = TestRepo::new();
        let main = test.main();
        let base = test.create_branch(&main, "base", "f.txt", "base");
        let a = test.create_branch(&main, "a", "f.txt", "a");

        let fail = expect_failure(test.repo().merge("msg", &base, &[a]));

        assert!(fail.conflict_branches.is_empty());
        assert_eq!(fail.failed_files.len(), 1);
        assert_eq!(fail.failed_files[0].path, "f.txt");
        assert_eq!(fail.failed_files[0].conflict_type, "add/add");
        assert!(fail.failed_files[0].conflict_detail.contains("<<<<<<<"));
        assert!(fail.commandline.starts_with("git merge --no-ff"));
        assert!(!fail.status.is_empty());
        assert!(!is_working_copy_dirty(test.path()).unwrap());
    }

    #[test]
    fn conflict_attribution_excludes_unrelated_branch() {
        let test = TestRepo::new();
        let main = test.main();
        let x = test.create_branch(&main, "x", "f.txt", "x");
        let y = test.create_branch(&main, "y", "g.txt", "y");
        let z = test.create_branch(&main, "z", "f.txt", "z");

        let fail = expect_failure(test.repo().merge("msg", &main, &[x, y, z]));

        assert_eq!(branch_names(&fail), vec!["x", "z"]);
        assert_eq!(fail.failed_files[0].path, "f.txt");
        assert!(!is_working_copy_dirty(test.path()).unwrap());
    }

    #[test]
    fn conflict_attribution_lists_all_conflicting_in_order() {
        let test = TestRepo::new();
        let main = test.main();
        let a = test.create_branch(&main, "a", "f.txt", "a");
        let b = test.create_branch(&main, "b", "g.txt", "b");
        let c = test.create_branch(&main, "c", "g.txt", "b");
        let last = test.create_branch(&main, "last", "f.txt", "last");

        // b and c make the same change to g.txt, so they merge cleanly together.
        let last_g = test.create_branch(&last, "last-g", "g.txt", "last");
        let fail = expect_failure(test.repo().merge("msg", &main, &[a, b, c, last_g]));

        assert_eq!(branch_names(&fail), vec!["a", "b", "c", "last-g"]);
    }

    #[test]
    fn partial_merge_failure_is_propagated_without_attribution() {
        let test = TestRepo::new();
        let main = test.main();
        let a = test.create_branch(&main, "a", "f.txt", "a");
        let b = test.create_branch(&main, "b", "f.txt", "b");
        let c = test.create_branch(&main, "c", "c.txt", "c");

        let fail = expect_failure(test.repo().merge("msg", &main, &[a, b, c]));

        assert!(fail.conflict_branches.is_empty());
        assert!(fail.commandline.contains("-m partial"));
        assert!(!is_working_copy_dirty(test.path()).unwrap());
    }

    #[test]
    fn conflict_check_propagates_git_errors() {
        let test = TestRepo::new();
        let main = test.main();
        let x = test.create_branch(&main, "x", "f.txt", "x");
        let missing = GitRef::new("gone", Sha::new("0".repeat(40)));

        assert!(test.repo().conflicts_with(&missing, &x).is_err());
        assert!(!test.repo().conflicts_with(&main, &x).unwrap());
        assert!(!is_working_copy_dirty(test.path()).unwrap());
    }

    #[test]
    fn does_not_move_any_branch() {
        let test = TestRepo::new();
        let main = test.main();
        let a = test.create_branch(&main, "a", "a.txt", "a");
        let b = test.create_branch(&main, "b", "b.txt", "b");

        test.repo().merge("msg", &main, &[a.clone(), b.clone()]).unwrap();

        assert_eq!(test.rev_parse("main"), main.commit);
        assert_eq!(test.rev_parse("a"), a.commit);
        assert_eq!(test.rev_parse("b"), b.commit);
    }
}
