//! Local git operations for merge trains.
//!
//! This module wraps the `git` executable:
//! - Reference resolution and commit message reads
//! - Multi-parent merges with conflict diagnosis ([`merge`])
//! - Branch pointer updates and remote pushes ([`push`])
//! - Working copy cleanup on every exit path ([`recovery`])
//! - Clone-or-fetch bootstrap ([`sync`])
//!
//! All merges happen on a **detached HEAD**, so no local branch is ever
//! checked out and moved implicitly. Branch pointers are only changed through
//! [`Repo::set_branch`].

pub mod merge;
pub mod push;
pub mod recovery;
pub mod sync;

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;

use crate::types::{GitRef, Sha};

pub use merge::MergeError;
pub use recovery::WorkingCopyGuard;
pub use sync::sync_with_remote;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Ref does not resolve to a commit.
    #[error("ref not found: {refspec}")]
    RefNotFound { refspec: String },

    /// Git printed something that is not an object name.
    #[error("invalid SHA: {0}")]
    InvalidSha(String),

    /// The path is not a usable repository directory.
    #[error("repository not found at {}", path.display())]
    RepoNotFound { path: PathBuf },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Author and committer of integration commits.
///
/// Supplied with `-c` on each commit-creating invocation, since user and
/// system config are ignored and cloned working copies carry no identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,

    /// Key passed as `user.signingkey`; merges add `-S` when set.
    pub signing_key: Option<String>,
}

impl CommitIdentity {
    /// Creates an unsigned identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        CommitIdentity {
            name: name.into(),
            email: email.into(),
            signing_key: None,
        }
    }
}

/// A `git` invocation in `workdir` that ignores user and system config.
///
/// The bot host's rerere cache, hooks or aliases must not change merge results.
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    let mut cmd = std::process::Command::new("git");
    cmd.current_dir(workdir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        // Fetches with bad credentials must fail, not hang.
        .env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

/// [`git_command`] with `identity` configured, for invocations that create commits.
pub(crate) fn git_commit_command(
    workdir: &Path,
    identity: &CommitIdentity,
) -> std::process::Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));

    if let Some(ref key) = identity.signing_key {
        cmd.arg("-c");
        cmd.arg(format!("user.signingkey={}", key));
    }

    cmd
}

/// Runs `git <args>` in `workdir`; a non-zero exit becomes [`GitError::CommandFailed`].
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Like [`run_git_sync`], returning trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A local working copy that merge trains are computed in.
///
/// Merges check out and reset the working tree, so callers must not run two
/// operations against the same `Repo` path concurrently.
#[derive(Debug, Clone)]
pub struct Repo {
    path: PathBuf,
    identity: CommitIdentity,
}

impl Repo {
    /// Opens an existing working copy.
    ///
    /// The path is canonicalised so log lines and lock keys are stable.
    pub fn open(path: impl AsRef<Path>, identity: CommitIdentity) -> GitResult<Repo> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|_| GitError::RepoNotFound {
            path: path.to_path_buf(),
        })?;
        if !path.is_dir() {
            return Err(GitError::RepoNotFound { path });
        }
        Ok(Repo { path, identity })
    }

    /// Returns the absolute path of the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the identity used for commits made by this repo handle.
    pub fn identity(&self) -> &CommitIdentity {
        &self.identity
    }

    /// Resolves a revision to a commit, returning `None` if it does not exist.
    pub fn try_resolve(&self, rev: &str) -> GitResult<Option<Sha>> {
        let spec = format!("{}^{{commit}}", rev);
        let output = git_command(&self.path)
            .args(["rev-parse", "--verify", "--quiet", &spec])
            .output()?;

        if !output.status.success() {
            return Ok(None);
        }

        let sha_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Sha::parse(&sha_str)
            .map(Some)
            .map_err(|_| GitError::InvalidSha(sha_str))
    }

    /// Resolves a branch, ref or commit-ish to a commit.
    pub fn resolve(&self, rev: &str) -> GitResult<Sha> {
        self.try_resolve(rev)?.ok_or_else(|| GitError::RefNotFound {
            refspec: rev.to_string(),
        })
    }

    /// Resolves `rev` and labels the result with it.
    pub fn resolve_ref(&self, rev: &str) -> GitResult<GitRef> {
        Ok(GitRef::new(rev, self.resolve(rev)?))
    }

    /// Returns the full message of a commit.
    pub fn read_message(&self, commit: &Sha) -> GitResult<String> {
        run_git_stdout(
            &self.path,
            &["log", "-1", "--pretty=format:%B", commit.as_str()],
        )
    }

    /// Points `refs/heads/<name>` at `commit`, or deletes it when `commit` is `None`.
    ///
    /// Both directions are idempotent: setting a branch to its current value and
    /// deleting a branch that does not exist are no-ops.
    pub fn set_branch(&self, name: &str, commit: Option<&Sha>) -> GitResult<()> {
        self.set_ref(&format!("refs/heads/{}", name), commit)
    }

    /// [`set_branch`](Self::set_branch) for a fully qualified ref name.
    pub fn set_ref(&self, refname: &str, commit: Option<&Sha>) -> GitResult<()> {
        match commit {
            Some(sha) => {
                run_git_sync(&self.path, &["update-ref", refname, sha.as_str()])?;
            }
            None => {
                if self.try_resolve(refname)?.is_some() {
                    run_git_sync(&self.path, &["update-ref", "-d", refname])?;
                }
            }
        }
        Ok(())
    }
}
