//! Publishing train branches to a remote.
//!
//! Train branches are rewritten on every membership change, so pushes are
//! always forced. Pushes name the commit explicitly (`<sha>:refs/heads/<branch>`)
//! rather than HEAD, because the working copy is reset after every merge.

use crate::types::Sha;

use super::{GitError, GitResult, Repo, git_command, run_git_sync};

impl Repo {
    /// Force-updates `refs/heads/<branch>` on `remote` to `commit`, or deletes it.
    ///
    /// Deleting a branch the remote does not have is a no-op.
    pub fn push_branch(&self, remote: &str, branch: &str, commit: Option<&Sha>) -> GitResult<()> {
        let refspec = match commit {
            Some(sha) => format!("{}:refs/heads/{}", sha, branch),
            None => {
                if self.remote_branch(remote, branch)?.is_none() {
                    tracing::debug!(remote, branch, "remote branch already absent");
                    return Ok(());
                }
                format!(":refs/heads/{}", branch)
            }
        };

        run_git_sync(self.path(), &["push", "--force", remote, &refspec])?;
        tracing::info!(remote, branch, commit = ?commit.map(Sha::short), "pushed train branch");
        Ok(())
    }

    /// Get the remote ref SHA for a branch.
    ///
    /// Returns `None` if the branch doesn't exist on the remote.
    pub fn remote_branch(&self, remote: &str, branch: &str) -> GitResult<Option<Sha>> {
        let refname = format!("refs/heads/{}", branch);
        let output = git_command(self.path())
            .args(["ls-remote", remote, &refname])
            .output()?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: format!("git ls-remote {} {}", remote, refname),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.trim();

        if line.is_empty() {
            return Ok(None);
        }

        // Format: "SHA\trefs/heads/branch"
        let sha_str = line.split('\t').next().unwrap_or("");
        Sha::parse(sha_str)
            .map(Some)
            .map_err(|_| GitError::InvalidSha(sha_str.to_string()))
    }
}
