//! Working copy bootstrap: clone on first use, fetch afterwards.

use std::path::Path;

use url::Url;

use super::{CommitIdentity, GitError, GitResult, Repo, run_git_sync};

/// Replacement for credentials in error text.
const REDACTED: &str = "***";

/// Ensures `path` holds a working copy of `remote_url` with current remote refs.
///
/// Clones when `path/.git` does not exist and runs `git fetch --all --prune`
/// otherwise, so it is safe to call before every operation. Credentials
/// embedded in `remote_url` never appear in returned errors.
pub fn sync_with_remote(
    path: &Path,
    remote_url: &str,
    identity: CommitIdentity,
) -> GitResult<Repo> {
    let result = if path.join(".git").exists() {
        fetch_all(path, identity)
    } else {
        clone_into(path, remote_url, identity)
    };
    result.map_err(|e| redact_error(e, remote_url))
}

fn clone_into(path: &Path, remote_url: &str, identity: CommitIdentity) -> GitResult<Repo> {
    std::fs::create_dir_all(path)?;
    tracing::info!(path = %path.display(), url = %redact_url(remote_url), "cloning repository");
    run_git_sync(path, &["clone", "--quiet", remote_url, "."])?;
    Repo::open(path, identity)
}

fn fetch_all(path: &Path, identity: CommitIdentity) -> GitResult<Repo> {
    let repo = Repo::open(path, identity)?;
    tracing::debug!(path = %repo.path().display(), "fetching remotes");
    run_git_sync(repo.path(), &["fetch", "--all", "--prune", "--quiet"])?;
    Ok(repo)
}

/// Returns `url` with any password replaced, for logging.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // Only fails for cannot-be-a-base URLs, which have no password.
            let _ = parsed.set_password(Some(REDACTED));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Scrubs the password of `remote_url` from anything git printed.
fn redact_error(error: GitError, remote_url: &str) -> GitError {
    let Some(secret) = Url::parse(remote_url)
        .ok()
        .and_then(|u| u.password().map(str::to_string))
        .filter(|p| !p.is_empty())
    else {
        return error;
    };

    match error {
        GitError::CommandFailed { command, stderr } => GitError::CommandFailed {
            command: command.replace(&secret, REDACTED),
            stderr: stderr.replace(&secret, REDACTED),
        },
        other => other,
    }
}
