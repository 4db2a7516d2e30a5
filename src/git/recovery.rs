//! Working copy cleanup.
//!
//! Merge attempts leave the working tree in arbitrary states: an unfinished
//! merge with conflict markers in the index, staged octopus results, untracked
//! files from the merged branches. The next operation on the same path must
//! start from a clean tree, so every merge runs inside a [`WorkingCopyGuard`]
//! that restores cleanliness when it is dropped, on success, failure and
//! unwinding alike.

use std::path::Path;

use super::{GitResult, run_git_sync};
use crate::types::Sha;

/// Discards any in-progress merge and all local modifications.
///
/// This function:
/// 1. Aborts any in-progress merge
/// 2. Hard resets to HEAD
/// 3. Cleans untracked files
pub fn clean_working_copy(workdir: &Path) -> GitResult<()> {
    // Fails when no merge is in progress; that's fine.
    let _ = run_git_sync(workdir, &["merge", "--abort"]);

    run_git_sync(workdir, &["reset", "--hard", "HEAD"])?;
    run_git_sync(workdir, &["clean", "-fd"])?;

    Ok(())
}

/// Scoped exclusive use of a working copy, entered at a known commit.
///
/// Creating the guard cleans the tree and force-detaches HEAD at `base`.
/// Dropping it cleans the tree again. HEAD stays detached at whatever commit
/// the guarded operation produced, so the caller can read it before dropping.
#[derive(Debug)]
pub struct WorkingCopyGuard<'a> {
    workdir: &'a Path,
}

impl<'a> WorkingCopyGuard<'a> {
    /// Cleans the working copy and checks out `base` on a detached HEAD.
    pub fn enter(workdir: &'a Path, base: &Sha) -> GitResult<Self> {
        clean_working_copy(workdir)?;
        run_git_sync(
            workdir,
            &["checkout", "--detach", "--force", base.as_str()],
        )?;
        Ok(WorkingCopyGuard { workdir })
    }
}

impl Drop for WorkingCopyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = clean_working_copy(self.workdir) {
            tracing::warn!(
                workdir = %self.workdir.display(),
                error = %e,
                "failed to clean working copy"
            );
        }
    }
}

/// Check if a working copy is in a dirty state.
///
/// A working copy is dirty if there are uncommitted changes, untracked files,
/// or an in-progress merge.
pub fn is_working_copy_dirty(workdir: &Path) -> GitResult<bool> {
    let output = run_git_sync(workdir, &["status", "--porcelain"])?;
    if !String::from_utf8_lossy(&output.stdout).trim().is_empty() {
        return Ok(true);
    }

    Ok(has_merge_in_progress(workdir))
}

/// Returns true if `MERGE_HEAD` exists.
pub fn has_merge_in_progress(workdir: &Path) -> bool {
    run_git_sync(workdir, &["rev-parse", "--verify", "--quiet", "MERGE_HEAD"]).is_ok()
}
