//! Shared test utilities and arbitrary generators for property-based testing.

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use tempfile::TempDir;

use crate::git::{CommitIdentity, Repo, run_git_stdout, run_git_sync};
use crate::types::{GitRef, IssueIid, MergeTrain, MergeTrainItem, ProjectId, Sha};

/// Test identity for merge commits (no signing).
pub fn test_identity() -> CommitIdentity {
    CommitIdentity::new("Test", "test@test.com")
}

/// A throwaway repository with a `main` branch holding one commit.
///
/// The working copy lives in `<tmp>/work`; bare remotes created with
/// [`TestRepo::add_bare_remote`] live next to it.
pub struct TestRepo {
    dir: TempDir,
    repo: Repo,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        run_git_sync(&work, &["init", "--quiet"]).unwrap();
        run_git_sync(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]).unwrap();
        run_git_sync(&work, &["config", "user.email", "test@test.com"]).unwrap();
        run_git_sync(&work, &["config", "user.name", "Test"]).unwrap();

        std::fs::write(work.join("README.md"), "# Test").unwrap();
        run_git_sync(&work, &["add", "."]).unwrap();
        run_git_sync(&work, &["commit", "--quiet", "-m", "Initial commit"]).unwrap();

        let repo = Repo::open(&work, test_identity()).unwrap();
        TestRepo { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.repo.path()
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// Runs git in the working copy, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        run_git_stdout(self.path(), args).unwrap()
    }

    /// Runs git in the working copy, returning the error instead of panicking.
    pub fn git_may_fail(&self, args: &[&str]) -> Result<String, crate::git::GitError> {
        run_git_stdout(self.path(), args)
    }

    pub fn rev_parse(&self, rev: &str) -> Sha {
        Self::rev_parse_in(self.path(), rev)
    }

    pub fn rev_parse_in(path: &Path, rev: &str) -> Sha {
        Sha::parse(run_git_stdout(path, &["rev-parse", rev]).unwrap()).unwrap()
    }

    /// The current tip of `main`.
    pub fn main(&self) -> GitRef {
        GitRef::new("main", self.rev_parse("refs/heads/main"))
    }

    /// Commits `file` with `content` on top of `base` and points branch `name` at it.
    pub fn create_branch(&self, base: &GitRef, name: &str, file: &str, content: &str) -> GitRef {
        self.commit_file(&base.commit, name, file, content)
    }

    /// Adds a commit to an existing branch.
    pub fn update_branch(&self, name: &str, file: &str, content: &str) -> GitRef {
        let tip = self.rev_parse(&format!("refs/heads/{}", name));
        self.commit_file(&tip, name, file, content)
    }

    fn commit_file(&self, parent: &Sha, name: &str, file: &str, content: &str) -> GitRef {
        self.git(&["checkout", "--quiet", "--detach", "--force", parent.as_str()]);
        let file_path = self.path().join(file);
        if let Some(dir) = file_path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(&file_path, content).unwrap();
        self.git(&["add", file]);
        self.git(&["commit", "--quiet", "-m", &format!("{}: write {}", name, file)]);
        let commit = self.rev_parse("HEAD");
        self.git(&["update-ref", &format!("refs/heads/{}", name), commit.as_str()]);
        GitRef::new(name, commit)
    }

    /// Parents of `commit`, in order.
    pub fn parents(&self, commit: &Sha) -> Vec<Sha> {
        self.git(&["rev-parse", &format!("{}^@", commit)])
            .lines()
            .map(|l| Sha::parse(l).unwrap())
            .collect()
    }

    /// Contents of `file` at `commit`.
    pub fn show_file(&self, commit: &Sha, file: &str) -> String {
        self.git(&["show", &format!("{}:{}", commit, file)])
    }

    /// Creates a bare repository next to the working copy, registers it as
    /// `name`, and pushes `main` to it.
    pub fn add_bare_remote(&self, name: &str) -> PathBuf {
        let bare = self.dir.path().join(format!("{}.git", name));
        std::fs::create_dir_all(&bare).unwrap();
        run_git_sync(&bare, &["init", "--quiet", "--bare"]).unwrap();
        run_git_sync(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]).unwrap();

        let bare_str = bare.to_str().unwrap();
        self.git(&["remote", "add", name, bare_str]);
        self.git(&["push", "--quiet", name, "refs/heads/main:refs/heads/main"]);
        self.git(&["fetch", "--quiet", name]);
        bare
    }
}

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(|s| Sha::parse(s).unwrap())
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9/-]{0,50}".prop_map(String::from)
}

/// Trains with 0..8 members, distinct branch names, in arbitrary order.
pub fn arb_merge_train() -> impl Strategy<Value = MergeTrain> {
    (
        any::<u64>(),
        any::<u64>(),
        "[a-z/-]{0,20}",
        prop::collection::btree_map(arb_branch_name(), arb_sha(), 0..8),
        any::<prop::sample::Index>(),
    )
        .prop_map(|(project, iid, prefix, branches, rotate)| {
            let project_id = ProjectId(project);
            let mut members: Vec<_> = branches
                .into_iter()
                .map(|(branch, merged_commit)| MergeTrainItem {
                    project_id,
                    branch,
                    merged_commit,
                })
                .collect();
            if !members.is_empty() {
                let by = rotate.index(members.len());
                members.rotate_left(by);
            }
            let mut train = MergeTrain::new(project_id, IssueIid(iid), &prefix);
            train.members = members;
            train
        })
}
