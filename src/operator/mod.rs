//! The merge train operator.
//!
//! A [`MergeTrainOperator`] owns one train for the duration of one command.
//! It loads the train from the tip of its branch, applies membership changes
//! by recomputing the integration commit from scratch, and moves the branch
//! only when that succeeds. A failed add or remove leaves both the in-memory
//! members and the branch exactly as they were.
//!
//! The merge base is re-resolved from [`OperatorSettings::base_revision`] on
//! every change, so a train follows its target branch as it moves.

use thiserror::Error;

use crate::git::{GitError, MergeError, Repo};
use crate::status::{FormatError, ParseError, format_train_state, parse_train_state};
use crate::types::{
    GitMergeFailResult, GitRef, IssueIid, MergeTrain, MergeTrainItem, ProjectId, Sha,
};
use crate::view::{
    CommitView, MemberView, MergeTrainView, ViewHelper, error_to_markdown, render_merge_failure,
};


/// Errors from train operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The members do not merge cleanly.
    #[error("{0}")]
    Merge(Box<GitMergeFailResult>),

    /// `remove` named a branch the train does not contain.
    #[error("branch {branch} is not a member of {train}")]
    NotAMember { branch: String, train: String },

    /// The train branch tip is not an integration commit.
    #[error("{branch} does not hold light-merge state: {source}")]
    Decode {
        branch: String,
        #[source]
        source: ParseError,
    },

    /// The prospective train could not be serialised.
    #[error(transparent)]
    Encode(#[from] FormatError),

    /// Local git failure.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The local branch was updated but publishing it failed.
    ///
    /// Local state is not rolled back; re-running the command retries the push.
    #[error("{branch} was updated locally but pushing to {remote} failed: {source}")]
    Push {
        branch: String,
        remote: String,
        #[source]
        source: GitError,
    },
}

impl From<MergeError> for OperatorError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Failed(fail) => OperatorError::Merge(fail),
            MergeError::Git(e) => OperatorError::Git(e),
        }
    }
}

impl OperatorError {
    /// Returns the merge failure, if this is a conflict.
    pub fn as_merge_failure(&self) -> Option<&GitMergeFailResult> {
        match self {
            OperatorError::Merge(fail) => Some(fail),
            _ => None,
        }
    }

    /// Renders the error for an issue description or note.
    pub fn to_markdown(&self) -> String {
        match self {
            OperatorError::Merge(fail) => render_merge_failure(fail),
            other => error_to_markdown(&other.to_string()),
        }
    }
}

/// Everything an operator needs besides the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSettings {
    pub project_id: ProjectId,
    pub issue_iid: IssueIid,

    /// Prefix of the train branch name; the issue IID is appended.
    pub branch_prefix: String,

    /// Revision every integration commit is built on (e.g. `origin/HEAD`).
    pub base_revision: String,

    /// Remote that train branches are pushed to and recovered from.
    pub remote: String,
}

impl OperatorSettings {
    /// The train branch name for these settings.
    pub fn branch_name(&self) -> String {
        MergeTrain::branch_name_for(&self.branch_prefix, self.issue_iid)
    }

    /// Records the last integration commit of a train emptied locally whose
    /// remote branch may still exist. Cleared once the remote delete lands or
    /// the train is rebuilt.
    pub fn deleted_marker(&self) -> String {
        format!("refs/light-merge/deleted/{}", self.branch_name())
    }
}

/// Applies membership changes to one merge train.
#[derive(Debug)]
pub struct MergeTrainOperator {
    repo: Repo,
    settings: OperatorSettings,
    train: MergeTrain,
    head: Option<GitRef>,
}

impl MergeTrainOperator {
    /// Loads the train for `settings` from `repo`.
    ///
    /// The local train branch is read first; if it is absent, the remote-tracking
    /// branch is used so that a fresh clone picks up existing state. With
    /// neither, the train starts empty. A tracking branch still at a commit
    /// this working copy emptied locally (see
    /// [`OperatorSettings::deleted_marker`]) is stale and also means empty.
    /// Identifiers in the decoded state are replaced by those in `settings`.
    pub fn load(repo: Repo, settings: OperatorSettings) -> Result<Self, OperatorError> {
        let branch_name = settings.branch_name();
        let local = format!("refs/heads/{}", branch_name);
        let tracking = format!("refs/remotes/{}/{}", settings.remote, branch_name);

        let tip = match repo.try_resolve(&local)? {
            Some(sha) => Some(sha),
            None => {
                let tracked = repo.try_resolve(&tracking)?;
                let deleted = repo.try_resolve(&settings.deleted_marker())?;
                if tracked.is_some() && tracked == deleted {
                    tracing::warn!(
                        branch = %branch_name,
                        remote = %settings.remote,
                        "remote still holds a train that was emptied locally, ignoring it"
                    );
                    None
                } else {
                    tracked
                }
            }
        };

        let Some(tip) = tip else {
            tracing::debug!(branch = %branch_name, "no train branch, starting empty");
            let train = MergeTrain::new(settings.project_id, settings.issue_iid, &settings.branch_prefix);
            return Ok(MergeTrainOperator {
                repo,
                settings,
                train,
                head: None,
            });
        };

        let message = repo.read_message(&tip)?;
        let mut train = parse_train_state(&message).map_err(|source| OperatorError::Decode {
            branch: branch_name.clone(),
            source,
        })?;
        train.project_id = settings.project_id;
        train.issue_iid = settings.issue_iid;
        train.branch_name = branch_name.clone();

        tracing::debug!(
            branch = %branch_name,
            head = %tip.short(),
            members = train.members.len(),
            "loaded train"
        );

        Ok(MergeTrainOperator {
            repo,
            settings,
            train,
            head: Some(GitRef::new(branch_name, tip)),
        })
    }

    /// The current train.
    pub fn train(&self) -> &MergeTrain {
        &self.train
    }

    /// The current members, in merge order.
    pub fn members(&self) -> &[MergeTrainItem] {
        &self.train.members
    }

    /// The current integration commit, or `None` for an empty train.
    pub fn head(&self) -> Option<&GitRef> {
        self.head.as_ref()
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.settings
    }

    /// Adds `git_ref` to the end of the train, replacing any member with the
    /// same branch name, and returns the new integration commit.
    pub fn add(&mut self, git_ref: &GitRef) -> Result<GitRef, OperatorError> {
        let members = self.train.members_with(git_ref);
        let merged = self.rebuild(members)?;
        tracing::info!(
            train = %self.train.branch_name,
            branch = %git_ref.name,
            commit = %git_ref.commit.short(),
            head = %merged.commit.short(),
            "added branch"
        );
        Ok(merged)
    }

    /// Removes `branch` from the train.
    ///
    /// Returns the new integration commit, or `None` when the train became
    /// empty and its branch was deleted.
    pub fn remove(&mut self, branch: &str) -> Result<Option<GitRef>, OperatorError> {
        if !self.train.contains(branch) {
            return Err(OperatorError::NotAMember {
                branch: branch.to_string(),
                train: self.train.branch_name.clone(),
            });
        }

        let remaining = self.train.members_without(branch);
        if remaining.is_empty() {
            if let Some(head) = &self.head {
                self.repo
                    .set_ref(&self.settings.deleted_marker(), Some(&head.commit))?;
            }
            self.repo.set_branch(&self.train.branch_name, None)?;
            self.train.members.clear();
            self.head = None;
            tracing::info!(train = %self.train.branch_name, branch, "removed last branch, train deleted");
            return Ok(None);
        }

        let merged = self.rebuild(remaining)?;
        tracing::info!(
            train = %self.train.branch_name,
            branch,
            head = %merged.commit.short(),
            "removed branch"
        );
        Ok(Some(merged))
    }

    /// [`add`](Self::add), then publish the train branch.
    pub fn add_and_push(&mut self, git_ref: &GitRef) -> Result<GitRef, OperatorError> {
        let merged = self.add(git_ref)?;
        self.push(Some(&merged.commit))?;
        Ok(merged)
    }

    /// [`remove`](Self::remove), then publish the train branch (or delete it
    /// remotely if the train became empty).
    pub fn remove_and_push(&mut self, branch: &str) -> Result<Option<GitRef>, OperatorError> {
        let merged = self.remove(branch)?;
        self.push(merged.as_ref().map(|r| &r.commit))?;
        Ok(merged)
    }

    /// Builds the display view through `helper` and hands it to `helper.save`.
    ///
    /// Lookup failures for individual members are logged and rendered as
    /// missing data; only the final save can fail.
    pub async fn sync_merge_train_view<H>(&self, helper: &H) -> Result<(), H::Error>
    where
        H: ViewHelper + Sync,
    {
        let view = self.build_view(helper).await;
        helper.save(&view).await
    }

    /// Builds the display view of the current state.
    pub async fn build_view<H>(&self, helper: &H) -> MergeTrainView
    where
        H: ViewHelper + Sync,
    {
        let project_id = self.train.project_id;
        let url = helper.branch_url(project_id, &self.train.branch_name).await;

        let commit = match &self.head {
            Some(head) => Some(CommitView {
                sha: head.commit.clone(),
                url: helper.commit_url(project_id, &head.commit).await,
            }),
            None => None,
        };

        let mut members = Vec::with_capacity(self.train.members.len());
        for m in &self.train.members {
            let merge_request = helper
                .merge_request_info(m.project_id, &m.branch)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(branch = %m.branch, error = %e, "merge request lookup failed");
                    None
                });
            let latest_commit = helper
                .branch_latest_commit(m.project_id, &m.branch)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(branch = %m.branch, error = %e, "branch lookup failed");
                    None
                });

            members.push(MemberView {
                branch: m.branch.clone(),
                branch_url: helper.branch_url(m.project_id, &m.branch).await,
                merge_request,
                merged_commit: Some(CommitView {
                    sha: m.merged_commit.clone(),
                    url: helper.commit_url(m.project_id, &m.merged_commit).await,
                }),
                latest_commit,
            });
        }

        MergeTrainView {
            branch: self.train.branch_name.clone(),
            url,
            commit,
            members,
        }
    }

    /// Merges `members` onto the base and, on success, makes them current.
    fn rebuild(&mut self, members: Vec<MergeTrainItem>) -> Result<GitRef, OperatorError> {
        let prospective = self.train.with_members(members);
        let message = format_train_state(&prospective)?;
        let base = self.repo.resolve_ref(&self.settings.base_revision)?;
        let additions = prospective.member_refs();

        let merged = self.repo.merge(&message, &base, &additions)?;
        self.repo
            .set_branch(&prospective.branch_name, Some(&merged.commit))?;
        self.repo.set_ref(&self.settings.deleted_marker(), None)?;

        let head = GitRef::new(prospective.branch_name.clone(), merged.commit);
        self.train = prospective;
        self.head = Some(head.clone());
        Ok(head)
    }

    fn push(&self, commit: Option<&Sha>) -> Result<(), OperatorError> {
        self.repo
            .push_branch(&self.settings.remote, &self.train.branch_name, commit)
            .map_err(|source| OperatorError::Push {
                branch: self.train.branch_name.clone(),
                remote: self.settings.remote.clone(),
                source,
            })?;
        if commit.is_none() {
            self.repo.set_ref(&self.settings.deleted_marker(), None)?;
        }
        Ok(())
    }
}
