//! Display projection of a merge train.
//!
//! The operator builds a [`MergeTrainView`] by asking a [`ViewHelper`] for URLs
//! and platform metadata, then hands the finished view back to the helper's
//! [`save`](ViewHelper::save). Rendering to Markdown lives in [`render`].

pub mod render;

use std::future::Future;

use crate::types::{ProjectId, Sha};

pub use render::{
    LastCommand, MAX_CONFLICT_DETAIL_LEN, error_to_markdown, render_issue_description,
    render_merge_failure,
};

/// A commit with a link to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitView {
    pub sha: Sha,
    pub url: String,
}

/// Merge request metadata shown next to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestView {
    pub iid: u64,
    pub title: String,
    pub url: String,
    pub author: String,
}

/// One member of the train, as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub branch: String,
    pub branch_url: String,

    /// The open merge request whose source is `branch`, if any.
    pub merge_request: Option<MergeRequestView>,

    /// The commit that is part of the integration commit.
    pub merged_commit: Option<CommitView>,

    /// The branch's current tip. Differs from `merged_commit` when the branch
    /// moved after it was added.
    pub latest_commit: Option<CommitView>,
}

impl MemberView {
    /// Returns true if the branch has commits the train does not include yet.
    pub fn is_stale(&self) -> bool {
        match (&self.latest_commit, &self.merged_commit) {
            (Some(latest), Some(merged)) => latest.sha != merged.sha,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// A whole train, as displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeTrainView {
    /// Name of the train branch.
    pub branch: String,
    pub url: String,

    /// The integration commit. `None` for an empty train.
    pub commit: Option<CommitView>,

    pub members: Vec<MemberView>,
}

/// Platform lookups and persistence for the status view.
///
/// Lookup failures are reported as errors so the caller can decide whether a
/// partial view is acceptable; the operator logs them and renders "null".
pub trait ViewHelper {
    /// The error type returned by this helper.
    type Error: std::fmt::Display;

    /// Web URL of a branch.
    fn branch_url(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> impl Future<Output = String> + Send;

    /// Web URL of a commit.
    fn commit_url(&self, project_id: ProjectId, sha: &Sha) -> impl Future<Output = String> + Send;

    /// The current tip of `branch`, or `None` if it no longer exists.
    fn branch_latest_commit(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> impl Future<Output = Result<Option<CommitView>, Self::Error>> + Send;

    /// The merge request whose source branch is `branch`, if there is one.
    fn merge_request_info(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> impl Future<Output = Result<Option<MergeRequestView>, Self::Error>> + Send;

    /// Publishes the rendered view.
    fn save(&self, view: &MergeTrainView) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
