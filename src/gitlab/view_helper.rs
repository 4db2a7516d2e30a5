//! [`ViewHelper`] backed by GitLab: links point at the project's web UI and the
//! rendered view is written into the train issue's description.

use super::client::GitLabClient;
use super::error::GitLabError;
use crate::types::{IssueIid, ProjectId, Sha};
use crate::view::{
    CommitView, LastCommand, MergeRequestView, MergeTrainView, ViewHelper,
    render_issue_description,
};

/// Renders into the description of one issue.
#[derive(Debug, Clone)]
pub struct GitLabViewHelper {
    client: GitLabClient,
    project_id: ProjectId,
    project_web_url: String,
    issue_iid: IssueIid,
    last_command: Option<LastCommand>,
}

impl GitLabViewHelper {
    pub fn new(
        client: GitLabClient,
        project_id: ProjectId,
        project_web_url: impl Into<String>,
        issue_iid: IssueIid,
    ) -> Self {
        GitLabViewHelper {
            client,
            project_id,
            project_web_url: project_web_url.into(),
            issue_iid,
            last_command: None,
        }
    }

    /// Appends a "Last Command" section describing `last` to the saved description.
    pub fn with_last_command(mut self, last: LastCommand) -> Self {
        self.last_command = Some(last);
        self
    }

    /// Web URL of `project_id`. Members normally live in the train's own
    /// project, which needs no request.
    async fn project_web_url(&self, project_id: ProjectId) -> Option<String> {
        if project_id == self.project_id {
            return Some(self.project_web_url.clone());
        }
        match self.client.get_project(project_id).await {
            Ok(project) => Some(project.web_url),
            Err(e) => {
                tracing::error!(%project_id, error = %e, "failed to get project");
                None
            }
        }
    }
}

impl ViewHelper for GitLabViewHelper {
    type Error = GitLabError;

    async fn branch_url(&self, project_id: ProjectId, branch: &str) -> String {
        match self.project_web_url(project_id).await {
            Some(web_url) => format!("{}/-/tree/{}", web_url, branch),
            None => String::new(),
        }
    }

    async fn commit_url(&self, project_id: ProjectId, sha: &Sha) -> String {
        match self.project_web_url(project_id).await {
            Some(web_url) => format!("{}/-/commit/{}", web_url, sha),
            None => String::new(),
        }
    }

    async fn branch_latest_commit(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> Result<Option<CommitView>, GitLabError> {
        let branch = match self.client.get_branch(project_id, branch).await {
            Ok(branch) => branch,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let sha = Sha::parse(&branch.commit.id)?;
        let url = match branch.commit.web_url {
            Some(url) => url,
            None => self.commit_url(project_id, &sha).await,
        };
        Ok(Some(CommitView { sha, url }))
    }

    async fn merge_request_info(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> Result<Option<MergeRequestView>, GitLabError> {
        let mr = self
            .client
            .find_merge_request_for_branch(project_id, branch)
            .await?;
        Ok(mr.map(|mr| MergeRequestView {
            iid: mr.iid,
            title: mr.title,
            url: mr.web_url,
            author: mr.author.username,
        }))
    }

    async fn save(&self, view: &MergeTrainView) -> Result<(), GitLabError> {
        let description = render_issue_description(view, self.last_command.as_ref());
        self.client
            .update_issue_description(self.project_id, self.issue_iid, &description)
            .await
    }
}
