//! A small GitLab REST v4 client.
//!
//! Every call is a single request/response with no retries; callers decide
//! what a failure means for them.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api::{Branch, MergeRequest, Project};
use super::error::GitLabError;
use crate::types::{GitRef, IssueIid, NoteId, ProjectId, Sha};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Authenticated client for one GitLab instance.
#[derive(Clone)]
pub struct GitLabClient {
    http: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GitLabClient {
    /// Creates a client for the instance at `base_url` (e.g. `https://gitlab.com`).
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, GitLabError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(GitLabClient {
            http,
            api_base: format!("{}/api/v4", base_url.trim_end_matches('/')),
            token: token.into(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Sends an authenticated request and maps non-success statuses to errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, GitLabError> {
        let response = request.header("PRIVATE-TOKEN", &self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GitLabError::NotFound(what.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(GitLabError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, GitLabError> {
        let request = self.http.get(self.api_url(path)).query(query);
        Ok(self.send(request, what).await?.json().await?)
    }

    pub async fn get_branch(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> Result<Branch, GitLabError> {
        tracing::debug!(%project_id, branch, "fetching branch");
        let path = format!(
            "/projects/{}/repository/branches/{}",
            project_id,
            urlencoding::encode(branch)
        );
        self.get_json(&path, &[], &format!("branch {}", branch)).await
    }

    pub async fn get_merge_request(
        &self,
        project_id: ProjectId,
        iid: u64,
    ) -> Result<MergeRequest, GitLabError> {
        tracing::debug!(%project_id, mr_iid = iid, "fetching merge request");
        let path = format!("/projects/{}/merge_requests/{}", project_id, iid);
        self.get_json(&path, &[], &format!("merge request !{}", iid))
            .await
    }

    /// The most recent merge request whose source is `branch`, if any.
    pub async fn find_merge_request_for_branch(
        &self,
        project_id: ProjectId,
        branch: &str,
    ) -> Result<Option<MergeRequest>, GitLabError> {
        tracing::debug!(%project_id, branch, "finding merge request");
        let path = format!("/projects/{}/merge_requests", project_id);
        let mrs: Vec<MergeRequest> = self
            .get_json(
                &path,
                &[("source_branch", branch), ("per_page", "1")],
                &format!("merge requests of {}", project_id),
            )
            .await?;
        Ok(mrs.into_iter().next())
    }

    pub async fn get_project(&self, project_id: ProjectId) -> Result<Project, GitLabError> {
        let path = format!("/projects/{}", project_id);
        self.get_json(&path, &[], &format!("project {}", project_id))
            .await
    }

    /// Posts a note on an issue.
    pub async fn create_issue_note(
        &self,
        project_id: ProjectId,
        issue_iid: IssueIid,
        body: &str,
    ) -> Result<(), GitLabError> {
        let url = self.api_url(&format!(
            "/projects/{}/issues/{}/notes",
            project_id, issue_iid.0
        ));
        let request = self.http.post(url).json(&json!({ "body": body }));
        self.send(request, &format!("issue {}", issue_iid)).await?;
        Ok(())
    }

    /// Reacts to an issue note. `emoji` is the bare name, e.g. `white_check_mark`.
    pub async fn award_emoji_on_issue_note(
        &self,
        project_id: ProjectId,
        issue_iid: IssueIid,
        note_id: NoteId,
        emoji: &str,
    ) -> Result<(), GitLabError> {
        let url = self.api_url(&format!(
            "/projects/{}/issues/{}/notes/{}/award_emoji",
            project_id, issue_iid.0, note_id
        ));
        let request = self.http.post(url).json(&json!({ "name": emoji }));
        self.send(request, &format!("note {}", note_id)).await?;
        Ok(())
    }

    pub async fn update_issue_description(
        &self,
        project_id: ProjectId,
        issue_iid: IssueIid,
        description: &str,
    ) -> Result<(), GitLabError> {
        let url = self.api_url(&format!("/projects/{}/issues/{}", project_id, issue_iid.0));
        let request = self
            .http
            .put(url)
            .json(&json!({ "description": description }));
        self.send(request, &format!("issue {}", issue_iid)).await?;
        Ok(())
    }

    /// Resolves a branch name, or `!N` for merge request N, to a branch and commit.
    ///
    /// Merge requests resolve to their source branch at the merge request's
    /// head commit. Any failure to look up a merge request is reported as
    /// [`GitLabError::LookupFailed`]; a missing branch is [`GitLabError::NotFound`].
    pub async fn resolve_ref(
        &self,
        project_id: ProjectId,
        reference: &str,
    ) -> Result<GitRef, GitLabError> {
        let Some(number) = reference.strip_prefix('!') else {
            let branch = self.get_branch(project_id, reference).await?;
            return Ok(GitRef::new(reference, Sha::parse(&branch.commit.id)?));
        };

        let iid: u64 = number
            .parse()
            .map_err(|_| GitLabError::InvalidReference(reference.to_string()))?;
        let lookup_failed = |reason: String| GitLabError::LookupFailed {
            reference: reference.to_string(),
            reason,
        };

        let mr = self
            .get_merge_request(project_id, iid)
            .await
            .map_err(|e| lookup_failed(e.to_string()))?;
        let head = mr
            .head_sha()
            .ok_or_else(|| lookup_failed("merge request has no head commit".to_string()))?;
        let sha = Sha::parse(head).map_err(|e| lookup_failed(e.to_string()))?;
        Ok(GitRef::new(mr.source_branch, sha))
    }
}
