//! Response bodies of the GitLab REST endpoints we call.
//!
//! Only the fields we read are declared; serde ignores the rest.

use serde::Deserialize;

use crate::types::ProjectId;

#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchCommit {
    pub id: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub title: String,
    pub web_url: String,
    pub source_branch: String,
    pub author: User,

    /// Head commit of the source branch. Older GitLab versions only send `sha`.
    #[serde(default)]
    pub diff_refs: Option<DiffRefs>,
    #[serde(default)]
    pub sha: Option<String>,
}

impl MergeRequest {
    /// The commit the merge request currently points at.
    pub fn head_sha(&self) -> Option<&str> {
        self.diff_refs
            .as_ref()
            .map(|d| d.head_sha.as_str())
            .or(self.sha.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffRefs {
    pub head_sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub web_url: String,
    pub path_with_namespace: String,
}
