//! GitLab API error types.
//!
//! Lookups distinguish "the thing does not exist" ([`GitLabError::NotFound`])
//! from "the lookup itself went wrong" ([`GitLabError::LookupFailed`]) so the
//! dispatcher can reply with the right message.

use thiserror::Error;

use crate::types::InvalidSha;

#[derive(Debug, Error)]
pub enum GitLabError {
    /// HTTP 404 for the named object.
    #[error("{0} not found")]
    NotFound(String),

    /// A `!N` merge request reference could not be resolved.
    #[error("merge request {reference} lookup failed: {reason}")]
    LookupFailed { reference: String, reason: String },

    /// A reference that is neither a branch name nor `!<number>`.
    #[error("invalid reference {0:?}")]
    InvalidReference(String),

    /// Any other non-success status.
    #[error("GitLab API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitLab request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// GitLab returned a commit id that is not a full SHA.
    #[error(transparent)]
    InvalidSha(#[from] InvalidSha),
}

impl GitLabError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitLabError::NotFound(_))
    }
}
