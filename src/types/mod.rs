//! Core domain types for light-merge.
//!
//! This module contains the value types shared by the git adapter, the state
//! codec, the train operator and the status view.

pub mod git_ref;
pub mod ids;
pub mod merge;
pub mod train;

// Re-export commonly used types at the module level
pub use git_ref::GitRef;
pub use ids::{InvalidSha, IssueIid, NoteId, ProjectId, Sha};
pub use merge::{FileMergeConflict, GitMergeFailResult};
pub use train::{DEFAULT_BRANCH_NAME_PREFIX, MergeTrain, MergeTrainItem};
