//! Named references to commits.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Sha;

/// A commit with a human-readable label.
///
/// The label is a branch name or a synthetic name such as `HEAD`. Two refs are
/// equal iff they point at the same commit; the name is for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    /// Branch name or synthetic label.
    pub name: String,
    /// The commit this ref points at.
    pub commit: Sha,
}

impl GitRef {
    pub fn new(name: impl Into<String>, commit: Sha) -> Self {
        GitRef {
            name: name.into(),
            commit,
        }
    }
}

impl PartialEq for GitRef {
    fn eq(&self, other: &Self) -> bool {
        self.commit == other.commit
    }
}

impl Eq for GitRef {}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.commit.short())
    }
}
