//! Merge train aggregate and its members.
//!
//! A merge train is an integration branch plus the ordered list of branches
//! merged into it. The order of `members` is the exact order in which branches
//! are merged, so two trains with the same branch set but different orders can
//! produce different conflict outcomes.

use serde::{Deserialize, Serialize};

use super::git_ref::GitRef;
use super::ids::{IssueIid, ProjectId, Sha};

/// The default prefix for train branch names.
pub const DEFAULT_BRANCH_NAME_PREFIX: &str = "auto/light-merge-";

/// One branch's contribution to a merge train.
///
/// `merged_commit` is the commit that was merged in last, not necessarily the
/// branch's current tip. Trains are not updated when their source branches move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeTrainItem {
    /// Project the branch lives in.
    pub project_id: ProjectId,

    /// Branch name.
    pub branch: String,

    /// The commit of `branch` that is part of the integration commit.
    pub merged_commit: Sha,
}

impl MergeTrainItem {
    /// Returns the member as a ref pointing at its merged commit.
    pub fn to_git_ref(&self) -> GitRef {
        GitRef::new(self.branch.clone(), self.merged_commit.clone())
    }
}

/// A merge train bound to one issue.
///
/// Field order is part of the persisted format (see [`crate::status`]); new
/// fields must be appended and must tolerate being absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTrain {
    /// Project that owns the issue and the train branch.
    pub project_id: ProjectId,

    /// Issue the train is bound to.
    pub issue_iid: IssueIid,

    /// Name of the integration branch, derived from `issue_iid`.
    pub branch_name: String,

    /// Members in merge order. No two members share a branch name.
    #[serde(default)]
    pub members: Vec<MergeTrainItem>,
}

impl MergeTrain {
    /// Creates an empty train for an issue.
    pub fn new(project_id: ProjectId, issue_iid: IssueIid, branch_prefix: &str) -> Self {
        MergeTrain {
            project_id,
            issue_iid,
            branch_name: Self::branch_name_for(branch_prefix, issue_iid),
            members: Vec::new(),
        }
    }

    /// Derives the integration branch name for an issue.
    pub fn branch_name_for(prefix: &str, issue_iid: IssueIid) -> String {
        format!("{}{}", prefix, issue_iid.0)
    }

    /// Returns true if the train has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Looks up a member by branch name.
    pub fn member(&self, branch: &str) -> Option<&MergeTrainItem> {
        self.members.iter().find(|m| m.branch == branch)
    }

    /// Returns true if `branch` is a member.
    pub fn contains(&self, branch: &str) -> bool {
        self.member(branch).is_some()
    }

    /// Computes the member list that results from adding `git_ref`.
    ///
    /// An existing member with the same branch is dropped and the new item is
    /// appended, so the most recently touched branch is always last.
    pub fn members_with(&self, git_ref: &GitRef) -> Vec<MergeTrainItem> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.branch != git_ref.name)
            .cloned()
            .collect();
        members.push(MergeTrainItem {
            project_id: self.project_id,
            branch: git_ref.name.clone(),
            merged_commit: git_ref.commit.clone(),
        });
        members
    }

    /// Computes the member list that results from removing `branch`.
    pub fn members_without(&self, branch: &str) -> Vec<MergeTrainItem> {
        self.members
            .iter()
            .filter(|m| m.branch != branch)
            .cloned()
            .collect()
    }

    /// Returns a copy of this train with a different member list.
    pub fn with_members(&self, members: Vec<MergeTrainItem>) -> MergeTrain {
        MergeTrain {
            project_id: self.project_id,
            issue_iid: self.issue_iid,
            branch_name: self.branch_name.clone(),
            members,
        }
    }

    /// Returns all members as refs, in merge order.
    pub fn member_refs(&self) -> Vec<GitRef> {
        self.members.iter().map(MergeTrainItem::to_git_ref).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> Sha {
        Sha::new(c.to_string().repeat(40))
    }

    fn train_with(branches: &[(&str, char)]) -> MergeTrain {
        let mut train = MergeTrain::new(ProjectId(1), IssueIid(7), DEFAULT_BRANCH_NAME_PREFIX);
        for (branch, c) in branches {
            train.members = train.members_with(&GitRef::new(*branch, sha(*c)));
        }
        train
    }

    fn branches(members: &[MergeTrainItem]) -> Vec<&str> {
        members.iter().map(|m| m.branch.as_str()).collect()
    }

    #[test]
    fn branch_name_is_prefix_plus_iid() {
        let train = MergeTrain::new(ProjectId(1), IssueIid(42), "auto/light-merge-");
        assert_eq!(train.branch_name, "auto/light-merge-42");
        assert!(train.is_empty());
    }

    #[test]
    fn members_with_appends_new_branch() {
        let train = train_with(&[("a", 'a')]);
        let members = train.members_with(&GitRef::new("b", sha('b')));
        assert_eq!(branches(&members), vec!["a", "b"]);
        assert_eq!(members[1].project_id, ProjectId(1));
    }

    #[test]
    fn members_with_moves_existing_branch_to_end() {
        let train = train_with(&[("a", 'a'), ("b", 'b'), ("c", 'c')]);
        let members = train.members_with(&GitRef::new("b", sha('d')));
        assert_eq!(branches(&members), vec!["a", "c", "b"]);
        assert_eq!(members[2].merged_commit, sha('d'));
    }

    #[test]
    fn members_with_does_not_mutate() {
        let train = train_with(&[("a", 'a')]);
        let before = train.clone();
        let _ = train.members_with(&GitRef::new("b", sha('b')));
        assert_eq!(train, before);
    }

    #[test]
    fn members_without_preserves_order() {
        let train = train_with(&[("a", 'a'), ("b", 'b'), ("c", 'c')]);
        assert_eq!(branches(&train.members_without("b")), vec!["a", "c"]);
        assert_eq!(branches(&train.members_without("zzz")), vec!["a", "b", "c"]);
    }

    #[test]
    fn member_refs_use_merged_commit() {
        let train = train_with(&[("a", 'a'), ("b", 'b')]);
        let refs = train.member_refs();
        assert_eq!(refs[0].name, "a");
        assert_eq!(refs[1].commit, sha('b'));
    }
}
