use crate::model::{generate_id, Id};
use serde::{Deserialize, Serialize};

/// One immutable entry in a branch's append-only log.
///
/// A commit links the attribute version it supersedes (`attribute_id_in`,
/// absent for a fresh lineage) to the version it produced
/// (`attribute_id_out`, absent when the lineage was deleted). Commits are
/// never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: Id,
    /// Branch whose log this commit belongs to
    pub branch_id: Id,
    /// Chain position within the branch, starting at 1
    pub ordinal: i64,
    /// Predecessor commit on the same branch (None for the first commit)
    pub prev_commit_id: Option<Id>,
    /// Attribute version superseded by this commit
    pub attribute_id_in: Option<Id>,
    /// Attribute version produced by this commit
    pub attribute_id_out: Option<Id>,
    pub created_at: String, // ISO 8601 timestamp
}

impl Commit {
    pub fn new(
        branch_id: Id,
        ordinal: i64,
        prev_commit_id: Option<Id>,
        attribute_id_in: Option<Id>,
        attribute_id_out: Option<Id>,
    ) -> Self {
        Self {
            id: generate_id(),
            branch_id,
            ordinal,
            prev_commit_id,
            attribute_id_in,
            attribute_id_out,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// True for a commit that started a fresh lineage
    pub fn is_initial(&self) -> bool {
        self.attribute_id_in.is_none()
    }

    /// True for a commit that deleted its lineage
    pub fn is_terminal(&self) -> bool {
        self.attribute_id_out.is_none()
    }
}
