use crate::model::{generate_id, Id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    /// The single protected branch; changes only via an approved merge
    Main,
    /// An isolated line of schema evolution
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    None,      // No merge request pending
    Requested, // Merge into main has been requested
    Merged,    // Merge was approved; terminal
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: Id,
    pub name: String,
    pub branch_type: BranchType,
    pub merge_status: MergeStatus,
    pub created_at: String, // ISO 8601 timestamp
}

impl Branch {
    /// The protected main branch. Only the bootstrap path may call this.
    pub fn new_main() -> Self {
        Self {
            id: generate_id(),
            name: "main".to_string(),
            branch_type: BranchType::Main,
            merge_status: MergeStatus::None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn new(name: String) -> Self {
        Self {
            id: generate_id(),
            name,
            branch_type: BranchType::Feature,
            merge_status: MergeStatus::None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Main never takes mutations directly; it only advances through merges.
    pub fn is_mutable(&self) -> bool {
        self.branch_type == BranchType::Feature
    }

    pub fn merge_requested(&self) -> bool {
        self.merge_status == MergeStatus::Requested
    }
}
