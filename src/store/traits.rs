use crate::model::{Branch, ColumnAttributes, Commit, DbColumn, Id, Table};
use anyhow::Result;

/// Engine-prepared rows for one column mutation. The store assigns the chain
/// position and predecessor link inside its own transaction, so the
/// read-latest-then-append window cannot interleave with another writer.
#[derive(Debug, Clone)]
pub enum ChangeSet {
    /// Fresh lineage: commit gets `attribute_id_in = None`
    Create {
        column: DbColumn,
        attributes: ColumnAttributes,
    },
    /// Successor version: commit links prior to new
    Update {
        prior_column_id: Id,
        column: DbColumn,
        attributes: ColumnAttributes,
    },
    /// Terminal commit: `attribute_id_out = None`, no rows deleted
    Delete { prior_column_id: Id },
}

/// Everything one `append_change` call made visible, all at once.
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub column: Option<DbColumn>,
    pub attributes: Option<ColumnAttributes>,
    pub commit: Commit,
}

#[async_trait::async_trait]
pub trait BranchStore: Send + Sync {
    async fn get_branch(&self, id: &Id) -> Result<Option<Branch>>;
    async fn list_branches(&self) -> Result<Vec<Branch>>;
    async fn insert_branch(&self, branch: Branch) -> Result<()>;
    async fn update_branch(&self, branch: Branch) -> Result<()>;
    /// The single protected main branch, if bootstrapped
    async fn get_main_branch(&self) -> Result<Option<Branch>>;
}

#[async_trait::async_trait]
pub trait TableStore: Send + Sync {
    async fn get_table(&self, id: &Id) -> Result<Option<Table>>;
    async fn list_tables(&self) -> Result<Vec<Table>>;
    async fn insert_table(&self, table: Table) -> Result<()>;
}

#[async_trait::async_trait]
pub trait AttributeStore: Send + Sync {
    async fn get_column(&self, id: &Id) -> Result<Option<DbColumn>>;
    /// The one attributes row belonging to a column version
    async fn get_column_attributes(&self, column_id: &Id) -> Result<Option<ColumnAttributes>>;
}

#[async_trait::async_trait]
pub trait CommitStore: Send + Sync {
    /// All commits of a branch in ascending ordinal order
    async fn list_commits_for_branch(&self, branch_id: &Id) -> Result<Vec<Commit>>;
    async fn latest_commit_for_branch(&self, branch_id: &Id) -> Result<Option<Commit>>;
    /// Newest commit on the branch whose `attribute_id_out` equals `attribute_id`
    async fn latest_commit_producing(
        &self,
        branch_id: &Id,
        attribute_id: &Id,
    ) -> Result<Option<Commit>>;
    /// Newest commit on the branch touching the lineage, terminal commits
    /// included. The engine decides what a terminal head means.
    async fn latest_commit_for_lineage(
        &self,
        branch_id: &Id,
        lineage_id: &Id,
    ) -> Result<Option<Commit>>;
    /// The atomic mutation unit: read the branch's latest commit, assign
    /// ordinal and predecessor link, insert the version rows and the commit.
    /// All inserts become visible together or not at all.
    async fn append_change(&self, branch_id: &Id, change: ChangeSet) -> Result<AppliedChange>;
    /// Fold an approved merge into the target branch: append copies of the
    /// source branch's commits onto the target in ordinal order, referencing
    /// the same version rows, and mark the source branch merged — all in one
    /// transaction, so a failure leaves neither the replayed commits nor the
    /// status flip behind. A source branch that is already merged is skipped
    /// (returns 0), which makes caller retries safe. The source log is left
    /// untouched; returns the number of commits replayed.
    async fn approve_merge(&self, source_branch_id: &Id, target_branch_id: &Id) -> Result<usize>;
}

pub trait Store: BranchStore + TableStore + AttributeStore + CommitStore + Send + Sync {}
impl<T: BranchStore + TableStore + AttributeStore + CommitStore + Send + Sync> Store for T {}
