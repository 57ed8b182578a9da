use std::collections::HashMap;

use anyhow::{anyhow, Result};
use itertools::Itertools;
use parking_lot::RwLock;

use crate::model::{Branch, BranchType, ColumnAttributes, Commit, DbColumn, Id, MergeStatus, Table};
use crate::store::traits::{
    AppliedChange, AttributeStore, BranchStore, ChangeSet, CommitStore, TableStore,
};

#[derive(Debug, Default)]
struct MemoryInner {
    branches: HashMap<Id, Branch>,
    tables: HashMap<Id, Table>,
    columns: HashMap<Id, DbColumn>,
    /// Keyed by owning column id; one attributes row per column version
    attributes: HashMap<Id, ColumnAttributes>,
    /// Insertion order; ordinals order commits within a branch
    commits: Vec<Commit>,
}

impl MemoryInner {
    fn latest_commit(&self, branch_id: &Id) -> Option<&Commit> {
        self.commits
            .iter()
            .filter(|c| &c.branch_id == branch_id)
            .max_by_key(|c| c.ordinal)
    }

    /// Lineage a commit touches, resolved through the version it produced or,
    /// for terminal commits, the version it superseded
    fn lineage_of(&self, commit: &Commit) -> Option<&Id> {
        let column_id = commit
            .attribute_id_out
            .as_ref()
            .or(commit.attribute_id_in.as_ref())?;
        self.columns.get(column_id).map(|c| &c.lineage_id)
    }
}

/// In-memory store backing the test suite and local development.
///
/// A single lock over all tables makes `append_change` and `approve_merge`
/// atomic: readers either see the whole row group a mutation inserted or none
/// of it, matching the transaction contract the Postgres store gets from
/// serializable transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BranchStore for MemoryStore {
    async fn get_branch(&self, id: &Id) -> Result<Option<Branch>> {
        Ok(self.inner.read().branches.get(id).cloned())
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        let inner = self.inner.read();
        Ok(inner
            .branches
            .values()
            .cloned()
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at))
            .collect())
    }

    async fn insert_branch(&self, branch: Branch) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.branches.contains_key(&branch.id) {
            return Err(anyhow!("branch '{}' already exists", branch.id));
        }
        // At most one main branch, same invariant the Postgres schema
        // enforces with a partial unique index
        if branch.branch_type == BranchType::Main
            && inner
                .branches
                .values()
                .any(|b| b.branch_type == BranchType::Main)
        {
            return Err(anyhow!("a main branch already exists"));
        }
        inner.branches.insert(branch.id.clone(), branch);
        Ok(())
    }

    async fn update_branch(&self, branch: Branch) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.branches.contains_key(&branch.id) {
            return Err(anyhow!("branch '{}' does not exist", branch.id));
        }
        inner.branches.insert(branch.id.clone(), branch);
        Ok(())
    }

    async fn get_main_branch(&self) -> Result<Option<Branch>> {
        let inner = self.inner.read();
        Ok(inner
            .branches
            .values()
            .find(|b| b.branch_type == BranchType::Main)
            .cloned())
    }
}

#[async_trait::async_trait]
impl TableStore for MemoryStore {
    async fn get_table(&self, id: &Id) -> Result<Option<Table>> {
        Ok(self.inner.read().tables.get(id).cloned())
    }

    async fn list_tables(&self) -> Result<Vec<Table>> {
        let inner = self.inner.read();
        Ok(inner
            .tables
            .values()
            .cloned()
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at))
            .collect())
    }

    async fn insert_table(&self, table: Table) -> Result<()> {
        self.inner.write().tables.insert(table.id.clone(), table);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AttributeStore for MemoryStore {
    async fn get_column(&self, id: &Id) -> Result<Option<DbColumn>> {
        Ok(self.inner.read().columns.get(id).cloned())
    }

    async fn get_column_attributes(&self, column_id: &Id) -> Result<Option<ColumnAttributes>> {
        Ok(self.inner.read().attributes.get(column_id).cloned())
    }
}

#[async_trait::async_trait]
impl CommitStore for MemoryStore {
    async fn list_commits_for_branch(&self, branch_id: &Id) -> Result<Vec<Commit>> {
        let inner = self.inner.read();
        Ok(inner
            .commits
            .iter()
            .filter(|c| &c.branch_id == branch_id)
            .cloned()
            .sorted_by_key(|c| c.ordinal)
            .collect())
    }

    async fn latest_commit_for_branch(&self, branch_id: &Id) -> Result<Option<Commit>> {
        Ok(self.inner.read().latest_commit(branch_id).cloned())
    }

    async fn latest_commit_producing(
        &self,
        branch_id: &Id,
        attribute_id: &Id,
    ) -> Result<Option<Commit>> {
        let inner = self.inner.read();
        Ok(inner
            .commits
            .iter()
            .filter(|c| {
                &c.branch_id == branch_id && c.attribute_id_out.as_ref() == Some(attribute_id)
            })
            .max_by_key(|c| c.ordinal)
            .cloned())
    }

    async fn latest_commit_for_lineage(
        &self,
        branch_id: &Id,
        lineage_id: &Id,
    ) -> Result<Option<Commit>> {
        let inner = self.inner.read();
        Ok(inner
            .commits
            .iter()
            .filter(|c| &c.branch_id == branch_id)
            .sorted_by_key(|c| c.ordinal)
            .rev()
            .find(|c| inner.lineage_of(c) == Some(lineage_id))
            .cloned())
    }

    async fn append_change(&self, branch_id: &Id, change: ChangeSet) -> Result<AppliedChange> {
        let mut inner = self.inner.write();
        if !inner.branches.contains_key(branch_id) {
            return Err(anyhow!("branch '{}' does not exist", branch_id));
        }

        // Latest-commit read and the inserts happen under one write lock, so
        // no other writer can slip an append in between.
        let latest = inner.latest_commit(branch_id).cloned();
        let ordinal = latest.as_ref().map(|c| c.ordinal + 1).unwrap_or(1);
        let prev_commit_id = latest.map(|c| c.id);

        let applied = match change {
            ChangeSet::Create { column, attributes } => {
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    None,
                    Some(column.id.clone()),
                );
                inner.columns.insert(column.id.clone(), column.clone());
                inner.attributes.insert(column.id.clone(), attributes.clone());
                inner.commits.push(commit.clone());
                AppliedChange {
                    column: Some(column),
                    attributes: Some(attributes),
                    commit,
                }
            }
            ChangeSet::Update {
                prior_column_id,
                column,
                attributes,
            } => {
                if !inner.columns.contains_key(&prior_column_id) {
                    return Err(anyhow!("prior column '{}' does not exist", prior_column_id));
                }
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    Some(prior_column_id),
                    Some(column.id.clone()),
                );
                inner.columns.insert(column.id.clone(), column.clone());
                inner.attributes.insert(column.id.clone(), attributes.clone());
                inner.commits.push(commit.clone());
                AppliedChange {
                    column: Some(column),
                    attributes: Some(attributes),
                    commit,
                }
            }
            ChangeSet::Delete { prior_column_id } => {
                if !inner.columns.contains_key(&prior_column_id) {
                    return Err(anyhow!("prior column '{}' does not exist", prior_column_id));
                }
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    Some(prior_column_id),
                    None,
                );
                inner.commits.push(commit.clone());
                AppliedChange {
                    column: None,
                    attributes: None,
                    commit,
                }
            }
        };

        Ok(applied)
    }

    async fn approve_merge(
        &self,
        source_branch_id: &Id,
        target_branch_id: &Id,
    ) -> Result<usize> {
        let mut inner = self.inner.write();
        let source_branch = inner
            .branches
            .get(source_branch_id)
            .cloned()
            .ok_or_else(|| anyhow!("branch '{}' does not exist", source_branch_id))?;
        // An already-merged source means this approval completed earlier;
        // replaying again would duplicate main's history
        if source_branch.merge_status == MergeStatus::Merged {
            return Ok(0);
        }

        let source: Vec<Commit> = inner
            .commits
            .iter()
            .filter(|c| &c.branch_id == source_branch_id)
            .cloned()
            .sorted_by_key(|c| c.ordinal)
            .collect();

        let latest = inner.latest_commit(target_branch_id).cloned();
        let mut ordinal = latest.as_ref().map(|c| c.ordinal).unwrap_or(0);
        let mut prev_commit_id = latest.map(|c| c.id);

        let count = source.len();
        for commit in source {
            ordinal += 1;
            let replayed = Commit::new(
                target_branch_id.clone(),
                ordinal,
                prev_commit_id,
                commit.attribute_id_in,
                commit.attribute_id_out,
            );
            prev_commit_id = Some(replayed.id.clone());
            inner.commits.push(replayed);
        }

        let mut merged = source_branch;
        merged.merge_status = MergeStatus::Merged;
        inner.branches.insert(merged.id.clone(), merged);

        Ok(count)
    }
}
