use anyhow::{Context, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::model::{
    AttributeKind, Branch, BranchType, ColumnAttributes, Commit, DbColumn, Id, MergeStatus, Table,
};
use crate::store::traits::{
    AppliedChange, AttributeStore, BranchStore, ChangeSet, CommitStore, TableStore,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn branch_type_str(branch_type: BranchType) -> &'static str {
    match branch_type {
        BranchType::Main => "main",
        BranchType::Feature => "feature",
    }
}

fn parse_branch_type(s: &str) -> BranchType {
    match s {
        "main" => BranchType::Main,
        _ => BranchType::Feature,
    }
}

fn merge_status_str(status: MergeStatus) -> &'static str {
    match status {
        MergeStatus::None => "none",
        MergeStatus::Requested => "requested",
        MergeStatus::Merged => "merged",
    }
}

fn parse_merge_status(s: &str) -> MergeStatus {
    match s {
        "requested" => MergeStatus::Requested,
        "merged" => MergeStatus::Merged,
        _ => MergeStatus::None,
    }
}

fn kind_str(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Column => "column",
    }
}

fn branch_from_row(row: &PgRow) -> Branch {
    Branch {
        id: row.get("id"),
        name: row.get("name"),
        branch_type: parse_branch_type(row.get::<String, _>("branch_type").as_str()),
        merge_status: parse_merge_status(row.get::<String, _>("merge_status").as_str()),
        created_at: row.get("created_at"),
    }
}

fn table_from_row(row: &PgRow) -> Table {
    Table {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn column_from_row(row: &PgRow) -> DbColumn {
    DbColumn {
        id: row.get("id"),
        table_id: row.get("table_id"),
        lineage_id: row.get("lineage_id"),
        kind: AttributeKind::Column,
    }
}

fn attributes_from_row(row: &PgRow) -> ColumnAttributes {
    ColumnAttributes {
        id: row.get("id"),
        column_id: row.get("column_id"),
        kind: AttributeKind::Column,
        name: row.get("name"),
        datatype: row.get("datatype"),
    }
}

fn commit_from_row(row: &PgRow) -> Commit {
    Commit {
        id: row.get("id"),
        branch_id: row.get("branch_id"),
        ordinal: row.get("ordinal"),
        prev_commit_id: row.get("prev_commit_id"),
        attribute_id_in: row.get("attribute_id_in"),
        attribute_id_out: row.get("attribute_id_out"),
        created_at: row.get("created_at"),
    }
}

const COMMIT_COLUMNS: &str =
    "id, branch_id, ordinal, prev_commit_id, attribute_id_in, attribute_id_out, created_at";

async fn insert_column_tx(tx: &mut Transaction<'_, Postgres>, column: &DbColumn) -> Result<()> {
    sqlx::query("INSERT INTO columns (id, table_id, lineage_id, kind) VALUES ($1, $2, $3, $4)")
        .bind(&column.id)
        .bind(&column.table_id)
        .bind(&column.lineage_id)
        .bind(kind_str(column.kind))
        .execute(&mut **tx)
        .await
        .context("Failed to insert column version")?;
    Ok(())
}

async fn insert_attributes_tx(
    tx: &mut Transaction<'_, Postgres>,
    attributes: &ColumnAttributes,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO column_attributes (id, column_id, kind, name, datatype) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&attributes.id)
    .bind(&attributes.column_id)
    .bind(kind_str(attributes.kind))
    .bind(&attributes.name)
    .bind(&attributes.datatype)
    .execute(&mut **tx)
    .await
    .context("Failed to insert column attributes")?;
    Ok(())
}

async fn insert_commit_tx(tx: &mut Transaction<'_, Postgres>, commit: &Commit) -> Result<()> {
    sqlx::query(
        "INSERT INTO commits (id, branch_id, ordinal, prev_commit_id, attribute_id_in, attribute_id_out, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&commit.id)
    .bind(&commit.branch_id)
    .bind(commit.ordinal)
    .bind(&commit.prev_commit_id)
    .bind(&commit.attribute_id_in)
    .bind(&commit.attribute_id_out)
    .bind(&commit.created_at)
    .execute(&mut **tx)
    .await
    .context("Failed to insert commit")?;
    Ok(())
}

async fn latest_commit_tx(
    tx: &mut Transaction<'_, Postgres>,
    branch_id: &Id,
) -> Result<Option<Commit>> {
    let row = sqlx::query(&format!(
        "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = $1 ORDER BY ordinal DESC LIMIT 1"
    ))
    .bind(branch_id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to fetch latest commit")?;

    Ok(row.map(|r| commit_from_row(&r)))
}

#[async_trait::async_trait]
impl BranchStore for PostgresStore {
    async fn get_branch(&self, id: &Id) -> Result<Option<Branch>> {
        let row = sqlx::query(
            "SELECT id, name, branch_type, merge_status, created_at FROM branches WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch branch")?;

        Ok(row.map(|r| branch_from_row(&r)))
    }

    async fn list_branches(&self) -> Result<Vec<Branch>> {
        let rows = sqlx::query(
            "SELECT id, name, branch_type, merge_status, created_at FROM branches ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list branches")?;

        Ok(rows.iter().map(branch_from_row).collect())
    }

    async fn insert_branch(&self, branch: Branch) -> Result<()> {
        sqlx::query(
            "INSERT INTO branches (id, name, branch_type, merge_status, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(branch_type_str(branch.branch_type))
        .bind(merge_status_str(branch.merge_status))
        .bind(&branch.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert branch")?;

        Ok(())
    }

    async fn update_branch(&self, branch: Branch) -> Result<()> {
        let result = sqlx::query(
            "UPDATE branches SET name = $2, merge_status = $3 WHERE id = $1",
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(merge_status_str(branch.merge_status))
        .execute(&self.pool)
        .await
        .context("Failed to update branch")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("branch '{}' does not exist", branch.id));
        }
        Ok(())
    }

    async fn get_main_branch(&self) -> Result<Option<Branch>> {
        let row = sqlx::query(
            "SELECT id, name, branch_type, merge_status, created_at FROM branches \
             WHERE branch_type = 'main' LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch main branch")?;

        Ok(row.map(|r| branch_from_row(&r)))
    }
}

#[async_trait::async_trait]
impl TableStore for PostgresStore {
    async fn get_table(&self, id: &Id) -> Result<Option<Table>> {
        let row = sqlx::query("SELECT id, name, created_at FROM tables WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch table")?;

        Ok(row.map(|r| table_from_row(&r)))
    }

    async fn list_tables(&self) -> Result<Vec<Table>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM tables ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tables")?;

        Ok(rows.iter().map(table_from_row).collect())
    }

    async fn insert_table(&self, table: Table) -> Result<()> {
        sqlx::query("INSERT INTO tables (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(&table.id)
            .bind(&table.name)
            .bind(&table.created_at)
            .execute(&self.pool)
            .await
            .context("Failed to insert table")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl AttributeStore for PostgresStore {
    async fn get_column(&self, id: &Id) -> Result<Option<DbColumn>> {
        let row = sqlx::query("SELECT id, table_id, lineage_id, kind FROM columns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch column")?;

        Ok(row.map(|r| column_from_row(&r)))
    }

    async fn get_column_attributes(&self, column_id: &Id) -> Result<Option<ColumnAttributes>> {
        let row = sqlx::query(
            "SELECT id, column_id, kind, name, datatype FROM column_attributes WHERE column_id = $1",
        )
        .bind(column_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch column attributes")?;

        Ok(row.map(|r| attributes_from_row(&r)))
    }
}

#[async_trait::async_trait]
impl CommitStore for PostgresStore {
    async fn list_commits_for_branch(&self, branch_id: &Id) -> Result<Vec<Commit>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = $1 ORDER BY ordinal"
        ))
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list commits")?;

        Ok(rows.iter().map(commit_from_row).collect())
    }

    async fn latest_commit_for_branch(&self, branch_id: &Id) -> Result<Option<Commit>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = $1 ORDER BY ordinal DESC LIMIT 1"
        ))
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest commit")?;

        Ok(row.map(|r| commit_from_row(&r)))
    }

    async fn latest_commit_producing(
        &self,
        branch_id: &Id,
        attribute_id: &Id,
    ) -> Result<Option<Commit>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits \
             WHERE branch_id = $1 AND attribute_id_out = $2 \
             ORDER BY ordinal DESC LIMIT 1"
        ))
        .bind(branch_id)
        .bind(attribute_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch commit producing attribute")?;

        Ok(row.map(|r| commit_from_row(&r)))
    }

    async fn latest_commit_for_lineage(
        &self,
        branch_id: &Id,
        lineage_id: &Id,
    ) -> Result<Option<Commit>> {
        // Terminal commits carry the lineage only through attribute_id_in,
        // hence the second join.
        let row = sqlx::query(
            "SELECT c.id, c.branch_id, c.ordinal, c.prev_commit_id, c.attribute_id_in, c.attribute_id_out, c.created_at \
             FROM commits c \
             LEFT JOIN columns o ON o.id = c.attribute_id_out \
             LEFT JOIN columns i ON i.id = c.attribute_id_in \
             WHERE c.branch_id = $1 AND (o.lineage_id = $2 OR i.lineage_id = $2) \
             ORDER BY c.ordinal DESC LIMIT 1",
        )
        .bind(branch_id)
        .bind(lineage_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch commit for lineage")?;

        Ok(row.map(|r| commit_from_row(&r)))
    }

    async fn append_change(&self, branch_id: &Id, change: ChangeSet) -> Result<AppliedChange> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .context("Failed to set transaction isolation level")?;

        let latest = latest_commit_tx(&mut tx, branch_id).await?;
        let ordinal = latest.as_ref().map(|c| c.ordinal + 1).unwrap_or(1);
        let prev_commit_id = latest.map(|c| c.id);

        let applied = match change {
            ChangeSet::Create { column, attributes } => {
                insert_column_tx(&mut tx, &column).await?;
                insert_attributes_tx(&mut tx, &attributes).await?;
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    None,
                    Some(column.id.clone()),
                );
                insert_commit_tx(&mut tx, &commit).await?;
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
                insert_column_tx(&mut tx, &column).await?;
                insert_attributes_tx(&mut tx, &attributes).await?;
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    Some(prior_column_id),
                    Some(column.id.clone()),
                );
                insert_commit_tx(&mut tx, &commit).await?;
                AppliedChange {
                    column: Some(column),
                    attributes: Some(attributes),
                    commit,
                }
            }
            ChangeSet::Delete { prior_column_id } => {
                let commit = Commit::new(
                    branch_id.clone(),
                    ordinal,
                    prev_commit_id,
                    Some(prior_column_id),
                    None,
                );
                insert_commit_tx(&mut tx, &commit).await?;
                AppliedChange {
                    column: None,
                    attributes: None,
                    commit,
                }
            }
        };

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(applied)
    }

    async fn approve_merge(
        &self,
        source_branch_id: &Id,
        target_branch_id: &Id,
    ) -> Result<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .context("Failed to set transaction isolation level")?;

        // Lock the source branch row; an already-merged source means this
        // approval completed earlier and must not replay again
        let source_row = sqlx::query(
            "SELECT merge_status FROM branches WHERE id = $1 FOR UPDATE",
        )
        .bind(source_branch_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock source branch")?
        .ok_or_else(|| anyhow::anyhow!("branch '{}' does not exist", source_branch_id))?;
        if source_row.get::<String, _>("merge_status") == "merged" {
            tx.commit().await.context("Failed to commit transaction")?;
            return Ok(0);
        }

        let rows = sqlx::query(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = $1 ORDER BY ordinal"
        ))
        .bind(source_branch_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fetch source commits")?;
        let source: Vec<Commit> = rows.iter().map(commit_from_row).collect();

        let latest = latest_commit_tx(&mut tx, target_branch_id).await?;
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
            insert_commit_tx(&mut tx, &replayed).await?;
        }

        // Status flip rides the same transaction as the replay
        sqlx::query("UPDATE branches SET merge_status = 'merged' WHERE id = $1")
            .bind(source_branch_id)
            .execute(&mut *tx)
            .await
            .context("Failed to mark branch merged")?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(count)
    }
}
