use anyhow::anyhow;

use crate::error::EngineError;
use crate::model::{Branch, ColumnAttributes, Commit, DbColumn, Id, Table};
use crate::store::traits::{ChangeSet, Store};

/// Main never takes create/update/delete directly; it only advances through
/// an approved merge.
fn ensure_mutable(branch: &Branch, action: &str) -> Result<(), EngineError> {
    if !branch.is_mutable() {
        return Err(EngineError::prohibited(action, &branch.name));
    }
    Ok(())
}

fn ensure_in_table(column: &DbColumn, table: &Table) -> Result<(), EngineError> {
    if column.table_id != table.id {
        return Err(EngineError::not_found("column", &column.id));
    }
    Ok(())
}

/// Create a column in a table on a branch.
///
/// Appends one column version, its attributes row and an initial commit
/// (`attribute_id_in` absent) in a single atomic store call.
pub async fn create_column<S: Store>(
    store: &S,
    branch: &Branch,
    table: &Table,
    name: &str,
    datatype: &str,
) -> Result<(DbColumn, ColumnAttributes, Commit), EngineError> {
    log::debug!("create_column branch={} table={}", branch.id, table.id);
    ensure_mutable(branch, "Column creating")?;

    let column = DbColumn::new_lineage(table.id.clone());
    let attributes =
        ColumnAttributes::new(column.id.clone(), name.to_string(), datatype.to_string());
    let applied = store
        .append_change(&branch.id, ChangeSet::Create { column, attributes })
        .await?;

    unpack_version(applied)
}

/// Read the column version identified by exactly `id` on a branch.
///
/// This resolves the newest commit whose `attribute_id_out` equals the given
/// id; it does not walk the lineage forward. Use [`get_latest_column`] to
/// resolve the newest version of a logical column.
pub async fn get_column<S: Store>(
    store: &S,
    branch: &Branch,
    table: &Table,
    id: &Id,
) -> Result<(DbColumn, ColumnAttributes), EngineError> {
    log::debug!("get_column branch={} id={}", branch.id, id);
    let commit = store
        .latest_commit_producing(&branch.id, id)
        .await?
        .ok_or_else(|| EngineError::not_found("column", id))?;
    let produced = commit
        .attribute_id_out
        .ok_or_else(|| EngineError::not_found("column", id))?;

    resolve_version(store, table, &produced).await
}

/// Read the newest version of a logical column on a branch.
///
/// Resolves the commit with the largest chain position touching the lineage;
/// a terminal head means the column was deleted on this branch and reads as
/// NotFound.
pub async fn get_latest_column<S: Store>(
    store: &S,
    branch: &Branch,
    table: &Table,
    lineage_id: &Id,
) -> Result<(DbColumn, ColumnAttributes), EngineError> {
    log::debug!("get_latest_column branch={} lineage={}", branch.id, lineage_id);
    let commit = store
        .latest_commit_for_lineage(&branch.id, lineage_id)
        .await?
        .ok_or_else(|| EngineError::not_found("column", lineage_id))?;
    let produced = commit
        .attribute_id_out
        .ok_or_else(|| EngineError::not_found("column", lineage_id))?;

    resolve_version(store, table, &produced).await
}

/// Update one or more attributes of a column on a branch.
///
/// Appends a successor version in the same lineage; fields the caller leaves
/// unspecified inherit the prior version's values. The prior version stays
/// readable unchanged.
pub async fn update_column<S: Store>(
    store: &S,
    branch: &Branch,
    table: &Table,
    column: &DbColumn,
    name: Option<&str>,
    datatype: Option<&str>,
) -> Result<(DbColumn, ColumnAttributes, Commit), EngineError> {
    log::debug!("update_column branch={} column={}", branch.id, column.id);
    ensure_mutable(branch, "Column altering")?;
    ensure_in_table(column, table)?;

    let prior = store
        .get_column_attributes(&column.id)
        .await?
        .ok_or_else(|| EngineError::not_found("column attributes", &column.id))?;

    let new_column = column.next_version();
    let new_attributes = ColumnAttributes::new(
        new_column.id.clone(),
        name.unwrap_or(&prior.name).to_string(),
        datatype.unwrap_or(&prior.datatype).to_string(),
    );
    let applied = store
        .append_change(
            &branch.id,
            ChangeSet::Update {
                prior_column_id: column.id.clone(),
                column: new_column,
                attributes: new_attributes,
            },
        )
        .await?;

    unpack_version(applied)
}

/// Delete a column from a branch.
///
/// Appends a terminal commit (`attribute_id_out` absent). No column or
/// attributes rows are removed; history stays readable and only the chain
/// head resolves to deleted.
pub async fn delete_column<S: Store>(
    store: &S,
    branch: &Branch,
    column: &DbColumn,
) -> Result<Commit, EngineError> {
    log::debug!("delete_column branch={} column={}", branch.id, column.id);
    ensure_mutable(branch, "Column deleting")?;

    let applied = store
        .append_change(
            &branch.id,
            ChangeSet::Delete {
                prior_column_id: column.id.clone(),
            },
        )
        .await?;

    Ok(applied.commit)
}

async fn resolve_version<S: Store>(
    store: &S,
    table: &Table,
    column_id: &Id,
) -> Result<(DbColumn, ColumnAttributes), EngineError> {
    let column = store
        .get_column(column_id)
        .await?
        .ok_or_else(|| EngineError::not_found("column", column_id))?;
    ensure_in_table(&column, table)?;
    let attributes = store
        .get_column_attributes(&column.id)
        .await?
        .ok_or_else(|| EngineError::not_found("column attributes", &column.id))?;
    Ok((column, attributes))
}

fn unpack_version(
    applied: crate::store::traits::AppliedChange,
) -> Result<(DbColumn, ColumnAttributes, Commit), EngineError> {
    let column = applied
        .column
        .ok_or_else(|| EngineError::Storage(anyhow!("store applied a change without a column version")))?;
    let attributes = applied
        .attributes
        .ok_or_else(|| EngineError::Storage(anyhow!("store applied a change without attributes")))?;
    Ok((column, attributes, applied.commit))
}
