use crate::model::{generate_id, Id};
use serde::{Deserialize, Serialize};

/// Tag distinguishing columns from other attribute kinds that may share the
/// commit-chain mechanism later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Column,
}

/// One immutable version of a column's existence.
///
/// Editing a column never reuses its row; every edit produces a new
/// `DbColumn` with a fresh `id` but the same `lineage_id`, which is the
/// stable identity of "the same logical column" across its versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbColumn {
    pub id: Id,
    pub table_id: Id,
    /// Stable logical-column identity; equals `id` on the first version
    pub lineage_id: Id,
    pub kind: AttributeKind,
}

impl DbColumn {
    /// First version of a brand-new lineage
    pub fn new_lineage(table_id: Id) -> Self {
        let id = generate_id();
        Self {
            lineage_id: id.clone(),
            id,
            table_id,
            kind: AttributeKind::Column,
        }
    }

    /// Successor version within the same lineage and table
    pub fn next_version(&self) -> Self {
        Self {
            id: generate_id(),
            table_id: self.table_id.clone(),
            lineage_id: self.lineage_id.clone(),
            kind: self.kind,
        }
    }
}

/// Full state of a column at one version; exactly one row per `DbColumn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAttributes {
    pub id: Id,
    pub column_id: Id,
    pub kind: AttributeKind,
    pub name: String,
    pub datatype: String,
}

impl ColumnAttributes {
    pub fn new(column_id: Id, name: String, datatype: String) -> Self {
        Self {
            id: generate_id(),
            column_id,
            kind: AttributeKind::Column,
            name,
            datatype,
        }
    }
}
