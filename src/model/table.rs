use crate::model::{generate_id, Id};
use serde::{Deserialize, Serialize};

/// Groups column lineages. Table versioning follows a separate mechanism and
/// is out of scope here; the engine only needs the grouping identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: Id,
    pub name: String,
    pub created_at: String, // ISO 8601 timestamp
}

impl Table {
    pub fn new(name: String) -> Self {
        Self {
            id: generate_id(),
            name,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
