//! MCP `snapshot` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `snapshot` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotParams {
    /// `"list"` or `"rollback"`.
    #[schemars(description = "Action: 'list' a memory's history, or 'rollback' to a snapshot")]
    pub action: String,

    /// Memory whose history to list (list only).
    #[schemars(description = "Memory whose history to list (list only)")]
    pub memory_id: Option<String>,

    /// Snapshot to restore (rollback only).
    #[schemars(description = "Snapshot to restore (rollback only)")]
    pub snapshot_id: Option<String>,
}
