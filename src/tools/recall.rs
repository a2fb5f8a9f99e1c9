//! MCP `recall` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `recall` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallParams {
    /// Natural language query.
    #[schemars(description = "Natural language query")]
    pub query: String,

    /// Maximum results; capped by the classified intent's own limit.
    #[schemars(description = "Maximum results. The classified query intent caps this further.")]
    pub limit: Option<usize>,
}
