//! MCP `forget` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `forget` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ForgetParams {
    /// ID of the memory to forget.
    #[schemars(description = "ID of the memory to forget")]
    pub id: String,

    /// `true` deletes permanently (leaving a tombstone snapshot); `false`
    /// suppresses by dropping vitality to a tenth.
    #[schemars(
        description = "true: delete permanently with a tombstone snapshot. false (default): soft-forget by dropping vitality to 10%."
    )]
    pub hard: Option<bool>,
}
