//! MCP `recall_path` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `recall_path` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallPathParams {
    /// Exact URI, or a prefix matching several paths.
    #[schemars(description = "Exact URI (domain://path) or a prefix matching several paths")]
    pub uri: String,

    /// On an exact hit, also traverse linked memories this many hops out.
    #[schemars(description = "On an exact hit, expand linked memories up to this many hops")]
    pub traverse_hops: Option<u32>,
}
