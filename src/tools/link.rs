//! MCP `link` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `link` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LinkParams {
    /// `"create"`, `"query"`, or `"traverse"`.
    #[schemars(description = "Action: 'create' an edge, 'query' edges around a memory, or 'traverse' the graph")]
    pub action: String,

    /// Memory the action centers on (query/traverse), or the edge source (create).
    #[schemars(description = "Edge source (create) or center memory (query/traverse)")]
    pub source_id: Option<String>,

    /// Edge target (create only).
    #[schemars(description = "Edge target (create only)")]
    pub target_id: Option<String>,

    /// Relation: `related`, `caused`, `reminds`, `evolved`, or `contradicts`.
    #[schemars(description = "Relation: related, caused, reminds, evolved, contradicts")]
    pub relation: Option<String>,

    /// Edge weight, default `1.0`.
    #[schemars(description = "Edge weight, default 1.0")]
    pub weight: Option<f64>,

    /// Traversal depth, default `2`.
    #[schemars(description = "Traversal depth (traverse only), default 2")]
    pub max_hops: Option<u32>,
}
