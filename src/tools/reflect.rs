//! MCP `reflect` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `reflect` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReflectParams {
    /// Maintenance phase: `"decay"`, `"tidy"`, `"govern"`, or `"all"`.
    #[schemars(description = "Maintenance phase to run: decay, tidy, govern, or all")]
    pub phase: String,
}
