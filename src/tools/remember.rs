//! MCP `remember` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `remember` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RememberParams {
    /// The natural language content of the memory.
    #[schemars(description = "The natural language content of the memory")]
    pub content: String,

    /// Memory type: `"identity"`, `"emotion"`, `"knowledge"`, or `"event"`.
    #[schemars(
        description = "Memory type: 'identity' (who the agent is, never decays), 'emotion' (affective impressions), 'knowledge' (facts), 'event' (happenings, fastest decay)"
    )]
    pub r#type: String,

    /// Optional URI anchor, e.g. `core://agent/identity`.
    #[schemars(
        description = "Optional URI anchor (domain://path). Writing to an existing URI updates the memory behind it."
    )]
    pub uri: Option<String>,

    /// Emotional valence in `[-1.0, 1.0]`. Defaults to `0.0`.
    #[schemars(description = "Emotional valence -1.0..1.0. Defaults to 0.0.")]
    pub emotion_val: Option<f64>,

    /// Optional free-form origin tag.
    #[schemars(description = "Optional free-form origin tag (e.g. 'conversation', 'import')")]
    pub source: Option<String>,
}
