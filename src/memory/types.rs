//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the four lifecycle categories), [`Relation`]
//! (typed graph edges), [`SnapshotAction`], and the record structs matching
//! the table schemas, plus the priority → stability/floor mappings that drive
//! the forgetting model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stability value standing in for "never decays" (priority 0).
pub const STABILITY_CEILING: f64 = 999_999.0;

/// The four lifecycle types, ordered from most to least durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Who the agent is — never decays.
    Identity,
    /// Affective state and impressions — slow decay.
    Emotion,
    /// Facts and learned knowledge — medium decay.
    Knowledge,
    /// Events and session happenings — fast decay, archivable.
    Event,
}

impl MemoryType {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Emotion => "emotion",
            Self::Knowledge => "knowledge",
            Self::Event => "event",
        }
    }

    /// Default durability class for this type.
    pub fn default_priority(&self) -> u8 {
        match self {
            Self::Identity => 0,
            Self::Emotion => 1,
            Self::Knowledge => 2,
            Self::Event => 3,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "emotion" => Ok(Self::Emotion),
            "knowledge" => Ok(Self::Knowledge),
            "event" => Ok(Self::Event),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Initial Ebbinghaus half-life (days) per durability class.
pub fn initial_stability(priority: u8) -> f64 {
    match priority {
        0 => STABILITY_CEILING,
        1 => 365.0,
        2 => 90.0,
        _ => 14.0,
    }
}

/// The floor decay can never push vitality below, per durability class.
pub fn vitality_floor(priority: u8) -> f64 {
    match priority {
        0 => 1.0,
        1 => 0.3,
        2 => 0.1,
        _ => 0.0,
    }
}

/// Edge types between memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Related,
    Caused,
    Reminds,
    Evolved,
    Contradicts,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Related => "related",
            Self::Caused => "caused",
            Self::Reminds => "reminds",
            Self::Evolved => "evolved",
            Self::Contradicts => "contradicts",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "related" => Ok(Self::Related),
            "caused" => Ok(Self::Caused),
            "reminds" => Ok(Self::Reminds),
            "evolved" => Ok(Self::Evolved),
            "contradicts" => Ok(Self::Contradicts),
            _ => Err(format!("unknown relation: {s}")),
        }
    }
}

/// What a snapshot records about the operation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotAction {
    Create,
    Update,
    Delete,
    Merge,
}

impl SnapshotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Merge => "merge",
        }
    }
}

impl std::str::FromStr for SnapshotAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "merge" => Ok(Self::Merge),
            _ => Err(format!("unknown snapshot action: {s}")),
        }
    }
}

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Random 128-bit identifier.
    pub id: String,
    /// Tenant scope.
    pub agent_id: String,
    /// The full text content of the memory.
    pub content: String,
    /// Lifecycle category.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Durability class 0..3 (0 = most durable).
    pub priority: u8,
    /// Affect in `[-1.0, 1.0]`.
    pub emotion_val: f64,
    /// How alive this memory currently is, in `[0.0, 1.0]`.
    pub vitality: f64,
    /// Ebbinghaus half-life parameter (days).
    pub stability: f64,
    /// Number of times this memory has been recalled.
    pub access_count: u32,
    /// ISO 8601 timestamp of the last recall, or `None` if never accessed.
    pub last_accessed: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
    /// Optional free-form origin tag.
    pub source: Option<String>,
    /// 16-hex-char prefix of SHA-256 over trimmed content.
    pub hash: String,
}

/// Column list every `Memory` SELECT uses, in [`Memory::from_row`] order.
pub const MEMORY_COLUMNS: &str =
    "id, agent_id, content, type, priority, emotion_val, vitality, stability, \
     access_count, last_accessed, created_at, updated_at, source, hash";

impl Memory {
    /// Map a row selected with [`MEMORY_COLUMNS`] into a `Memory`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let type_str: String = row.get(3)?;
        let memory_type = type_str.parse::<MemoryType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(Memory {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            content: row.get(2)?,
            memory_type,
            priority: row.get(4)?,
            emotion_val: row.get(5)?,
            vitality: row.get(6)?,
            stability: row.get(7)?,
            access_count: row.get(8)?,
            last_accessed: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            source: row.get(12)?,
            hash: row.get(13)?,
        })
    }
}

/// A URI anchor onto a memory, matching the `paths` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPath {
    pub id: String,
    pub memory_id: String,
    pub agent_id: String,
    pub uri: String,
    pub alias: Option<String>,
    pub domain: String,
    pub created_at: String,
}

/// A directed, typed edge between two memories of the same agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub agent_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    pub weight: f64,
    pub created_at: String,
}

/// An immutable historical copy of a memory's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub memory_id: String,
    pub content: String,
    pub changed_by: Option<String>,
    pub action: String,
    pub created_at: String,
}

/// 16-hex-character prefix of a SHA-256 over the trimmed content.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.trim().as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_to_priority_mapping() {
        assert_eq!(MemoryType::Identity.default_priority(), 0);
        assert_eq!(MemoryType::Emotion.default_priority(), 1);
        assert_eq!(MemoryType::Knowledge.default_priority(), 2);
        assert_eq!(MemoryType::Event.default_priority(), 3);
    }

    #[test]
    fn priority_to_stability_mapping() {
        assert_eq!(initial_stability(0), STABILITY_CEILING);
        assert_eq!(initial_stability(1), 365.0);
        assert_eq!(initial_stability(2), 90.0);
        assert_eq!(initial_stability(3), 14.0);
    }

    #[test]
    fn priority_to_floor_mapping() {
        assert_eq!(vitality_floor(0), 1.0);
        assert_eq!(vitality_floor(1), 0.3);
        assert_eq!(vitality_floor(2), 0.1);
        assert_eq!(vitality_floor(3), 0.0);
    }

    #[test]
    fn hash_is_16_hex_chars_over_trimmed_content() {
        let h = content_hash("  hello world  ");
        assert_eq!(h.len(), 16);
        assert_eq!(h, content_hash("hello world"));
        assert_ne!(h, content_hash("hello worlds"));
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for t in ["identity", "emotion", "knowledge", "event"] {
            assert_eq!(t.parse::<MemoryType>().unwrap().as_str(), t);
        }
        for r in ["related", "caused", "reminds", "evolved", "contradicts"] {
            assert_eq!(r.parse::<Relation>().unwrap().as_str(), r);
        }
        assert!("bogus".parse::<MemoryType>().is_err());
        assert!("bogus".parse::<Relation>().is_err());
    }
}
