//! Chunk-graph data model
//!
//! Flat, serializable shapes exchanged with the extraction layer:
//! `{ "entities": [...], "relationships": [...] }`. Unknown keys on entities
//! and relationships are kept in `extra` so annotations survive a merge.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{KgmError, Result};

// ============================================================================
// Importance
// ============================================================================

/// Ordinal importance tag, used as a tie-break when groups merge.
///
/// Ordered `Peripheral < Supporting < Core`. Any unrecognised string, or
/// `null`, deserializes to `Peripheral`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Importance {
    #[default]
    Peripheral,
    Supporting,
    Core,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Peripheral => "peripheral",
            Self::Supporting => "supporting",
            Self::Core => "core",
        }
    }
}

impl From<String> for Importance {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "core" => Self::Core,
            "supporting" => Self::Supporting,
            _ => Self::Peripheral,
        }
    }
}

impl From<Option<String>> for Importance {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }
}

impl From<Importance> for String {
    fn from(value: Importance) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Entities and Relationships
// ============================================================================

/// Sparse extraction output may spell an absent field as `null`
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fail on an empty id, or on the first id that appears twice
pub fn validate_entity_ids(entities: &[Entity], context: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(entities.len());
    for entity in entities {
        if entity.id.is_empty() {
            return Err(KgmError::InvalidInput(format!(
                "entity with empty id ({context})"
            )));
        }
        if !seen.insert(entity.id.as_str()) {
            return Err(KgmError::DuplicateEntityId {
                id: entity.id.clone(),
                context: context.to_string(),
            });
        }
    }
    Ok(())
}

/// An extracted knowledge unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier, unique within its batch
    pub id: String,

    /// Short human-readable name
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,

    /// Category tag (Concept, Method, Event, ...)
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub entity_type: String,

    /// Free-text description
    #[serde(default, deserialize_with = "null_as_default")]
    pub definition: String,

    #[serde(default)]
    pub importance: Importance,

    /// Keys not modelled above, carried through unchanged
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Entity {
    /// Create an entity with an id and label
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            entity_type: String::new(),
            definition: String::new(),
            importance: Importance::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }
}

/// A directed edge between two entity ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,

    /// Relation label
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub relation_type: String,

    /// Supporting quote from the chunk text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Relationship {
    /// Create a relationship
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
            evidence: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

// ============================================================================
// Knowledge Graph
// ============================================================================

/// Entities plus relationships: one chunk-graph, or a merged graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl KnowledgeGraph {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    /// Set of entity ids in this graph
    pub fn entity_ids(&self) -> HashSet<&str> {
        self.entities.iter().map(|e| e.id.as_str()).collect()
    }

    /// See [`validate_entity_ids`]
    pub fn validate_unique_ids(&self, context: &str) -> Result<()> {
        validate_entity_ids(&self.entities, context)
    }

    /// Prefix every entity id, and every relationship endpoint naming an
    /// entity of this graph. Endpoints that name no entity pass through.
    pub fn with_id_prefix(self, prefix: &str) -> Self {
        let id_map: HashMap<String, String> = self
            .entities
            .iter()
            .map(|e| (e.id.clone(), format!("{prefix}{}", e.id)))
            .collect();

        let entities = self
            .entities
            .into_iter()
            .map(|mut e| {
                if let Some(new_id) = id_map.get(&e.id) {
                    e.id = new_id.clone();
                }
                e
            })
            .collect();

        let relationships = self
            .relationships
            .into_iter()
            .map(|mut r| {
                if let Some(source) = id_map.get(&r.source) {
                    r.source = source.clone();
                }
                if let Some(target) = id_map.get(&r.target) {
                    r.target = target.clone();
                }
                r
            })
            .collect();

        Self {
            entities,
            relationships,
        }
    }
}

// ============================================================================
// Token accounting
// ============================================================================

/// LLM token usage reported by extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Output of extracting one chunk: its graph and the tokens it cost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    #[serde(flatten)]
    pub graph: KnowledgeGraph,

    #[serde(default)]
    pub tokens: TokenUsage,
}

/// A merged graph with the summed extraction cost of its chunks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    #[serde(flatten)]
    pub graph: KnowledgeGraph,

    pub tokens: TokenUsage,
}

// ============================================================================
// Tests
// ============================================================================
