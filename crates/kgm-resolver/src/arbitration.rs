//! Layer 3 arbitration boundary
//!
//! Entities left as singletons after the deterministic layers are sent, in one
//! batch, to an external arbitrator that proposes groups by numeric index.
//! Replies are untrusted: they are decoded strictly and then filtered against
//! the indices that were actually offered.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kgm_core::{Entity, KgmError, LlmClient, Result};

// ============================================================================
// Request / Response
// ============================================================================

/// One unresolved entity offered for arbitration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrationCandidate {
    /// Position of the entity in the batch being resolved
    pub index: usize,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Leading part of the definition
    pub definition: String,
}

/// Batched arbitration request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArbitrationRequest {
    pub candidates: Vec<ArbitrationCandidate>,
}

impl ArbitrationRequest {
    /// Build a request from the entities at `indices`, truncating definitions
    /// to `snippet_chars` characters
    pub fn from_entities(entities: &[Entity], indices: &[usize], snippet_chars: usize) -> Self {
        let candidates = indices
            .iter()
            .map(|&index| {
                let entity = &entities[index];
                ArbitrationCandidate {
                    index,
                    label: entity.label.clone(),
                    entity_type: entity.entity_type.clone(),
                    definition: entity.definition.chars().take(snippet_chars).collect(),
                }
            })
            .collect();
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn indices(&self) -> HashSet<usize> {
        self.candidates.iter().map(|c| c.index).collect()
    }
}

/// Proposed duplicate groups, by candidate index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbitrationResponse {
    pub groups: Vec<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    groups: Vec<Vec<Value>>,
}

impl ArbitrationResponse {
    pub fn new(groups: Vec<Vec<usize>>) -> Self {
        Self { groups }
    }

    /// Decode `{"groups": [[idx, ...], ...]}`.
    ///
    /// Indices may be non-negative integers or numeric strings; any other
    /// element is dropped. A reply that is not this shape is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawResponse = serde_json::from_str(text.trim())
            .map_err(|e| KgmError::Arbitration(format!("Malformed arbitration reply: {e}")))?;

        let groups = raw
            .groups
            .iter()
            .map(|group| group.iter().filter_map(index_from_value).collect())
            .collect();

        Ok(Self { groups })
    }

    /// Groups restricted to `allowed` indices.
    ///
    /// Duplicates inside a group collapse, an index already claimed by an
    /// earlier group is ignored, and groups left with fewer than two members
    /// are dropped. Also returns how many proposed indices were discarded.
    pub fn validated_groups(&self, allowed: &HashSet<usize>) -> (Vec<Vec<usize>>, usize) {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut discarded = 0usize;
        let mut groups = Vec::new();

        for proposed in &self.groups {
            let mut group = Vec::with_capacity(proposed.len());
            for &index in proposed {
                if !allowed.contains(&index) || claimed.contains(&index) {
                    discarded += 1;
                    continue;
                }
                if !group.contains(&index) {
                    group.push(index);
                }
            }
            if group.len() >= 2 {
                claimed.extend(group.iter().copied());
                groups.push(group);
            } else {
                discarded += group.len();
            }
        }

        (groups, discarded)
    }
}

fn index_from_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Arbitrator
// ============================================================================

/// External decision-maker for residual singletons
#[async_trait]
pub trait Arbitrator: Send + Sync {
    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbitrationResponse>;
}

const ARBITRATION_PROMPT: &str = "You are deduplicating entities extracted from one document.

ENTITIES (each line starts with a numeric ID):
{entities}

Group entities that name the SAME real-world concept or object. Entities that are \
merely related must stay apart.

Reply with JSON only, no markdown fences:
{\"groups\": [[id1, id2], [id3, id4, id5]]}
Each group lists the numeric IDs of duplicates. Entities without duplicates must not \
appear in any group. Reply {\"groups\": []} if there are none.";

/// Arbitrator backed by an LLM completion call
pub struct LlmArbitrator {
    client: Arc<dyn LlmClient>,
}

impl LlmArbitrator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Render the dedup prompt for a request
    pub fn build_prompt(&self, request: &ArbitrationRequest) -> String {
        let lines: Vec<String> = request
            .candidates
            .iter()
            .map(|c| {
                format!(
                    "  - ID: {} | Label: {} | Type: {} | Definition: {}",
                    c.index, c.label, c.entity_type, c.definition
                )
            })
            .collect();

        ARBITRATION_PROMPT.replace("{entities}", &lines.join("\n"))
    }
}

#[async_trait]
impl Arbitrator for LlmArbitrator {
    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbitrationResponse> {
        let prompt = self.build_prompt(request);
        tracing::debug!(
            model = self.client.model(),
            candidates = request.len(),
            "Sending arbitration batch"
        );
        let reply = self.client.generate(&prompt).await?;
        ArbitrationResponse::parse(&reply)
    }
}

// ============================================================================
// Tests
// ============================================================================
