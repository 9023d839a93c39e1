//! Relationship (directed edge) in the property graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NodeId, PropertyMap};

/// Opaque relationship identifier. Monotonically increasing and unique within
/// the database, in a counter space independent of `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction relative to an anchor node, used when resolving a
/// relationship pattern's arrow against a candidate relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A directed, typed edge. Direction is inherent: `start_node_id` → `end_node_id`.
/// Parallel relationships (same endpoints, same type) are permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub rel_type: String,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        id: RelId,
        rel_type: String,
        start_node_id: NodeId,
        end_node_id: NodeId,
        properties: PropertyMap,
    ) -> Self {
        Self {
            id,
            rel_type,
            start_node_id,
            end_node_id,
            properties,
            created_at: Utc::now(),
        }
    }

    /// The "other" end of the relationship as seen from `from`, if `from` is
    /// one of its endpoints.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.start_node_id {
            Some(self.end_node_id)
        } else if from == self.end_node_id {
            Some(self.start_node_id)
        } else {
            None
        }
    }
}
