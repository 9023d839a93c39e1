//! Node in the property graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{PropertyMap, Value};

/// Opaque node identifier. Monotonically increasing and unique within the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the property graph: an ordered sequence of labels (typically ≤4)
/// plus a JSON-shaped property mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: SmallVec<[String; 4]>,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(id: NodeId, labels: Vec<String>, properties: PropertyMap) -> Self {
        let now = Utc::now();
        Self {
            id,
            labels: labels.into_iter().collect(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn has_all_labels(&self, labels: &[String]) -> bool {
        labels.iter().all(|l| self.has_label(l))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
