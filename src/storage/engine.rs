//! `GraphStore` — the uniform row-store contract every backend implements.
//!
//! Backends differ only in connection mechanics and SQL dialect; every
//! method here must produce structurally identical outputs, and the same
//! error messages for the same error conditions, across implementations.

use async_trait::async_trait;

use crate::model::{Direction, Node, NodeId, PropertyMap, RelId, Relationship, Value};
use crate::Result;

/// The single monotonically increasing schema version this crate knows how
/// to initialize. Schema migrations beyond this are out of scope.
pub const SCHEMA_VERSION: i64 = 1;

#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// Idempotent schema bootstrap: `CREATE TABLE IF NOT EXISTS` /
    /// `CREATE INDEX IF NOT EXISTS`. Calling this `n` times produces the
    /// same schema as calling it once.
    async fn initialize(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn get_type(&self) -> &'static str;

    /// Allocate the next node id. Ids are never reused, even for nodes whose
    /// creating transaction is later rolled back — the id was already
    /// observable to the caller that received it.
    fn allocate_node_id(&self) -> NodeId;

    fn allocate_relationship_id(&self) -> RelId;

    /// Persist a node under an id obtained from `allocate_node_id`. Used
    /// both for direct creation and for folding a transaction's pending set
    /// on commit.
    async fn insert_node(&self, node: &Node) -> Result<()>;

    async fn insert_relationship(&self, rel: &Relationship) -> Result<()>;

    async fn create_node(&self, labels: Vec<String>, properties: PropertyMap) -> Result<Node> {
        let node = Node::new(self.allocate_node_id(), labels, properties);
        self.insert_node(&node).await?;
        Ok(node)
    }

    /// Both endpoints must already exist; otherwise fails with a `NotFound`
    /// naming the offending id.
    async fn create_relationship(
        &self,
        rel_type: &str,
        start_id: NodeId,
        end_id: NodeId,
        properties: PropertyMap,
    ) -> Result<Relationship> {
        if self.get_node(start_id).await?.is_none() {
            return Err(crate::Error::NotFound(format!("start node {start_id}")));
        }
        if self.get_node(end_id).await?.is_none() {
            return Err(crate::Error::NotFound(format!("end node {end_id}")));
        }
        let rel = Relationship::new(
            self.allocate_relationship_id(),
            rel_type.to_string(),
            start_id,
            end_id,
            properties,
        );
        self.insert_relationship(&rel).await?;
        Ok(rel)
    }

    /// All-or-nothing batch node creation.
    async fn create_nodes_atomic(
        &self,
        specs: Vec<(Vec<String>, PropertyMap)>,
    ) -> Result<Vec<Node>>;

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>>;

    /// Replace semantics; refreshes `updated_at`. Fails if `id` doesn't exist.
    async fn update_node_properties(&self, id: NodeId, properties: PropertyMap) -> Result<()>;

    async fn update_node_labels(&self, id: NodeId, labels: Vec<String>) -> Result<()>;

    /// Cascades to incident relationships atomically. Missing id is a no-op
    /// (`Ok(false)`).
    async fn delete_node(&self, id: NodeId) -> Result<bool>;

    async fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>>;

    async fn update_relationship_properties(&self, id: RelId, properties: PropertyMap) -> Result<()>;

    async fn delete_relationship(&self, id: RelId) -> Result<bool>;

    async fn find_nodes_by_label(&self, label: &str) -> Result<Vec<Node>>;

    async fn find_relationships_by_type(&self, rel_type: &str) -> Result<Vec<Relationship>>;

    async fn find_nodes_by_property(&self, key: &str, value: &Value) -> Result<Vec<Node>>;

    async fn find_nodes_with_array_containing(&self, field: &str, value: &Value) -> Result<Vec<Node>>;

    async fn all_nodes(&self) -> Result<Vec<Node>>;

    /// Relationships incident to `node`, filtered by direction and
    /// optionally by type.
    async fn relationships_of(
        &self,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    async fn node_count(&self) -> Result<u64>;

    async fn relationship_count(&self) -> Result<u64>;

    async fn schema_version(&self) -> Result<i64>;
}
