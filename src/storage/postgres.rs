//! PostgreSQL-backed `GraphStore`. Structurally identical to [`super::sqlite`]
//! — same schema shape, same safe-decode policy, same id-allocation scheme —
//! differing only in SQL dialect and connection mechanics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::model::{
    encode_labels, encode_properties, safe_decode_labels, safe_decode_properties, Direction, Node,
    NodeId, PropertyMap, RelId, Relationship, Value,
};
use crate::storage::engine::GraphStore;
use crate::{Error, Result};

pub struct PostgresStore {
    pool: PgPool,
    ready: AtomicBool,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(Self {
            pool,
            ready: AtomicBool::new(false),
            next_node_id: AtomicU64::new(1),
            next_rel_id: AtomicU64::new(1),
        })
    }

    fn row_to_node(row: &sqlx::postgres::PgRow) -> Result<Node> {
        let id: i64 = row.try_get("id").map_err(sqlx_err)?;
        let labels_raw: String = row.try_get("labels").map_err(sqlx_err)?;
        let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
        let created_at: String = row.try_get("created_at").map_err(sqlx_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(sqlx_err)?;
        Ok(Node {
            id: NodeId(id as u64),
            labels: safe_decode_labels(&labels_raw).into_iter().collect(),
            properties: safe_decode_properties(&props_raw),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_to_relationship(row: &sqlx::postgres::PgRow) -> Result<Relationship> {
        let id: i64 = row.try_get("id").map_err(sqlx_err)?;
        let rel_type: String = row.try_get("type").map_err(sqlx_err)?;
        let start: i64 = row.try_get("start_node_id").map_err(sqlx_err)?;
        let end: i64 = row.try_get("end_node_id").map_err(sqlx_err)?;
        let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
        let created_at: String = row.try_get("created_at").map_err(sqlx_err)?;
        Ok(Relationship {
            id: RelId(id as u64),
            rel_type,
            start_node_id: NodeId(start as u64),
            end_node_id: NodeId(end as u64),
            properties: safe_decode_properties(&props_raw),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    fn row_is_wholly_corrupt(labels_raw: &str, props_raw: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(labels_raw).is_err()
            && serde_json::from_str::<serde_json::Value>(props_raw).is_err()
    }
}

fn sqlx_err(e: sqlx::Error) -> Error {
    Error::StorageError(e.to_string())
}

#[async_trait]
impl GraphStore for PostgresStore {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS nodes (
                id BIGINT PRIMARY KEY,
                labels TEXT NOT NULL DEFAULT '[]',
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS node_labels (
                node_id BIGINT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                PRIMARY KEY (node_id, label)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_node_labels_label ON node_labels(label)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS relationships (
                id BIGINT PRIMARY KEY,
                type TEXT NOT NULL,
                start_node_id BIGINT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                end_node_id BIGINT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(type)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_relationships_start ON relationships(start_node_id)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_relationships_end ON relationships(end_node_id)")
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version BIGINT PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(super::engine::SCHEMA_VERSION)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let max_node: Option<i64> = sqlx::query("SELECT MAX(id) as m FROM nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?
            .try_get("m")
            .unwrap_or(None);
        let max_rel: Option<i64> = sqlx::query("SELECT MAX(id) as m FROM relationships")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?
            .try_get("m")
            .unwrap_or(None);
        self.next_node_id.store(max_node.unwrap_or(0) as u64 + 1, Ordering::SeqCst);
        self.next_rel_id.store(max_rel.unwrap_or(0) as u64 + 1, Ordering::SeqCst);

        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn get_type(&self) -> &'static str {
        "postgres"
    }

    fn allocate_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::SeqCst))
    }

    fn allocate_relationship_id(&self) -> RelId {
        RelId(self.next_rel_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn insert_node(&self, node: &Node) -> Result<()> {
        let labels: Vec<String> = node.labels.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO nodes (id, labels, properties, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(node.id.0 as i64)
        .bind(encode_labels(&labels))
        .bind(encode_properties(&node.properties))
        .bind(node.created_at.to_rfc3339())
        .bind(node.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        for label in &labels {
            sqlx::query("INSERT INTO node_labels (node_id, label) VALUES ($1, $2)")
                .bind(node.id.0 as i64)
                .bind(label)
                .execute(&self.pool)
                .await
                .map_err(sqlx_err)?;
        }
        Ok(())
    }

    async fn insert_relationship(&self, rel: &Relationship) -> Result<()> {
        sqlx::query(
            "INSERT INTO relationships (id, type, start_node_id, end_node_id, properties, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(rel.id.0 as i64)
        .bind(&rel.rel_type)
        .bind(rel.start_node_id.0 as i64)
        .bind(rel.end_node_id.0 as i64)
        .bind(encode_properties(&rel.properties))
        .bind(rel.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn create_nodes_atomic(&self, specs: Vec<(Vec<String>, PropertyMap)>) -> Result<Vec<Node>> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;
        let mut created = Vec::with_capacity(specs.len());
        for (labels, properties) in specs {
            let node = Node::new(self.allocate_node_id(), labels, properties);
            let label_list: Vec<String> = node.labels.iter().cloned().collect();
            sqlx::query(
                "INSERT INTO nodes (id, labels, properties, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(node.id.0 as i64)
            .bind(encode_labels(&label_list))
            .bind(encode_properties(&node.properties))
            .bind(node.created_at.to_rfc3339())
            .bind(node.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(sqlx_err)?;
            for label in &label_list {
                sqlx::query("INSERT INTO node_labels (node_id, label) VALUES ($1, $2)")
                    .bind(node.id.0 as i64)
                    .bind(label)
                    .execute(&mut *tx)
                    .await
                    .map_err(sqlx_err)?;
            }
            created.push(node);
        }
        tx.commit().await.map_err(sqlx_err)?;
        Ok(created)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let row = sqlx::query("SELECT id, labels, properties, created_at, updated_at FROM nodes WHERE id = $1")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(Self::row_to_node).transpose()
    }

    async fn update_node_properties(&self, id: NodeId, properties: PropertyMap) -> Result<()> {
        let result = sqlx::query("UPDATE nodes SET properties = $1, updated_at = $2 WHERE id = $3")
            .bind(encode_properties(&properties))
            .bind(Utc::now().to_rfc3339())
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Node {id}")));
        }
        Ok(())
    }

    async fn update_node_labels(&self, id: NodeId, labels: Vec<String>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;
        let result = sqlx::query("UPDATE nodes SET labels = $1, updated_at = $2 WHERE id = $3")
            .bind(encode_labels(&labels))
            .bind(Utc::now().to_rfc3339())
            .bind(id.0 as i64)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Node {id}")));
        }
        sqlx::query("DELETE FROM node_labels WHERE node_id = $1")
            .bind(id.0 as i64)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_err)?;
        for label in &labels {
            sqlx::query("INSERT INTO node_labels (node_id, label) VALUES ($1, $2)")
                .bind(id.0 as i64)
                .bind(label)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;
        }
        tx.commit().await.map_err(sqlx_err)?;
        Ok(())
    }

    async fn delete_node(&self, id: NodeId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        let row = sqlx::query(
            "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE id = $1",
        )
        .bind(id.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?;
        row.as_ref().map(Self::row_to_relationship).transpose()
    }

    async fn update_relationship_properties(&self, id: RelId, properties: PropertyMap) -> Result<()> {
        let result = sqlx::query("UPDATE relationships SET properties = $1 WHERE id = $2")
            .bind(encode_properties(&properties))
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Relationship {id}")));
        }
        Ok(())
    }

    async fn delete_relationship(&self, id: RelId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM relationships WHERE id = $1")
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_nodes_by_label(&self, label: &str) -> Result<Vec<Node>> {
        let rows = sqlx::query(
            "SELECT n.id, n.labels, n.properties, n.created_at, n.updated_at FROM nodes n
             JOIN node_labels nl ON nl.node_id = n.id WHERE nl.label = $1",
        )
        .bind(label)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let labels_raw: String = row.try_get("labels").map_err(sqlx_err)?;
            let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
            if Self::row_is_wholly_corrupt(&labels_raw, &props_raw) {
                continue;
            }
            out.push(Self::row_to_node(row)?);
        }
        Ok(out)
    }

    async fn find_relationships_by_type(&self, rel_type: &str) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE type = $1",
        )
        .bind(rel_type)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;
        rows.iter().map(Self::row_to_relationship).collect()
    }

    async fn find_nodes_by_property(&self, key: &str, value: &Value) -> Result<Vec<Node>> {
        let rows = sqlx::query("SELECT id, labels, properties, created_at, updated_at FROM nodes")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let mut out = Vec::new();
        for row in &rows {
            let labels_raw: String = row.try_get("labels").map_err(sqlx_err)?;
            let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
            if Self::row_is_wholly_corrupt(&labels_raw, &props_raw) {
                continue;
            }
            let node = Self::row_to_node(row)?;
            if node.get(key) == Some(value) {
                out.push(node);
            }
        }
        Ok(out)
    }

    async fn find_nodes_with_array_containing(&self, field: &str, value: &Value) -> Result<Vec<Node>> {
        let rows = sqlx::query("SELECT id, labels, properties, created_at, updated_at FROM nodes")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let mut out = Vec::new();
        for row in &rows {
            let labels_raw: String = row.try_get("labels").map_err(sqlx_err)?;
            let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
            if Self::row_is_wholly_corrupt(&labels_raw, &props_raw) {
                continue;
            }
            let node = Self::row_to_node(row)?;
            let contains = matches!(node.get(field), Some(Value::List(items)) if items.contains(value));
            if contains {
                out.push(node);
            }
        }
        Ok(out)
    }

    async fn all_nodes(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query("SELECT id, labels, properties, created_at, updated_at FROM nodes")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let labels_raw: String = row.try_get("labels").map_err(sqlx_err)?;
            let props_raw: String = row.try_get("properties").map_err(sqlx_err)?;
            if Self::row_is_wholly_corrupt(&labels_raw, &props_raw) {
                continue;
            }
            out.push(Self::row_to_node(row)?);
        }
        Ok(out)
    }

    async fn relationships_of(
        &self,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let sql = match dir {
            Direction::Outgoing => {
                "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE start_node_id = $1"
            }
            Direction::Incoming => {
                "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE end_node_id = $1"
            }
            Direction::Both => {
                "SELECT id, type, start_node_id, end_node_id, properties, created_at FROM relationships WHERE start_node_id = $1 OR end_node_id = $1"
            }
        };
        let rows = sqlx::query(sql)
            .bind(node.0 as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter()
            .map(Self::row_to_relationship)
            .collect::<Result<Vec<_>>>()
            .map(|rels| match rel_type {
                Some(t) => rels.into_iter().filter(|r| r.rel_type == t).collect(),
                None => rels,
            })
    }

    async fn node_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let c: i64 = row.try_get("c").map_err(sqlx_err)?;
        Ok(c as u64)
    }

    async fn relationship_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM relationships")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let c: i64 = row.try_get("c").map_err(sqlx_err)?;
        Ok(c as u64)
    }

    async fn schema_version(&self) -> Result<i64> {
        let row = sqlx::query("SELECT MAX(version) as v FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let v: Option<i64> = row.try_get("v").unwrap_or(None);
        Ok(v.unwrap_or(0))
    }
}
