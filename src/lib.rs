//! # cyphergraph — a property-graph database over a SQL row store
//!
//! Nodes and relationships live in ordinary SQL tables; queries are a
//! Neo4j-flavored Cypher subset (`MATCH`, `OPTIONAL MATCH`, `CREATE`,
//! `RETURN`, `WHERE`) executed by walking the parsed AST directly against
//! the storage adapter — there is no separate logical plan or optimizer.
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | SQLite | `sqlite` (default) | single-file row store |
//! | Postgres | `postgres` | same schema, `$n` placeholders |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cyphergraph::{Graph, PropertyMap, SqliteStore, Value};
//!
//! # async fn example() -> cyphergraph::Result<()> {
//! let store = SqliteStore::connect("sqlite::memory:").await?;
//! let graph = Graph::new(store);
//! graph.initialize().await?;
//!
//! let mut params = PropertyMap::new();
//! params.insert("name".into(), Value::from("Ada"));
//! let result = graph.run("CREATE (n:Person {name: $name}) RETURN id(n) AS nodeId", params).await?;
//! println!("{:?}", result.records);
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod execution;
pub mod cypher;
pub mod model;
pub mod storage;
pub mod tx;

pub use execution::{Counters, QueryResult, Row};
pub use model::{Direction, Node, NodeId, PropertyMap, RelId, Relationship, Value};
pub use storage::{GraphStore, SCHEMA_VERSION};
#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use tx::{BeginConfig, TransactionManager, TxState};

/// The primary entry point: a storage adapter plus its transaction registry.
pub struct Graph<S: GraphStore> {
    storage: S,
    transactions: TransactionManager,
}

impl<S: GraphStore> Graph<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            transactions: TransactionManager::new(),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.storage.initialize().await
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Run a statement outside any transaction; writes apply immediately.
    pub async fn run(&self, query: &str, params: PropertyMap) -> Result<QueryResult> {
        execution::execute(&self.storage, &self.transactions, None, query, params).await
    }

    /// Run a statement scoped to an open transaction; writes stay pending
    /// until `commit`.
    pub async fn run_in_tx(&self, tx_id: &str, query: &str, params: PropertyMap) -> Result<QueryResult> {
        match self.transactions.get_state(tx_id) {
            Ok(TxState::Active) => {}
            Ok(TxState::Expired) => {
                return Err(Error::TransactionError(format!(
                    "transaction {tx_id} expired"
                )));
            }
            Ok(state) => {
                return Err(Error::TransactionError(format!(
                    "transaction {tx_id} is not active (state: {state:?})"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        execution::execute(&self.storage, &self.transactions, Some(tx_id), query, params).await
    }

    pub fn begin(&self, config: Option<BeginConfig>) -> String {
        self.transactions.begin(config)
    }

    /// Fold a transaction's pending writes into storage, in dependency order:
    /// nodes before relationships, relationship deletes before node deletes.
    pub async fn commit(&self, tx_id: &str) -> Result<()> {
        let storage = &self.storage;
        self.transactions
            .commit(tx_id, |pending| async move {
                for node in &pending.created_nodes {
                    storage.insert_node(node).await?;
                }
                for rel in &pending.created_relationships {
                    storage.insert_relationship(rel).await?;
                }
                for id in &pending.deleted_relationship_ids {
                    storage.delete_relationship(*id).await?;
                }
                for id in &pending.deleted_node_ids {
                    storage.delete_node(*id).await?;
                }
                Ok(())
            })
            .await
    }

    pub fn rollback(&self, tx_id: &str) -> Result<()> {
        self.transactions.rollback(tx_id)?;
        Ok(())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cypher syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Semantic error: {0}")]
    SemanticError(String),

    #[error("Missing parameter: {0}")]
    ParameterMissing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("{0}")]
    General(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Neo4j-flavored wire error code, surfaced in the dispatcher's error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::SyntaxError { .. } => "Neo.ClientError.Statement.SyntaxError",
            Error::SemanticError(_) => "Neo.ClientError.Statement.SemanticError",
            Error::ParameterMissing(_) => "Neo.ClientError.Statement.ParameterMissing",
            Error::NotFound(_) => "Neo.ClientError.Statement.EntityNotFound",
            Error::TransactionError(_) => "Neo.ClientError.Transaction.TransactionNotFound",
            Error::NotImplemented(_) => "Neo.ClientError.Statement.NotImplemented",
            Error::StorageError(_) | Error::Io(_) | Error::General(_) => {
                "Neo.DatabaseError.General.UnknownError"
            }
        }
    }
}

impl From<tx::TxError> for Error {
    fn from(e: tx::TxError) -> Self {
        Error::TransactionError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
