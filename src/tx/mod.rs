//! Transaction management: BEGIN/COMMIT/ROLLBACK state machine with
//! read-your-writes isolation via a per-transaction pending set.
//!
//! The registry is a single `tx_id → Transaction` mapping behind a coarse
//! mutex. The host's single-threaded-per-instance execution contract means
//! there is never real contention; the mutex exists so the design tolerates
//! being ported to a multi-threaded host without a rewrite.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Node, NodeId, PropertyMap, RelId, Relationship};
use crate::Error;

/// `begin` configuration. `timeout_ms` defaults to 30s; `timeout_ms: 0` means
/// the transaction is already expired by the next wall-clock tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeginConfig {
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub metadata: PropertyMap,
}

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
    Expired,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Transaction already committed")]
    AlreadyCommitted,
    #[error("Transaction already rolled back")]
    AlreadyRolledBack,
    #[error("Transaction expired")]
    Expired,
}

/// A batch of writes staged under one transaction, ready to fold into storage
/// on commit.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    pub created_nodes: Vec<Node>,
    pub created_relationships: Vec<Relationship>,
    pub deleted_node_ids: HashSet<NodeId>,
    pub deleted_relationship_ids: HashSet<RelId>,
}

/// A read-only view of a transaction's staged writes, consulted by the
/// executor when evaluating MATCH under that transaction's scope.
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub nodes: HashMap<NodeId, Node>,
    pub relationships: HashMap<RelId, Relationship>,
    pub deleted_node_ids: HashSet<NodeId>,
    pub deleted_relationship_ids: HashSet<RelId>,
}

struct Transaction {
    state: TxState,
    timeout_ms: u64,
    expires_at: DateTime<Utc>,
    metadata: PropertyMap,
    pending_nodes: HashMap<NodeId, Node>,
    pending_relationships: HashMap<RelId, Relationship>,
    created_node_ids: Vec<NodeId>,
    created_relationship_ids: Vec<RelId>,
    deleted_node_ids: HashSet<NodeId>,
    deleted_relationship_ids: HashSet<RelId>,
}

impl Transaction {
    /// Lazily promotes `Active` to `Expired` if past `expires_at`. All
    /// state-reading operations funnel through this.
    fn effective_state(&mut self) -> TxState {
        if self.state == TxState::Active && Utc::now() >= self.expires_at {
            self.state = TxState::Expired;
        }
        self.state
    }
}

pub struct TransactionManager {
    registry: Mutex<HashMap<String, Transaction>>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self, config: Option<BeginConfig>) -> String {
        let config = config.unwrap_or_default();
        let timeout_ms = config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        let now = Utc::now();
        let tx_id = Uuid::new_v4().to_string();
        let tx = Transaction {
            state: TxState::Active,
            timeout_ms,
            expires_at: now + ChronoDuration::milliseconds(timeout_ms as i64),
            metadata: config.metadata,
            pending_nodes: HashMap::new(),
            pending_relationships: HashMap::new(),
            created_node_ids: Vec::new(),
            created_relationship_ids: Vec::new(),
            deleted_node_ids: HashSet::new(),
            deleted_relationship_ids: HashSet::new(),
        };
        self.registry.lock().insert(tx_id.clone(), tx);
        tx_id
    }

    pub fn get_state(&self, tx_id: &str) -> Result<TxState, TxError> {
        let mut registry = self.registry.lock();
        let tx = registry
            .get_mut(tx_id)
            .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
        Ok(tx.effective_state())
    }

    pub fn is_active(&self, tx_id: &str) -> bool {
        matches!(self.get_state(tx_id), Ok(TxState::Active))
    }

    pub fn get_metadata(&self, tx_id: &str) -> Result<PropertyMap, TxError> {
        let mut registry = self.registry.lock();
        let tx = registry
            .get_mut(tx_id)
            .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
        tx.effective_state();
        Ok(tx.metadata.clone())
    }

    /// Stage a newly created node into the transaction's pending set.
    pub fn stage_created_node(&self, tx_id: &str, node: Node) -> Result<(), TxError> {
        self.with_active_tx(tx_id, |tx| {
            tx.created_node_ids.push(node.id);
            tx.pending_nodes.insert(node.id, node);
        })
    }

    /// Stage a newly created relationship into the transaction's pending set.
    pub fn stage_created_relationship(
        &self,
        tx_id: &str,
        rel: Relationship,
    ) -> Result<(), TxError> {
        self.with_active_tx(tx_id, |tx| {
            tx.created_relationship_ids.push(rel.id);
            tx.pending_relationships.insert(rel.id, rel);
        })
    }

    pub fn stage_deleted_node(&self, tx_id: &str, id: NodeId) -> Result<(), TxError> {
        self.with_active_tx(tx_id, |tx| {
            tx.pending_nodes.remove(&id);
            tx.deleted_node_ids.insert(id);
        })
    }

    pub fn stage_deleted_relationship(&self, tx_id: &str, id: RelId) -> Result<(), TxError> {
        self.with_active_tx(tx_id, |tx| {
            tx.pending_relationships.remove(&id);
            tx.deleted_relationship_ids.insert(id);
        })
    }

    /// Snapshot of everything staged so far, for MATCH to union against the
    /// committed storage view.
    pub fn snapshot_pending(&self, tx_id: &str) -> Result<PendingSnapshot, TxError> {
        let mut registry = self.registry.lock();
        let tx = registry
            .get_mut(tx_id)
            .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
        match tx.effective_state() {
            TxState::Active => Ok(PendingSnapshot {
                nodes: tx.pending_nodes.clone(),
                relationships: tx.pending_relationships.clone(),
                deleted_node_ids: tx.deleted_node_ids.clone(),
                deleted_relationship_ids: tx.deleted_relationship_ids.clone(),
            }),
            TxState::Expired => Err(TxError::Expired),
            TxState::Committed => Err(TxError::AlreadyCommitted),
            TxState::RolledBack => Err(TxError::AlreadyRolledBack),
        }
    }

    fn with_active_tx<F>(&self, tx_id: &str, f: F) -> Result<(), TxError>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut registry = self.registry.lock();
        let tx = registry
            .get_mut(tx_id)
            .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
        match tx.effective_state() {
            TxState::Active => {
                f(tx);
                Ok(())
            }
            TxState::Expired => Err(TxError::Expired),
            TxState::Committed => Err(TxError::AlreadyCommitted),
            TxState::RolledBack => Err(TxError::AlreadyRolledBack),
        }
    }

    /// Discard the pending set and transition to `RolledBack`. No
    /// persistence calls — must be cheaper than `commit`.
    pub fn rollback(&self, tx_id: &str) -> Result<(), TxError> {
        let mut registry = self.registry.lock();
        let tx = registry
            .get_mut(tx_id)
            .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
        match tx.effective_state() {
            TxState::Active => {
                tx.state = TxState::RolledBack;
                tx.pending_nodes.clear();
                tx.pending_relationships.clear();
                Ok(())
            }
            TxState::Expired => Err(TxError::Expired),
            TxState::Committed => Err(TxError::AlreadyCommitted),
            TxState::RolledBack => Err(TxError::AlreadyRolledBack),
        }
    }

    /// Fold the pending set into storage via `fold`, then transition to
    /// `Committed`. Fails without transitioning state if the transaction is
    /// not `Active` at the moment of evaluation, or if `fold` itself fails.
    pub async fn commit<F, Fut>(&self, tx_id: &str, fold: F) -> Result<(), Error>
    where
        F: FnOnce(PendingSet) -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let pending = {
            let mut registry = self.registry.lock();
            let tx = registry
                .get_mut(tx_id)
                .ok_or_else(|| TxError::NotFound(tx_id.to_string()))?;
            match tx.effective_state() {
                TxState::Active => PendingSet {
                    created_nodes: tx
                        .created_node_ids
                        .iter()
                        .filter_map(|id| tx.pending_nodes.get(id).cloned())
                        .collect(),
                    created_relationships: tx
                        .created_relationship_ids
                        .iter()
                        .filter_map(|id| tx.pending_relationships.get(id).cloned())
                        .collect(),
                    deleted_node_ids: tx.deleted_node_ids.clone(),
                    deleted_relationship_ids: tx.deleted_relationship_ids.clone(),
                },
                TxState::Expired => return Err(TxError::Expired.into()),
                TxState::Committed => return Err(TxError::AlreadyCommitted.into()),
                TxState::RolledBack => return Err(TxError::AlreadyRolledBack.into()),
            }
        };

        fold(pending).await?;

        let mut registry = self.registry.lock();
        if let Some(tx) = registry.get_mut(tx_id) {
            tx.state = TxState::Committed;
            tx.pending_nodes.clear();
            tx.pending_relationships.clear();
        }
        Ok(())
    }

    /// Remove every non-`Active` (terminal or expired) entry. Returns the
    /// count removed. Invoked opportunistically at request entry.
    pub fn cleanup_expired(&self) -> usize {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|_, tx| tx.effective_state() == TxState::Active);
        before - registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_yields_active_transaction() {
        let mgr = TransactionManager::new();
        let tx_id = mgr.begin(None);
        assert_eq!(mgr.get_state(&tx_id), Ok(TxState::Active));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let mgr = TransactionManager::new();
        let tx_id = mgr.begin(Some(BeginConfig {
            timeout_ms: Some(0),
            metadata: PropertyMap::new(),
        }));
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert_eq!(mgr.get_state(&tx_id), Ok(TxState::Expired));
    }

    #[test]
    fn rollback_then_commit_fails_as_already_rolled_back() {
        let mgr = TransactionManager::new();
        let tx_id = mgr.begin(None);
        mgr.rollback(&tx_id).unwrap();
        assert!(matches!(mgr.rollback(&tx_id), Err(TxError::AlreadyRolledBack)));
    }

    #[test]
    fn unknown_tx_id_is_not_found() {
        let mgr = TransactionManager::new();
        assert!(matches!(
            mgr.get_state("does-not-exist"),
            Err(TxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn commit_folds_pending_and_transitions_state() {
        let mgr = TransactionManager::new();
        let tx_id = mgr.begin(None);
        let node = Node::new(NodeId(1), vec!["Person".into()], PropertyMap::new());
        mgr.stage_created_node(&tx_id, node).unwrap();

        let mut folded = false;
        mgr.commit(&tx_id, |pending| {
            folded = pending.created_nodes.len() == 1;
            async move { Ok(()) }
        })
        .await
        .unwrap();

        assert!(folded);
        assert_eq!(mgr.get_state(&tx_id), Ok(TxState::Committed));
    }
}
