//! Simulated network node and its key bookkeeping

use crate::types::NodeId;
use crypto::{PrivateState, SharedSecret};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Shared handle to a node. Only sessions the node takes part in write to it.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    id: NodeId,
    state: Arc<Mutex<Node>>,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, Node> {
        self.state.lock().await
    }
}

/// A participant in the topology
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    neighbors: BTreeSet<NodeId>,
    /// Set by this node's own keygen step; never transmitted
    private_key: Option<PrivateState>,
    /// Most recently authenticated session key
    session_key: Option<SharedSecret>,
    /// Authenticated key per peer
    peer_keys: BTreeMap<NodeId, SharedSecret>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            neighbors: BTreeSet::new(),
            private_key: None,
            session_key: None,
            peer_keys: BTreeMap::new(),
        }
    }

    pub fn into_handle(self) -> NodeHandle {
        NodeHandle {
            id: self.id.clone(),
            state: Arc::new(Mutex::new(self)),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    pub fn add_neighbor(&mut self, peer: NodeId) {
        if peer != self.id {
            self.neighbors.insert(peer);
        }
    }

    pub fn private_key(&self) -> Option<&PrivateState> {
        self.private_key.as_ref()
    }

    pub fn session_key(&self) -> Option<&SharedSecret> {
        self.session_key.as_ref()
    }

    /// Key authenticated with `peer`, if any
    pub fn peer_key(&self, peer: &NodeId) -> Option<&SharedSecret> {
        self.peer_keys.get(peer)
    }

    pub fn peer_keys(&self) -> &BTreeMap<NodeId, SharedSecret> {
        &self.peer_keys
    }

    pub(crate) fn set_private_key(&mut self, state: PrivateState) {
        self.private_key = Some(state);
    }

    pub(crate) fn install_session_key(&mut self, peer: &NodeId, key: SharedSecret) {
        self.peer_keys.insert(peer.clone(), key.clone());
        self.session_key = Some(key);
    }
}
