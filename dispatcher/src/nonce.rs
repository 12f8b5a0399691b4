//! Local nonce tracking
//!
//! Several approvals on one network within a tick can outrun the node's view
//! of the pending pool. The tracker remembers the next nonce after every
//! accepted submission and never hands out a value below it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use ultron_core::{Address, NetworkId};

#[derive(Clone, Default)]
pub struct NonceTracker {
    next: Arc<RwLock<HashMap<(NetworkId, Address), u64>>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonce to use given the count the node reported.
    pub async fn resolve(&self, network: &NetworkId, address: &Address, remote: u64) -> u64 {
        let cache = self.next.read().await;
        match cache.get(&(network.clone(), *address)) {
            Some(&local) if local > remote => {
                debug!(%network, remote, local, "Node nonce behind local submissions");
                local
            }
            _ => remote,
        }
    }

    /// Record that `nonce` was accepted by the network.
    pub async fn commit(&self, network: &NetworkId, address: &Address, nonce: u64) {
        let mut cache = self.next.write().await;
        let entry = cache.entry((network.clone(), *address)).or_insert(0);
        *entry = (*entry).max(nonce.saturating_add(1));
    }

    pub async fn tracked(&self) -> usize {
        self.next.read().await.len()
    }
}
