//! Endpoint Registry
//!
//! Owns one connection handle per configured network. Every network is checked
//! at startup; the ones that answer the liveness check are published as an
//! immutable snapshot. The rest stay configured and are re-checked by
//! `refresh_missing` until they answer. The snapshot is only ever replaced
//! wholesale (by `refresh`, `refresh_missing` or `reverify`), so a reader
//! iterating one tick's connections never sees it change underneath.

use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{Result, UltronError};
use crate::rpc::{ChainClient, ClientFactory};
use crate::types::{ConnectionState, Network, NetworkId};

/// Connection handle bound to exactly one network
#[derive(Clone)]
pub struct Connection {
    network: Network,
    client: Arc<dyn ChainClient>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(network: Network, client: Arc<dyn ChainClient>) -> Self {
        Self {
            network,
            client,
            state: ConnectionState::Unverified,
        }
    }

    pub fn id(&self) -> &NetworkId {
        &self.network.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network.id)
            .field("endpoint", &self.client.endpoint())
            .field("state", &self.state)
            .finish()
    }
}

/// Result of probing one network
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub network: NetworkId,
    pub state: ConnectionState,
    pub error: Option<String>,
}

/// Registry of healthy connections, one per network
pub struct Registry {
    networks: Vec<Network>,
    factory: Arc<dyn ClientFactory>,
    check_timeout: Duration,
    connections: RwLock<Arc<Vec<Connection>>>,
}

impl Registry {
    /// Check every network and keep the healthy ones.
    ///
    /// Fails with `NoHealthyEndpoints` when nothing answers.
    pub async fn connect(
        networks: Vec<Network>,
        factory: Arc<dyn ClientFactory>,
        check_timeout: Duration,
    ) -> Result<Self> {
        let networks = dedupe(networks);
        info!("Probing {} configured networks", networks.len());

        let checks = networks
            .iter()
            .map(|network| check_network(factory.as_ref(), network, check_timeout));
        let results = join_all(checks).await;

        let connections: Vec<Connection> = results
            .into_iter()
            .filter_map(|(_, connection)| connection)
            .collect();

        if connections.is_empty() {
            error!("❌ CRITICAL: no working RPC connections");
            return Err(UltronError::NoHealthyEndpoints);
        }

        info!(
            healthy = connections.len(),
            configured = networks.len(),
            "Endpoint registry ready"
        );

        Ok(Self {
            networks,
            factory,
            check_timeout,
            connections: RwLock::new(Arc::new(connections)),
        })
    }

    /// Configured networks, in check order
    pub fn configured(&self) -> &[Network] {
        &self.networks
    }

    /// Current healthy snapshot, in configured order
    pub async fn healthy(&self) -> Arc<Vec<Connection>> {
        Arc::clone(&*self.connections.read().await)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up the healthy connection for a network
    pub async fn get(&self, id: &NetworkId) -> Result<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or_else(|| UltronError::NotFound(id.clone()))
    }

    /// Re-check a configured network with a fresh client.
    ///
    /// This is the recovery hook for networks dropped at startup or by
    /// [`Registry::reverify`].
    pub async fn refresh(&self, id: &NetworkId) -> Result<ConnectionState> {
        let network = self
            .networks
            .iter()
            .find(|n| &n.id == id)
            .ok_or_else(|| UltronError::NotFound(id.clone()))?;

        let (outcome, connection) =
            check_network(self.factory.as_ref(), network, self.check_timeout).await;
        self.replace(id, connection).await;

        Ok(outcome.state)
    }

    /// Refresh every configured network that is not currently healthy.
    ///
    /// Checks run concurrently; results come back in configured order.
    pub async fn refresh_missing(&self) -> Vec<(NetworkId, ConnectionState)> {
        let snapshot = self.healthy().await;
        let missing: Vec<&NetworkId> = self
            .networks
            .iter()
            .filter(|n| !snapshot.iter().any(|c| c.id() == &n.id))
            .map(|n| &n.id)
            .collect();

        if missing.is_empty() {
            return Vec::new();
        }

        let refreshes = missing
            .into_iter()
            .map(|id| async move { (id.clone(), self.refresh(id).await) });

        join_all(refreshes)
            .await
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(state) => Some((id, state)),
                Err(e) => {
                    warn!(network = %id, error = %e, "Refresh failed");
                    None
                }
            })
            .collect()
    }

    /// Re-run the liveness check on an existing connection after a use failure.
    ///
    /// The connection is dropped from the snapshot when the check fails; the
    /// network stays configured, so `refresh_missing` can bring it back.
    pub async fn reverify(&self, id: &NetworkId) -> Result<ConnectionState> {
        let connection = self.get(id).await?;

        match check_liveness(connection.client(), connection.network(), self.check_timeout).await {
            Ok(block) => {
                info!(network = %id, block, "Connection re-verified");
                Ok(ConnectionState::Healthy)
            }
            Err(e) => {
                warn!(network = %id, error = %e, "⚠️ Connection failed re-verification, dropping");
                self.replace(id, None).await;
                Ok(ConnectionState::Failed)
            }
        }
    }

    async fn replace(&self, id: &NetworkId, connection: Option<Connection>) {
        let mut guard = self.connections.write().await;
        let mut next: Vec<Connection> = guard.iter().filter(|c| c.id() != id).cloned().collect();
        if let Some(connection) = connection {
            next.push(connection);
        }
        next.sort_by_key(|c| self.position(c.id()));
        *guard = Arc::new(next);
    }

    fn position(&self, id: &NetworkId) -> usize {
        self.networks
            .iter()
            .position(|n| &n.id == id)
            .unwrap_or(usize::MAX)
    }
}

/// Open a client for `network` and run the liveness check.
pub async fn check_network(
    factory: &dyn ClientFactory,
    network: &Network,
    timeout: Duration,
) -> (CheckOutcome, Option<Connection>) {
    let client = match factory.connect(network) {
        Ok(client) => client,
        Err(e) => {
            warn!(network = %network.id, error = %e, "❌ Error connecting to RPC");
            return (failed(network, e), None);
        }
    };

    let mut connection = Connection::new(network.clone(), client);

    match check_liveness(connection.client(), network, timeout).await {
        Ok(block) => {
            connection.state = ConnectionState::Healthy;
            info!(
                network = %network.id,
                endpoint = connection.client().endpoint(),
                block,
                "✅ RPC connected successfully"
            );
            let outcome = CheckOutcome {
                network: network.id.clone(),
                state: ConnectionState::Healthy,
                error: None,
            };
            (outcome, Some(connection))
        }
        Err(e) => {
            warn!(network = %network.id, error = %e, "⚠️ RPC failed to connect");
            (failed(network, e), None)
        }
    }
}

async fn check_liveness(
    client: &dyn ChainClient,
    network: &Network,
    timeout: Duration,
) -> Result<u64> {
    let block = tokio::time::timeout(timeout, client.block_number())
        .await
        .map_err(|_| UltronError::Timeout(format!("{} liveness check", network.id)))??;

    if let Some(expected) = network.chain_id {
        let actual = tokio::time::timeout(timeout, client.chain_id())
            .await
            .map_err(|_| UltronError::Timeout(format!("{} chain id check", network.id)))??;
        if actual != expected {
            return Err(UltronError::ConnectionError(format!(
                "chain id mismatch: expected {}, endpoint reports {}",
                expected, actual
            )));
        }
    }

    Ok(block)
}

fn failed(network: &Network, e: UltronError) -> CheckOutcome {
    CheckOutcome {
        network: network.id.clone(),
        state: ConnectionState::Failed,
        error: Some(e.to_string()),
    }
}

fn dedupe(networks: Vec<Network>) -> Vec<Network> {
    let mut unique: Vec<Network> = Vec::with_capacity(networks.len());
    for network in networks {
        if unique.iter().any(|n| n.id == network.id) {
            warn!(network = %network.id, "Duplicate network entry ignored");
            continue;
        }
        unique.push(network);
    }
    unique
}
