pub mod error;
pub mod features;
pub mod mempool;
pub mod registry;
pub mod rpc;
pub mod types;

pub use error::{ErrorKind, Result, UltronError};
pub use features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use mempool::{poll, PollError};
pub use registry::{CheckOutcome, Connection, Registry};
pub use rpc::{ChainClient, ClientFactory, HttpClientFactory, RpcClient};
pub use types::{
    Address, Bytes, ConnectionState, Network, NetworkId, OutgoingTransaction, PendingTransaction,
    SignedTransaction, TransactionRequest, TxHash, U256,
};
