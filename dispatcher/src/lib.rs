pub mod builder;
pub mod dispatch;
pub mod nonce;
pub mod signer;

pub use builder::{TransactionBuilder, BLOCK_GAS_CAP};
pub use dispatch::{DispatchError, DispatchStage, Dispatcher};
pub use nonce::NonceTracker;
pub use signer::{Account, RemoteSigner, TransactionSigner};
