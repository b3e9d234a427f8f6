//! SolView wallet core
//!
//! Wallet session and transaction submission for a Solana explorer:
//! - Connect an external signing wallet and track the active account
//! - Query balances and send SOL with bounded retry and confirmation
//! - Keep favorites, search history and network selection in a
//!   write-through preferences store
//!
//! # Security Model
//!
//! - Signing is delegated to the wallet behind [`wallet::WalletSigner`]
//! - The local [`wallet::KeypairSigner`] never logs or serializes key material
//! - Every send outcome can be journaled, including uncertain broadcasts

pub mod config;
pub mod rpc;
pub mod store;
pub mod types;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, RpcConfig, KEYPAIR_ENV};
pub use error::{Error, Result};
pub use store::PreferencesStore;
pub use types::{Environment, Pubkey, Signature};
pub use wallet::{SessionStatus, WalletSession};
