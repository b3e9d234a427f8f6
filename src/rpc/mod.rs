//! Remote ledger node access
//!
//! The session talks to the node only through the [`LedgerNode`] trait so
//! the send pipeline can run against the JSON-RPC client or a test double.

mod client;

pub use client::{RpcClient, RpcNodeProvider};

use crate::types::{Environment, FreshnessToken, Pubkey, Signature};
use async_trait::async_trait;
use std::sync::Arc;

/// Options passed with a broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip node-side preflight simulation
    pub skip_preflight: bool,
    /// Node-side rebroadcast attempts (node default when `None`)
    pub max_retries: Option<usize>,
}

/// Final outcome of waiting for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Executed successfully at the requested commitment
    Confirmed,
    /// Included but failed during execution
    Failed(String),
    /// The blockhash expired before the transaction landed
    Expired,
}

/// Error type for node calls
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// Operations the wallet needs from a ledger node
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// Balance of `pubkey` in lamports
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, RpcError>;

    /// Latest blockhash and its expiry height
    async fn get_latest_blockhash(&self) -> Result<FreshnessToken, RpcError>;

    /// Submit a signed wire transaction
    async fn send_transaction(
        &self,
        transaction: &[u8],
        options: SendOptions,
    ) -> Result<Signature, RpcError>;

    /// Wait until `signature` is confirmed, fails, or `token` expires
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        token: &FreshnessToken,
    ) -> Result<ConfirmationOutcome, RpcError>;
}

/// Supplies a node connection for a network environment
pub trait NodeProvider: Send + Sync {
    fn node(&self, environment: Environment) -> crate::Result<Arc<dyn LedgerNode>>;
}
