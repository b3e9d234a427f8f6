//! Error types for the wallet core

use crate::types::{Environment, Signature};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wallet authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Wallet authorization returned no accounts")]
    NoAccountReturned,

    #[error("Wallet not connected")]
    NotConnected,

    #[error("A wallet connection is already in progress")]
    ConnectInProgress,

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Signing failed: wallet returned no signed transaction")]
    SigningFailed,

    /// The node never acknowledged the transaction. Its fate is uncertain:
    /// check `signature` before resubmitting.
    #[error("Broadcast of {signature} failed after {attempts} attempts: {reason}")]
    BroadcastFailed {
        signature: Signature,
        attempts: u32,
        reason: String,
    },

    #[error("Transaction {signature} rejected on chain: {detail}")]
    TransactionRejectedOnChain { signature: Signature, detail: String },

    #[error("Transaction {0} expired before confirmation")]
    Expired(Signature),

    /// `environment` is the one the operation started in. `signature` is set
    /// when the transaction was already broadcast there and may still land.
    #[error("Network environment changed during operation{}", may_still_land(.signature))]
    EnvironmentChanged {
        environment: Environment,
        signature: Option<Signature>,
    },

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Invalid send state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may safely repeat the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_))
    }

    /// Validation failures are raised before any signer or node interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::InvalidRecipient(_) | Error::InvalidAmount(_)
        )
    }
}

fn may_still_land(signature: &Option<Signature>) -> String {
    match signature {
        Some(signature) => format!("; transaction {} may still land", signature),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
