//! Signer boundary
//!
//! The wallet holding private keys lives out of process (a mobile wallet
//! app in production). The session only sees the [`WalletSigner`] trait:
//! an authorization handshake and a signing request.
//!
//! [`KeypairSigner`] is a local implementation for the command line and tests.
//! - Keys are held in ed25519-dalek's SigningKey
//! - Keys are never serialized or logged
//! - Debug output redacts the key

use crate::config::AppIdentity;
use crate::types::{Environment, Pubkey, Signature};
use crate::wallet::transaction::Transaction;
use crate::{Error, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use secrecy::{ExposeSecret, SecretString};

/// Parameters of an authorization handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub environment: Environment,
    pub identity: AppIdentity,
    /// Token from a previous authorization, to skip re-prompting
    pub auth_token: Option<String>,
}

impl AuthorizationRequest {
    /// Chain identifier in the form `solana:<cluster>`
    pub fn chain(&self) -> String {
        self.environment.chain_id()
    }
}

/// An account the wallet granted access to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAccount {
    /// Base-64 encoded public key
    pub address: String,
    pub label: Option<String>,
}

/// Result of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub accounts: Vec<AuthorizedAccount>,
    pub auth_token: Option<String>,
}

/// Error type for signer requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The user declined or aborted the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The wallet could not complete the request
    #[error("request failed: {0}")]
    Failed(String),
}

/// An external wallet able to authorize the app and sign transactions
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Ask the wallet to authorize this app for `request.environment`
    async fn authorize(&self, request: &AuthorizationRequest) -> std::result::Result<Authorization, SignerError>;

    /// Sign each transaction, returning the signed wire encodings
    async fn sign_transactions(
        &self,
        transactions: &[Transaction],
    ) -> std::result::Result<Vec<Vec<u8>>, SignerError>;
}

/// Local ed25519 signer
pub struct KeypairSigner {
    /// The signing key
    key: SigningKey,
    /// Public key (safe to expose)
    pubkey: Pubkey,
}

impl KeypairSigner {
    /// Create a signer from an environment variable holding a base-58 keypair
    pub fn from_env(var_name: &str) -> Result<Self> {
        let secret = std::env::var(var_name).map_err(|_| {
            Error::Config(format!(
                "Environment variable {} not set. Required for the local signer.",
                var_name
            ))
        })?;

        Self::from_base58(&SecretString::from(secret))
    }

    /// Create a signer from a base-58 64-byte keypair (secret ‖ public),
    /// the format exported by Solana wallets and `solana-keygen`
    pub fn from_base58(keypair: &SecretString) -> Result<Self> {
        let bytes = bs58::decode(keypair.expose_secret().trim())
            .into_vec()
            .map_err(|e| Error::Config(format!("Invalid keypair encoding: {}", e)))?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::Config("Keypair must be 64 bytes".to_string()))?;
        let key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| Error::Config(format!("Invalid keypair: {}", e)))?;
        Ok(Self::from_signing_key(key))
    }

    /// Create a signer from a 32-byte secret seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let pubkey = Pubkey::new(key.verifying_key().to_bytes());
        Self { key, pubkey }
    }

    /// Get the public key (safe to share)
    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    /// Sign arbitrary bytes
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        Signature::new(self.key.sign(message).to_bytes())
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    async fn authorize(&self, request: &AuthorizationRequest) -> std::result::Result<Authorization, SignerError> {
        tracing::debug!(
            chain = %request.chain(),
            app = %request.identity.name,
            "Local signer authorizing"
        );
        let auth_token = request
            .auth_token
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(Authorization {
            accounts: vec![AuthorizedAccount {
                address: self.pubkey.to_base64(),
                label: Some("local keypair".to_string()),
            }],
            auth_token: Some(auth_token),
        })
    }

    async fn sign_transactions(
        &self,
        transactions: &[Transaction],
    ) -> std::result::Result<Vec<Vec<u8>>, SignerError> {
        transactions
            .iter()
            .map(|tx| {
                let mut tx = tx.clone();
                let signature = self.sign_message(&tx.message_data());
                tx.add_signature(&self.pubkey, signature)
                    .map_err(|e| SignerError::Rejected(e.to_string()))?;
                Ok(tx.serialize())
            })
            .collect()
    }
}

// Implement Debug manually to avoid exposing the key
impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("pubkey", &self.pubkey)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
