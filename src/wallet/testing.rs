//! Scriptable signer and node doubles for session tests

use crate::config::{Config, SendConfig};
use crate::rpc::{ConfirmationOutcome, LedgerNode, NodeProvider, RpcError, SendOptions};
use crate::store::{KeyValueStore, MemoryKeyValueStore};
use crate::types::{Environment, FreshnessToken, Hash, Pubkey, Signature};
use crate::wallet::signer::{
    Authorization, AuthorizationRequest, AuthorizedAccount, KeypairSigner, SignerError,
    WalletSigner,
};
use crate::wallet::transaction::Transaction;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Config with no post-sign pause and near-zero retry delays
pub fn test_config() -> Config {
    Config {
        send: SendConfig {
            post_sign_delay_ms: 0,
            broadcast_attempts: 3,
            broadcast_retry_delay_ms: 1,
            node_max_retries: None,
            confirm_poll_interval_ms: 1,
        },
        store_dir: None,
        journal_path: None,
        ..Default::default()
    }
}

/// Signer backed by a real keypair, with switches for each failure mode
pub struct MockSigner {
    inner: KeypairSigner,
    pub reject_authorize: AtomicBool,
    pub no_accounts: AtomicBool,
    pub hang_authorize: AtomicBool,
    pub reject_signing: AtomicBool,
    pub return_nothing: AtomicBool,
    pub hang_signing: AtomicBool,
    pub authorize_calls: AtomicU32,
    pub sign_calls: AtomicU32,
    requests: Mutex<Vec<AuthorizationRequest>>,
}

impl MockSigner {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            inner: KeypairSigner::from_seed(&seed),
            reject_authorize: AtomicBool::new(false),
            no_accounts: AtomicBool::new(false),
            hang_authorize: AtomicBool::new(false),
            reject_signing: AtomicBool::new(false),
            return_nothing: AtomicBool::new(false),
            hang_signing: AtomicBool::new(false),
            authorize_calls: AtomicU32::new(0),
            sign_calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.inner.pubkey()
    }

    /// Every authorization request received, in order
    pub fn requests(&self) -> Vec<AuthorizationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<Authorization, SignerError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.hang_authorize.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_authorize.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected("user declined".to_string()));
        }
        if self.no_accounts.load(Ordering::SeqCst) {
            return Ok(Authorization {
                accounts: Vec::new(),
                auth_token: None,
            });
        }
        Ok(Authorization {
            accounts: vec![AuthorizedAccount {
                address: self.pubkey().to_base64(),
                label: None,
            }],
            auth_token: Some(
                request
                    .auth_token
                    .clone()
                    .unwrap_or_else(|| format!("token-{}", request.environment)),
            ),
        })
    }

    async fn sign_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_signing.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_signing.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected("user declined".to_string()));
        }
        if self.return_nothing.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.sign_transactions(transactions).await
    }
}

/// In-memory ledger node recording every call
pub struct MockNode {
    pub token: FreshnessToken,
    pub balance: AtomicU64,
    pub unavailable: AtomicBool,
    /// Number of upcoming broadcasts that fail
    pub broadcast_failures: AtomicU32,
    /// Confirmation never resolves
    pub hang_confirm: AtomicBool,
    pub balance_calls: AtomicU32,
    pub blockhash_calls: AtomicU32,
    pub send_calls: AtomicU32,
    pub confirm_calls: AtomicU32,
    outcome: Mutex<ConfirmationOutcome>,
    sent: Mutex<Vec<(Vec<u8>, SendOptions)>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            token: FreshnessToken {
                blockhash: Hash::new([42u8; 32]),
                last_valid_block_height: 1_000,
            },
            balance: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            broadcast_failures: AtomicU32::new(0),
            hang_confirm: AtomicBool::new(false),
            balance_calls: AtomicU32::new(0),
            blockhash_calls: AtomicU32::new(0),
            send_calls: AtomicU32::new(0),
            confirm_calls: AtomicU32::new(0),
            outcome: Mutex::new(ConfirmationOutcome::Confirmed),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: ConfirmationOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Wire bytes of every broadcast, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().iter().map(|(tx, _)| tx.clone()).collect()
    }

    pub fn send_options(&self) -> Vec<SendOptions> {
        self.sent.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }

    pub fn total_calls(&self) -> u32 {
        [
            &self.balance_calls,
            &self.blockhash_calls,
            &self.send_calls,
            &self.confirm_calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    fn check_available(&self) -> Result<(), RpcError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerNode for MockNode {
    async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64, RpcError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn get_latest_blockhash(&self) -> Result<FreshnessToken, RpcError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.token)
    }

    async fn send_transaction(
        &self,
        transaction: &[u8],
        options: SendOptions,
    ) -> Result<Signature, RpcError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((transaction.to_vec(), options));
        self.check_available()?;

        let remaining = self.broadcast_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.broadcast_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RpcError::Transport("timed out".to_string()));
        }

        Transaction::from_wire(transaction)
            .ok()
            .and_then(|tx| tx.signature())
            .ok_or_else(|| RpcError::Rpc {
                code: -32602,
                message: "invalid transaction".to_string(),
            })
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
        _token: &FreshnessToken,
    ) -> Result<ConfirmationOutcome, RpcError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_confirm.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.check_available()?;
        Ok(self.outcome.lock().unwrap().clone())
    }
}

/// Hands out the same [`MockNode`] for every environment
pub struct MockProvider {
    node: Arc<MockNode>,
    environments: Mutex<Vec<Environment>>,
}

impl MockProvider {
    pub fn new(node: Arc<MockNode>) -> Self {
        Self {
            node,
            environments: Mutex::new(Vec::new()),
        }
    }

    /// Environments requested so far
    pub fn environments(&self) -> Vec<Environment> {
        self.environments.lock().unwrap().clone()
    }
}

impl NodeProvider for MockProvider {
    fn node(&self, environment: Environment) -> crate::Result<Arc<dyn LedgerNode>> {
        self.environments.lock().unwrap().push(environment);
        Ok(self.node.clone())
    }
}

/// Memory backend whose writes can be made to fail
pub struct FlakyStore {
    inner: MemoryKeyValueStore,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> std::io::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        }
        self.inner.set(key, value).await
    }
}
