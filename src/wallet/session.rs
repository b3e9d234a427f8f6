//! Wallet session manager
//!
//! Owns the connection to the external signer and drives each send through
//! build, sign, broadcast and confirmation. Network selection and the active
//! identity live in the [`PreferencesStore`]; a change of environment while a
//! connect or send is in flight aborts it with [`Error::EnvironmentChanged`].

use crate::config::{AppIdentity, Config, SendConfig};
use crate::rpc::{ConfirmationOutcome, LedgerNode, NodeProvider, SendOptions};
use crate::store::{Preferences, PreferencesStore};
use crate::types::{lamports_to_sol, sol_to_lamports, Environment, Pubkey, Signature};
use crate::wallet::journal::{JournalEntry, SendJournal};
use crate::wallet::retry::RetryPolicy;
use crate::wallet::signer::{AuthorizationRequest, SignerError, WalletSigner};
use crate::wallet::transaction::Transaction;
use crate::wallet::transfer::{PendingTransfer, SendState, SendStateMachine};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

/// Observable session state for the front end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub sending: bool,
    pub identity: Option<Pubkey>,
}

/// Signer authorization token, valid only for the environment it was issued in
#[derive(Debug, Clone)]
struct CachedAuth {
    token: String,
    environment: Environment,
}

#[derive(Debug, Default)]
struct Connection {
    identity: Option<Pubkey>,
    auth: Option<CachedAuth>,
}

/// Bookkeeping for one send, kept outside the cancellable future
struct SendProgress {
    machine: SendStateMachine,
    transfer: Option<PendingTransfer>,
    signature: Option<Signature>,
}

impl SendProgress {
    /// Signature of a transaction the node may already hold
    fn broadcast_signature(&self) -> Option<Signature> {
        match self.machine.state() {
            SendState::Broadcasting { .. } | SendState::Confirming => self.signature,
            _ => None,
        }
    }
}

/// Keeps `sending` set while at least one send is in flight
struct SendingGuard<'a> {
    session: &'a WalletSession,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        let session = self.session;
        session.status.send_modify(|s| {
            let in_flight = session.sends_in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.sending = in_flight > 0;
        });
    }
}

/// Wallet session bound to one signer and one preferences store
pub struct WalletSession {
    store: PreferencesStore,
    signer: Arc<dyn WalletSigner>,
    nodes: Arc<dyn NodeProvider>,
    app_identity: AppIdentity,
    send_config: SendConfig,
    journal: Option<SendJournal>,
    /// Held for the duration of a connect; disconnect waits on it
    connect_lock: Mutex<()>,
    connection: RwLock<Connection>,
    status: watch::Sender<SessionStatus>,
    /// Updated only inside `status.send_modify` so the flag never lags
    sends_in_flight: AtomicU32,
}

impl WalletSession {
    /// Create a session, adopting the identity persisted in `store`
    pub async fn new(
        store: PreferencesStore,
        signer: Arc<dyn WalletSigner>,
        nodes: Arc<dyn NodeProvider>,
        config: &Config,
    ) -> Self {
        let identity = store.active_identity().await;
        if let Some(identity) = identity {
            tracing::info!(identity = %identity, "Restored wallet session");
        }

        let (status, _) = watch::channel(SessionStatus {
            connected: identity.is_some(),
            identity,
            ..Default::default()
        });

        Self {
            store,
            signer,
            nodes,
            app_identity: config.app_identity.clone(),
            send_config: config.send.clone(),
            journal: None,
            connect_lock: Mutex::new(()),
            connection: RwLock::new(Connection {
                identity,
                auth: None,
            }),
            status,
            sends_in_flight: AtomicU32::new(0),
        }
    }

    /// Record every send outcome to `journal`
    pub fn with_journal(mut self, journal: SendJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn store(&self) -> &PreferencesStore {
        &self.store
    }

    /// The connected account, if any
    pub async fn identity(&self) -> Option<Pubkey> {
        self.connection.read().await.identity
    }

    /// Explorer link for `signature` on the current environment
    pub async fn explorer_url(&self, signature: &Signature) -> String {
        self.store.environment().await.explorer_url(signature)
    }

    fn begin_send(&self) -> SendingGuard<'_> {
        self.status.send_modify(|s| {
            self.sends_in_flight.fetch_add(1, Ordering::SeqCst);
            s.sending = true;
        });
        SendingGuard { session: self }
    }

    async fn cached_token(&self, environment: Environment) -> Option<String> {
        self.connection
            .read()
            .await
            .auth
            .as_ref()
            .filter(|auth| auth.environment == environment)
            .map(|auth| auth.token.clone())
    }

    async fn cache_token(&self, token: Option<String>, environment: Environment) {
        if let Some(token) = token {
            self.connection.write().await.auth = Some(CachedAuth { token, environment });
        }
    }

    fn authorization_request(
        &self,
        environment: Environment,
        auth_token: Option<String>,
    ) -> AuthorizationRequest {
        AuthorizationRequest {
            environment,
            identity: self.app_identity.clone(),
            auth_token,
        }
    }

    /// Authorize with the signer and adopt the first returned account
    pub async fn connect(&self) -> Result<Pubkey> {
        let _guard = self
            .connect_lock
            .try_lock()
            .map_err(|_| Error::ConnectInProgress)?;

        let mut prefs = self.store.subscribe();
        let environment = prefs.borrow_and_update().environment();
        let request = self.authorization_request(environment, self.cached_token(environment).await);

        tracing::info!(chain = %request.chain(), "Connecting wallet");
        self.status.send_modify(|s| s.connecting = true);
        let result = tokio::select! {
            result = self.signer.authorize(&request) => Some(result),
            _ = environment_changed(prefs, environment) => None,
        };
        self.status.send_modify(|s| s.connecting = false);

        let authorization = match result {
            Some(Ok(authorization)) => authorization,
            Some(Err(SignerError::Rejected(reason))) => {
                tracing::warn!(reason = %reason, "Wallet authorization denied");
                return Err(Error::AuthorizationDenied(reason));
            }
            Some(Err(SignerError::Failed(reason))) => {
                tracing::warn!(reason = %reason, "Wallet authorization failed");
                return Err(Error::AuthorizationDenied(reason));
            }
            None => {
                tracing::warn!(environment = %environment, "Environment changed during connect");
                return Err(Error::EnvironmentChanged {
                    environment,
                    signature: None,
                });
            }
        };

        let account = authorization
            .accounts
            .first()
            .ok_or(Error::NoAccountReturned)?;
        let identity = Pubkey::from_base64(&account.address).map_err(|e| {
            Error::Signer(format!("Undecodable account address {}: {}", account.address, e))
        })?;

        self.store.set_active_identity(Some(identity)).await?;
        {
            let mut connection = self.connection.write().await;
            connection.identity = Some(identity);
            connection.auth = authorization
                .auth_token
                .map(|token| CachedAuth { token, environment });
        }
        self.status.send_modify(|s| {
            s.connected = true;
            s.identity = Some(identity);
        });

        tracing::info!(identity = %identity, environment = %environment, "Wallet connected");
        Ok(identity)
    }

    /// Forget the connected account locally; the signer is not contacted
    ///
    /// The store is written first, so a failed write leaves the session connected.
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        self.store.set_active_identity(None).await?;
        let previous = {
            let mut connection = self.connection.write().await;
            connection.auth = None;
            connection.identity.take()
        };
        self.status.send_modify(|s| {
            s.connected = false;
            s.identity = None;
        });

        if let Some(identity) = previous {
            tracing::info!(identity = %identity, "Wallet disconnected");
        }
        Ok(())
    }

    /// Balance of the connected account in SOL, zero when not connected
    pub async fn get_balance(&self) -> Result<f64> {
        let Some(identity) = self.identity().await else {
            return Ok(0.0);
        };
        let node = self.nodes.node(self.store.environment().await)?;
        let lamports = node
            .get_balance(&identity)
            .await
            .map_err(|e| Error::NetworkUnavailable(e.to_string()))?;

        tracing::debug!(identity = %identity, lamports, "Fetched balance");
        Ok(lamports_to_sol(lamports))
    }

    /// Transfer `amount_sol` from the connected account to `recipient`
    ///
    /// Returns the transaction signature once the node reports it confirmed.
    /// Inputs are validated before the signer or node is contacted.
    pub async fn send_sol(&self, recipient: &str, amount_sol: f64) -> Result<Signature> {
        let sender = self.identity().await.ok_or(Error::NotConnected)?;
        let recipient = recipient
            .trim()
            .parse::<Pubkey>()
            .map_err(|e| Error::InvalidRecipient(format!("{}: {}", recipient, e)))?;
        let lamports = sol_to_lamports(amount_sol).ok_or_else(|| {
            Error::InvalidAmount(format!("{} is not a positive SOL amount", amount_sol))
        })?;

        let mut prefs = self.store.subscribe();
        let environment = prefs.borrow_and_update().environment();
        let mut progress = SendProgress {
            machine: SendStateMachine::new(self.send_config.max_broadcast_attempts()),
            transfer: None,
            signature: None,
        };

        let sending = self.begin_send();
        let outcome = tokio::select! {
            result = self.execute_send(sender, recipient, lamports, environment, &mut progress) => Some(result),
            _ = environment_changed(prefs, environment) => None,
        };
        drop(sending);

        let result = outcome.unwrap_or_else(|| {
            let signature = progress.broadcast_signature();
            tracing::warn!(
                environment = %environment,
                signature = ?signature,
                "Environment changed during send"
            );
            Err(Error::EnvironmentChanged {
                environment,
                signature,
            })
        });

        if result.is_err() {
            progress.machine.fail();
        }
        if let (Some(journal), Some(transfer)) = (&self.journal, &progress.transfer) {
            journal
                .record(JournalEntry::new(
                    transfer,
                    progress.signature,
                    progress.machine.state(),
                    result.as_ref().err().map(|e| e.to_string()),
                ))
                .await;
        }

        tracing::debug!(states = ?progress.machine.history(), "Send state history");
        match &result {
            Ok(signature) => tracing::info!(%signature, lamports, "Send confirmed"),
            Err(e) => tracing::warn!(error = %e, state = %progress.machine.state(), "Send failed"),
        }
        result
    }

    async fn execute_send(
        &self,
        sender: Pubkey,
        recipient: Pubkey,
        lamports: u64,
        environment: Environment,
        progress: &mut SendProgress,
    ) -> Result<Signature> {
        let node = self.nodes.node(environment)?;

        progress.machine.advance(SendState::BuildingTransaction)?;
        let token = node
            .get_latest_blockhash()
            .await
            .map_err(|e| Error::NetworkUnavailable(e.to_string()))?;
        let transfer = PendingTransfer::new(sender, recipient, lamports, token, environment);
        let transaction = transfer.to_transaction();
        tracing::info!(
            transfer_id = %transfer.id,
            sender = %sender,
            recipient = %recipient,
            amount_sol = transfer.amount_sol(),
            environment = %environment,
            "Built transfer"
        );
        progress.transfer = Some(transfer);

        progress.machine.advance(SendState::AwaitingSignature)?;
        let (wire, signature) = self.sign(&transaction, environment).await?;
        progress.signature = Some(signature);

        let delay = self.send_config.post_sign_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let acknowledged = self
            .broadcast(&node, &wire, signature, &mut progress.machine)
            .await?;
        if acknowledged != signature {
            tracing::warn!(expected = %signature, returned = %acknowledged, "Node returned a different signature");
        }
        progress.signature = Some(acknowledged);

        progress.machine.advance(SendState::Confirming)?;
        let outcome = node
            .confirm_transaction(&acknowledged, &token)
            .await
            .map_err(|e| {
                Error::NetworkUnavailable(format!("confirming {}: {}", acknowledged, e))
            })?;

        match outcome {
            ConfirmationOutcome::Confirmed => {
                progress.machine.advance(SendState::Confirmed)?;
                Ok(acknowledged)
            }
            ConfirmationOutcome::Failed(detail) => {
                progress.machine.advance(SendState::Rejected)?;
                Err(Error::TransactionRejectedOnChain {
                    signature: acknowledged,
                    detail,
                })
            }
            ConfirmationOutcome::Expired => {
                progress.machine.advance(SendState::Expired)?;
                Err(Error::Expired(acknowledged))
            }
        }
    }

    /// Re-authorize and have the signer sign `transaction`
    async fn sign(
        &self,
        transaction: &Transaction,
        environment: Environment,
    ) -> Result<(Vec<u8>, Signature)> {
        let request = self.authorization_request(environment, self.cached_token(environment).await);
        let authorization = self
            .signer
            .authorize(&request)
            .await
            .map_err(|e| Error::SigningRejected(e.to_string()))?;
        self.cache_token(authorization.auth_token, environment).await;

        let signed = self
            .signer
            .sign_transactions(std::slice::from_ref(transaction))
            .await
            .map_err(|e| match e {
                SignerError::Rejected(reason) => Error::SigningRejected(reason),
                SignerError::Failed(reason) => {
                    tracing::warn!(reason = %reason, "Signer failed");
                    Error::SigningFailed
                }
            })?;
        let wire = signed.into_iter().next().ok_or(Error::SigningFailed)?;

        let decoded = Transaction::from_wire(&wire)
            .map_err(|e| Error::Signer(format!("Undecodable signed transaction: {}", e)))?;
        if decoded.message != transaction.message {
            return Err(Error::Signer(
                "Signed transaction does not match the request".to_string(),
            ));
        }
        if !decoded.is_signed() {
            return Err(Error::SigningFailed);
        }
        let signature = decoded.signature().ok_or(Error::SigningFailed)?;
        tracing::debug!(%signature, "Transaction signed");
        Ok((wire, signature))
    }

    async fn broadcast(
        &self,
        node: &Arc<dyn LedgerNode>,
        wire: &[u8],
        signature: Signature,
        machine: &mut SendStateMachine,
    ) -> Result<Signature> {
        let policy = RetryPolicy::new(
            self.send_config.max_broadcast_attempts(),
            self.send_config.broadcast_retry_delay(),
        );
        let options = SendOptions {
            skip_preflight: true,
            max_retries: self.send_config.node_max_retries,
        };

        policy
            .run(|attempt| {
                if let Err(e) = machine.advance(SendState::Broadcasting { attempt }) {
                    tracing::error!(error = %e, "Send state out of step with broadcast attempts");
                }
                tracing::debug!(%signature, attempt, "Broadcasting transaction");
                let node = Arc::clone(node);
                async move { node.send_transaction(wire, options).await }
            })
            .await
            .map_err(|exhausted| Error::BroadcastFailed {
                signature,
                attempts: exhausted.attempts,
                reason: exhausted.last_error.to_string(),
            })
    }
}

/// Resolves once the store's environment differs from `start`
async fn environment_changed(mut prefs: watch::Receiver<Preferences>, start: Environment) {
    loop {
        if prefs.changed().await.is_err() {
            // Store dropped, nothing can change any more
            std::future::pending::<()>().await;
        }
        if prefs.borrow_and_update().environment() != start {
            return;
        }
    }
}
