//! Wallet session and transaction submission
//!
//! Private keys never enter this crate in production: signing happens in an
//! external wallet reached through [`WalletSigner`]. The session builds the
//! transfer, hands it out for signing and submits the signed bytes.

mod journal;
mod retry;
mod session;
mod signer;
mod transaction;
mod transfer;

#[cfg(test)]
mod testing;

pub use journal::{JournalEntry, SendJournal};
pub use retry::{RetryExhausted, RetryPolicy};
pub use session::{SessionStatus, WalletSession};
pub use signer::{
    Authorization, AuthorizationRequest, AuthorizedAccount, KeypairSigner, SignerError,
    WalletSigner,
};
pub use transaction::{CompiledInstruction, Message, MessageHeader, Transaction, TransactionError};
pub use transfer::{PendingTransfer, SendState, SendStateMachine};
