//! Pending transfers and the per-send state machine

use crate::types::{lamports_to_sol, Environment, FreshnessToken, Pubkey};
use crate::wallet::transaction::{Message, Transaction};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One send operation, alive until it reaches a terminal state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingTransfer {
    pub id: Uuid,
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub lamports: u64,
    pub token: FreshnessToken,
    pub environment: Environment,
    pub created_at: DateTime<Utc>,
}

impl PendingTransfer {
    pub fn new(
        sender: Pubkey,
        recipient: Pubkey,
        lamports: u64,
        token: FreshnessToken,
        environment: Environment,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            lamports,
            token,
            environment,
            created_at: Utc::now(),
        }
    }

    pub fn amount_sol(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }

    /// Unsigned system transfer with the sender as fee payer
    pub fn to_transaction(&self) -> Transaction {
        Transaction::new_unsigned(Message::new_transfer(
            &self.sender,
            &self.recipient,
            self.lamports,
            self.token.blockhash,
        ))
    }
}

/// Where a single send currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SendState {
    Idle,
    BuildingTransaction,
    AwaitingSignature,
    Broadcasting { attempt: u32 },
    Confirming,
    Confirmed,
    Rejected,
    Expired,
    Failed,
}

impl SendState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SendState::Confirmed | SendState::Rejected | SendState::Expired | SendState::Failed
        )
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendState::Broadcasting { attempt } => write!(f, "broadcasting (attempt {})", attempt),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Enforces legal transitions for one send
#[derive(Debug, Clone)]
pub struct SendStateMachine {
    state: SendState,
    max_attempts: u32,
    history: Vec<SendState>,
}

impl SendStateMachine {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: SendState::Idle,
            max_attempts: max_attempts.max(1),
            history: vec![SendState::Idle],
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[SendState] {
        &self.history
    }

    fn allowed(&self, next: SendState) -> bool {
        use SendState::*;
        match (self.state, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Idle, BuildingTransaction) => true,
            (BuildingTransaction, AwaitingSignature) => true,
            (AwaitingSignature, Broadcasting { attempt: 1 }) => true,
            (Broadcasting { attempt: n }, Broadcasting { attempt: m }) => {
                m == n + 1 && m <= self.max_attempts
            }
            (Broadcasting { .. }, Confirming) => true,
            (Confirming, Confirmed | Rejected | Expired) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn advance(&mut self, next: SendState) -> Result<()> {
        if !self.allowed(next) {
            return Err(Error::InvalidState(format!(
                "cannot move from {} to {}",
                self.state, next
            )));
        }
        tracing::trace!(from = %self.state, to = %next, "Send state transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Mark the send failed unless it already finished
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SendState::Failed;
            self.history.push(SendState::Failed);
        }
    }
}
