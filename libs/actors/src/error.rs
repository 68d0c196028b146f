//! Ledger transport and actor handler errors

use thiserror::Error;
use types::{Address, CodeId, Coins};

/// Failures raised by the ledger runtime itself
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unknown account {address}")]
    UnknownAccount { address: Address },

    #[error("Account {address} already exists")]
    AccountExists { address: Address },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Coins, available: Coins },

    #[error("Insufficient inbound value: required {required}, available {available}")]
    InsufficientValue { required: Coins, available: Coins },

    #[error("Attached value {attached} does not cover compute fee {compute_fee}")]
    OutOfGas { attached: Coins, compute_fee: Coins },

    #[error("No code registered for {code}")]
    UnknownCode { code: CodeId },

    #[error("State init derives {derived}, not destination {destination}")]
    AddressMismatch { derived: Address, destination: Address },

    #[error("Actor state at {address} is not of the requested type")]
    StateMismatch { address: Address },

    #[error("Mailbox closed for {address}")]
    MailboxClosed { address: Address },

    #[error("Ledger did not settle within {timeout_ms}ms ({in_flight} messages in flight)")]
    SettleTimeout { timeout_ms: u64, in_flight: u64 },

    #[error("Decode error: {0}")]
    Decode(#[from] bincode::Error),
}

impl TransportError {
    /// Short label for structured log fields and journal entries
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::UnknownAccount { .. } => "unknown_account",
            TransportError::AccountExists { .. } => "account_exists",
            TransportError::InsufficientBalance { .. } => "insufficient_balance",
            TransportError::InsufficientValue { .. } => "insufficient_value",
            TransportError::OutOfGas { .. } => "out_of_gas",
            TransportError::UnknownCode { .. } => "unknown_code",
            TransportError::AddressMismatch { .. } => "address_mismatch",
            TransportError::StateMismatch { .. } => "state_mismatch",
            TransportError::MailboxClosed { .. } => "mailbox_closed",
            TransportError::SettleTimeout { .. } => "settle_timeout",
            TransportError::Decode(_) => "decode",
        }
    }
}

/// Outcome of a failed handler; any error aborts the transaction
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Rejected ({category}): {reason}")]
    Rejected {
        category: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ActorError {
    pub fn rejected(category: &'static str, reason: impl std::fmt::Display) -> Self {
        ActorError::Rejected {
            category,
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Rejected { category, .. } => category,
            ActorError::Transport(e) => e.category(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
