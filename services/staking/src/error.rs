//! Error types for the staking protocol actors

use messaging_actors::{ActorError, TransportError};
use thiserror::Error;
use types::{Address, Coins, RoundId, Tokens, ValueError};

/// Reasons a protocol actor rejects a message.
///
/// Every variant aborts the transaction it was raised in; the ledger restores
/// the actor state and bounces the attached value when the message allows it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Treasury is stopped")]
    Halted,

    #[error("Insufficient value: required {required}, attached {attached}")]
    InsufficientValue { required: Coins, attached: Coins },

    #[error("Unauthorized: {sender} is not the {role}")]
    Unauthorized { sender: Address, role: &'static str },

    #[error("Unexpected operation '{op}' for {actor}")]
    UnknownOp {
        op: &'static str,
        actor: &'static str,
    },

    #[error("Unknown comment '{text}'")]
    UnknownComment { text: String },

    #[error("Staking for {round} is locked by an active round")]
    RoundLocked { round: RoundId },

    #[error("{round} cannot advance before t={until}")]
    RoundTooEarly { round: RoundId, until: u64 },

    #[error("No capital available to lend")]
    NothingToLend,

    #[error("No pending coins to stake")]
    NothingToStake,

    #[error("Insufficient tokens: requested {requested}, available {available}")]
    InsufficientTokens { requested: Tokens, available: Tokens },

    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: Coins, available: Coins },

    #[error("Pool is insolvent: {total_tokens} tokens have no backing")]
    Insolvent { total_tokens: Tokens },

    #[error("Unknown loan {address}")]
    UnknownLoan { address: Address },

    #[error("Loan is {phase}, expected {expected}")]
    LoanPhase {
        phase: &'static str,
        expected: &'static str,
    },

    #[error("Message for owner {actual} reached the wallet of {expected}")]
    OwnerMismatch { expected: Address, actual: Address },

    #[error("Governance fee {bps} bps exceeds the maximum")]
    InvalidFee { bps: u16 },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ValueError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Stable label recorded in the transaction journal
    pub fn category(&self) -> &'static str {
        match self {
            ProtocolError::Halted => "halted",
            ProtocolError::InsufficientValue { .. } => "insufficient_value",
            ProtocolError::Unauthorized { .. } => "unauthorized",
            ProtocolError::UnknownOp { .. } => "unknown_op",
            ProtocolError::UnknownComment { .. } => "unknown_comment",
            ProtocolError::RoundLocked { .. } => "round_locked",
            ProtocolError::RoundTooEarly { .. } => "round_too_early",
            ProtocolError::NothingToLend => "nothing_to_lend",
            ProtocolError::NothingToStake => "nothing_to_stake",
            ProtocolError::InsufficientTokens { .. } => "insufficient_tokens",
            ProtocolError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            ProtocolError::Insolvent { .. } => "insolvent",
            ProtocolError::UnknownLoan { .. } => "unknown_loan",
            ProtocolError::LoanPhase { .. } => "loan_phase",
            ProtocolError::OwnerMismatch { .. } => "owner_mismatch",
            ProtocolError::InvalidFee { .. } => "invalid_fee",
            ProtocolError::Arithmetic(_) => "arithmetic",
            ProtocolError::Transport(e) => e.category(),
        }
    }
}

impl From<ProtocolError> for ActorError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Transport(e) => ActorError::Transport(e),
            other => ActorError::rejected(other.category(), other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
