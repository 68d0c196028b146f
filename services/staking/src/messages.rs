//! Protocol message set
//!
//! One enum carries every operation exchanged between stakers, the Treasury,
//! Wallets, Loans and the authority accounts. Which actor accepts which
//! variant is decided by the actor handlers; the enum itself is only the
//! vocabulary.

use crate::error::{ProtocolError, Result};
use messaging_actors::{ActorMessage, Outbound, TxContext};
use serde::{Deserialize, Serialize};
use staking_config::comments;
use types::{Address, Coins, RoundId, Tokens};

/// Capital request for one validator in an `OpenRound`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub validator: Address,
    pub max_stake: Coins,
}

/// Result of a round as reported for one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanOutcome {
    Profit(Coins),
    Loss(Coins),
}

impl LoanOutcome {
    /// Outcome of a loan recovered without a result from the elector
    pub const NEUTRAL: Self = LoanOutcome::Profit(Coins::ZERO);
}

/// Staker request relayed by the Treasury to the staker's Wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletRequest {
    StakeFirstCoins,
    /// Driver-relayed stake of the coins pledged for `round`
    StakeRound { round: RoundId, refund_to: Address },
    /// `None` unstakes every token the wallet holds
    UnstakeTokens { tokens: Option<Tokens> },
    WithdrawTokens,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    // Staker -> Treasury
    TopUp,
    Comment(String),
    DepositCoins,
    StakeFirstCoins,
    UnstakeAllTokens,
    UnstakeTokens { tokens: Tokens },
    WithdrawTokens,

    // Treasury -> Wallet
    SaveCoins {
        owner: Address,
        round: RoundId,
        coins: Coins,
    },
    WalletRequest {
        owner: Address,
        request: WalletRequest,
    },
    MintTokens {
        round: RoundId,
        coins: Coins,
        tokens: Tokens,
        refund_to: Address,
    },
    /// The mint bounced and was reversed; `coins` go back to pending
    MintReverted {
        round: RoundId,
        coins: Coins,
        refund_to: Address,
    },

    // Wallet -> Treasury
    StakeCoins {
        owner: Address,
        round: RoundId,
        coins: Coins,
        refund_to: Address,
    },
    ReserveTokens {
        owner: Address,
        tokens: Tokens,
    },
    BurnTokens {
        owner: Address,
        tokens: Tokens,
    },

    // -> staker
    TransferNotification { tokens: Tokens },
    WithdrawalNotification { tokens: Tokens, coins: Coins },
    DepositReturned { coins: Coins },
    GasExcess,

    // Driver -> Treasury
    OpenRound { loans: Vec<LoanRequest> },
    CloseRound { round: RoundId },
    StakePledge { owner: Address, round: RoundId },

    // Treasury -> Loan
    ProvideLoan { stake: Coins },
    RecoverStake,

    // Elector -> Loan -> Treasury
    RoundOutcome { outcome: LoanOutcome },
    LoanSettled {
        round: RoundId,
        validator: Address,
        stake: Coins,
        outcome: LoanOutcome,
    },

    // Governance
    SetStopped { stopped: bool },
    SetDriver { driver: Address },
    SetHalter { halter: Address },
    SetGovernanceFee { fee_bps: u16 },
    ProposeGovernor { governor: Address },
    AcceptGovernance,
}

impl Op {
    /// Map a plain transfer comment to the staker operation it stands for
    pub fn from_comment(text: &str) -> Result<Op> {
        match text.trim() {
            comments::DEPOSIT_COINS => Ok(Op::DepositCoins),
            comments::STAKE_FIRST_COINS => Ok(Op::StakeFirstCoins),
            comments::UNSTAKE_ALL_TOKENS => Ok(Op::UnstakeAllTokens),
            comments::WITHDRAW_TOKENS => Ok(Op::WithdrawTokens),
            other => Err(ProtocolError::UnknownComment {
                text: other.to_string(),
            }),
        }
    }

    pub fn is_governance(&self) -> bool {
        matches!(
            self,
            Op::SetStopped { .. }
                | Op::SetDriver { .. }
                | Op::SetHalter { .. }
                | Op::SetGovernanceFee { .. }
                | Op::ProposeGovernor { .. }
                | Op::AcceptGovernance
        )
    }
}

impl ActorMessage for Op {
    fn op_name(&self) -> &'static str {
        match self {
            Op::TopUp => "top_up",
            Op::Comment(_) => "comment",
            Op::DepositCoins => "deposit_coins",
            Op::StakeFirstCoins => "stake_first_coins",
            Op::UnstakeAllTokens => "unstake_all_tokens",
            Op::UnstakeTokens { .. } => "unstake_tokens",
            Op::WithdrawTokens => "withdraw_tokens",
            Op::SaveCoins { .. } => "save_coins",
            Op::WalletRequest { .. } => "wallet_request",
            Op::MintTokens { .. } => "mint_tokens",
            Op::MintReverted { .. } => "mint_reverted",
            Op::StakeCoins { .. } => "stake_coins",
            Op::ReserveTokens { .. } => "reserve_tokens",
            Op::BurnTokens { .. } => "burn_tokens",
            Op::TransferNotification { .. } => "transfer_notification",
            Op::WithdrawalNotification { .. } => "withdrawal_notification",
            Op::DepositReturned { .. } => "deposit_returned",
            Op::GasExcess => "gas_excess",
            Op::OpenRound { .. } => "open_round",
            Op::CloseRound { .. } => "close_round",
            Op::StakePledge { .. } => "stake_pledge",
            Op::ProvideLoan { .. } => "provide_loan",
            Op::RecoverStake => "recover_stake",
            Op::RoundOutcome { .. } => "round_outcome",
            Op::LoanSettled { .. } => "loan_settled",
            Op::SetStopped { .. } => "set_stopped",
            Op::SetDriver { .. } => "set_driver",
            Op::SetHalter { .. } => "set_halter",
            Op::SetGovernanceFee { .. } => "set_governance_fee",
            Op::ProposeGovernor { .. } => "propose_governor",
            Op::AcceptGovernance => "accept_governance",
        }
    }
}

/// Return the unconsumed inbound value to `to` as a `GasExcess` message.
///
/// Sends nothing when the remainder would not cover the forwarding fee.
pub(crate) fn refund_gas_excess(ctx: &mut TxContext<Op>, to: Address) -> Result<Option<Coins>> {
    let refund = Outbound::new(to, Op::GasExcess).remaining().bounce(false);
    if ctx.available() <= ctx.forward_fee(&refund) {
        return Ok(None);
    }
    Ok(Some(ctx.send(refund)?))
}
