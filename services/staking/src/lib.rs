//! # Liquid Staking Protocol
//!
//! A Treasury pools staker coins, mints pool tokens against them and lends the
//! pooled capital to validators round by round. Each staker gets a Wallet that
//! holds its tokens and pending stakes; each validator loan in a round is a
//! short-lived Loan account. All three run as actors on the
//! [`messaging_actors`] ledger, so every operation is a saga of messages that
//! commit or bounce one hop at a time.
//!
//! ## Staker flow
//!
//! ```text
//!  staker ──'d'──▶ Treasury ──SaveCoins+StateInit──▶ Wallet
//!  staker ──'m'──▶ Treasury ──WalletRequest────────▶ Wallet
//!                  Treasury ◀──StakeCoins─────────── Wallet
//!                  Treasury ──MintTokens───────────▶ Wallet ──TransferNotification──▶ staker
//!  staker ──'w'──▶ Treasury ──WalletRequest────────▶ Wallet
//!                  Treasury ◀──ReserveTokens──────── Wallet
//!  staker ──'b'──▶ Treasury ──WalletRequest────────▶ Wallet
//!                  Treasury ◀──BurnTokens─────────── Wallet
//!  staker ◀──WithdrawalNotification── Treasury
//! ```
//!
//! ## Round flow
//!
//! ```text
//!  driver ──OpenRound──▶ Treasury ──ProvideLoan+StateInit──▶ Loan × n
//!  elector ──RoundOutcome──▶ Loan ──LoanSettled(all balance)──▶ Treasury
//!  driver ──CloseRound──▶ Treasury ──RecoverStake──▶ Loan ──LoanSettled──▶ Treasury
//!  driver ──StakePledge──▶ Treasury ──WalletRequest──▶ Wallet   (pledges left after a round)
//! ```
//!
//! Every handler returns unused inbound value to the originator as
//! `GasExcess`; a rejected step bounces and the sender undoes its half.

pub mod account;
pub mod deploy;
pub mod error;
pub mod fees;
pub mod loan;
pub mod messages;
pub mod queries;
pub mod treasury;
pub mod wallet;

use once_cell::sync::Lazy;
use staking_config::codes;
use types::CodeId;

pub static TREASURY_CODE: Lazy<CodeId> = Lazy::new(|| CodeId::named(codes::TREASURY));
pub static WALLET_CODE: Lazy<CodeId> = Lazy::new(|| CodeId::named(codes::WALLET));
pub static LOAN_CODE: Lazy<CodeId> = Lazy::new(|| CodeId::named(codes::LOAN));

pub use account::{ExternalAccount, Receipt};
pub use deploy::{Authorities, Genesis, Protocol};
pub use error::ProtocolError;
pub use fees::{governance_share, ExchangeRate, FeeSchedule};
pub use loan::{Loan, LoanInit, LoanPhase};
pub use messages::{LoanOutcome, LoanRequest, Op, WalletRequest};
pub use queries::{LoanState, TreasuryState, WalletState};
pub use treasury::{
    Governance, LoanEntry, Participation, ParticipationState, RoundTiming, Treasury,
    TreasuryInit, TreasuryTotals,
};
pub use wallet::{StakingEntry, Wallet, WalletInit, WalletPhase};
