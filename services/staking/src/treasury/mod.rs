//! Treasury actor
//!
//! Aggregate ledger of the pool. Staker operations arrive here first and are
//! relayed to the staker's Wallet; the Wallet's confirmations come back here to
//! mint, reserve or burn tokens. Round orchestration lives in [`rounds`] and
//! authority handling in [`governance`].
//!
//! ## Accounting
//!
//! - `total_coins` backs `total_tokens`; the rate is `total_coins / total_tokens`
//! - `total_staking` holds deposits not yet minted; part of it may be swept
//!   into an active participation and lent out
//! - `total_unstaking` counts tokens reserved by wallets for withdrawal
//! - `total_validators_stake` is the capital currently held by Loans

pub mod governance;
pub mod rounds;

pub use governance::Governance;
pub use rounds::{LoanEntry, Participation, ParticipationState};

use crate::error::{ProtocolError, Result};
use crate::fees::{hop_gas, ExchangeRate, FeeSchedule};
use crate::messages::{refund_gas_excess, Op, WalletRequest};
use crate::wallet::WalletInit;
use async_trait::async_trait;
use messaging_actors::{
    ActorBehavior, ActorError, ActorMessage, Envelope, GasSchedule, Outbound, StateInit, TxContext,
};
use serde::{Deserialize, Serialize};
use staking_config::rounds::IMBALANCE_NEUTRAL;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use types::{Address, Coins, RoundId, Tokens};

/// Initial data of the Treasury
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryInit {
    pub driver: Address,
    pub halter: Address,
    pub governor: Address,
    pub elector: Address,
    pub governance_fee_bps: u16,
    pub fees: FeeSchedule,
    pub timing: RoundTiming,
}

/// Round duration bounds in ledger seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTiming {
    /// Earliest a later round may open after this one
    pub min_duration: u64,
    /// Earliest the driver may recover this round's loans
    pub held_duration: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreasuryTotals {
    pub total_coins: Coins,
    pub total_tokens: Tokens,
    pub total_staking: Coins,
    pub total_unstaking: Tokens,
    pub total_validators_stake: Coins,
}

#[derive(Debug, Clone)]
pub struct Treasury {
    pub(crate) totals: TreasuryTotals,
    pub(crate) participations: BTreeMap<RoundId, Participation>,
    pub(crate) next_round: RoundId,
    pub(crate) rounds_imbalance: u8,
    pub(crate) stopped: bool,
    pub(crate) governance: Governance,
    pub(crate) fees: FeeSchedule,
    pub(crate) timing: RoundTiming,
}

impl Treasury {
    pub fn new(init: TreasuryInit) -> Self {
        Self {
            totals: TreasuryTotals::default(),
            participations: BTreeMap::new(),
            next_round: RoundId::FIRST,
            rounds_imbalance: IMBALANCE_NEUTRAL,
            stopped: false,
            governance: Governance {
                driver: init.driver,
                halter: init.halter,
                governor: init.governor,
                proposed_governor: None,
                elector: init.elector,
                governance_fee_bps: init.governance_fee_bps,
            },
            fees: init.fees,
            timing: init.timing,
        }
    }

    pub fn totals(&self) -> &TreasuryTotals {
        &self.totals
    }

    pub fn participations(&self) -> &BTreeMap<RoundId, Participation> {
        &self.participations
    }

    pub fn next_round(&self) -> RoundId {
        self.next_round
    }

    pub fn rounds_imbalance(&self) -> u8 {
        self.rounds_imbalance
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn exchange_rate(&self) -> ExchangeRate {
        ExchangeRate::new(self.totals.total_coins, self.totals.total_tokens)
    }

    /// Staking swept into active participations
    pub fn swept_staking(&self) -> Coins {
        self.participations
            .values()
            .map(|p| p.swept_staking)
            .sum()
    }

    /// Backing coins held by the Treasury itself rather than lent to loans
    pub fn backing_in_treasury(&self) -> Coins {
        self.totals
            .total_coins
            .saturating_add(self.swept_staking())
            .saturating_sub(self.totals.total_validators_stake)
    }

    /// Backing coins that can be paid out of `balance` right now
    fn liquid_backing(&self, balance: Coins) -> Coins {
        let spendable = balance
            .saturating_sub(self.fees.treasury_storage)
            .saturating_sub(self.totals.total_staking);
        self.backing_in_treasury().min(spendable)
    }

    fn latest_round(&self) -> Option<(&RoundId, &Participation)> {
        self.participations.iter().next_back()
    }

    /// Round a deposit made now is recorded under
    fn deposit_round(&self) -> RoundId {
        self.latest_round()
            .map(|(round, _)| *round)
            .unwrap_or(self.next_round)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            return Err(ProtocolError::Halted);
        }
        Ok(())
    }

    /// Staking keyed `round` cannot mint while a round at or after it lends
    fn ensure_unlocked(&self, round: RoundId) -> Result<()> {
        if let Some((active, _)) = self.latest_round() {
            if *active >= round {
                return Err(ProtocolError::RoundLocked { round });
            }
        }
        Ok(())
    }

    fn ensure_value(ctx: &TxContext<Op>, required: Coins) -> Result<()> {
        if ctx.value() < required {
            return Err(ProtocolError::InsufficientValue {
                required,
                attached: ctx.value(),
            });
        }
        Ok(())
    }

    /// Reject `sender` unless it is the Wallet derived for `owner`
    fn ensure_wallet(ctx: &TxContext<Op>, sender: Address, owner: Address) -> Result<()> {
        let expected = Self::wallet_init(ctx, owner).address()?;
        if sender != expected {
            return Err(ProtocolError::Unauthorized {
                sender,
                role: "wallet",
            });
        }
        Ok(())
    }

    fn wallet_init(ctx: &TxContext<Op>, owner: Address) -> WalletInit {
        WalletInit {
            owner,
            treasury: ctx.address(),
        }
    }

    /// Least value a `StakeCoins` must carry into the Treasury.
    ///
    /// Covers the mint, a bounce of the mint and the release of the Wallet's
    /// minting coins, or a refusal bounced straight back to the Wallet.
    pub(crate) fn stake_coins_value(
        &self,
        gas: &GasSchedule,
        owner: Address,
        round: RoundId,
        refund_to: Address,
    ) -> Coins {
        let mint = Op::MintTokens {
            round,
            coins: Coins::ZERO,
            tokens: Tokens::ZERO,
            refund_to,
        };
        let reverted = Op::MintReverted {
            round,
            coins: Coins::ZERO,
            refund_to,
        };
        let minted = gas
            .compute_fee
            .saturating_add(hop_gas(gas, &mint))
            .saturating_add(hop_gas(gas, &mint))
            .saturating_add(hop_gas(gas, &reverted));
        let stake = Self::stake_body(owner, round, refund_to);
        let refused = gas.compute_fee.saturating_add(hop_gas(gas, &stake));
        self.fees.stake_coins_fee.max(minted).max(refused)
    }

    fn stake_body(owner: Address, round: RoundId, refund_to: Address) -> Op {
        Op::StakeCoins {
            owner,
            round,
            coins: Coins::ZERO,
            refund_to,
        }
    }

    /// Worst-case gas of the chain a relayed `request` starts, counting the
    /// Treasury's own transaction
    fn request_gas(&self, gas: &GasSchedule, owner: Address, request: WalletRequest) -> Coins {
        let relay = gas
            .compute_fee
            .saturating_add(hop_gas(gas, &Op::WalletRequest { owner, request }));
        let (round, refund_to) = match request {
            WalletRequest::StakeRound { round, refund_to } => (round, refund_to),
            WalletRequest::StakeFirstCoins => (RoundId::FIRST, owner),
            WalletRequest::UnstakeTokens { .. } => {
                let reserve = Op::ReserveTokens {
                    owner,
                    tokens: Tokens::ZERO,
                };
                // Reserved at the Treasury, or bounced back to the Wallet
                return relay
                    .saturating_add(hop_gas(gas, &reserve))
                    .saturating_add(hop_gas(gas, &reserve));
            }
            WalletRequest::WithdrawTokens => {
                let burn = Op::BurnTokens {
                    owner,
                    tokens: Tokens::ZERO,
                };
                return relay
                    .saturating_add(hop_gas(gas, &burn))
                    .saturating_add(hop_gas(gas, &burn));
            }
        };
        let stake = Self::stake_body(owner, round, refund_to);
        relay
            .saturating_add(gas.forward_fee(stake.encoded_size()))
            .saturating_add(self.stake_coins_value(gas, owner, round, refund_to))
    }

    /// Worst-case gas of a deposit: the Treasury's transaction, the deploying
    /// `SaveCoins` and its bounce
    fn deposit_gas(gas: &GasSchedule, save: &Op, init: &StateInit) -> Coins {
        let deploy = gas.forward_fee(save.encoded_size().saturating_add(init.encoded_size()));
        gas.compute_fee
            .saturating_add(deploy)
            .saturating_add(gas.compute_fee)
            .saturating_add(hop_gas(gas, save))
    }

    /// Relay `request` to the Wallet of `owner` once the attached value covers
    /// `fee` and the gas of the chain it starts
    pub(crate) fn relay_request(
        &self,
        ctx: &mut TxContext<Op>,
        owner: Address,
        fee: Coins,
        request: WalletRequest,
    ) -> Result<()> {
        let required = fee.max(self.request_gas(ctx.gas(), owner, request));
        Self::ensure_value(ctx, required)?;

        let wallet = Self::wallet_init(ctx, owner).address()?;
        ctx.send(Outbound::new(wallet, Op::WalletRequest { owner, request }).remaining())?;
        debug!(staker = %owner.short(), request = ?request, "Relayed to wallet");
        Ok(())
    }

    fn process(&mut self, ctx: &mut TxContext<Op>, envelope: &Envelope<Op>) -> Result<()> {
        if envelope.bounced {
            return self.on_bounce(ctx, envelope);
        }

        let sender = envelope.src;
        match &envelope.body {
            Op::TopUp => {
                debug!(from = %sender.short(), value = %ctx.value(), "Top up");
                Ok(())
            }
            Op::Comment(text) => {
                let op = Op::from_comment(text)?;
                self.staker_op(ctx, sender, &op)
            }
            Op::DepositCoins
            | Op::StakeFirstCoins
            | Op::UnstakeAllTokens
            | Op::UnstakeTokens { .. }
            | Op::WithdrawTokens => self.staker_op(ctx, sender, &envelope.body),
            Op::StakeCoins {
                owner,
                round,
                coins,
                refund_to,
            } => self.stake_coins(ctx, sender, *owner, *round, *coins, *refund_to),
            Op::ReserveTokens { owner, tokens } => {
                self.reserve_tokens(ctx, sender, *owner, *tokens)
            }
            Op::BurnTokens { owner, tokens } => self.burn_tokens(ctx, sender, *owner, *tokens),
            Op::OpenRound { loans } => self.open_round(ctx, sender, loans),
            Op::CloseRound { round } => self.close_round(ctx, sender, *round),
            Op::StakePledge { owner, round } => self.stake_pledge(ctx, sender, *owner, *round),
            Op::LoanSettled {
                round,
                validator,
                stake,
                outcome,
            } => self.loan_settled(ctx, sender, *round, *validator, *stake, *outcome),
            op if op.is_governance() => self.govern(ctx, sender, op),
            other => Err(ProtocolError::UnknownOp {
                op: other.op_name(),
                actor: "treasury",
            }),
        }
    }

    fn staker_op(&mut self, ctx: &mut TxContext<Op>, staker: Address, op: &Op) -> Result<()> {
        let (fee, request) = match op {
            Op::DepositCoins => return self.deposit_coins(ctx, staker),
            Op::StakeFirstCoins => {
                self.ensure_running()?;
                (
                    self.fees.stake_first_coins_fee,
                    WalletRequest::StakeFirstCoins,
                )
            }
            Op::UnstakeAllTokens => (
                self.fees.unstake_all_tokens_fee,
                WalletRequest::UnstakeTokens { tokens: None },
            ),
            Op::UnstakeTokens { tokens } => (
                self.fees.unstake_tokens_fee,
                WalletRequest::UnstakeTokens {
                    tokens: Some(*tokens),
                },
            ),
            Op::WithdrawTokens => (self.fees.withdraw_tokens_fee, WalletRequest::WithdrawTokens),
            other => {
                return Err(ProtocolError::UnknownOp {
                    op: other.op_name(),
                    actor: "treasury",
                })
            }
        };
        self.relay_request(ctx, staker, fee, request)
    }

    fn deposit_coins(&mut self, ctx: &mut TxContext<Op>, staker: Address) -> Result<()> {
        self.ensure_running()?;
        let round = self.deposit_round();
        let init = Self::wallet_init(ctx, staker).state_init()?;
        let save = Op::SaveCoins {
            owner: staker,
            round,
            coins: Coins::ZERO,
        };
        let fee = self
            .fees
            .deposit_coins_fee
            .max(Self::deposit_gas(ctx.gas(), &save, &init));
        let coins = ctx.value().saturating_sub(fee);
        if coins.is_zero() {
            return Err(ProtocolError::InsufficientValue {
                required: fee.saturating_add(Coins::ONE_NANO),
                attached: ctx.value(),
            });
        }

        self.totals.total_staking = self.totals.total_staking.checked_add(coins)?;
        ctx.retain(coins)?;

        ctx.send(
            Outbound::new(
                init.address(),
                Op::SaveCoins {
                    owner: staker,
                    round,
                    coins,
                },
            )
            .remaining()
            .with_state_init(init),
        )?;
        info!(staker = %staker.short(), %round, coins = %coins, "Deposit accepted");
        Ok(())
    }

    fn stake_coins(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        owner: Address,
        round: RoundId,
        coins: Coins,
        refund_to: Address,
    ) -> Result<()> {
        Self::ensure_wallet(ctx, sender, owner)?;
        self.ensure_running()?;
        let required = self.stake_coins_value(ctx.gas(), owner, round, refund_to);
        Self::ensure_value(ctx, required)?;
        self.ensure_unlocked(round)?;

        let rate = self.exchange_rate();
        if rate.is_insolvent() {
            error!(
                staker = %owner.short(),
                total_tokens = %self.totals.total_tokens,
                "Refusing to mint against an unbacked pool"
            );
            return Err(ProtocolError::Insolvent {
                total_tokens: self.totals.total_tokens,
            });
        }
        let tokens = rate.tokens_for(coins)?;
        self.totals.total_staking = self.totals.total_staking.checked_sub(coins)?;
        self.totals.total_coins = self.totals.total_coins.checked_add(coins)?;
        self.totals.total_tokens = self.totals.total_tokens.checked_add(tokens)?;

        ctx.send(
            Outbound::new(
                sender,
                Op::MintTokens {
                    round,
                    coins,
                    tokens,
                    refund_to,
                },
            )
            .remaining(),
        )?;
        info!(staker = %owner.short(), coins = %coins, tokens = %tokens, "Minted tokens");
        Ok(())
    }

    fn reserve_tokens(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        owner: Address,
        tokens: Tokens,
    ) -> Result<()> {
        Self::ensure_wallet(ctx, sender, owner)?;
        self.totals.total_unstaking = self.totals.total_unstaking.checked_add(tokens)?;
        debug!(staker = %owner.short(), tokens = %tokens, "Reserved tokens for withdrawal");
        refund_gas_excess(ctx, owner)?;
        Ok(())
    }

    fn burn_tokens(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        owner: Address,
        tokens: Tokens,
    ) -> Result<()> {
        Self::ensure_wallet(ctx, sender, owner)?;
        let coins = self.exchange_rate().coins_for(tokens)?;
        let available = self.liquid_backing(ctx.balance_before());
        if coins > available {
            return Err(ProtocolError::InsufficientLiquidity {
                required: coins,
                available,
            });
        }

        self.totals.total_coins = self.totals.total_coins.checked_sub(coins)?;
        self.totals.total_tokens = self.totals.total_tokens.checked_sub(tokens)?;
        self.totals.total_unstaking = self.totals.total_unstaking.saturating_sub(tokens);

        ctx.send(
            Outbound::new(owner, Op::WithdrawalNotification { tokens, coins })
                .exact(coins)
                .bounce(false),
        )?;
        refund_gas_excess(ctx, owner)?;
        info!(staker = %owner.short(), tokens = %tokens, coins = %coins, "Withdrawal paid");
        Ok(())
    }

    /// Undo the effect of a message that failed downstream
    fn on_bounce(&mut self, ctx: &mut TxContext<Op>, envelope: &Envelope<Op>) -> Result<()> {
        warn!(
            from = %envelope.src.short(),
            op = envelope.op_name(),
            value = %ctx.value(),
            "Message bounced back to treasury"
        );
        match &envelope.body {
            Op::SaveCoins { owner, coins, .. } => {
                self.totals.total_staking = self.totals.total_staking.saturating_sub(*coins);
                ctx.send(
                    Outbound::new(*owner, Op::DepositReturned { coins: *coins })
                        .exact(*coins)
                        .bounce(false),
                )?;
                refund_gas_excess(ctx, *owner)?;
            }
            Op::WalletRequest { owner, request } => {
                let payer = match request {
                    WalletRequest::StakeRound { refund_to, .. } => *refund_to,
                    _ => *owner,
                };
                refund_gas_excess(ctx, payer)?;
            }
            Op::MintTokens {
                round,
                coins,
                tokens,
                refund_to,
            } => {
                self.totals.total_coins = self.totals.total_coins.saturating_sub(*coins);
                self.totals.total_tokens = self.totals.total_tokens.saturating_sub(*tokens);
                self.totals.total_staking = self.totals.total_staking.checked_add(*coins)?;

                let release = Outbound::new(
                    envelope.src,
                    Op::MintReverted {
                        round: *round,
                        coins: *coins,
                        refund_to: *refund_to,
                    },
                )
                .remaining()
                .bounce(false);
                if ctx.available() > ctx.forward_fee(&release) {
                    ctx.send(release)?;
                } else {
                    error!(wallet = %envelope.src.short(), %round, coins = %coins, "Mint reversed but the wallet cannot be told");
                }
            }
            Op::ProvideLoan { stake } => self.loan_refused(envelope.src, *stake)?,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ActorBehavior<Op> for Treasury {
    async fn handle(
        &mut self,
        ctx: &mut TxContext<Op>,
        envelope: &Envelope<Op>,
    ) -> std::result::Result<(), ActorError> {
        self.process(ctx, envelope).map_err(ActorError::from)
    }

    fn kind(&self) -> &'static str {
        "treasury"
    }
}
