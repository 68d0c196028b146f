//! Round lifecycle
//!
//! A round lends pooled capital to validators through one Loan per
//! validator. The participation record tracks what was accepted, how much of
//! it came from `total_staking`, and which loans are still outstanding.
//!
//! ```text
//! OpenRound ──▶ Lending ──(held_until)──▶ CloseRound ──▶ Recovering
//!                  │                                         │
//!                  └──── LoanSettled × n ◀───────────────────┘
//!                              │ last loan
//!                              ▼
//!                     participation removed
//! ```

use super::Treasury;
use crate::error::{ProtocolError, Result};
use crate::fees::governance_share;
use crate::loan::LoanInit;
use crate::messages::{refund_gas_excess, LoanOutcome, LoanRequest, Op, WalletRequest};
use messaging_actors::{Outbound, StateInit, TxContext};
use serde::Serialize;
use staking_config::rounds::{IMBALANCE_MAX, IMBALANCE_STEP};
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use types::{Address, Coins, RoundId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParticipationState {
    Lending,
    /// Driver asked the outstanding loans to return their stake
    Recovering,
}

/// Capital lent to one validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoanEntry {
    pub validator: Address,
    pub stake: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participation {
    pub round: RoundId,
    pub state: ParticipationState,
    pub requested: Coins,
    pub accepted: Coins,
    /// Part of `accepted` taken from `total_staking`
    pub swept_staking: Coins,
    pub opened_at: u64,
    pub min_close_at: u64,
    pub held_until: u64,
    /// Outstanding loans by loan address
    pub loans: BTreeMap<Address, LoanEntry>,
}

impl Treasury {
    fn ensure_driver(&self, sender: Address) -> Result<()> {
        if sender != self.governance.driver {
            return Err(ProtocolError::Unauthorized {
                sender,
                role: "driver",
            });
        }
        Ok(())
    }

    /// Capital a new round may lend out of `balance`
    pub(crate) fn lendable_pool(&self, balance: Coins) -> Result<Coins> {
        let reserved = self
            .exchange_rate()
            .coins_for(self.totals.total_unstaking)?;
        let idle_backing = self.backing_in_treasury().saturating_sub(reserved);
        let pool = idle_backing.checked_add(self.totals.total_staking)?;
        Ok(pool.min(balance.saturating_sub(self.fees.treasury_storage)))
    }

    pub(crate) fn open_round(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        requests: &[LoanRequest],
    ) -> Result<()> {
        self.ensure_driver(sender)?;
        self.ensure_running()?;
        if requests.is_empty() {
            return Err(ProtocolError::NothingToLend);
        }
        Self::ensure_value(ctx, self.fees.loan_fees(requests.len())?)?;

        let now = ctx.now();
        if let Some((round, latest)) = self.latest_round() {
            if now < latest.min_close_at {
                return Err(ProtocolError::RoundTooEarly {
                    round: *round,
                    until: latest.min_close_at,
                });
            }
        }

        let overlapping = !self.participations.is_empty();
        let pool = self.lendable_pool(ctx.balance_before())?;
        let offered = if overlapping {
            pool.mul_div(self.rounds_imbalance as u128, IMBALANCE_MAX as u128)?
        } else {
            pool
        };

        let round = self.next_round;
        let elector = self.governance.elector;
        let mut remaining = offered;
        let mut requested = Coins::ZERO;
        let mut allocations: Vec<(Address, StateInit, Address, Coins)> =
            Vec::with_capacity(requests.len());
        for request in requests {
            requested = requested.checked_add(request.max_stake)?;
            let stake = request.max_stake.min(remaining);
            if stake.is_zero() {
                continue;
            }
            let init = LoanInit {
                treasury: ctx.address(),
                elector,
                round,
                validator: request.validator,
            }
            .state_init()?;
            let address = init.address();
            if allocations.iter().any(|(existing, ..)| *existing == address) {
                continue;
            }
            remaining = remaining.checked_sub(stake)?;
            allocations.push((address, init, request.validator, stake));
            debug!(validator = %request.validator.short(), stake = %stake, "Allocated loan");
        }
        let accepted = offered.saturating_sub(remaining);
        if accepted.is_zero() {
            return Err(ProtocolError::NothingToLend);
        }

        let swept = self.totals.total_staking.min(accepted);
        self.totals.total_staking = self.totals.total_staking.checked_sub(swept)?;
        self.totals.total_validators_stake =
            self.totals.total_validators_stake.checked_add(accepted)?;

        let loan_fee = self.fees.new_stake_fee;
        ctx.retain(self.fees.loan_fees(allocations.len())?)?;

        let mut loans = BTreeMap::new();
        for (address, init, validator, stake) in allocations {
            ctx.send(
                Outbound::new(address, Op::ProvideLoan { stake })
                    .exact(stake.checked_add(loan_fee)?)
                    .with_state_init(init),
            )?;
            loans.insert(address, LoanEntry { validator, stake });
        }

        if overlapping {
            self.rounds_imbalance = self.rounds_imbalance.saturating_sub(IMBALANCE_STEP);
        }
        self.participations.insert(
            round,
            Participation {
                round,
                state: ParticipationState::Lending,
                requested,
                accepted,
                swept_staking: swept,
                opened_at: now,
                min_close_at: now.saturating_add(self.timing.min_duration),
                held_until: now.saturating_add(self.timing.held_duration),
                loans,
            },
        );
        self.next_round = round.next();

        info!(
            %round,
            accepted = %accepted,
            swept = %swept,
            overlapping,
            imbalance = self.rounds_imbalance,
            "Round opened"
        );
        refund_gas_excess(ctx, sender)?;
        Ok(())
    }

    pub(crate) fn close_round(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        round: RoundId,
    ) -> Result<()> {
        self.ensure_driver(sender)?;

        let outstanding: Vec<Address> = match self.participations.get(&round) {
            None => {
                debug!(%round, "Close requested for unknown round");
                refund_gas_excess(ctx, sender)?;
                return Ok(());
            }
            Some(participation) => participation.loans.keys().copied().collect(),
        };
        if outstanding.is_empty() {
            self.complete_participation(round)?;
            refund_gas_excess(ctx, sender)?;
            return Ok(());
        }

        let loan_fee = self.fees.new_stake_fee;
        let required = self.fees.loan_fees(outstanding.len())?;
        if let Some(participation) = self.participations.get_mut(&round) {
            if ctx.now() < participation.held_until {
                return Err(ProtocolError::RoundTooEarly {
                    round,
                    until: participation.held_until,
                });
            }
            Self::ensure_value(ctx, required)?;
            participation.state = ParticipationState::Recovering;
        }

        ctx.retain(required)?;
        for loan in &outstanding {
            ctx.send(Outbound::new(*loan, Op::RecoverStake).exact(loan_fee))?;
        }
        info!(%round, loans = outstanding.len(), "Recovering round");
        refund_gas_excess(ctx, sender)?;
        Ok(())
    }

    /// Mint `owner`'s coins pledged for `round` once no active round locks
    /// them. The driver pays the gas and receives the refund.
    pub(crate) fn stake_pledge(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        owner: Address,
        round: RoundId,
    ) -> Result<()> {
        self.ensure_driver(sender)?;
        self.ensure_running()?;
        self.ensure_unlocked(round)?;
        self.relay_request(
            ctx,
            owner,
            self.fees.stake_first_coins_fee,
            WalletRequest::StakeRound {
                round,
                refund_to: sender,
            },
        )
    }

    pub(crate) fn loan_settled(
        &mut self,
        ctx: &mut TxContext<Op>,
        sender: Address,
        round: RoundId,
        validator: Address,
        stake: Coins,
        outcome: LoanOutcome,
    ) -> Result<()> {
        let expected = LoanInit {
            treasury: ctx.address(),
            elector: self.governance.elector,
            round,
            validator,
        }
        .address()?;
        if sender != expected {
            return Err(ProtocolError::Unauthorized {
                sender,
                role: "loan",
            });
        }

        let participation = self
            .participations
            .get_mut(&round)
            .ok_or(ProtocolError::UnknownLoan { address: sender })?;
        let entry = participation
            .loans
            .remove(&sender)
            .ok_or(ProtocolError::UnknownLoan { address: sender })?;
        if entry.stake != stake {
            debug!(loan = %sender.short(), reported = %stake, lent = %entry.stake, "Loan reported a different stake");
        }

        self.totals.total_validators_stake =
            self.totals.total_validators_stake.saturating_sub(entry.stake);

        match outcome {
            LoanOutcome::Profit(profit) => {
                let share = governance_share(profit, self.governance.governance_fee_bps)?;
                let credited = profit.checked_sub(share)?;
                self.totals.total_coins = self.totals.total_coins.checked_add(credited)?;
                if !share.is_zero() {
                    ctx.send(
                        Outbound::new(self.governance.governor, Op::TopUp)
                            .exact(share)
                            .bounce(false),
                    )?;
                }
                info!(%round, validator = %validator.short(), profit = %profit, governance = %share, "Loan settled with profit");
            }
            LoanOutcome::Loss(loss) => {
                if loss > self.totals.total_coins {
                    let excess = loss.saturating_sub(self.totals.total_coins);
                    error!(%round, loss = %loss, backing = %self.totals.total_coins, "Loss exceeds backing");
                    self.totals.total_coins = Coins::ZERO;
                    if let Some(participation) = self.participations.get_mut(&round) {
                        participation.swept_staking =
                            participation.swept_staking.saturating_sub(excess);
                    }
                } else {
                    self.totals.total_coins = self.totals.total_coins.checked_sub(loss)?;
                }
                info!(%round, validator = %validator.short(), loss = %loss, "Loan settled with loss");
            }
        }

        let finished = self
            .participations
            .get(&round)
            .map_or(false, |p| p.loans.is_empty());
        if finished {
            self.complete_participation(round)?;
        }
        Ok(())
    }

    /// A loan refused its funding; the capital is back in the Treasury
    pub(crate) fn loan_refused(&mut self, loan: Address, stake: Coins) -> Result<()> {
        let Some((round, participation)) = self
            .participations
            .iter_mut()
            .find(|(_, p)| p.loans.contains_key(&loan))
        else {
            return Ok(());
        };
        let round = *round;
        participation.loans.remove(&loan);
        participation.accepted = participation.accepted.saturating_sub(stake);
        let returned = participation.swept_staking.min(stake);
        participation.swept_staking = participation.swept_staking.saturating_sub(returned);
        let finished = participation.loans.is_empty();

        self.totals.total_validators_stake =
            self.totals.total_validators_stake.saturating_sub(stake);
        self.totals.total_staking = self.totals.total_staking.checked_add(returned)?;
        if finished {
            self.complete_participation(round)?;
        }
        Ok(())
    }

    fn complete_participation(&mut self, round: RoundId) -> Result<()> {
        let Some(participation) = self.participations.remove(&round) else {
            return Ok(());
        };
        self.totals.total_staking = self
            .totals
            .total_staking
            .checked_add(participation.swept_staking)?;
        if !self.participations.is_empty() {
            self.rounds_imbalance = self.rounds_imbalance.saturating_add(IMBALANCE_STEP);
        }
        // Pledges keyed up to this round become mintable through `StakePledge`
        info!(
            %round,
            accepted = %participation.accepted,
            returned_staking = %participation.swept_staking,
            "Round completed"
        );
        Ok(())
    }
}
