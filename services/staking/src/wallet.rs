//! Per-staker Wallet actor
//!
//! A Wallet only ever talks to its Treasury. It tracks the staker's claim
//! tokens, the coins pledged per round that are waiting to be minted, and the
//! tokens reserved for withdrawal. Every chain it takes part in ends with a
//! `GasExcess` refund to whoever paid for it (the staker, or the driver for a
//! relayed stake), after topping its own balance up to the storage reserve.

use crate::error::{ProtocolError, Result};
use crate::messages::{refund_gas_excess, Op, WalletRequest};
use crate::WALLET_CODE;
use async_trait::async_trait;
use messaging_actors::{
    ActorBehavior, ActorError, ActorMessage, Envelope, Outbound, StateInit, TransportError,
    TxContext,
};
use serde::{Deserialize, Serialize};
use staking_config::TRANSFER_NOTIFICATION_NANO;
use std::collections::BTreeMap;
use tracing::debug;
use types::{Address, Coins, RoundId, Tokens};

/// Initial data of a Wallet; the address is derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInit {
    pub owner: Address,
    pub treasury: Address,
}

impl WalletInit {
    pub fn state_init(&self) -> std::result::Result<StateInit, TransportError> {
        StateInit::encode(*WALLET_CODE, self)
    }

    pub fn address(&self) -> std::result::Result<Address, TransportError> {
        Ok(self.state_init()?.address())
    }
}

/// Coins pledged for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingEntry {
    /// Not yet offered for minting
    pub pending: Coins,
    /// Sent to the Treasury in a `StakeCoins` that has not been confirmed
    pub minting: Coins,
}

impl StakingEntry {
    pub fn is_empty(&self) -> bool {
        self.pending.is_zero() && self.minting.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WalletPhase {
    Idle,
    StakingPending,
    HoldingTokens,
    UnstakingPending,
}

#[derive(Debug, Clone)]
pub struct Wallet {
    owner: Address,
    treasury: Address,
    storage: Coins,
    tokens: Tokens,
    staking: BTreeMap<RoundId, StakingEntry>,
    unstaking: Tokens,
}

impl Wallet {
    pub fn new(init: WalletInit, storage: Coins) -> Self {
        Self {
            owner: init.owner,
            treasury: init.treasury,
            storage,
            tokens: Tokens::ZERO,
            staking: BTreeMap::new(),
            unstaking: Tokens::ZERO,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn tokens(&self) -> Tokens {
        self.tokens
    }

    pub fn staking(&self) -> &BTreeMap<RoundId, StakingEntry> {
        &self.staking
    }

    pub fn unstaking(&self) -> Tokens {
        self.unstaking
    }

    /// Most advanced pending step of the staker's position
    pub fn phase(&self) -> WalletPhase {
        if !self.unstaking.is_zero() {
            WalletPhase::UnstakingPending
        } else if !self.staking.is_empty() {
            WalletPhase::StakingPending
        } else if !self.tokens.is_zero() {
            WalletPhase::HoldingTokens
        } else {
            WalletPhase::Idle
        }
    }

    fn process(&mut self, ctx: &mut TxContext<Op>, envelope: &Envelope<Op>) -> Result<()> {
        if envelope.src != self.treasury {
            return Err(ProtocolError::Unauthorized {
                sender: envelope.src,
                role: "treasury",
            });
        }
        if envelope.bounced {
            return self.on_bounce(ctx, &envelope.body);
        }

        match &envelope.body {
            Op::SaveCoins {
                owner,
                round,
                coins,
            } => {
                self.ensure_owner(*owner)?;
                let entry = self.staking.entry(*round).or_default();
                entry.pending = entry.pending.checked_add(*coins)?;
                debug!(owner = %self.owner.short(), %round, coins = %coins, "Saved coins");
                self.refund(ctx, self.owner)
            }
            Op::WalletRequest { owner, request } => {
                self.ensure_owner(*owner)?;
                match request {
                    WalletRequest::StakeFirstCoins => self.stake_coins(ctx, None, self.owner),
                    WalletRequest::StakeRound { round, refund_to } => {
                        self.stake_coins(ctx, Some(*round), *refund_to)
                    }
                    WalletRequest::UnstakeTokens { tokens } => self.unstake_tokens(ctx, *tokens),
                    WalletRequest::WithdrawTokens => self.withdraw_tokens(ctx),
                }
            }
            Op::MintTokens {
                round,
                coins,
                tokens,
                refund_to,
            } => self.receive_tokens(ctx, *round, *coins, *tokens, *refund_to),
            Op::MintReverted {
                round,
                coins,
                refund_to,
            } => {
                self.release_minting(*round, *coins)?;
                debug!(owner = %self.owner.short(), %round, coins = %coins, "Mint reverted");
                self.refund(ctx, *refund_to)
            }
            other => Err(ProtocolError::UnknownOp {
                op: other.op_name(),
                actor: "wallet",
            }),
        }
    }

    /// Offer the pending coins of `round`, or of the lowest round holding
    /// any, for minting
    fn stake_coins(
        &mut self,
        ctx: &mut TxContext<Op>,
        round: Option<RoundId>,
        refund_to: Address,
    ) -> Result<()> {
        let (round, entry) = match round {
            Some(round) => self.staking.get_mut(&round).map(|entry| (round, entry)),
            None => self
                .staking
                .iter_mut()
                .find(|(_, entry)| !entry.pending.is_zero())
                .map(|(round, entry)| (*round, entry)),
        }
        .filter(|(_, entry)| !entry.pending.is_zero())
        .ok_or(ProtocolError::NothingToStake)?;
        let coins = entry.pending;
        entry.minting = entry.minting.checked_add(coins)?;
        entry.pending = Coins::ZERO;

        ctx.send(
            Outbound::new(
                self.treasury,
                Op::StakeCoins {
                    owner: self.owner,
                    round,
                    coins,
                    refund_to,
                },
            )
            .remaining(),
        )?;
        Ok(())
    }

    fn unstake_tokens(&mut self, ctx: &mut TxContext<Op>, tokens: Option<Tokens>) -> Result<()> {
        let requested = tokens.unwrap_or(self.tokens);
        if requested.is_zero() || requested > self.tokens {
            return Err(ProtocolError::InsufficientTokens {
                requested,
                available: self.tokens,
            });
        }
        self.tokens = self.tokens.checked_sub(requested)?;
        self.unstaking = self.unstaking.checked_add(requested)?;

        ctx.send(
            Outbound::new(
                self.treasury,
                Op::ReserveTokens {
                    owner: self.owner,
                    tokens: requested,
                },
            )
            .remaining(),
        )?;
        Ok(())
    }

    fn withdraw_tokens(&mut self, ctx: &mut TxContext<Op>) -> Result<()> {
        if self.unstaking.is_zero() {
            debug!(owner = %self.owner.short(), "Nothing to withdraw");
            return self.refund(ctx, self.owner);
        }
        let tokens = std::mem::take(&mut self.unstaking);
        ctx.send(
            Outbound::new(
                self.treasury,
                Op::BurnTokens {
                    owner: self.owner,
                    tokens,
                },
            )
            .remaining(),
        )?;
        Ok(())
    }

    fn receive_tokens(
        &mut self,
        ctx: &mut TxContext<Op>,
        round: RoundId,
        coins: Coins,
        tokens: Tokens,
        refund_to: Address,
    ) -> Result<()> {
        self.tokens = self.tokens.checked_add(tokens)?;
        if let Some(entry) = self.staking.get_mut(&round) {
            entry.minting = entry.minting.saturating_sub(coins);
            if entry.is_empty() {
                self.staking.remove(&round);
            }
        }
        debug!(owner = %self.owner.short(), tokens = %tokens, "Tokens credited");

        // Best effort: the credit above stands even if the staker rejects this
        ctx.send(
            Outbound::new(self.owner, Op::TransferNotification { tokens })
                .exact(Coins::from_nano(TRANSFER_NOTIFICATION_NANO))
                .bounce(false),
        )?;
        self.refund(ctx, refund_to)
    }

    /// Move `coins` of `round` from minting back to pending
    fn release_minting(&mut self, round: RoundId, coins: Coins) -> Result<()> {
        let entry = self.staking.entry(round).or_default();
        entry.minting = entry.minting.saturating_sub(coins);
        entry.pending = entry.pending.checked_add(coins)?;
        Ok(())
    }

    fn on_bounce(&mut self, ctx: &mut TxContext<Op>, body: &Op) -> Result<()> {
        let mut payer = self.owner;
        match body {
            Op::StakeCoins {
                round,
                coins,
                refund_to,
                ..
            } => {
                self.release_minting(*round, *coins)?;
                payer = *refund_to;
            }
            Op::ReserveTokens { tokens, .. } => {
                self.unstaking = self.unstaking.saturating_sub(*tokens);
                self.tokens = self.tokens.checked_add(*tokens)?;
            }
            Op::BurnTokens { tokens, .. } => {
                self.unstaking = self.unstaking.checked_add(*tokens)?;
            }
            _ => {}
        }
        debug!(owner = %self.owner.short(), op = body.op_name(), "Restored after bounce");
        self.refund(ctx, payer)
    }

    fn ensure_owner(&self, owner: Address) -> Result<()> {
        if owner != self.owner {
            return Err(ProtocolError::OwnerMismatch {
                expected: self.owner,
                actual: owner,
            });
        }
        Ok(())
    }

    /// Keep the storage reserve, refund the rest to `to`
    fn refund(&self, ctx: &mut TxContext<Op>, to: Address) -> Result<()> {
        let top_up = self
            .storage
            .saturating_sub(ctx.balance_before())
            .min(ctx.available());
        ctx.retain(top_up)?;
        refund_gas_excess(ctx, to)?;
        Ok(())
    }
}

#[async_trait]
impl ActorBehavior<Op> for Wallet {
    async fn handle(
        &mut self,
        ctx: &mut TxContext<Op>,
        envelope: &Envelope<Op>,
    ) -> std::result::Result<(), ActorError> {
        self.process(ctx, envelope).map_err(ActorError::from)
    }

    fn kind(&self) -> &'static str {
        "wallet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(owner: &str) -> WalletInit {
        WalletInit {
            owner: Address::external(owner),
            treasury: Address::external("treasury"),
        }
    }

    #[test]
    fn test_address_depends_on_owner_and_treasury() {
        let alice = init("alice").address().unwrap();
        assert_eq!(alice, init("alice").address().unwrap());
        assert_ne!(alice, init("bob").address().unwrap());

        let elsewhere = WalletInit {
            treasury: Address::external("other-treasury"),
            ..init("alice")
        };
        assert_ne!(alice, elsewhere.address().unwrap());
    }

    #[test]
    fn test_state_init_round_trips_owner() {
        let state_init = init("alice").state_init().unwrap();
        assert_eq!(state_init.code, *WALLET_CODE);
        let decoded: WalletInit = state_init.decode().unwrap();
        assert_eq!(decoded, init("alice"));
    }

    #[test]
    fn test_release_moves_minting_back_to_pending() {
        let mut wallet = Wallet::new(init("alice"), Coins::from_nano(10_000_000));
        wallet.staking.insert(
            RoundId::new(2),
            StakingEntry {
                pending: Coins::whole(1),
                minting: Coins::whole(10),
            },
        );

        wallet.release_minting(RoundId::new(2), Coins::whole(10)).unwrap();
        let entry = wallet.staking()[&RoundId::new(2)];
        assert_eq!(entry.pending, Coins::whole(11));
        assert_eq!(entry.minting, Coins::ZERO);
    }

    #[test]
    fn test_phase_reports_latest_pending_step() {
        let mut wallet = Wallet::new(init("alice"), Coins::from_nano(10_000_000));
        assert_eq!(wallet.phase(), WalletPhase::Idle);

        wallet.staking.insert(
            RoundId::FIRST,
            StakingEntry {
                pending: Coins::whole(1),
                minting: Coins::ZERO,
            },
        );
        assert_eq!(wallet.phase(), WalletPhase::StakingPending);

        wallet.staking.clear();
        wallet.tokens = Tokens::whole(5);
        assert_eq!(wallet.phase(), WalletPhase::HoldingTokens);

        wallet.unstaking = Tokens::whole(1);
        assert_eq!(wallet.phase(), WalletPhase::UnstakingPending);
    }
}
