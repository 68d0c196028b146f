//! Per-transaction execution context
//!
//! A handler never touches the ledger directly. It reads the inbound message
//! metadata from [`TxContext`] and buffers outbound messages through it; the
//! runtime applies the buffered effects only if the handler returns `Ok`.
//!
//! Value accounting inside one transaction:
//!
//! - `balance` starts at the pre-transaction balance plus the attached value,
//!   minus the compute fee
//! - `available` is the part of the attached value not yet consumed; it starts
//!   at attached minus compute fee
//! - [`TxContext::retain`] consumes `available` without sending (the actor keeps it)
//! - an `Exact` send is paid from `balance`; its forwarding fee is drawn from
//!   `available` first
//! - a `Remaining` send carries all of `available` minus its forwarding fee

use crate::error::TransportError;
use crate::gas::GasSchedule;
use crate::messages::{ActorMessage, Envelope, Outbound, Value};
use types::{Address, Coins};

pub struct TxContext<M> {
    address: Address,
    sender: Address,
    value: Coins,
    bounced: bool,
    now: u64,
    gas: GasSchedule,
    prior_balance: Coins,
    balance: Coins,
    available: Coins,
    fees: Coins,
    outbound: Vec<Envelope<M>>,
    destroy: bool,
}

/// Effects of a committed transaction
pub(crate) struct TxEffects<M> {
    pub balance: Coins,
    pub fees: Coins,
    pub outbound: Vec<Envelope<M>>,
    pub destroy: bool,
}

impl<M: ActorMessage> TxContext<M> {
    pub(crate) fn new(
        address: Address,
        inbound: &Envelope<M>,
        balance: Coins,
        now: u64,
        gas: GasSchedule,
    ) -> Self {
        Self {
            address,
            sender: inbound.src,
            value: inbound.value,
            bounced: inbound.bounced,
            now,
            gas,
            prior_balance: balance
                .saturating_add(gas.compute_fee.min(inbound.value))
                .saturating_sub(inbound.value),
            balance,
            available: inbound.value.saturating_sub(gas.compute_fee),
            fees: Coins::ZERO,
            outbound: Vec::new(),
            destroy: false,
        }
    }

    /// Address of the account running this transaction
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Value attached to the inbound message
    pub fn value(&self) -> Coins {
        self.value
    }

    pub fn is_bounced(&self) -> bool {
        self.bounced
    }

    /// Ledger time in seconds
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Current balance, after the compute fee and any sends so far
    pub fn balance(&self) -> Coins {
        self.balance
    }

    /// Balance the account held before this message arrived
    pub fn balance_before(&self) -> Coins {
        self.prior_balance
    }

    /// Unconsumed part of the inbound value
    pub fn available(&self) -> Coins {
        self.available
    }

    pub fn gas(&self) -> &GasSchedule {
        &self.gas
    }

    /// Forwarding fee `outbound` would be charged
    pub fn forward_fee(&self, outbound: &Outbound<M>) -> Coins {
        self.gas.forward_fee(outbound.encoded_size())
    }

    /// Keep `coins` of the inbound value in this account
    pub fn retain(&mut self, coins: Coins) -> Result<(), TransportError> {
        self.available = self
            .available
            .checked_sub(coins)
            .map_err(|_| TransportError::InsufficientValue {
                required: coins,
                available: self.available,
            })?;
        Ok(())
    }

    /// Price `outbound` and buffer it, returning the value it will carry
    pub fn send(&mut self, outbound: Outbound<M>) -> Result<Coins, TransportError> {
        let fee = self.forward_fee(&outbound);
        let value = match outbound.value {
            Value::Exact(coins) => coins,
            Value::Remaining => {
                self.available
                    .checked_sub(fee)
                    .map_err(|_| TransportError::InsufficientValue {
                        required: fee,
                        available: self.available,
                    })?
            }
            Value::AllBalance => {
                self.balance
                    .checked_sub(fee)
                    .map_err(|_| TransportError::InsufficientBalance {
                        required: fee,
                        available: self.balance,
                    })?
            }
        };

        let total = value.checked_add(fee).map_err(|_| TransportError::InsufficientBalance {
            required: Coins::MAX,
            available: self.balance,
        })?;
        self.balance = self
            .balance
            .checked_sub(total)
            .map_err(|_| TransportError::InsufficientBalance {
                required: total,
                available: self.balance,
            })?;

        self.available = match outbound.value {
            Value::Exact(_) => self.available.saturating_sub(fee),
            Value::Remaining | Value::AllBalance => Coins::ZERO,
        };
        self.fees = self.fees.saturating_add(fee);

        self.outbound.push(Envelope {
            src: self.address,
            dest: outbound.dest,
            value,
            bounce: outbound.bounce,
            bounced: false,
            body: outbound.body,
            state_init: outbound.state_init,
        });
        Ok(value)
    }

    /// Remove this account once the transaction commits
    pub fn destroy(&mut self) {
        self.destroy = true;
    }

    /// Messages buffered so far
    pub fn outbound(&self) -> &[Envelope<M>] {
        &self.outbound
    }

    pub(crate) fn into_effects(self) -> TxEffects<M> {
        TxEffects {
            balance: self.balance,
            fees: self.fees,
            outbound: self.outbound,
            destroy: self.destroy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note(u8);

    impl ActorMessage for Note {
        fn op_name(&self) -> &'static str {
            "note"
        }
    }

    fn context(attached: Coins, prior: Coins) -> TxContext<Note> {
        let gas = GasSchedule::new(Coins::from_nano(10), Coins::from_nano(3), 0);
        let inbound = Envelope {
            src: Address::external("sender"),
            dest: Address::external("me"),
            value: attached,
            bounce: true,
            bounced: false,
            body: Note(0),
            state_init: None,
        };
        let balance = prior.saturating_add(attached).saturating_sub(gas.compute_fee);
        TxContext::new(inbound.dest, &inbound, balance, 0, gas)
    }

    #[test]
    fn test_remaining_forwards_unconsumed_value() {
        let mut ctx = context(Coins::from_nano(1_000), Coins::from_nano(500));
        assert_eq!(ctx.available().nano(), 990);
        assert_eq!(ctx.balance_before().nano(), 500);

        ctx.retain(Coins::from_nano(400)).unwrap();
        let sent = ctx
            .send(Outbound::new(Address::external("next"), Note(1)).remaining())
            .unwrap();
        assert_eq!(sent.nano(), 587);
        // Prior balance plus the retained part survives
        assert_eq!(ctx.balance().nano(), 900);
        assert!(ctx.available().is_zero());
    }

    #[test]
    fn test_exact_fee_drawn_from_inbound_value_first() {
        let mut ctx = context(Coins::from_nano(100), Coins::from_nano(1_000));
        ctx.send(Outbound::new(Address::external("payee"), Note(2)).exact(Coins::from_nano(700)))
            .unwrap();
        assert_eq!(ctx.available().nano(), 87);
        ctx.send(Outbound::new(Address::external("refund"), Note(3)).remaining())
            .unwrap();
        assert_eq!(ctx.outbound()[1].value.nano(), 84);
        // Only the exact payment left the prior balance
        assert_eq!(ctx.balance().nano(), 300);
    }

    #[test]
    fn test_overspending_is_an_error() {
        let mut ctx = context(Coins::from_nano(20), Coins::ZERO);
        assert!(matches!(
            ctx.retain(Coins::from_nano(11)),
            Err(TransportError::InsufficientValue { .. })
        ));
        assert!(matches!(
            ctx.send(Outbound::new(Address::ZERO, Note(4)).exact(Coins::from_nano(50))),
            Err(TransportError::InsufficientBalance { .. })
        ));
        assert!(ctx.outbound().is_empty());
    }

    #[test]
    fn test_all_balance_empties_account() {
        let mut ctx = context(Coins::from_nano(100), Coins::from_nano(900));
        let sent = ctx
            .send(Outbound::new(Address::external("heir"), Note(5)).value(Value::AllBalance))
            .unwrap();
        ctx.destroy();
        assert_eq!(sent.nano(), 987);
        let effects = ctx.into_effects();
        assert!(effects.balance.is_zero());
        assert!(effects.destroy);
        assert_eq!(effects.fees.nano(), 3);
    }

    proptest::proptest! {
        #[test]
        fn prop_value_is_conserved(
            attached in 10u128..1_000_000,
            prior in 0u128..1_000_000,
            keep_ratio in 0u128..=100,
        ) {
            let mut ctx = context(Coins::from_nano(attached), Coins::from_nano(prior));
            let keep = Coins::from_nano((attached - 10) * keep_ratio / 100);
            ctx.retain(keep).unwrap();
            let sent = ctx
                .send(Outbound::new(Address::external("next"), Note(6)).remaining())
                .map(|value| value.nano())
                .unwrap_or(0);
            let effects = ctx.into_effects();
            proptest::prop_assert_eq!(
                effects.balance.nano() + sent + effects.fees.nano(),
                prior + attached - 10
            );
        }
    }
}
