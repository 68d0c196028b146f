//! Fee schedule and exchange-rate arithmetic
//!
//! All conversions round down. Minting fewer tokens and paying out fewer
//! coins than the exact rate keeps `total_coins / total_tokens` from ever
//! decreasing through a mint or a burn.

use messaging_actors::{ActorMessage, GasSchedule};
use serde::{Deserialize, Serialize};
use staking_config::{FeeConfig, BPS_DENOMINATOR};
use types::{mul_div, Coins, Tokens, ValueError};

/// Named fee constants charged by the Treasury
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub deposit_coins_fee: Coins,
    pub stake_first_coins_fee: Coins,
    pub stake_coins_fee: Coins,
    pub unstake_all_tokens_fee: Coins,
    pub unstake_tokens_fee: Coins,
    pub withdraw_tokens_fee: Coins,
    /// Attached to every loan on top of its stake
    pub new_stake_fee: Coins,
    pub wallet_storage: Coins,
    pub treasury_storage: Coins,
}

impl FeeSchedule {
    /// Value a driver attaches to open or recover `loans` loans
    pub fn loan_fees(&self, loans: usize) -> Result<Coins, ValueError> {
        self.new_stake_fee.checked_mul(loans as u128)
    }
}

impl From<&FeeConfig> for FeeSchedule {
    fn from(config: &FeeConfig) -> Self {
        Self {
            deposit_coins_fee: config.deposit_coins_fee,
            stake_first_coins_fee: config.stake_first_coins_fee,
            stake_coins_fee: config.stake_coins_fee,
            unstake_all_tokens_fee: config.unstake_all_tokens_fee,
            unstake_tokens_fee: config.unstake_tokens_fee,
            withdraw_tokens_fee: config.withdraw_tokens_fee,
            new_stake_fee: config.new_stake_fee,
            wallet_storage: config.wallet_storage,
            treasury_storage: config.treasury_storage,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::from(&FeeConfig::default())
    }
}

/// Coins backing the outstanding claim tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExchangeRate {
    pub total_coins: Coins,
    pub total_tokens: Tokens,
}

impl ExchangeRate {
    pub fn new(total_coins: Coins, total_tokens: Tokens) -> Self {
        Self {
            total_coins,
            total_tokens,
        }
    }

    /// Tokens still exist but nothing backs them
    pub fn is_insolvent(&self) -> bool {
        self.total_coins.is_zero() && !self.total_tokens.is_zero()
    }

    /// Tokens minted for `coins`; 1:1 while no tokens exist.
    ///
    /// Fails with `DivisionByZero` when the rate is insolvent.
    pub fn tokens_for(&self, coins: Coins) -> Result<Tokens, ValueError> {
        if self.total_tokens.is_zero() {
            return Ok(coins.as_tokens_one_to_one());
        }
        mul_div(coins.nano(), self.total_tokens.nano(), self.total_coins.nano())
            .map(Tokens::from_nano)
    }

    /// Coins paid out for burning `tokens`; 1:1 while no tokens exist
    pub fn coins_for(&self, tokens: Tokens) -> Result<Coins, ValueError> {
        if self.total_tokens.is_zero() {
            return Ok(tokens.as_coins_one_to_one());
        }
        mul_div(tokens.nano(), self.total_coins.nano(), self.total_tokens.nano())
            .map(Coins::from_nano)
    }
}

/// Gas one message costs: the sender's forwarding fee for `body` plus the
/// receiver's compute fee
pub fn hop_gas<M: ActorMessage>(gas: &GasSchedule, body: &M) -> Coins {
    gas.compute_fee
        .saturating_add(gas.forward_fee(body.encoded_size()))
}

/// Part of `profit` owed to the governor
pub fn governance_share(profit: Coins, fee_bps: u16) -> Result<Coins, ValueError> {
    profit.mul_div(fee_bps as u128, BPS_DENOMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_to_one_until_tokens_exist() {
        let rate = ExchangeRate::new(Coins::ZERO, Tokens::ZERO);
        assert_eq!(rate.tokens_for(Coins::whole(10)).unwrap(), Tokens::whole(10));
        assert_eq!(rate.coins_for(Tokens::whole(3)).unwrap(), Coins::whole(3));
    }

    #[test]
    fn test_insolvent_rate_refuses_to_mint() {
        let rate = ExchangeRate::new(Coins::ZERO, Tokens::whole(5));
        assert!(rate.is_insolvent());
        assert_eq!(
            rate.tokens_for(Coins::whole(10)),
            Err(ValueError::DivisionByZero)
        );
        assert_eq!(rate.coins_for(Tokens::whole(5)).unwrap(), Coins::ZERO);
        assert!(!ExchangeRate::new(Coins::ZERO, Tokens::ZERO).is_insolvent());
    }

    #[test]
    fn test_hop_gas_counts_size_and_compute() {
        let gas = GasSchedule::default();
        let body = crate::messages::Op::GasExcess;
        assert_eq!(
            hop_gas(&gas, &body),
            gas.compute_fee
                .saturating_add(gas.forward_fee(body.encoded_size()))
        );
        assert_eq!(hop_gas(&GasSchedule::free(), &body), Coins::ZERO);
    }

    #[test]
    fn test_rate_after_profit() {
        let rate = ExchangeRate::new(
            Coins::from_decimal_str("11.8").unwrap(),
            Tokens::whole(10),
        );
        assert_eq!(
            rate.tokens_for(Coins::whole(10)).unwrap(),
            Tokens::from_nano(8_474_576_271)
        );
        assert_eq!(
            rate.coins_for(Tokens::whole(5)).unwrap(),
            Coins::from_decimal_str("5.9").unwrap()
        );
    }

    #[test]
    fn test_governance_share_floors() {
        let share = governance_share(Coins::whole(2), 1_000).unwrap();
        assert_eq!(share, Coins::from_decimal_str("0.2").unwrap());
        assert_eq!(governance_share(Coins::from_nano(9), 1_000).unwrap(), Coins::ZERO);
        assert_eq!(governance_share(Coins::whole(2), 10_000).unwrap(), Coins::whole(2));
    }

    #[test]
    fn test_default_schedule_matches_config() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.deposit_coins_fee, Coins::from_decimal_str("0.05").unwrap());
        assert_eq!(
            fees.loan_fees(3).unwrap(),
            Coins::from_decimal_str("0.3").unwrap()
        );
    }

    proptest! {
        #[test]
        fn prop_mint_never_lowers_rate(
            coins in 1_000_000_000u128..1_000_000_000_000_000,
            tokens in 1_000_000_000u128..1_000_000_000_000_000,
            deposit in 0u128..1_000_000_000_000_000,
        ) {
            let rate = ExchangeRate::new(Coins::from_nano(coins), Tokens::from_nano(tokens));
            let minted = rate.tokens_for(Coins::from_nano(deposit)).unwrap().nano();
            // (coins + deposit) / (tokens + minted) >= coins / tokens
            prop_assert!((coins + deposit) * tokens >= coins * (tokens + minted));
        }

        #[test]
        fn prop_burn_never_lowers_rate(
            coins in 1_000_000_000u128..1_000_000_000_000_000,
            tokens in 1_000_000_000u128..1_000_000_000_000_000,
            burn_ratio in 0u128..100,
        ) {
            let burned = tokens * burn_ratio / 100;
            let rate = ExchangeRate::new(Coins::from_nano(coins), Tokens::from_nano(tokens));
            let paid = rate.coins_for(Tokens::from_nano(burned)).unwrap().nano();
            prop_assert!(paid <= coins);
            // (coins - paid) / (tokens - burned) >= coins / tokens
            prop_assert!((coins - paid) * tokens >= coins * (tokens - burned));
        }
    }
}
