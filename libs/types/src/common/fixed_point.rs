//! Fixed-point nano-unit amounts for ledger accounting
//!
//! Both the native coin and the claim token are stored as `u128` counts of
//! nano units (10^-9 of a whole unit). All ledger arithmetic goes through the
//! checked helpers here so that an overflow or a negative balance surfaces as
//! a [`ValueError`] instead of wrapping.
//!
//! ## Design Principles
//!
//! - **No Precision Loss**: Amounts are integers, parsed exactly from decimal strings
//! - **Non-negative by construction**: `u128` storage, subtraction is checked
//! - **Type Safety**: `Coins` and `Tokens` cannot be mixed without an explicit rate
//! - **Floor rounding**: Rate conversions round down so the pool never over-issues

use crate::common::errors::ValueError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nano units per whole unit
pub const NANO_PER_UNIT: u128 = 1_000_000_000;

/// Fractional digits carried by every amount
pub const DECIMALS: u32 = 9;

/// Compute `value * numerator / denominator` rounding down.
///
/// Used for exchange-rate conversions and basis-point shares. The product is
/// checked so extremely large balances report [`ValueError::Overflow`].
pub fn mul_div(value: u128, numerator: u128, denominator: u128) -> Result<u128, ValueError> {
    if denominator == 0 {
        return Err(ValueError::DivisionByZero);
    }
    let product = value.checked_mul(numerator).ok_or(ValueError::Overflow {
        lhs: value,
        rhs: numerator,
        op: "*",
    })?;
    Ok(product / denominator)
}

macro_rules! define_nano_amount {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u128);

        impl $name {
            /// Zero amount
            pub const ZERO: Self = Self(0);

            /// Smallest representable amount
            pub const ONE_NANO: Self = Self(1);

            /// Largest representable amount
            pub const MAX: Self = Self(u128::MAX);

            /// Create from a raw nano-unit count
            #[inline]
            pub const fn from_nano(nano: u128) -> Self {
                Self(nano)
            }

            /// Create from whole units
            #[inline]
            pub const fn whole(units: u64) -> Self {
                Self(units as u128 * NANO_PER_UNIT)
            }

            /// Parse an exact decimal string such as `"10"` or `"0.05"`.
            ///
            /// This is the PRIMARY method for reading amounts from configuration.
            pub fn from_decimal_str(s: &str) -> Result<Self, ValueError> {
                let decimal = Decimal::from_str(s.trim()).map_err(|_| ValueError::InvalidDecimal {
                    input: s.to_string(),
                })?;
                if decimal.is_sign_negative() && !decimal.is_zero() {
                    return Err(ValueError::InvalidDecimal {
                        input: s.to_string(),
                    });
                }
                if decimal.normalize().scale() > DECIMALS {
                    return Err(ValueError::PrecisionLoss {
                        input: s.to_string(),
                    });
                }
                let scaled = decimal * Decimal::from(NANO_PER_UNIT as u64);
                scaled
                    .to_u128()
                    .map(Self)
                    .ok_or_else(|| ValueError::InvalidDecimal {
                        input: s.to_string(),
                    })
            }

            /// Raw nano-unit count
            #[inline]
            pub const fn nano(self) -> u128 {
                self.0
            }

            #[inline]
            pub const fn is_zero(self) -> bool {
                self.0 == 0
            }

            // CHECKED ARITHMETIC - overflow or negative results become errors

            pub fn checked_add(self, rhs: Self) -> Result<Self, ValueError> {
                self.0.checked_add(rhs.0).map(Self).ok_or(ValueError::Overflow {
                    lhs: self.0,
                    rhs: rhs.0,
                    op: "+",
                })
            }

            pub fn checked_sub(self, rhs: Self) -> Result<Self, ValueError> {
                self.0
                    .checked_sub(rhs.0)
                    .map(Self)
                    .ok_or(ValueError::Underflow { lhs: self.0, rhs: rhs.0 })
            }

            /// Multiply by an integer count (e.g. per-loan fee times loan count)
            pub fn checked_mul(self, count: u128) -> Result<Self, ValueError> {
                self.0.checked_mul(count).map(Self).ok_or(ValueError::Overflow {
                    lhs: self.0,
                    rhs: count,
                    op: "*",
                })
            }

            /// `self * numerator / denominator`, rounded down
            pub fn mul_div(self, numerator: u128, denominator: u128) -> Result<Self, ValueError> {
                mul_div(self.0, numerator, denominator).map(Self)
            }

            // SATURATING ARITHMETIC - for refunds and reporting where a floor of zero is wanted

            pub fn saturating_add(self, rhs: Self) -> Self {
                Self(self.0.saturating_add(rhs.0))
            }

            pub fn saturating_sub(self, rhs: Self) -> Self {
                Self(self.0.saturating_sub(rhs.0))
            }

            pub fn min(self, rhs: Self) -> Self {
                Self(self.0.min(rhs.0))
            }

            /// Convert to a decimal for display or interfacing with reports
            pub fn to_decimal(self) -> Option<Decimal> {
                let nano = i128::try_from(self.0).ok()?;
                Decimal::try_from_i128_with_scale(nano, DECIMALS).ok().map(|d| d.normalize())
            }
        }

        /// Decimal display, trailing zeros trimmed: `10`, `0.05`, `0.000000001`
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let units = self.0 / NANO_PER_UNIT;
                let frac = self.0 % NANO_PER_UNIT;
                if frac == 0 {
                    write!(f, "{}", units)
                } else {
                    let digits = format!("{:09}", frac);
                    write!(f, "{}.{}", units, digits.trim_end_matches('0'))
                }
            }
        }

        impl FromStr for $name {
            type Err = ValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_decimal_str(s)
            }
        }

        impl std::iter::Sum for $name {
            /// Saturates at `MAX`; callers summing ledger totals stay far below it
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, |acc, x| acc.saturating_add(x))
            }
        }
    };
}

define_nano_amount!(
    /// Native coin amount, in nano-coins.
    ///
    /// Examples:
    /// - 1 coin = `Coins::from_nano(1_000_000_000)`
    /// - 0.05 coin = `Coins::from_nano(50_000_000)`
    Coins
);

define_nano_amount!(
    /// Claim-token amount, in nano-tokens.
    Tokens
);

impl Coins {
    /// Reinterpret a coin amount as tokens at a 1:1 rate
    #[inline]
    pub const fn as_tokens_one_to_one(self) -> Tokens {
        Tokens(self.0)
    }
}

impl Tokens {
    /// Reinterpret a token amount as coins at a 1:1 rate
    #[inline]
    pub const fn as_coins_one_to_one(self) -> Coins {
        Coins(self.0)
    }
}
