//! # Ledger Value Types
//!
//! Shared value and identifier types for the liquid staking ledger.
//!
//! ## Design Philosophy
//!
//! - **No Precision Loss**: Coin and token amounts are nano-unit integers
//! - **Type Safety**: `Coins` and `Tokens` are distinct; so are `Address` and `CodeId`
//! - **Checked Arithmetic**: Overflow and negative balances are errors, never wraps
//! - **Deterministic Addressing**: Contract addresses derive from code and initial data
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Address, CodeId, Coins, Tokens};
//!
//! let fee = Coins::from_decimal_str("0.05").unwrap();
//! let deposit = Coins::whole(10).checked_add(fee).unwrap();
//! assert_eq!(deposit.to_string(), "10.05");
//!
//! let wallet = Address::derive(&CodeId::named("wallet"), b"init");
//! println!("wallet at {}", wallet);
//! # let _ = Tokens::ZERO;
//! ```

pub mod common;

pub use common::errors::{IdentifierError, ValueError};
pub use common::fixed_point::{mul_div, Coins, Tokens, DECIMALS, NANO_PER_UNIT};
pub use common::identifiers::{Address, CodeId, RoundId};
