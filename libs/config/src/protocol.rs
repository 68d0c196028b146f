//! Liquid staking protocol constants
//!
//! Values shared by the Treasury, Wallet and Loan actors that are fixed by the
//! protocol rather than tuned per deployment.

/// Basis-point denominator for fee shares
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Largest governance fee the Treasury accepts (100%)
pub const MAX_GOVERNANCE_FEE_BPS: u16 = 10_000;

/// Round inclusion counter bounds
pub mod rounds {
    /// Starting value of the imbalance counter
    pub const IMBALANCE_NEUTRAL: u8 = 128;

    /// Denominator applied to the counter when sizing an overlapping round
    pub const IMBALANCE_MAX: u8 = u8::MAX;

    /// Amount the counter moves per overlapping open or completed round
    pub const IMBALANCE_STEP: u8 = 16;
}

/// Short comment bodies accepted by the Treasury as operation shorthands
pub mod comments {
    pub const DEPOSIT_COINS: &str = "d";
    pub const STAKE_FIRST_COINS: &str = "m";
    pub const UNSTAKE_ALL_TOKENS: &str = "w";
    pub const WITHDRAW_TOKENS: &str = "b";
}

/// Code body names; code identities are derived from these
pub mod codes {
    pub const TREASURY: &str = "liquid-staking/treasury";
    pub const WALLET: &str = "liquid-staking/wallet";
    pub const LOAN: &str = "liquid-staking/loan";
}

/// Value attached to the best-effort transfer notification, in nano-coins
pub const TRANSFER_NOTIFICATION_NANO: u128 = 1;
