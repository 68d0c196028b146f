//! Ledger fee model

use types::Coins;

/// Flat compute fee per transaction plus a size-dependent forwarding fee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    pub compute_fee: Coins,
    pub forward_fee_base: Coins,
    /// Nano-coins per encoded byte
    pub forward_fee_per_byte: u128,
}

impl GasSchedule {
    pub const fn new(compute_fee: Coins, forward_fee_base: Coins, forward_fee_per_byte: u128) -> Self {
        Self {
            compute_fee,
            forward_fee_base,
            forward_fee_per_byte,
        }
    }

    /// Schedule that charges nothing, for tests that only track value flow
    pub const fn free() -> Self {
        Self::new(Coins::ZERO, Coins::ZERO, 0)
    }

    pub fn forward_fee(&self, encoded_bytes: u64) -> Coins {
        let per_byte = Coins::from_nano(self.forward_fee_per_byte.saturating_mul(encoded_bytes as u128));
        self.forward_fee_base.saturating_add(per_byte)
    }
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self::new(Coins::from_nano(2_000_000), Coins::from_nano(500_000), 1_000)
    }
}
