//! Error types for fixed-point amounts and identifier parsing

use thiserror::Error;

/// Errors that can occur during nano-unit arithmetic and parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Result exceeds the maximum representable amount
    #[error("Overflow: {lhs} {op} {rhs} exceeds maximum representable amount")]
    Overflow {
        lhs: u128,
        rhs: u128,
        op: &'static str,
    },

    /// Result would be negative
    #[error("Underflow: {lhs} - {rhs} is below zero")]
    Underflow { lhs: u128, rhs: u128 },

    /// Invalid decimal string format
    #[error("Invalid decimal string: '{input}' - expected non-negative numeric format")]
    InvalidDecimal { input: String },

    /// More fractional digits than nano precision allows
    #[error("Precision loss: '{input}' has more than 9 fractional digits")]
    PrecisionLoss { input: String },

    /// Division by zero while applying a rate
    #[error("Division by zero while applying a rate")]
    DivisionByZero,
}

/// Errors that can occur while parsing identifiers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid hex address '{input}': {reason}")]
    InvalidHex { input: String, reason: String },

    #[error("Address must be 32 bytes, got {len}")]
    InvalidLength { len: usize },
}
