//! # Ledger Identifiers
//!
//! Addresses and code identities are 32-byte SHA3-256 digests. Contract
//! addresses are derived from `(code, initial data)`, so any actor can locate
//! a child contract (a staker's wallet, a round's loan) without a registry
//! lookup:
//!
//! ```rust
//! use types::{Address, CodeId};
//!
//! let wallet_code = CodeId::named("wallet");
//! let a = Address::derive(&wallet_code, b"owner-and-treasury");
//! let b = Address::derive(&wallet_code, b"owner-and-treasury");
//! assert_eq!(a, b);
//! ```

use crate::common::errors::IdentifierError;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;

/// Define a strongly typed 32-byte digest wrapper with hex display and parsing
macro_rules! define_digest_id {
    (
        $(#[$meta:meta])*
        $name:ident, $display_prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// All-zero value
            pub const ZERO: Self = Self([0u8; 32]);

            #[inline(always)]
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            #[inline(always)]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First four bytes as hex, for compact log fields
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }

            /// Parse from 64 hex characters, with or without `0x`
            pub fn from_hex(input: &str) -> Result<Self, IdentifierError> {
                let clean = input.trim().trim_start_matches("0x");
                let bytes = hex::decode(clean).map_err(|e| IdentifierError::InvalidHex {
                    input: input.to_string(),
                    reason: e.to_string(),
                })?;
                let array: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| IdentifierError::InvalidLength { len: bytes.len() })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", $display_prefix, self.short())
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

define_digest_id!(
    /// Identity of a code body shared by every instance deployed from it
    CodeId, "Code"
);

define_digest_id!(
    /// Account address on the ledger
    Address, "Addr"
);

impl CodeId {
    /// Deterministic code identity for a named code body
    pub fn named(name: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(b"code:");
        hasher.update(name.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl Address {
    /// Derive a contract address from its code identity and encoded initial data
    pub fn derive(code: &CodeId, init_data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(code.as_bytes());
        hasher.update((init_data.len() as u64).to_le_bytes());
        hasher.update(init_data);
        Self(hasher.finalize().into())
    }

    /// Address of an externally controlled account (staker, driver, ...)
    pub fn external(name: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(b"external:");
        hasher.update(name.as_bytes());
        Self(hasher.finalize().into())
    }
}

/// Staking round identifier, increasing from zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(pub u32);

impl RoundId {
    pub const FIRST: Self = Self(0);

    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn inner(self) -> u32 {
        self.0
    }

    /// Following round id, saturating at `u32::MAX`
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let code = CodeId::named("wallet");
        assert_eq!(Address::derive(&code, b"abc"), Address::derive(&code, b"abc"));
        assert_ne!(Address::derive(&code, b"abc"), Address::derive(&code, b"abd"));
        assert_ne!(
            Address::derive(&CodeId::named("loan"), b"abc"),
            Address::derive(&code, b"abc")
        );
    }

    #[test]
    fn test_external_and_contract_spaces_differ() {
        assert_ne!(Address::external("alice"), Address::external("bob"));
        assert_ne!(
            Address::external("alice"),
            Address::derive(&CodeId::named("alice"), &[])
        );
    }

    #[test]
    fn test_hex_round_trip_and_errors() {
        let addr = Address::external("driver");
        let parsed: Address = format!("0x{}", addr).parse().unwrap();
        assert_eq!(parsed, addr);

        assert!(matches!(
            Address::from_hex("zz"),
            Err(IdentifierError::InvalidHex { .. })
        ));
        assert!(matches!(
            Address::from_hex("abcd"),
            Err(IdentifierError::InvalidLength { len: 2 })
        ));
    }

    #[test]
    fn test_debug_is_compact() {
        let addr = Address::new([0xab; 32]);
        assert_eq!(format!("{:?}", addr), "Addr(abababab..)");
    }

    #[test]
    fn test_round_id_ordering() {
        assert!(RoundId::FIRST < RoundId::FIRST.next());
        assert_eq!(RoundId::new(u32::MAX).next(), RoundId::new(u32::MAX));
        assert_eq!(RoundId::new(3).to_string(), "round-3");
    }
}
