//! # Liquid Staking Configuration
//!
//! Configuration management, protocol constants and tracing setup for the
//! liquid staking services.
//!
//! ## Features
//!
//! - **Protocol Constants**: fee denominators, round counter bounds, comment tags
//! - **Layered Configuration**: TOML base file, environment overlay, `STAKING_` variables
//! - **Tracing Setup**: one entry point for human or JSON log output
//!
//! ## Usage
//!
//! ```rust
//! use staking_config::{protocol, StakingConfig};
//!
//! let config = StakingConfig::default();
//! config.validate().unwrap();
//! assert_eq!(protocol::comments::DEPOSIT_COINS, "d");
//! ```

pub mod logging;
pub mod protocol;
pub mod staking_config;

// Re-export commonly used types
pub use logging::init_tracing;
pub use protocol::*;
pub use staking_config::{
    load_config, parse_address, FeeConfig, GovernanceConfig, LedgerConfig, LoggingConfig,
    RoundsConfig, StakingConfig,
};
