//! Staking Configuration Module
//!
//! Provides configuration loading for the liquid staking ledger. Supports
//! loading from TOML files with environment-specific overrides and `STAKING_`
//! environment variables. Coin amounts are written as decimal strings
//! (`"0.05"`) and addresses as hex or `external:<name>`.

use crate::protocol::MAX_GOVERNANCE_FEE_BPS;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{Address, Coins};

/// Main staking configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StakingConfig {
    pub logging: LoggingConfig,
    pub ledger: LedgerConfig,
    pub fees: FeeConfig,
    pub governance: GovernanceConfig,
    pub rounds: RoundsConfig,
}

/// Tracing output settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
}

/// Simulated ledger fee model
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Flat compute fee charged per transaction
    #[serde(with = "decimal_coins")]
    pub compute_fee: Coins,
    /// Fixed part of the forwarding fee for every outbound message
    #[serde(with = "decimal_coins")]
    pub forward_fee_base: Coins,
    /// Nano-coins per encoded message byte
    pub forward_fee_per_byte: u64,
    /// Upper bound for waiting on quiescence
    pub settle_timeout_ms: u64,
}

/// Fee schedule published by the Treasury
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeeConfig {
    #[serde(with = "decimal_coins")]
    pub deposit_coins_fee: Coins,
    #[serde(with = "decimal_coins")]
    pub stake_first_coins_fee: Coins,
    #[serde(with = "decimal_coins")]
    pub stake_coins_fee: Coins,
    #[serde(with = "decimal_coins")]
    pub unstake_all_tokens_fee: Coins,
    #[serde(with = "decimal_coins")]
    pub unstake_tokens_fee: Coins,
    #[serde(with = "decimal_coins")]
    pub withdraw_tokens_fee: Coins,
    /// Per-loan fee the driver attaches when opening a round
    #[serde(with = "decimal_coins")]
    pub new_stake_fee: Coins,
    /// Minimum balance a Wallet keeps before refunding
    #[serde(with = "decimal_coins")]
    pub wallet_storage: Coins,
    /// Balance the Treasury never lends out
    #[serde(with = "decimal_coins")]
    pub treasury_storage: Coins,
}

/// Authority addresses and the governance fee
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GovernanceConfig {
    pub driver: String,
    pub halter: String,
    pub governor: String,
    /// Account reporting round outcomes to Loans
    pub elector: String,
    pub governance_fee_bps: u16,
}

/// Round timing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RoundsConfig {
    /// Before this many seconds, a newer round cannot be opened
    pub min_duration_secs: u64,
    /// After this many seconds, the driver may force loans to settle
    pub held_duration_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            compute_fee: Coins::from_nano(2_000_000),
            forward_fee_base: Coins::from_nano(500_000),
            forward_fee_per_byte: 1_000,
            settle_timeout_ms: 5_000,
        }
    }
}

impl LedgerConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            deposit_coins_fee: Coins::from_nano(50_000_000),
            stake_first_coins_fee: Coins::from_nano(50_000_000),
            stake_coins_fee: Coins::from_nano(30_000_000),
            unstake_all_tokens_fee: Coins::from_nano(50_000_000),
            unstake_tokens_fee: Coins::from_nano(50_000_000),
            withdraw_tokens_fee: Coins::from_nano(50_000_000),
            new_stake_fee: Coins::from_nano(100_000_000),
            wallet_storage: Coins::from_nano(10_000_000),
            treasury_storage: Coins::from_nano(10_000_000),
        }
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            driver: "external:driver".to_string(),
            halter: "external:halter".to_string(),
            governor: "external:governor".to_string(),
            elector: "external:elector".to_string(),
            governance_fee_bps: 1_000,
        }
    }
}

impl GovernanceConfig {
    pub fn driver_address(&self) -> Result<Address> {
        parse_address(&self.driver).context("Invalid governance.driver")
    }

    pub fn halter_address(&self) -> Result<Address> {
        parse_address(&self.halter).context("Invalid governance.halter")
    }

    pub fn governor_address(&self) -> Result<Address> {
        parse_address(&self.governor).context("Invalid governance.governor")
    }

    pub fn elector_address(&self) -> Result<Address> {
        parse_address(&self.elector).context("Invalid governance.elector")
    }
}

impl Default for RoundsConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 3_600,
            held_duration_secs: 7_200,
        }
    }
}

/// Parse an address written as 64 hex characters or `external:<name>`
pub fn parse_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    if let Some(name) = trimmed.strip_prefix("external:") {
        if name.is_empty() {
            bail!("external address needs a name: {:?}", raw);
        }
        return Ok(Address::external(name));
    }
    Address::from_hex(trimmed).with_context(|| format!("Failed to parse address {:?}", raw))
}

impl StakingConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/staking.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("config"))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (STAKING_SECTION__FIELD)
        builder = builder.add_source(
            Environment::with_prefix("STAKING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut staking: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        staking.expand_env_vars()?;
        staking.validate()?;
        debug!(path = ?base, "Loaded staking configuration");
        Ok(staking)
    }

    /// Expand `${VAR}` references in address strings
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let governance = &mut self.governance;
        for (field, value) in [
            ("driver", &mut governance.driver),
            ("halter", &mut governance.halter),
            ("governor", &mut governance.governor),
            ("elector", &mut governance.elector),
        ] {
            let expanded = shellexpand::env(value.as_str())
                .with_context(|| format!("Failed to expand governance.{}", field))?;
            *value = expanded.to_string();
        }
        Ok(())
    }

    /// Reject configurations the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.governance.governance_fee_bps > MAX_GOVERNANCE_FEE_BPS {
            bail!(
                "governance.governance_fee_bps {} exceeds maximum {}",
                self.governance.governance_fee_bps,
                MAX_GOVERNANCE_FEE_BPS
            );
        }
        if self.rounds.min_duration_secs == 0 || self.rounds.held_duration_secs == 0 {
            bail!("rounds durations must be non-zero");
        }
        if self.rounds.held_duration_secs < self.rounds.min_duration_secs {
            bail!(
                "rounds.held_duration_secs {} is shorter than min_duration_secs {}",
                self.rounds.held_duration_secs,
                self.rounds.min_duration_secs
            );
        }
        if self.ledger.settle_timeout_ms == 0 {
            bail!("ledger.settle_timeout_ms must be non-zero");
        }

        let compute = self.ledger.compute_fee;
        for (name, fee) in [
            ("deposit_coins_fee", self.fees.deposit_coins_fee),
            ("stake_first_coins_fee", self.fees.stake_first_coins_fee),
            ("stake_coins_fee", self.fees.stake_coins_fee),
            ("unstake_all_tokens_fee", self.fees.unstake_all_tokens_fee),
            ("unstake_tokens_fee", self.fees.unstake_tokens_fee),
            ("withdraw_tokens_fee", self.fees.withdraw_tokens_fee),
            ("new_stake_fee", self.fees.new_stake_fee),
        ] {
            if fee <= compute {
                bail!("fees.{} ({}) must exceed ledger.compute_fee ({})", name, fee, compute);
            }
        }

        // A stake runs four transactions after the relay: mint, a bounced
        // mint, the reversal and the Wallet's release
        let hop = compute.saturating_add(self.ledger.forward_fee_base);
        let mint_chain = Coins::from_nano(hop.nano().saturating_mul(4));
        if self.fees.stake_coins_fee < mint_chain {
            bail!(
                "fees.stake_coins_fee ({}) cannot carry a mint chain of {}",
                self.fees.stake_coins_fee,
                mint_chain
            );
        }
        // The relay through the Wallet is paid before `StakeCoins` is sent
        let relay = Coins::from_nano(hop.nano().saturating_mul(2));
        let stake_chain = self.fees.stake_coins_fee.saturating_add(relay);
        if self.fees.stake_first_coins_fee < stake_chain {
            bail!(
                "fees.stake_first_coins_fee ({}) must cover stake_coins_fee plus the relay ({})",
                self.fees.stake_first_coins_fee,
                stake_chain
            );
        }

        self.governance.driver_address()?;
        self.governance.halter_address()?;
        self.governance.governor_address()?;
        self.governance.elector_address()?;
        Ok(())
    }

    /// Render as TOML, amounts as decimal strings
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Convenience function to load configuration from the default location
pub fn load_config(environment: Option<&str>) -> Result<StakingConfig> {
    StakingConfig::load(None, environment)
}

/// Decimal-string serde for coin amounts.
///
/// Environment overrides arrive as numbers after `try_parsing`, so numeric
/// input is accepted too.
mod decimal_coins {
    use serde::{Deserialize, Deserializer, Serializer};
    use types::Coins;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Text(String),
        Integer(u64),
        Float(f64),
    }

    pub fn serialize<S: Serializer>(value: &Coins, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Coins, D::Error> {
        let text = match RawAmount::deserialize(deserializer)? {
            RawAmount::Text(text) => text,
            RawAmount::Integer(units) => units.to_string(),
            RawAmount::Float(units) => units.to_string(),
        };
        Coins::from_decimal_str(&text).map_err(serde::de::Error::custom)
    }
}
