//! Protocol bootstrap
//!
//! Builds a ledger from [`StakingConfig`], registers the Treasury, Wallet and
//! Loan code bodies, opens the authority accounts and deploys the Treasury.

use crate::account::ExternalAccount;
use crate::fees::FeeSchedule;
use crate::loan::{Loan, LoanInit};
use crate::messages::Op;
use crate::treasury::{RoundTiming, Treasury, TreasuryInit};
use crate::wallet::{Wallet, WalletInit};
use crate::{LOAN_CODE, TREASURY_CODE, WALLET_CODE};
use anyhow::{Context, Result};
use messaging_actors::{
    ActorBehavior, ActorSystem, GasSchedule, LedgerClock, Outbound, StateInit, TransportError,
};
use staking_config::StakingConfig;
use std::sync::Arc;
use tracing::info;
use types::{Address, Coins, RoundId};

/// Opening balances
#[derive(Debug, Clone, Copy)]
pub struct Genesis {
    pub treasury: Coins,
    /// Given to each authority account (driver, halter, governor, elector)
    pub authorities: Coins,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            treasury: Coins::whole(10),
            authorities: Coins::whole(1_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorities {
    pub driver: Address,
    pub halter: Address,
    pub governor: Address,
    pub elector: Address,
}

impl Authorities {
    pub fn from_config(config: &StakingConfig) -> Result<Self> {
        let governance = &config.governance;
        Ok(Self {
            driver: governance.driver_address()?,
            halter: governance.halter_address()?,
            governor: governance.governor_address()?,
            elector: governance.elector_address()?,
        })
    }

    fn named(&self) -> [(&'static str, Address); 4] {
        [
            ("driver", self.driver),
            ("halter", self.halter),
            ("governor", self.governor),
            ("elector", self.elector),
        ]
    }
}

/// Handle to a deployed protocol instance
#[derive(Clone)]
pub struct Protocol {
    system: ActorSystem<Op>,
    treasury: Address,
    fees: FeeSchedule,
    authorities: Authorities,
}

impl Protocol {
    pub async fn bootstrap(config: &StakingConfig, genesis: Genesis) -> Result<Self> {
        config.validate().context("Invalid staking configuration")?;

        let ledger = &config.ledger;
        let gas = GasSchedule::new(
            ledger.compute_fee,
            ledger.forward_fee_base,
            ledger.forward_fee_per_byte as u128,
        );
        let system = ActorSystem::new("liquid-staking", gas)
            .with_settle_timeout(ledger.settle_timeout());
        let fees = FeeSchedule::from(&config.fees);
        register_codes(&system, &fees);

        let authorities = Authorities::from_config(config)?;
        for (name, address) in authorities.named() {
            if system.contains(&address) {
                continue;
            }
            system
                .spawn(address, ExternalAccount::new(name), genesis.authorities)
                .await
                .with_context(|| format!("Failed to open the {} account", name))?;
        }

        let init = TreasuryInit {
            driver: authorities.driver,
            halter: authorities.halter,
            governor: authorities.governor,
            elector: authorities.elector,
            governance_fee_bps: config.governance.governance_fee_bps,
            fees,
            timing: RoundTiming {
                min_duration: config.rounds.min_duration_secs,
                held_duration: config.rounds.held_duration_secs,
            },
        };
        let treasury = system
            .deploy(StateInit::encode(*TREASURY_CODE, &init)?, genesis.treasury)
            .await
            .context("Failed to deploy the treasury")?;

        info!(
            treasury = %treasury,
            system_id = system.system_id(),
            balance = %genesis.treasury,
            "Liquid staking protocol deployed"
        );
        Ok(Self {
            system,
            treasury,
            fees,
            authorities,
        })
    }

    pub fn system(&self) -> &ActorSystem<Op> {
        &self.system
    }

    pub fn clock(&self) -> &LedgerClock {
        self.system.clock()
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    /// Open an external account for a staker called `name`
    pub async fn open_account(
        &self,
        name: &str,
        balance: Coins,
    ) -> std::result::Result<Address, TransportError> {
        self.system
            .spawn(Address::external(name), ExternalAccount::new(name), balance)
            .await
    }

    /// Address of the Wallet deployed for `owner`
    pub fn wallet_address(&self, owner: Address) -> std::result::Result<Address, TransportError> {
        WalletInit {
            owner,
            treasury: self.treasury,
        }
        .address()
    }

    pub fn loan_address(
        &self,
        round: RoundId,
        validator: Address,
    ) -> std::result::Result<Address, TransportError> {
        LoanInit {
            treasury: self.treasury,
            elector: self.authorities.elector,
            round,
            validator,
        }
        .address()
    }

    /// Send `op` from `from` to the Treasury with an exact, bounceable value
    pub async fn send(
        &self,
        from: Address,
        op: Op,
        value: Coins,
    ) -> std::result::Result<Coins, TransportError> {
        self.send_to(from, self.treasury, op, value).await
    }

    pub async fn send_to(
        &self,
        from: Address,
        dest: Address,
        op: Op,
        value: Coins,
    ) -> std::result::Result<Coins, TransportError> {
        self.system
            .post(from, Outbound::new(dest, op).exact(value))
            .await
    }

    /// Plain transfer to the Treasury carrying a text comment
    pub async fn comment(
        &self,
        from: Address,
        text: &str,
        value: Coins,
    ) -> std::result::Result<Coins, TransportError> {
        self.send(from, Op::Comment(text.to_string()), value).await
    }

    pub async fn settle(&self) -> std::result::Result<(), TransportError> {
        self.system.settle().await
    }
}

type FactoryResult = std::result::Result<Box<dyn ActorBehavior<Op>>, TransportError>;

fn register_codes(system: &ActorSystem<Op>, fees: &FeeSchedule) {
    system.register_code(
        *TREASURY_CODE,
        Arc::new(|data: &[u8]| -> FactoryResult {
            let init: TreasuryInit = bincode::deserialize(data).map_err(TransportError::from)?;
            Ok(Box::new(Treasury::new(init)))
        }),
    );

    let wallet_storage = fees.wallet_storage;
    system.register_code(
        *WALLET_CODE,
        Arc::new(move |data: &[u8]| -> FactoryResult {
            let init: WalletInit = bincode::deserialize(data).map_err(TransportError::from)?;
            Ok(Box::new(Wallet::new(init, wallet_storage)))
        }),
    );

    system.register_code(
        *LOAN_CODE,
        Arc::new(|data: &[u8]| -> FactoryResult {
            let init: LoanInit = bincode::deserialize(data).map_err(TransportError::from)?;
            Ok(Box::new(Loan::new(init)))
        }),
    );
}

