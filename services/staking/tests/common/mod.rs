//! Shared fixture for the protocol scenario tests

#![allow(dead_code)]

use liquid_staking::{Genesis, Op, Protocol};
use messaging_actors::{ActorBehavior, TransactionRecord, TransportError};
use staking_config::StakingConfig;
use std::sync::Arc;
use types::{Address, CodeId, Coins};

pub type FactoryResult = Result<Box<dyn ActorBehavior<Op>>, TransportError>;

pub fn coins(decimal: &str) -> Coins {
    Coins::from_decimal_str(decimal).unwrap()
}

/// Deployed protocol with default fees and funded stakers
pub struct Fixture {
    pub protocol: Protocol,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(StakingConfig::default()).await
    }

    pub async fn with_config(config: StakingConfig) -> Self {
        let protocol = Protocol::bootstrap(&config, Genesis::default())
            .await
            .unwrap();
        Self { protocol }
    }

    pub async fn staker(&self, name: &str) -> Address {
        self.protocol
            .open_account(name, Coins::whole(1_000))
            .await
            .unwrap()
    }

    pub fn driver(&self) -> Address {
        self.protocol.authorities().driver
    }

    pub fn elector(&self) -> Address {
        self.protocol.authorities().elector
    }

    pub fn governor(&self) -> Address {
        self.protocol.authorities().governor
    }

    pub fn halter(&self) -> Address {
        self.protocol.authorities().halter
    }

    pub async fn comment(&self, from: Address, text: &str, value: &str) {
        self.protocol.comment(from, text, coins(value)).await.unwrap();
        self.protocol.settle().await.unwrap();
    }

    pub async fn send(&self, from: Address, op: Op, value: &str) {
        self.protocol.send(from, op, coins(value)).await.unwrap();
        self.protocol.settle().await.unwrap();
    }

    pub async fn send_to(&self, from: Address, dest: Address, op: Op, value: &str) {
        self.protocol
            .send_to(from, dest, op, coins(value))
            .await
            .unwrap();
        self.protocol.settle().await.unwrap();
    }

    /// Deposit `amount` plus the deposit fee
    pub async fn deposit(&self, from: Address, amount: u64) {
        let value = Coins::whole(amount)
            .checked_add(self.protocol.fees().deposit_coins_fee)
            .unwrap();
        self.protocol.comment(from, "d", value).await.unwrap();
        self.protocol.settle().await.unwrap();
    }

    /// Deposit then stake, leaving the staker holding tokens
    pub async fn deposit_and_stake(&self, from: Address, amount: u64) {
        self.deposit(from, amount).await;
        self.comment(from, "m", "0.05").await;
    }

    /// Later deployments of `code` fail, as if it had never been registered
    pub fn fail_deployments(&self, code: CodeId) {
        self.protocol.system().register_code(
            code,
            Arc::new(move |_: &[u8]| -> FactoryResult { Err(TransportError::UnknownCode { code }) }),
        );
    }

    pub fn journal_for(&self, op: &str) -> Vec<TransactionRecord> {
        self.protocol.system().journal().by_op(op)
    }

    pub async fn assert_balanced(&self) {
        let audit = self.protocol.system().audit().await.unwrap();
        assert!(audit.is_balanced(), "ledger audit out of balance: {:?}", audit);
    }
}
