//! Read-only queries
//!
//! Every query is answered by the actor itself, in mailbox order, so a query
//! issued after [`Protocol::settle`] observes every committed transaction and
//! changes nothing.

use crate::account::{ExternalAccount, Receipt};
use crate::deploy::Protocol;
use crate::fees::{ExchangeRate, FeeSchedule};
use crate::loan::{Loan, LoanPhase};
use crate::messages::LoanOutcome;
use crate::treasury::{Governance, Participation, Treasury, TreasuryTotals};
use crate::wallet::{StakingEntry, Wallet, WalletPhase};
use futures::future::try_join_all;
use messaging_actors::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use types::{Address, Coins, RoundId, Tokens};

/// Snapshot of every aggregate Treasury field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreasuryState {
    pub totals: TreasuryTotals,
    pub participations: BTreeMap<RoundId, Participation>,
    pub next_round: RoundId,
    pub rounds_imbalance: u8,
    pub stopped: bool,
    pub governance: Governance,
    pub balance: Coins,
}

impl TreasuryState {
    fn capture(treasury: &Treasury, balance: Coins) -> Self {
        Self {
            totals: *treasury.totals(),
            participations: treasury.participations().clone(),
            next_round: treasury.next_round(),
            rounds_imbalance: treasury.rounds_imbalance(),
            stopped: treasury.is_stopped(),
            governance: treasury.governance().clone(),
            balance,
        }
    }

    pub fn exchange_rate(&self) -> ExchangeRate {
        ExchangeRate::new(self.totals.total_coins, self.totals.total_tokens)
    }

    pub fn swept_staking(&self) -> Coins {
        self.participations.values().map(|p| p.swept_staking).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletState {
    pub address: Address,
    pub owner: Address,
    pub tokens: Tokens,
    pub staking: BTreeMap<RoundId, StakingEntry>,
    pub unstaking: Tokens,
    pub phase: WalletPhase,
    pub balance: Coins,
}

impl WalletState {
    /// Coins pledged and not yet minted, across rounds
    pub fn staking_total(&self) -> Coins {
        self.staking
            .values()
            .map(|entry| entry.pending.saturating_add(entry.minting))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanState {
    pub address: Address,
    pub round: RoundId,
    pub validator: Address,
    pub stake: Coins,
    pub outcome: Option<LoanOutcome>,
    pub phase: LoanPhase,
    pub balance: Coins,
}

impl Protocol {
    pub async fn treasury_state(&self) -> Result<TreasuryState> {
        self.system()
            .inspect(self.treasury(), |treasury: &Treasury, balance| {
                TreasuryState::capture(treasury, balance)
            })
            .await
    }

    /// Fee constants the Treasury charges
    pub async fn fee_schedule(&self) -> Result<FeeSchedule> {
        self.system()
            .inspect(self.treasury(), |treasury: &Treasury, _| *treasury.fees())
            .await
    }

    /// State of `owner`'s Wallet, or `None` before the first deposit
    pub async fn wallet_state(&self, owner: Address) -> Result<Option<WalletState>> {
        let address = self.wallet_address(owner)?;
        if !self.system().contains(&address) {
            return Ok(None);
        }
        let state = self
            .system()
            .inspect(address, move |wallet: &Wallet, balance| WalletState {
                address,
                owner: wallet.owner(),
                tokens: wallet.tokens(),
                staking: wallet.staking().clone(),
                unstaking: wallet.unstaking(),
                phase: wallet.phase(),
                balance,
            })
            .await?;
        Ok(Some(state))
    }

    pub async fn wallet_states(&self, owners: &[Address]) -> Result<Vec<Option<WalletState>>> {
        try_join_all(owners.iter().map(|owner| self.wallet_state(*owner))).await
    }

    /// State of the loan for `validator` in `round`, while it is live
    pub async fn loan_state(&self, round: RoundId, validator: Address) -> Result<Option<LoanState>> {
        let address = self.loan_address(round, validator)?;
        if !self.system().contains(&address) {
            return Ok(None);
        }
        let state = self
            .system()
            .inspect(address, move |loan: &Loan, balance| LoanState {
                address,
                round: loan.round(),
                validator: loan.validator(),
                stake: loan.stake(),
                outcome: loan.outcome(),
                phase: loan.phase(),
                balance,
            })
            .await?;
        Ok(Some(state))
    }

    pub async fn balance(&self, address: Address) -> Result<Coins> {
        self.system().balance(address).await
    }

    /// Transfers and notifications an external account has received
    pub async fn receipts(&self, account: Address) -> Result<Vec<Receipt>> {
        self.system()
            .inspect(account, |account: &ExternalAccount, _| {
                account.received().to_vec()
            })
            .await
    }
}
