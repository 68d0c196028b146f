//! Authority checks and governance setters

use super::Treasury;
use crate::error::{ProtocolError, Result};
use crate::messages::{refund_gas_excess, Op};
use messaging_actors::{ActorMessage, TxContext};
use serde::Serialize;
use staking_config::MAX_GOVERNANCE_FEE_BPS;
use tracing::info;
use types::Address;

/// Authority addresses and the governance fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Governance {
    /// Opens and closes rounds
    pub driver: Address,
    /// May only stop the Treasury
    pub halter: Address,
    pub governor: Address,
    /// Successor named by the governor, effective once it accepts
    pub proposed_governor: Option<Address>,
    /// Reports round outcomes to loans
    pub elector: Address,
    pub governance_fee_bps: u16,
}

impl Governance {
    fn ensure_governor(&self, sender: Address) -> Result<()> {
        if sender != self.governor {
            return Err(ProtocolError::Unauthorized {
                sender,
                role: "governor",
            });
        }
        Ok(())
    }
}

impl Treasury {
    pub(crate) fn govern(&mut self, ctx: &mut TxContext<Op>, sender: Address, op: &Op) -> Result<()> {
        let governance = &mut self.governance;
        match op {
            Op::SetStopped { stopped } => {
                let halting = sender == governance.halter && *stopped;
                if sender != governance.governor && !halting {
                    return Err(ProtocolError::Unauthorized {
                        sender,
                        role: if *stopped { "halter" } else { "governor" },
                    });
                }
                self.stopped = *stopped;
                info!(stopped = *stopped, by = %sender.short(), "Treasury stop flag changed");
            }
            Op::SetDriver { driver } => {
                governance.ensure_governor(sender)?;
                governance.driver = *driver;
                info!(driver = %driver.short(), "Driver changed");
            }
            Op::SetHalter { halter } => {
                governance.ensure_governor(sender)?;
                governance.halter = *halter;
                info!(halter = %halter.short(), "Halter changed");
            }
            Op::SetGovernanceFee { fee_bps } => {
                governance.ensure_governor(sender)?;
                if *fee_bps > MAX_GOVERNANCE_FEE_BPS {
                    return Err(ProtocolError::InvalidFee { bps: *fee_bps });
                }
                governance.governance_fee_bps = *fee_bps;
                info!(fee_bps = *fee_bps, "Governance fee changed");
            }
            Op::ProposeGovernor { governor } => {
                governance.ensure_governor(sender)?;
                governance.proposed_governor = Some(*governor);
                info!(proposed = %governor.short(), "Governor proposed");
            }
            Op::AcceptGovernance => {
                if governance.proposed_governor != Some(sender) {
                    return Err(ProtocolError::Unauthorized {
                        sender,
                        role: "proposed governor",
                    });
                }
                governance.governor = sender;
                governance.proposed_governor = None;
                info!(governor = %sender.short(), "Governance accepted");
            }
            other => {
                return Err(ProtocolError::UnknownOp {
                    op: other.op_name(),
                    actor: "treasury",
                })
            }
        }
        refund_gas_excess(ctx, sender)?;
        Ok(())
    }
}
