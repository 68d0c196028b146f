//! Per-round validator Loan actor
//!
//! Single use: funded once by the Treasury, settled once (by the elector's
//! round outcome or by the Treasury recovering the stake), then destroyed
//! after sending its whole balance back with `LoanSettled`.

use crate::error::{ProtocolError, Result};
use crate::messages::{LoanOutcome, Op};
use crate::LOAN_CODE;
use async_trait::async_trait;
use messaging_actors::{
    ActorBehavior, ActorError, ActorMessage, Envelope, Outbound, StateInit, TransportError,
    TxContext, Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::{Address, Coins, RoundId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanInit {
    pub treasury: Address,
    pub elector: Address,
    pub round: RoundId,
    pub validator: Address,
}

impl LoanInit {
    pub fn state_init(&self) -> std::result::Result<StateInit, TransportError> {
        StateInit::encode(*LOAN_CODE, self)
    }

    pub fn address(&self) -> std::result::Result<Address, TransportError> {
        Ok(self.state_init()?.address())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoanPhase {
    Unfunded,
    Active,
    Settled,
}

impl LoanPhase {
    fn name(self) -> &'static str {
        match self {
            LoanPhase::Unfunded => "unfunded",
            LoanPhase::Active => "active",
            LoanPhase::Settled => "settled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Loan {
    init: LoanInit,
    stake: Coins,
    outcome: Option<LoanOutcome>,
    phase: LoanPhase,
}

impl Loan {
    pub fn new(init: LoanInit) -> Self {
        Self {
            init,
            stake: Coins::ZERO,
            outcome: None,
            phase: LoanPhase::Unfunded,
        }
    }

    pub fn round(&self) -> RoundId {
        self.init.round
    }

    pub fn validator(&self) -> Address {
        self.init.validator
    }

    pub fn stake(&self) -> Coins {
        self.stake
    }

    pub fn outcome(&self) -> Option<LoanOutcome> {
        self.outcome
    }

    pub fn phase(&self) -> LoanPhase {
        self.phase
    }

    fn ensure_sender(&self, sender: Address, expected: Address, role: &'static str) -> Result<()> {
        if sender != expected {
            return Err(ProtocolError::Unauthorized { sender, role });
        }
        Ok(())
    }

    fn ensure_phase(&self, expected: LoanPhase) -> Result<()> {
        if self.phase != expected {
            return Err(ProtocolError::LoanPhase {
                phase: self.phase.name(),
                expected: expected.name(),
            });
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut TxContext<Op>, envelope: &Envelope<Op>) -> Result<()> {
        if envelope.bounced {
            return Ok(());
        }

        match &envelope.body {
            Op::ProvideLoan { stake } => {
                self.ensure_sender(envelope.src, self.init.treasury, "treasury")?;
                self.ensure_phase(LoanPhase::Unfunded)?;
                if ctx.value() < *stake {
                    return Err(ProtocolError::InsufficientValue {
                        required: *stake,
                        attached: ctx.value(),
                    });
                }
                self.stake = *stake;
                self.phase = LoanPhase::Active;
                info!(round = %self.init.round, validator = %self.init.validator.short(), stake = %stake, "Loan funded");
                Ok(())
            }
            Op::RoundOutcome { outcome } => {
                self.ensure_sender(envelope.src, self.init.elector, "elector")?;
                self.ensure_phase(LoanPhase::Active)?;
                let outcome = match *outcome {
                    LoanOutcome::Profit(profit) => {
                        if ctx.value() < profit {
                            return Err(ProtocolError::InsufficientValue {
                                required: profit,
                                attached: ctx.value(),
                            });
                        }
                        LoanOutcome::Profit(profit)
                    }
                    LoanOutcome::Loss(loss) => {
                        let penalty = loss.min(self.stake);
                        if !penalty.is_zero() {
                            ctx.send(
                                Outbound::new(self.init.elector, Op::TopUp)
                                    .exact(penalty)
                                    .bounce(false),
                            )?;
                        }
                        LoanOutcome::Loss(penalty)
                    }
                };
                self.settle(ctx, outcome)
            }
            Op::RecoverStake => {
                self.ensure_sender(envelope.src, self.init.treasury, "treasury")?;
                self.ensure_phase(LoanPhase::Active)?;
                debug!(round = %self.init.round, "Stake recovered without outcome");
                self.settle(ctx, LoanOutcome::NEUTRAL)
            }
            Op::TopUp => Ok(()),
            other => Err(ProtocolError::UnknownOp {
                op: other.op_name(),
                actor: "loan",
            }),
        }
    }

    fn settle(&mut self, ctx: &mut TxContext<Op>, outcome: LoanOutcome) -> Result<()> {
        self.outcome = Some(outcome);
        self.phase = LoanPhase::Settled;
        ctx.send(
            Outbound::new(
                self.init.treasury,
                Op::LoanSettled {
                    round: self.init.round,
                    validator: self.init.validator,
                    stake: self.stake,
                    outcome,
                },
            )
            .value(Value::AllBalance)
            .bounce(false),
        )?;
        ctx.destroy();
        info!(round = %self.init.round, validator = %self.init.validator.short(), outcome = ?outcome, "Loan settled");
        Ok(())
    }
}

#[async_trait]
impl ActorBehavior<Op> for Loan {
    async fn handle(
        &mut self,
        ctx: &mut TxContext<Op>,
        envelope: &Envelope<Op>,
    ) -> std::result::Result<(), ActorError> {
        self.process(ctx, envelope).map_err(ActorError::from)
    }

    fn kind(&self) -> &'static str {
        "loan"
    }
}
