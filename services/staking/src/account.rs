//! External accounts
//!
//! Stakers and the authority roles are plain accounts driven from outside the
//! ledger. They accept value transfers and notifications and keep a receipt
//! of each one.

use crate::error::ProtocolError;
use crate::messages::Op;
use async_trait::async_trait;
use messaging_actors::{ActorBehavior, ActorError, Envelope, TxContext};
use serde::Serialize;
use types::Coins;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub op: &'static str,
    pub value: Coins,
    pub bounced: bool,
    pub at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalAccount {
    name: String,
    received: Vec<Receipt>,
}

impl ExternalAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn received(&self) -> &[Receipt] {
        &self.received
    }

    fn accepts(op: &Op) -> bool {
        matches!(
            op,
            Op::TopUp
                | Op::Comment(_)
                | Op::GasExcess
                | Op::TransferNotification { .. }
                | Op::WithdrawalNotification { .. }
                | Op::DepositReturned { .. }
        )
    }
}

#[async_trait]
impl ActorBehavior<Op> for ExternalAccount {
    async fn handle(
        &mut self,
        ctx: &mut TxContext<Op>,
        envelope: &Envelope<Op>,
    ) -> Result<(), ActorError> {
        if !envelope.bounced && !Self::accepts(&envelope.body) {
            return Err(ProtocolError::UnknownOp {
                op: envelope.op_name(),
                actor: "external account",
            }
            .into());
        }
        self.received.push(Receipt {
            op: envelope.op_name(),
            value: envelope.value,
            bounced: envelope.bounced,
            at: ctx.now(),
        });
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "external"
    }
}
