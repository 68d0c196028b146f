//! Ledger message model
//!
//! An [`Outbound`] is what a handler asks to send; the runtime resolves its
//! [`Value`] mode against the sender's balance and turns it into an
//! [`Envelope`] carrying a concrete coin amount. Bodies are a single
//! application-defined enum implementing [`ActorMessage`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use types::{Address, CodeId, Coins};

/// Application message body carried by the ledger
pub trait ActorMessage: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Stable operation name for logs and the transaction journal
    fn op_name(&self) -> &'static str;

    /// Encoded body size in bytes, used for forwarding fees
    fn encoded_size(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0)
    }
}

/// Code and initial data of a contract account.
///
/// The account address is `Address::derive(code, data)`, so a message carrying
/// a `StateInit` can deploy its destination on first contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInit {
    pub code: CodeId,
    pub data: Vec<u8>,
}

impl StateInit {
    /// Encode `init` with bincode as the initial data
    pub fn encode<T: Serialize>(code: CodeId, init: &T) -> crate::Result<Self> {
        Ok(Self {
            code,
            data: bincode::serialize(init)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(bincode::deserialize(&self.data)?)
    }

    pub fn address(&self) -> Address {
        Address::derive(&self.code, &self.data)
    }

    pub fn encoded_size(&self) -> u64 {
        32 + self.data.len() as u64
    }
}

/// How much value an outbound message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// Fixed amount paid from the sender's balance
    Exact(Coins),
    /// Inbound value not yet consumed by fees, retention or earlier sends
    Remaining,
    /// Entire balance; used together with self-destruction
    AllBalance,
}

/// Message requested by a handler, not yet priced
#[derive(Debug, Clone)]
pub struct Outbound<M> {
    pub dest: Address,
    pub value: Value,
    pub bounce: bool,
    pub body: M,
    pub state_init: Option<StateInit>,
}

impl<M: ActorMessage> Outbound<M> {
    /// Bounceable message carrying no value
    pub fn new(dest: Address, body: M) -> Self {
        Self {
            dest,
            value: Value::Exact(Coins::ZERO),
            bounce: true,
            body,
            state_init: None,
        }
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn exact(self, coins: Coins) -> Self {
        self.value(Value::Exact(coins))
    }

    pub fn remaining(self) -> Self {
        self.value(Value::Remaining)
    }

    pub fn bounce(mut self, bounce: bool) -> Self {
        self.bounce = bounce;
        self
    }

    pub fn with_state_init(mut self, init: StateInit) -> Self {
        self.state_init = Some(init);
        self
    }

    /// Bytes charged by the forwarding fee
    pub fn encoded_size(&self) -> u64 {
        self.body.encoded_size() + self.state_init.as_ref().map_or(0, StateInit::encoded_size)
    }
}

/// Message in flight between two accounts
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    pub src: Address,
    pub dest: Address,
    pub value: Coins,
    pub bounce: bool,
    /// Set on the copy returned to the sender after an abort
    pub bounced: bool,
    pub body: M,
    pub state_init: Option<StateInit>,
}

impl<M: ActorMessage> Envelope<M> {
    pub fn op_name(&self) -> &'static str {
        self.body.op_name()
    }

    pub fn encoded_size(&self) -> u64 {
        self.body.encoded_size() + self.state_init.as_ref().map_or(0, StateInit::encoded_size)
    }

    /// Whether an abort at the destination returns a bounced copy
    pub fn bounces_on_abort(&self) -> bool {
        self.bounce && !self.bounced
    }

    /// Copy returned to the sender carrying `value`
    pub fn into_bounce(self, value: Coins) -> Self {
        Self {
            src: self.dest,
            dest: self.src,
            value,
            bounce: false,
            bounced: true,
            body: self.body,
            state_init: None,
        }
    }
}
