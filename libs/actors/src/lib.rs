//! Actor Ledger Runtime
//!
//! Asynchronous actor runtime modelling a sharded ledger: every account is an
//! independently scheduled tokio task with its own mailbox and coin balance,
//! and actors interact only by sending messages that carry value.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Envelope{value}  ┌──────────────┐
//! │  Account A   │ ────────────────▶ │  Account B   │
//! │  state+coins │                   │  state+coins │
//! │  mailbox     │ ◀──────────────── │  mailbox     │
//! └──────────────┘   bounce on Err   └──────────────┘
//!         │                                  ▲
//!         │ StateInit{code,data}             │ deploy on first contact
//!         └──────────▶ CodeRegistry ─────────┘
//! ```
//!
//! - **Transactions**: a handler either commits (state + outbound messages)
//!   or aborts (state restored, outbound dropped, value bounced)
//! - **Fees**: flat compute fee per transaction, size-based forwarding fee
//! - **Ordering**: FIFO per sender and destination pair
//! - **Quiescence**: [`ActorSystem::settle`] waits until nothing is in flight
//!
//! # Examples
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use messaging_actors::{
//!     ActorBehavior, ActorError, ActorMessage, ActorSystem, Envelope, GasSchedule, Outbound,
//!     TxContext,
//! };
//! use serde::{Deserialize, Serialize};
//! use types::{Address, Coins};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Hello;
//!
//! impl ActorMessage for Hello {
//!     fn op_name(&self) -> &'static str { "hello" }
//! }
//!
//! #[derive(Clone, Default)]
//! struct Greeter { greeted: u32 }
//!
//! #[async_trait]
//! impl ActorBehavior<Hello> for Greeter {
//!     async fn handle(&mut self, _ctx: &mut TxContext<Hello>, _env: &Envelope<Hello>) -> Result<(), ActorError> {
//!         self.greeted += 1;
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> messaging_actors::Result<()> {
//! let system = ActorSystem::new("demo", GasSchedule::default());
//! let alice = system.spawn(Address::external("alice"), Greeter::default(), Coins::whole(1)).await?;
//! let bob = system.spawn(Address::external("bob"), Greeter::default(), Coins::ZERO).await?;
//! system.post(alice, Outbound::new(bob, Hello).exact(Coins::from_decimal_str("0.1").unwrap())).await?;
//! system.settle().await?;
//! let greeted = system.inspect(bob, |g: &Greeter, _| g.greeted).await?;
//! assert_eq!(greeted, 1);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod context;
pub mod error;
pub mod gas;
pub mod journal;
pub mod messages;
pub mod registry;
pub mod system;

pub use clock::LedgerClock;
pub use context::TxContext;
pub use error::{ActorError, Result, TransportError};
pub use gas::GasSchedule;
pub use journal::{Journal, TransactionRecord, TxOutcome};
pub use messages::{ActorMessage, Envelope, Outbound, StateInit, Value};
pub use registry::{CodeFactory, CodeRegistry};
pub use system::{
    AccountHandle, ActorBehavior, ActorSystem, LedgerAudit, LedgerMetrics, LedgerStats,
    StateSnapshot,
};
