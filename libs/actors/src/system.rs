//! Actor System Core
//!
//! Ledger runtime with per-account mailboxes, attached value and
//! transactional message handling.
//!
//! Every account (contract or external) runs as one tokio task that owns its
//! actor state and balance, and drains a single FIFO mailbox. Each delivered
//! message is one transaction:
//!
//! 1. the attached value is credited and the compute fee charged
//! 2. the handler runs against the live state while a snapshot is kept
//! 3. `Ok` commits the state and dispatches the buffered outbound messages
//! 4. `Err` restores the snapshot, drops the outbound messages and, for a
//!    bounceable message, returns a bounced copy with the value minus fees
//!
//! Messages from one sender to one destination keep their send order because
//! the sender's task enqueues them in order onto the destination's mailbox.
//!
//! # Lock Ordering
//!
//! When acquiring multiple locks, ALWAYS follow this order:
//! 1. `accounts` (read or write)
//! 2. `task_registry`
//!
//! No lock is ever held across an `.await`.

use crate::clock::LedgerClock;
use crate::context::TxContext;
use crate::error::{ActorError, Result, TransportError};
use crate::gas::GasSchedule;
use crate::journal::{Journal, TransactionRecord, TxOutcome};
use crate::messages::{ActorMessage, Envelope, Outbound, StateInit, Value};
use crate::registry::{CodeFactory, CodeRegistry};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{Address, CodeId, Coins};
use uuid::Uuid;

/// Actor state machine run by one ledger account
#[async_trait]
pub trait ActorBehavior<M: ActorMessage>: StateSnapshot<M> + Send + 'static {
    /// Handle one inbound message. Returning `Err` aborts the transaction.
    async fn handle(
        &mut self,
        ctx: &mut TxContext<M>,
        envelope: &Envelope<M>,
    ) -> std::result::Result<(), ActorError>;

    /// Label for log fields
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Snapshot and downcast support, implemented for every `Clone` actor
pub trait StateSnapshot<M: ActorMessage> {
    fn snapshot(&self) -> Box<dyn ActorBehavior<M>>;
    fn as_any(&self) -> &dyn Any;
}

impl<M, T> StateSnapshot<M> for T
where
    M: ActorMessage,
    T: ActorBehavior<M> + Clone + 'static,
{
    fn snapshot(&self) -> Box<dyn ActorBehavior<M>> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type InspectFn = Box<dyn FnOnce(&dyn Any, Coins) + Send>;

enum MailboxItem<M> {
    Deliver {
        envelope: Envelope<M>,
        deployed: bool,
    },
    /// Externally requested send debited from this account
    Post {
        outbound: Outbound<M>,
        reply: oneshot::Sender<Result<Coins>>,
    },
    Inspect(InspectFn),
}

/// Handle to a running account
pub struct AccountHandle<M> {
    pub address: Address,
    pub kind: &'static str,
    pub start_time: Instant,
    mailbox: mpsc::UnboundedSender<MailboxItem<M>>,
}

impl<M> Clone for AccountHandle<M> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            kind: self.kind,
            start_time: self.start_time,
            mailbox: self.mailbox.clone(),
        }
    }
}

/// Ledger-wide counters
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub transactions_committed: AtomicU64,
    pub transactions_aborted: AtomicU64,
    pub bounces_sent: AtomicU64,
    pub undeliverable_messages: AtomicU64,
    pub accounts_deployed: AtomicU64,
    pub accounts_destroyed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,
}

impl LedgerMetrics {
    pub fn record_transaction(&self, committed: bool, duration: Duration) {
        if committed {
            self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_bounce(&self) {
        self.bounces_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undeliverable(&self) {
        self.undeliverable_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deploy(&self) {
        self.accounts_deployed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroy(&self) {
        self.accounts_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> LedgerStats {
        let committed = self.transactions_committed.load(Ordering::Relaxed);
        let aborted = self.transactions_aborted.load(Ordering::Relaxed);
        let total = committed + aborted;
        let avg_processing_time_ns = if total == 0 {
            0.0
        } else {
            self.total_processing_time_ns.load(Ordering::Relaxed) as f64 / total as f64
        };

        LedgerStats {
            transactions_committed: committed,
            transactions_aborted: aborted,
            bounces_sent: self.bounces_sent.load(Ordering::Relaxed),
            undeliverable_messages: self.undeliverable_messages.load(Ordering::Relaxed),
            accounts_deployed: self.accounts_deployed.load(Ordering::Relaxed),
            accounts_destroyed: self.accounts_destroyed.load(Ordering::Relaxed),
            avg_processing_time_ns,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    pub bounces_sent: u64,
    pub undeliverable_messages: u64,
    pub accounts_deployed: u64,
    pub accounts_destroyed: u64,
    pub avg_processing_time_ns: f64,
}

/// Where every coin of the ledger sits, taken at quiescence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub held: Coins,
    pub dormant: Coins,
    pub fees: Coins,
    pub genesis: Coins,
}

impl LedgerAudit {
    /// Held, dormant and collected fees add up to the genesis supply
    pub fn is_balanced(&self) -> bool {
        self.held
            .saturating_add(self.dormant)
            .saturating_add(self.fees)
            == self.genesis
    }
}

/// Ledger managing account lifecycles and message routing
pub struct ActorSystem<M: ActorMessage> {
    /// Live accounts by address
    accounts: Arc<RwLock<HashMap<Address, AccountHandle<M>>>>,

    /// Code bodies available for deployment
    codes: Arc<CodeRegistry<M>>,

    /// Value sent to addresses without an account
    dormant: Arc<DashMap<Address, Coins>>,

    collected_fees: Arc<Mutex<Coins>>,
    genesis: Arc<Mutex<Coins>>,

    /// Task registry for proper cleanup on shutdown
    task_registry: Arc<Mutex<HashMap<Address, JoinHandle<()>>>>,

    /// Messages enqueued but not yet resolved
    in_flight: Arc<AtomicU64>,
    quiescent: Arc<Notify>,

    journal: Journal,
    metrics: Arc<LedgerMetrics>,
    clock: LedgerClock,
    gas: GasSchedule,
    settle_timeout: Duration,

    /// System ID for debugging
    system_id: String,
}

impl<M: ActorMessage> Clone for ActorSystem<M> {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            codes: Arc::clone(&self.codes),
            dormant: Arc::clone(&self.dormant),
            collected_fees: Arc::clone(&self.collected_fees),
            genesis: Arc::clone(&self.genesis),
            task_registry: Arc::clone(&self.task_registry),
            in_flight: Arc::clone(&self.in_flight),
            quiescent: Arc::clone(&self.quiescent),
            journal: self.journal.clone(),
            metrics: Arc::clone(&self.metrics),
            clock: self.clock.clone(),
            gas: self.gas,
            settle_timeout: self.settle_timeout,
            system_id: self.system_id.clone(),
        }
    }
}

impl<M: ActorMessage> ActorSystem<M> {
    pub fn new(name: &str, gas: GasSchedule) -> Self {
        let system_id = format!("{}-{}", name, Uuid::new_v4().simple());
        info!(system_id = %system_id, "Creating ledger");

        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            codes: Arc::new(CodeRegistry::new()),
            dormant: Arc::new(DashMap::new()),
            collected_fees: Arc::new(Mutex::new(Coins::ZERO)),
            genesis: Arc::new(Mutex::new(Coins::ZERO)),
            task_registry: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicU64::new(0)),
            quiescent: Arc::new(Notify::new()),
            journal: Journal::new(),
            metrics: Arc::new(LedgerMetrics::default()),
            clock: LedgerClock::default(),
            gas,
            settle_timeout: Duration::from_secs(5),
            system_id,
        }
    }

    pub fn with_clock(mut self, clock: LedgerClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn gas(&self) -> &GasSchedule {
        &self.gas
    }

    pub fn clock(&self) -> &LedgerClock {
        &self.clock
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    /// Make `code` deployable through `StateInit`
    pub fn register_code(&self, code: CodeId, factory: CodeFactory<M>) {
        self.codes.register(code, factory);
    }

    pub fn has_code(&self, code: &CodeId) -> bool {
        self.codes.contains(code)
    }

    /// Create an account at `address` with a genesis `balance`
    pub async fn spawn<B: ActorBehavior<M>>(
        &self,
        address: Address,
        behavior: B,
        balance: Coins,
    ) -> Result<Address> {
        self.spawn_boxed(address, Box::new(behavior), balance)
    }

    /// Deploy registered code at the address derived from `init`
    pub async fn deploy(&self, init: StateInit, balance: Coins) -> Result<Address> {
        let behavior = self.codes.instantiate(&init.code, &init.data)?;
        self.spawn_boxed(init.address(), behavior, balance)
    }

    fn spawn_boxed(
        &self,
        address: Address,
        behavior: Box<dyn ActorBehavior<M>>,
        balance: Coins,
    ) -> Result<Address> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&address) {
            return Err(TransportError::AccountExists { address });
        }

        {
            let mut genesis = self.genesis.lock();
            *genesis = genesis.saturating_add(balance);
        }
        let parked = self.take_dormant(&address);
        let kind = behavior.kind();
        self.start_account(address, behavior, balance.saturating_add(parked), &mut accounts);
        info!(
            actor = %address.short(),
            kind,
            balance = %balance,
            system_id = %self.system_id,
            "Spawned account"
        );
        Ok(address)
    }

    fn start_account(
        &self,
        address: Address,
        behavior: Box<dyn ActorBehavior<M>>,
        balance: Coins,
        accounts: &mut HashMap<Address, AccountHandle<M>>,
    ) -> mpsc::UnboundedSender<MailboxItem<M>> {
        let (tx, rx) = mpsc::unbounded_channel();
        accounts.insert(
            address,
            AccountHandle {
                address,
                kind: behavior.kind(),
                start_time: Instant::now(),
                mailbox: tx.clone(),
            },
        );

        let task = AccountTask {
            address,
            behavior,
            balance,
            system: self.clone(),
        };
        let join = tokio::spawn(task.run(rx));
        self.task_registry.lock().insert(address, join);
        tx
    }

    /// Send `outbound` on behalf of account `from`, debiting its balance.
    ///
    /// Returns the value the message carries. `Remaining` carries nothing here
    /// since there is no inbound message to draw from.
    pub async fn post(&self, from: Address, outbound: Outbound<M>) -> Result<Coins> {
        let mailbox = self.mailbox(&from)?;
        let (reply, response) = oneshot::channel();
        mailbox
            .send(MailboxItem::Post { outbound, reply })
            .map_err(|_| TransportError::MailboxClosed { address: from })?;
        response
            .await
            .map_err(|_| TransportError::MailboxClosed { address: from })?
    }

    /// Wait until no message is in flight, bounded by the configured timeout
    pub async fn settle(&self) -> Result<()> {
        self.settle_within(self.settle_timeout).await
    }

    pub async fn settle_within(&self, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                let notified = self.quiescent.notified();
                if self.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TransportError::SettleTimeout {
                timeout_ms: timeout.as_millis() as u64,
                in_flight: self.in_flight.load(Ordering::Acquire),
            })
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a read-only closure against the actor state, in mailbox order
    pub async fn inspect<T, R, F>(&self, address: Address, f: F) -> Result<R>
    where
        T: 'static,
        R: Send + 'static,
        F: FnOnce(&T, Coins) -> R + Send + 'static,
    {
        self.inspect_raw(address, move |state, balance| {
            state.downcast_ref::<T>().map(|typed| f(typed, balance))
        })
        .await?
        .ok_or(TransportError::StateMismatch { address })
    }

    /// Current balance of a live account
    pub async fn balance(&self, address: Address) -> Result<Coins> {
        self.inspect_raw(address, |_, balance| balance).await
    }

    async fn inspect_raw<R, F>(&self, address: Address, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn Any, Coins) -> R + Send + 'static,
    {
        let mailbox = self.mailbox(&address)?;
        let (reply, response) = oneshot::channel();
        let query: InspectFn = Box::new(move |state: &dyn Any, balance: Coins| {
            let _ = reply.send(f(state, balance));
        });
        mailbox
            .send(MailboxItem::Inspect(query))
            .map_err(|_| TransportError::MailboxClosed { address })?;
        response
            .await
            .map_err(|_| TransportError::MailboxClosed { address })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.read().contains_key(address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.accounts.read().keys().copied().collect();
        addresses.sort();
        addresses
    }

    /// Actor type running at `address`
    pub fn account_kind(&self, address: &Address) -> Option<&'static str> {
        self.accounts.read().get(address).map(|handle| handle.kind)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    /// Value parked at an address without an account
    pub fn dormant_balance(&self, address: &Address) -> Coins {
        self.dormant
            .get(address)
            .map(|entry| *entry.value())
            .unwrap_or(Coins::ZERO)
    }

    pub fn total_dormant(&self) -> Coins {
        self.dormant.iter().map(|entry| *entry.value()).sum()
    }

    pub fn collected_fees(&self) -> Coins {
        *self.collected_fees.lock()
    }

    /// Account for every coin; call after [`ActorSystem::settle`]
    pub async fn audit(&self) -> Result<LedgerAudit> {
        let mut held = Coins::ZERO;
        for address in self.addresses() {
            match self.balance(address).await {
                Ok(balance) => held = held.saturating_add(balance),
                Err(TransportError::UnknownAccount { .. })
                | Err(TransportError::MailboxClosed { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(LedgerAudit {
            held,
            dormant: self.total_dormant(),
            fees: self.collected_fees(),
            genesis: *self.genesis.lock(),
        })
    }

    /// Stop every account task
    pub fn shutdown(&self) {
        let mut accounts = self.accounts.write();
        let count = accounts.len();
        accounts.clear();
        for (_, join) in self.task_registry.lock().drain() {
            join.abort();
        }
        info!(system_id = %self.system_id, accounts = count, "Ledger shut down");
    }

    fn mailbox(&self, address: &Address) -> Result<mpsc::UnboundedSender<MailboxItem<M>>> {
        self.accounts
            .read()
            .get(address)
            .map(|handle| handle.mailbox.clone())
            .ok_or(TransportError::UnknownAccount { address: *address })
    }

    fn collect_fee(&self, fee: Coins) {
        if fee.is_zero() {
            return;
        }
        let mut collected = self.collected_fees.lock();
        *collected = collected.saturating_add(fee);
    }

    fn credit_dormant(&self, address: Address, value: Coins) {
        if value.is_zero() {
            return;
        }
        let mut entry = self.dormant.entry(address).or_insert(Coins::ZERO);
        *entry = entry.saturating_add(value);
    }

    fn take_dormant(&self, address: &Address) -> Coins {
        self.dormant
            .remove(address)
            .map(|(_, value)| value)
            .unwrap_or(Coins::ZERO)
    }

    /// Enqueue a message; it stays in flight until processed or resolved
    fn dispatch(&self, envelope: Envelope<M>) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.route(envelope);
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.quiescent.notify_waiters();
        }
    }

    fn route(&self, envelope: Envelope<M>) {
        let existing = self.accounts.read().get(&envelope.dest).map(|h| h.mailbox.clone());
        let target = match existing {
            Some(mailbox) => Some((mailbox, false)),
            None => self.deploy_from(&envelope),
        };

        match target {
            Some((mailbox, deployed)) => {
                if let Err(rejected) = mailbox.send(MailboxItem::Deliver { envelope, deployed }) {
                    if let MailboxItem::Deliver { envelope, .. } = rejected.0 {
                        self.undeliverable(envelope);
                    }
                }
            }
            None => self.undeliverable(envelope),
        }
    }

    /// Deploy the destination from the envelope's `StateInit`, if it has one
    fn deploy_from(
        &self,
        envelope: &Envelope<M>,
    ) -> Option<(mpsc::UnboundedSender<MailboxItem<M>>, bool)> {
        let init = envelope.state_init.as_ref()?;
        let derived = init.address();
        if derived != envelope.dest {
            let err = TransportError::AddressMismatch {
                derived,
                destination: envelope.dest,
            };
            warn!(error_category = err.category(), "Deployment refused: {}", err);
            return None;
        }

        let behavior = match self.codes.instantiate(&init.code, &init.data) {
            Ok(behavior) => behavior,
            Err(e) => {
                warn!(
                    actor = %envelope.dest.short(),
                    error_category = e.category(),
                    "Deployment failed: {}",
                    e
                );
                return None;
            }
        };

        let mut accounts = self.accounts.write();
        if let Some(handle) = accounts.get(&envelope.dest) {
            return Some((handle.mailbox.clone(), false));
        }
        let kind = behavior.kind();
        let parked = self.take_dormant(&envelope.dest);
        let mailbox = self.start_account(envelope.dest, behavior, parked, &mut accounts);
        drop(accounts);

        self.metrics.record_deploy();
        info!(actor = %envelope.dest.short(), kind, op = envelope.op_name(), "Deployed account");
        Some((mailbox, true))
    }

    fn undeliverable(&self, envelope: Envelope<M>) {
        self.metrics.record_undeliverable();
        self.journal.record(TransactionRecord {
            seq: 0,
            src: envelope.src,
            dest: envelope.dest,
            op: envelope.op_name(),
            value: envelope.value,
            bounced: envelope.bounced,
            outcome: TxOutcome::Undeliverable,
            deployed: false,
            destroyed: false,
            now: self.clock.now(),
        });

        if envelope.bounces_on_abort() {
            let fee = self
                .gas
                .forward_fee(envelope.encoded_size())
                .min(envelope.value);
            let returned = envelope.value.saturating_sub(fee);
            self.collect_fee(fee);
            if !returned.is_zero() {
                debug!(
                    dest = %envelope.dest.short(),
                    op = envelope.op_name(),
                    value = %returned,
                    "Bouncing undeliverable message"
                );
                self.metrics.record_bounce();
                self.dispatch(envelope.into_bounce(returned));
            }
        } else {
            debug!(
                dest = %envelope.dest.short(),
                op = envelope.op_name(),
                value = %envelope.value,
                "Parking undeliverable value"
            );
            self.credit_dormant(envelope.dest, envelope.value);
        }
        self.finish_one();
    }

    fn remove_account(&self, address: &Address) {
        self.accounts.write().remove(address);
        self.task_registry.lock().remove(address);
    }
}

/// State owned by one account task
struct AccountTask<M: ActorMessage> {
    address: Address,
    behavior: Box<dyn ActorBehavior<M>>,
    balance: Coins,
    system: ActorSystem<M>,
}

impl<M: ActorMessage> AccountTask<M> {
    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<MailboxItem<M>>) {
        while let Some(item) = mailbox.recv().await {
            match item {
                MailboxItem::Deliver { envelope, deployed } => {
                    let destroyed = self.process(envelope, deployed).await;
                    // Retire before resolving the delivery
                    if destroyed {
                        let system = self.system.clone();
                        self.retire(mailbox);
                        system.finish_one();
                        return;
                    }
                    self.system.finish_one();
                }
                MailboxItem::Post { outbound, reply } => {
                    let _ = reply.send(self.post(outbound));
                }
                MailboxItem::Inspect(query) => query(self.behavior.as_any(), self.balance),
            }
        }
    }

    /// Run one transaction; returns whether the account destroyed itself.
    /// The caller resolves the in-flight count.
    async fn process(&mut self, envelope: Envelope<M>, deployed: bool) -> bool {
        let started = Instant::now();
        let gas = self.system.gas;
        let now = self.system.clock.now();
        let op = envelope.op_name();
        self.balance = self.balance.saturating_add(envelope.value);

        if envelope.value < gas.compute_fee {
            // The attached value is consumed as gas
            self.balance = self.balance.saturating_sub(envelope.value);
            self.system.collect_fee(envelope.value);
            let err = ActorError::from(TransportError::OutOfGas {
                attached: envelope.value,
                compute_fee: gas.compute_fee,
            });
            debug!(actor = %self.address.short(), op, "Transaction out of gas");
            self.record(&envelope, TxOutcome::aborted(&err), deployed, false, now);
            self.system.metrics.record_transaction(false, started.elapsed());
            return false;
        }

        self.balance = self.balance.saturating_sub(gas.compute_fee);
        self.system.collect_fee(gas.compute_fee);

        let snapshot = self.behavior.snapshot();
        let mut ctx = TxContext::new(self.address, &envelope, self.balance, now, gas);
        let result = self.behavior.handle(&mut ctx, &envelope).await;

        let destroyed = match result {
            Ok(()) => {
                let effects = ctx.into_effects();
                self.balance = effects.balance;
                self.system.collect_fee(effects.fees);
                debug!(
                    actor = %self.address.short(),
                    op,
                    value = %envelope.value,
                    outbound = effects.outbound.len(),
                    "Transaction committed"
                );
                self.record(&envelope, TxOutcome::Committed, deployed, effects.destroy, now);
                for outbound in effects.outbound {
                    self.system.dispatch(outbound);
                }
                self.system.metrics.record_transaction(true, started.elapsed());
                effects.destroy
            }
            Err(e) => {
                self.behavior = snapshot;
                warn!(
                    actor = %self.address.short(),
                    kind = self.behavior.kind(),
                    op,
                    bounced = envelope.bounced,
                    error_category = e.category(),
                    "Transaction aborted: {}",
                    e
                );
                self.record(&envelope, TxOutcome::aborted(&e), deployed, false, now);
                if let Some(bounce) = self.bounce_back(&envelope) {
                    self.system.dispatch(bounce);
                }
                self.system.metrics.record_transaction(false, started.elapsed());
                false
            }
        };

        destroyed
    }

    /// Return the inbound value, minus compute and forwarding fees, to the sender
    fn bounce_back(&mut self, envelope: &Envelope<M>) -> Option<Envelope<M>> {
        if !envelope.bounces_on_abort() {
            return None;
        }
        let gas = self.system.gas;
        let fee = gas.forward_fee(envelope.encoded_size());
        let returned = envelope
            .value
            .saturating_sub(gas.compute_fee)
            .saturating_sub(fee);
        if returned.is_zero() {
            return None;
        }

        self.balance = self.balance.saturating_sub(returned.saturating_add(fee));
        self.system.collect_fee(fee);
        self.system.metrics.record_bounce();
        Some(envelope.clone().into_bounce(returned))
    }

    fn post(&mut self, outbound: Outbound<M>) -> Result<Coins> {
        let fee = self.system.gas.forward_fee(outbound.encoded_size());
        let value = match outbound.value {
            Value::Exact(coins) => coins,
            Value::Remaining => Coins::ZERO,
            Value::AllBalance => self.balance.saturating_sub(fee),
        };
        let required = value.saturating_add(fee);
        if required > self.balance {
            return Err(TransportError::InsufficientBalance {
                required,
                available: self.balance,
            });
        }

        self.balance = self.balance.saturating_sub(required);
        self.system.collect_fee(fee);
        debug!(
            actor = %self.address.short(),
            dest = %outbound.dest.short(),
            op = outbound.body.op_name(),
            value = %value,
            "Posting external message"
        );
        self.system.dispatch(Envelope {
            src: self.address,
            dest: outbound.dest,
            value,
            bounce: outbound.bounce,
            bounced: false,
            body: outbound.body,
            state_init: outbound.state_init,
        });
        Ok(value)
    }

    fn record(
        &self,
        envelope: &Envelope<M>,
        outcome: TxOutcome,
        deployed: bool,
        destroyed: bool,
        now: u64,
    ) {
        self.system.journal.record(TransactionRecord {
            seq: 0,
            src: envelope.src,
            dest: envelope.dest,
            op: envelope.op_name(),
            value: envelope.value,
            bounced: envelope.bounced,
            outcome,
            deployed,
            destroyed,
            now,
        });
    }

    /// Leave the ledger; whatever is still queued becomes undeliverable
    fn retire(self, mut mailbox: mpsc::UnboundedReceiver<MailboxItem<M>>) {
        self.system.remove_account(&self.address);
        mailbox.close();
        while let Ok(item) = mailbox.try_recv() {
            match item {
                MailboxItem::Deliver { envelope, .. } => self.system.undeliverable(envelope),
                MailboxItem::Post { reply, .. } => {
                    let _ = reply.send(Err(TransportError::UnknownAccount {
                        address: self.address,
                    }));
                }
                MailboxItem::Inspect(_) => {}
            }
        }

        self.system.credit_dormant(self.address, self.balance);
        self.system.metrics.record_destroy();
        info!(actor = %self.address.short(), kind = self.behavior.kind(), "Account destroyed");
    }
}

impl TxOutcome {
    fn aborted(error: &ActorError) -> Self {
        TxOutcome::Aborted {
            category: error.category(),
            reason: error.to_string(),
        }
    }
}
