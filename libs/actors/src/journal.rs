//! Transaction journal
//!
//! Every delivery the ledger resolves (committed, aborted or undeliverable)
//! leaves one [`TransactionRecord`]. Tests use it to assert on saga shape:
//! which step aborted, which message bounced, how much value moved.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use types::{Address, Coins};

/// How a delivery ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TxOutcome {
    Committed,
    Aborted {
        category: &'static str,
        reason: String,
    },
    /// Destination missing or destroyed; value bounced or parked as dormant
    Undeliverable,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub seq: u64,
    pub src: Address,
    pub dest: Address,
    pub op: &'static str,
    pub value: Coins,
    pub bounced: bool,
    pub outcome: TxOutcome,
    pub deployed: bool,
    pub destroyed: bool,
    pub now: u64,
}

impl TransactionRecord {
    pub fn is_committed(&self) -> bool {
        self.outcome == TxOutcome::Committed
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, TxOutcome::Aborted { .. })
    }

    pub fn abort_category(&self) -> Option<&'static str> {
        match &self.outcome {
            TxOutcome::Aborted { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Append-only log shared by all account tasks
#[derive(Debug, Clone, Default)]
pub struct Journal {
    records: Arc<Mutex<Vec<TransactionRecord>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, assigning the next sequence number
    pub(crate) fn record(&self, mut record: TransactionRecord) {
        let mut records = self.records.lock();
        record.seq = records.len() as u64;
        records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.records.lock().clone()
    }

    /// Take all records, leaving the journal empty
    pub fn drain(&self) -> Vec<TransactionRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Records for one operation name, in processing order
    pub fn by_op(&self, op: &str) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.op == op)
            .cloned()
            .collect()
    }

    pub fn aborted(&self) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.is_aborted())
            .cloned()
            .collect()
    }
}
