//! FIFO queue of transactions waiting for a block.
//!
//! No priority ordering, deduplication or per-address limits: whatever is
//! enqueued before a drain goes into that cycle's block, in arrival order.

use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mempool {
    pending: VecDeque<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(txs: Vec<Transaction>) -> Self {
        Mempool {
            pending: txs.into(),
        }
    }

    pub fn enqueue(&mut self, tx: Transaction) {
        self.pending.push_back(tx);
    }

    /// Take the full current contents, leaving the pool empty.
    pub fn drain_all(&mut self) -> Vec<Transaction> {
        self.pending.drain(..).collect()
    }

    /// Put transactions back at the head of the queue, keeping their order,
    /// ahead of anything enqueued since they were drained.
    pub fn requeue_front(&mut self, txs: Vec<Transaction>) {
        for tx in txs.into_iter().rev() {
            self.pending.push_front(tx);
        }
    }

    /// Drop pending entries whose id appears in `included`.
    pub fn remove_included(&mut self, included: &[Transaction]) -> usize {
        let ids: HashSet<&str> = included.iter().map(|t| t.id()).collect();
        let before = self.pending.len();
        self.pending.retain(|tx| !ids.contains(tx.id()));
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.iter()
    }

    pub fn to_vec(&self) -> Vec<Transaction> {
        self.pending.iter().cloned().collect()
    }
}
