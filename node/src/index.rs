use serde::Serialize;
use std::collections::HashMap;
use zar_core::Block;
use zar_core::decoder::DecodedTransfer;

/// What the node remembers about an accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRecord {
    pub reference: String,
    pub sender: String,
    pub receiver: String,
    /// Wire value as `0x` hex.
    pub value: String,
    pub transaction_id: String,
    /// Height of the block that included it, once mined.
    pub block: Option<u64>,
}

impl TxRecord {
    pub fn pending(transfer: &DecodedTransfer) -> Self {
        TxRecord {
            reference: transfer.reference.clone(),
            sender: transfer.sender.clone(),
            receiver: transfer.receiver.clone(),
            value: transfer.value_hex(),
            transaction_id: transfer.transaction_id(),
            block: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStatus {
    pub included: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

/// Reference -> transfer lookup table plus per-sender transfer counters.
/// In-memory only; rebuilt empty on restart.
#[derive(Debug, Default)]
pub struct TxIndex {
    records: HashMap<String, TxRecord>,
    // transaction id -> reference, for marking inclusion
    by_tx_id: HashMap<String, String>,
    sent: HashMap<String, u64>,
}

impl TxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.records.contains_key(reference)
    }

    /// Store a newly accepted transfer and bump its sender's counter.
    pub fn insert(&mut self, record: TxRecord) {
        *self.sent.entry(record.sender.clone()).or_insert(0) += 1;
        self.by_tx_id
            .insert(record.transaction_id.clone(), record.reference.clone());
        self.records.insert(record.reference.clone(), record);
    }

    /// Fill in the inclusion height for every indexed transaction in `block`.
    pub fn mark_included(&mut self, block: &Block) -> usize {
        let mut marked = 0;
        for tx in &block.transactions {
            let Some(reference) = self.by_tx_id.get(tx.id()) else {
                continue;
            };
            if let Some(record) = self.records.get_mut(reference) {
                record.block = Some(block.index);
                marked += 1;
            }
        }
        marked
    }

    pub fn record(&self, reference: &str) -> Option<&TxRecord> {
        self.records.get(reference)
    }

    pub fn status(&self, reference: &str) -> Option<TxStatus> {
        self.records.get(reference).map(|r| TxStatus {
            included: r.block.is_some(),
            block_height: r.block,
        })
    }

    pub fn transaction_count(&self, sender: &str) -> u64 {
        self.sent.get(sender).copied().unwrap_or(0)
    }
}
