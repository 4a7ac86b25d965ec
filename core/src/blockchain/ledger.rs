use crate::amount::Amount;
use crate::block::Block;
use crate::config::{DEVELOPER_ADDRESS, developer_fee};
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address -> balance, maintained incrementally as blocks are appended.
///
/// Routing rule per transaction:
/// - sentinel sender: receiver credited the full amount, nobody debited.
/// - any other sender: sender debited the full amount (even past zero), receiver
///   credited `amount - fee`, developer address credited `fee`.
///
/// A block is applied all or nothing: if any balance would leave the `i128`
/// range the ledger is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    balances: BTreeMap<String, Amount>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_balances(balances: BTreeMap<String, Amount>) -> Self {
        Ledger { balances }
    }

    /// Rebuild a ledger from scratch by replaying `blocks` in order.
    pub fn replay(blocks: &[Block]) -> Result<Self, ChainError> {
        let mut ledger = Ledger::new();
        for block in blocks {
            ledger.apply_block(block)?;
        }
        Ok(ledger)
    }

    /// Current balance, zero for an address never seen.
    pub fn balance(&self, address: &str) -> Amount {
        self.balances.get(address).copied().unwrap_or(Amount::ZERO)
    }

    pub fn balances(&self) -> &BTreeMap<String, Amount> {
        &self.balances
    }

    pub fn apply_block(&mut self, block: &Block) -> Result<(), ChainError> {
        self.apply_all(block.index, &block.transactions)
    }

    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), ChainError> {
        self.apply_all(0, std::slice::from_ref(tx))
    }

    /// Stage every balance change first, then write them back in one go.
    fn apply_all(&mut self, index: u64, transactions: &[Transaction]) -> Result<(), ChainError> {
        let mut staged: BTreeMap<&str, Amount> = BTreeMap::new();
        for tx in transactions {
            if tx.sentinel().is_some() {
                self.stage(&mut staged, index, tx.receiver(), tx.amount())?;
                continue;
            }

            let fee = developer_fee(tx.amount());
            self.stage(&mut staged, index, tx.sender(), -tx.amount())?;
            self.stage(&mut staged, index, tx.receiver(), tx.amount() - fee)?;
            self.stage(&mut staged, index, DEVELOPER_ADDRESS, fee)?;
        }

        for (address, balance) in staged {
            self.balances.insert(address.to_string(), balance);
        }
        Ok(())
    }

    fn stage<'a>(
        &self,
        staged: &mut BTreeMap<&'a str, Amount>,
        index: u64,
        address: &'a str,
        delta: Amount,
    ) -> Result<(), ChainError> {
        let current = match staged.get(address) {
            Some(balance) => *balance,
            None => self.balance(address),
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| ChainError::BalanceOverflow {
                index,
                address: address.to_string(),
            })?;
        staged.insert(address, next);
        Ok(())
    }
}
