mod ledger;

pub use ledger::Ledger;

use crate::amount::Amount;
use crate::block::{Block, GENESIS_PREVIOUS_HASH};
use crate::consensus;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::Transaction;

/// Append-only chain of proof-of-work blocks plus the state derived from it.
///
/// Not internally synchronised: callers give it a single owner (the node wraps it
/// in an actor) so that a balance read never observes a half-applied block.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub(crate) blocks: Vec<Block>,
    pub(crate) difficulty: u32,
    pub(crate) mempool: Mempool,
    pub(crate) ledger: Ledger,
}

impl Blockchain {
    /// Fresh chain holding only a genesis block sealed at `initial_difficulty`.
    pub fn new(initial_difficulty: u32) -> Result<Self, ChainError> {
        let mut genesis = Block::new(0, GENESIS_PREVIOUS_HASH, Vec::new(), initial_difficulty)?;
        consensus::find_valid_nonce(&mut genesis)?;
        log::info!(
            "Genesis block created: hash={} difficulty={}",
            genesis.hash,
            initial_difficulty
        );

        Ok(Blockchain {
            blocks: vec![genesis],
            difficulty: initial_difficulty,
            mempool: Mempool::new(),
            ledger: Ledger::new(),
        })
    }

    /// Reassemble a chain from persisted parts. Does not re-verify; see [`Blockchain::verify`].
    pub fn from_parts(
        blocks: Vec<Block>,
        difficulty: u32,
        mempool: Mempool,
        ledger: Ledger,
    ) -> Result<Self, ChainError> {
        if blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        Ok(Blockchain {
            blocks,
            difficulty,
            mempool,
            ledger,
        })
    }

    pub fn latest_block(&self) -> Result<&Block, ChainError> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn latest_hash(&self) -> Result<&str, ChainError> {
        Ok(self.latest_block()?.hash.as_str())
    }

    /// Index of the tip block (genesis = 0).
    pub fn height(&self) -> u64 {
        self.blocks.last().map(|b| b.index).unwrap_or(0)
    }

    /// Number of blocks including genesis.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn balance(&self, address: &str) -> Amount {
        self.ledger.balance(address)
    }

    /// Queue a transaction for the next mining cycle.
    pub fn submit(&mut self, tx: Transaction) {
        self.mempool.enqueue(tx);
    }

    /// Validate `block` against the tip and, if it passes, apply its transactions
    /// to the ledger and append it.
    ///
    /// Balance sufficiency is deliberately not checked here: a non-sentinel sender
    /// is debited in full even when that leaves a negative balance. The only
    /// sufficiency check happens when a transfer is accepted into the mempool.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        let tip = self.latest_block()?;
        if block.previous_hash != tip.hash {
            log::warn!(
                "🚫 Block rejected [linkage]: index={} previous_hash={} tip={}",
                block.index,
                block.previous_hash,
                tip.hash
            );
            return Err(ChainError::InvalidLinkage {
                expected: tip.hash.clone(),
                found: block.previous_hash.clone(),
            });
        }

        if !block.has_valid_proof()? {
            log::warn!(
                "🚫 Block rejected [proof]: index={} hash={} difficulty={}",
                block.index,
                block.hash,
                block.difficulty
            );
            return Err(ChainError::InvalidProof {
                index: block.index,
                hash: block.hash.clone(),
                difficulty: block.difficulty,
            });
        }

        if let Err(e) = self.ledger.apply_block(&block) {
            log::warn!("🚫 Block rejected [ledger]: {}", e);
            return Err(e);
        }
        log::info!(
            "✅ Block appended index={} hash={} txs={}",
            block.index,
            block.hash,
            block.transactions.len()
        );
        self.blocks.push(block);
        Ok(())
    }

    /// Check linkage and proof of every block from genesis to tip.
    pub fn verify(&self) -> Result<(), ChainError> {
        let genesis = self.blocks.first().ok_or(ChainError::EmptyChain)?;
        if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(ChainError::InvalidLinkage {
                expected: GENESIS_PREVIOUS_HASH.to_string(),
                found: genesis.previous_hash.clone(),
            });
        }

        let mut previous: Option<&Block> = None;
        for block in &self.blocks {
            if let Some(prev) = previous {
                if block.previous_hash != prev.hash {
                    return Err(ChainError::InvalidLinkage {
                        expected: prev.hash.clone(),
                        found: block.previous_hash.clone(),
                    });
                }
            }
            if !block.has_valid_proof()? {
                return Err(ChainError::InvalidProof {
                    index: block.index,
                    hash: block.hash.clone(),
                    difficulty: block.difficulty,
                });
            }
            previous = Some(block);
        }
        Ok(())
    }
}
