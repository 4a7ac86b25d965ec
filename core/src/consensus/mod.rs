// core/consensus: proof-of-work sealing, reward issuance and the difficulty ratchet
use crate::block::{Block, meets_difficulty};
use crate::blockchain::Blockchain;
use crate::config::{BLOCK_REWARD, DEVELOPER_ADDRESS, DIFFICULTY_ADJUSTMENT_INTERVAL, split_block_reward};
use crate::error::{ChainError, ConsensusError};
use crate::transaction::{Sentinel, Transaction};
use bincode::error::EncodeError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// How often (in nonces) the search looks at the cancellation flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 10_000;

const PROGRESS_LOG_INTERVAL: u64 = 1_000_000;

/// Addresses that receive the non-developer shares of a block reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRecipients {
    pub miner: String,
    pub staker: String,
    pub treasury: String,
}

impl RewardRecipients {
    /// Addresses are lowercased, matching how balances are looked up.
    pub fn new(miner: impl AsRef<str>, staker: impl AsRef<str>, treasury: impl AsRef<str>) -> Self {
        RewardRecipients {
            miner: miner.as_ref().to_lowercase(),
            staker: staker.as_ref().to_lowercase(),
            treasury: treasury.as_ref().to_lowercase(),
        }
    }
}

/// The four SYSTEM issuances for a block at `height`: miner, staker, treasury, developer fee.
pub fn reward_transactions(height: u64, recipients: &RewardRecipients) -> Vec<Transaction> {
    let split = split_block_reward(BLOCK_REWARD);
    vec![
        Transaction::issuance(
            Sentinel::System,
            format!("miner-reward-{}", height),
            recipients.miner.as_str(),
            split.miner,
        ),
        Transaction::issuance(
            Sentinel::System,
            format!("staker-reward-{}", height),
            recipients.staker.as_str(),
            split.staker,
        ),
        Transaction::issuance(
            Sentinel::System,
            format!("treasury-reward-{}", height),
            recipients.treasury.as_str(),
            split.treasury,
        ),
        Transaction::issuance(
            Sentinel::System,
            format!("dev-fee-{}", height),
            DEVELOPER_ADDRESS,
            split.developer_fee,
        ),
    ]
}

/// Difficulty to use after the chain has grown to `chain_len` blocks.
/// Fixed ratchet: +1 whenever the length reaches a multiple of the interval.
pub fn next_difficulty(current: u32, chain_len: usize) -> u32 {
    if chain_len > 0 && chain_len as u64 % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 {
        current.saturating_add(1)
    } else {
        current
    }
}

/// Find a valid nonce by incrementing `block.nonce` from its current value.
/// Simple CPU single-threaded loop without a cancellation point; used for genesis.
pub fn find_valid_nonce(block: &mut Block) -> Result<(), EncodeError> {
    loop {
        let hash = block.compute_hash()?;
        if meets_difficulty(&hash, block.difficulty) {
            block.hash = hash;
            return Ok(());
        }

        block.nonce = block.nonce.wrapping_add(1);
        // yield occasionally so OS scheduler can run other threads
        if block.nonce % PROGRESS_LOG_INTERVAL == 0 {
            std::thread::yield_now();
        }
    }
}

/// Interruptible nonce search. Caller should run this in spawn_blocking.
pub fn seal(block: &mut Block, cancel: &AtomicBool) -> Result<(), ConsensusError> {
    seal_with_progress(block, cancel, |_| {})
}

/// Like [`seal`], reporting the observed hash rate (H/s) roughly once per second.
pub fn seal_with_progress(
    block: &mut Block,
    cancel: &AtomicBool,
    mut on_rate: impl FnMut(f64),
) -> Result<(), ConsensusError> {
    let started = Instant::now();
    let mut last_rate_update = started;
    let mut hashes_since_update: u64 = 0;
    let mut tried: u64 = 0;

    // ⛏️ CPU mining loop
    loop {
        if tried % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            log::info!(
                "⛔ Sealing of block {} cancelled after {} nonces",
                block.index,
                tried
            );
            return Err(ConsensusError::Cancelled);
        }

        let hash = block.compute_hash()?;
        if meets_difficulty(&hash, block.difficulty) {
            block.hash = hash;
            return Ok(());
        }

        block.nonce = block.nonce.wrapping_add(1);
        tried += 1;
        hashes_since_update += 1;

        if tried % CANCEL_CHECK_INTERVAL == 0 {
            let elapsed = last_rate_update.elapsed();
            if elapsed.as_secs() >= 1 {
                on_rate(hashes_since_update as f64 / elapsed.as_secs_f64());
                hashes_since_update = 0;
                last_rate_update = Instant::now();
            }
        }

        if tried % PROGRESS_LOG_INTERVAL == 0 {
            let total = started.elapsed().as_secs_f64();
            let avg = if total > 0.0 { tried as f64 / total } else { 0.0 };
            log::debug!(
                "⛏️  Mining progress: {} hashes tried, avg {:.2} H/s (difficulty: {})",
                tried,
                avg,
                block.difficulty
            );
        }
    }
}

/// An unsealed block plus the number of its leading transactions that came from the mempool.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: Block,
    drained: usize,
}

impl Candidate {
    /// The mempool transactions in this candidate, in drain order.
    pub fn drained_transactions(&self) -> &[Transaction] {
        &self.block.transactions[..self.drained]
    }

    /// Consume the candidate, keeping only the mempool transactions (rewards are dropped).
    pub fn into_drained(self) -> Vec<Transaction> {
        let mut txs = self.block.transactions;
        txs.truncate(self.drained);
        txs
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub index: u64,
    pub hash: String,
    pub transactions: usize,
    /// New difficulty if this block triggered the ratchet.
    pub difficulty_raised_to: Option<u32>,
}

impl Blockchain {
    /// Drain the mempool and build an unsealed candidate on top of the current tip,
    /// at the current difficulty, with the four reward transactions appended.
    pub fn prepare_candidate(
        &mut self,
        recipients: &RewardRecipients,
    ) -> Result<Candidate, ChainError> {
        let tip = self.latest_block()?;
        let index = tip.index + 1;
        let previous_hash = tip.hash.clone();

        let pending = self.mempool.drain_all();
        let drained = pending.len();
        let mut transactions = pending.clone();
        transactions.extend(reward_transactions(index, recipients));

        let block = match Block::new(index, previous_hash, transactions, self.difficulty) {
            Ok(block) => block,
            Err(e) => {
                self.mempool.requeue_front(pending);
                return Err(e.into());
            }
        };
        log::debug!(
            "Candidate block {} prepared: {} mempool txs + 4 rewards, difficulty {}",
            index,
            drained,
            self.difficulty
        );
        Ok(Candidate { block, drained })
    }

    /// Append a sealed block and apply the difficulty ratchet.
    pub fn apply_block(&mut self, block: Block) -> Result<CommitOutcome, ChainError> {
        let index = block.index;
        let hash = block.hash.clone();
        let transactions = block.transactions.len();
        self.append(block)?;

        let next = next_difficulty(self.difficulty, self.blocks.len());
        let difficulty_raised_to = if next != self.difficulty {
            log::info!(
                "📈 Difficulty raised from {} to {} at height {}",
                self.difficulty,
                next,
                index
            );
            self.difficulty = next;
            Some(next)
        } else {
            None
        };

        Ok(CommitOutcome {
            index,
            hash,
            transactions,
            difficulty_raised_to,
        })
    }

    /// Append a sealed candidate. On rejection the drained transactions go back to
    /// the front of the mempool and the error is returned.
    pub fn commit(&mut self, candidate: Candidate) -> Result<CommitOutcome, ChainError> {
        let drained = candidate.drained_transactions().to_vec();
        match self.apply_block(candidate.block) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::warn!(
                    "Mined block rejected ({}), returning {} txs to the mempool",
                    e,
                    drained.len()
                );
                self.mempool.requeue_front(drained);
                Err(e)
            }
        }
    }

    /// Give up on a candidate without appending it.
    pub fn abandon(&mut self, candidate: Candidate) {
        let drained = candidate.into_drained();
        if !drained.is_empty() {
            log::info!("Returning {} txs to the mempool", drained.len());
        }
        self.mempool.requeue_front(drained);
    }

    /// One full mining cycle in the caller's thread: drain, seal, append, ratchet.
    pub fn mine(
        &mut self,
        recipients: &RewardRecipients,
        cancel: &AtomicBool,
    ) -> Result<CommitOutcome, ConsensusError> {
        let mut candidate = self.prepare_candidate(recipients)?;
        if let Err(e) = seal(&mut candidate.block, cancel) {
            self.abandon(candidate);
            return Err(e);
        }
        Ok(self.commit(candidate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::config::DEVELOPER_ADDRESS;

    const MINER: &str = "0x000000000000000000000000000000000000000a";
    const STAKER: &str = "0x000000000000000000000000000000000000000b";
    const TREASURY: &str = "0x000000000000000000000000000000000000000c";
    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn recipients() -> RewardRecipients {
        RewardRecipients::new(MINER, STAKER, TREASURY)
    }

    fn never() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn reward_transactions_sum_to_block_reward() {
        let txs = reward_transactions(7, &recipients());
        assert_eq!(txs.len(), 4);
        let ids: Vec<_> = txs.iter().map(|t| t.id()).collect();
        assert_eq!(
            ids,
            vec!["miner-reward-7", "staker-reward-7", "treasury-reward-7", "dev-fee-7"]
        );
        assert!(txs.iter().all(|t| t.sender() == "SYSTEM"));
        assert_eq!(txs[3].receiver(), DEVELOPER_ADDRESS);
        let total: Amount = txs.iter().map(|t| t.amount()).sum();
        assert_eq!(total, BLOCK_REWARD);
    }

    #[test]
    fn ratchet_every_ten_blocks() {
        assert_eq!(next_difficulty(2, 9), 2);
        assert_eq!(next_difficulty(2, 10), 3);
        assert_eq!(next_difficulty(3, 11), 3);
        assert_eq!(next_difficulty(3, 20), 4);
    }

    #[test]
    fn seal_meets_difficulty() {
        let mut block = Block::new(1, "00".repeat(32), vec![], 2).unwrap();
        seal(&mut block, &never()).unwrap();
        assert!(block.hash.starts_with("00"));
        assert!(block.has_valid_proof().unwrap());
    }

    #[test]
    fn seal_observes_cancellation() {
        // difficulty 64 is unreachable; only the flag can end the loop
        let mut block = Block::new(1, "00".repeat(32), vec![], 64).unwrap();
        let cancel = AtomicBool::new(true);
        let err = seal(&mut block, &cancel).unwrap_err();
        assert!(matches!(err, ConsensusError::Cancelled));
    }

    #[test]
    fn mining_cycle_drains_mempool_and_adds_rewards() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.submit(Transaction::new("A", ALICE, BOB, Amount::from_zar(1), 0));
        chain.submit(Transaction::new("B", BOB, ALICE, Amount::from_zar(1), 0));

        let outcome = chain.mine(&recipients(), &never()).unwrap();
        assert_eq!(outcome.index, 1);
        assert_eq!(outcome.transactions, 6);
        assert!(chain.mempool().is_empty());

        let block = chain.latest_block().unwrap();
        let ids: Vec<_> = block.transactions.iter().map(|t| t.id()).collect();
        assert_eq!(&ids[..2], &["A", "B"]);
        assert_eq!(
            block.transactions.iter().filter(|t| t.sender() == "SYSTEM").count(),
            4
        );
        assert!(block.hash.starts_with('0'));
        chain.verify().unwrap();
    }

    #[test]
    fn rewards_credit_recipients() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.mine(&recipients(), &never()).unwrap();
        assert_eq!(chain.balance(MINER).to_string(), "5.9994");
        assert_eq!(chain.balance(STAKER).to_string(), "2.9997");
        assert_eq!(chain.balance(TREASURY).to_string(), "0.9999");
        assert_eq!(chain.balance(DEVELOPER_ADDRESS).to_string(), "0.001");
    }

    #[test]
    fn checksummed_recipients_are_credited_lowercase() {
        let recipients = RewardRecipients::new(
            "0xABCDEF0000000000000000000000000000000001",
            STAKER,
            TREASURY,
        );
        assert_eq!(recipients.miner, "0xabcdef0000000000000000000000000000000001");

        let mut chain = Blockchain::new(1).unwrap();
        chain.mine(&recipients, &never()).unwrap();
        assert_eq!(
            chain.balance("0xabcdef0000000000000000000000000000000001").to_string(),
            "5.9994"
        );
    }

    #[test]
    fn difficulty_ratchets_when_chain_reaches_ten_blocks() {
        let mut chain = Blockchain::new(1).unwrap();
        for _ in 0..8 {
            let outcome = chain.mine(&recipients(), &never()).unwrap();
            assert_eq!(outcome.difficulty_raised_to, None);
        }
        assert_eq!(chain.len(), 9);
        let outcome = chain.mine(&recipients(), &never()).unwrap();
        assert_eq!(chain.len(), 10);
        assert_eq!(outcome.difficulty_raised_to, Some(2));
        assert_eq!(chain.difficulty(), 2);
    }

    #[test]
    fn cancelled_cycle_requeues_drained_transactions() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.submit(Transaction::new("A", ALICE, BOB, Amount::from_zar(1), 0));
        chain.submit(Transaction::new("B", ALICE, BOB, Amount::from_zar(1), 0));

        let mut candidate = chain.prepare_candidate(&recipients()).unwrap();
        assert!(chain.mempool().is_empty());
        chain.submit(Transaction::new("late", ALICE, BOB, Amount::from_zar(1), 0));

        candidate.block.difficulty = 64;
        let cancel = AtomicBool::new(true);
        assert!(seal(&mut candidate.block, &cancel).is_err());
        chain.abandon(candidate);

        let ids: Vec<_> = chain.mempool().iter().map(|t| t.id().to_string()).collect();
        assert_eq!(ids, vec!["A", "B", "late"]);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn stale_candidate_is_rejected_and_requeued() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.submit(Transaction::new("A", ALICE, BOB, Amount::from_zar(1), 0));
        let mut stale = chain.prepare_candidate(&recipients()).unwrap();
        seal(&mut stale.block, &never()).unwrap();

        // another block lands first
        chain.mine(&recipients(), &never()).unwrap();

        let err = chain.commit(stale).unwrap_err();
        assert!(matches!(err, ChainError::InvalidLinkage { .. }));
        assert_eq!(chain.mempool().len(), 1);
        assert_eq!(chain.mempool().iter().next().unwrap().id(), "A");
    }

    #[test]
    fn transfer_routes_fee_after_mining() {
        let mut chain = Blockchain::new(1).unwrap();
        chain.submit(Transaction::issuance(
            Sentinel::Faucet,
            "seed",
            ALICE,
            Amount::from_zar(5),
        ));
        chain.mine(&recipients(), &never()).unwrap();
        let dev_before = chain.balance(DEVELOPER_ADDRESS);

        chain.submit(Transaction::new("t", ALICE, BOB, Amount::from_zar(1), 0));
        chain.mine(&recipients(), &never()).unwrap();

        assert_eq!(chain.balance(BOB).to_string(), "0.9999");
        assert_eq!(chain.balance(ALICE), Amount::from_zar(4));
        // one transfer fee plus one more block's developer share
        assert_eq!(
            (chain.balance(DEVELOPER_ADDRESS) - dev_before).to_string(),
            "0.0011"
        );
    }
}
