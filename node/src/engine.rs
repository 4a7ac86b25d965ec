//! The chain actor: sole owner of the [`Blockchain`], its store and the transfer index.
//!
//! Every read and write arrives as a [`Command`] and is handled to completion before
//! the next one, so a balance read never sees a half-applied block and an ingestion
//! balance check and its enqueue see the same ledger.
//!
//! The engine runs on a blocking thread: store writes hit the disk synchronously.

use crate::error::NodeError;
use crate::index::{TxIndex, TxRecord, TxStatus};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use zar_core::consensus::{Candidate, CommitOutcome, RewardRecipients};
use zar_core::decoder::DecodedTransfer;
use zar_core::{Amount, Block, Blockchain, ChainStore, Sentinel, Transaction};

/// Read-only summary of the chain tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub height: u64,
    pub latest_hash: String,
    pub difficulty: u32,
    pub mempool_size: usize,
}

pub(crate) enum Command {
    Ingest {
        transfer: DecodedTransfer,
        reply: oneshot::Sender<Result<String, NodeError>>,
    },
    Credit {
        sentinel: Sentinel,
        receiver: String,
        amount: Amount,
        reply: oneshot::Sender<String>,
    },
    Balance {
        address: String,
        reply: oneshot::Sender<Amount>,
    },
    ChainInfo {
        reply: oneshot::Sender<Result<ChainInfo, NodeError>>,
    },
    Block {
        index: u64,
        reply: oneshot::Sender<Option<Block>>,
    },
    TxStatus {
        reference: String,
        reply: oneshot::Sender<Option<TxStatus>>,
    },
    TxCount {
        address: String,
        reply: oneshot::Sender<u64>,
    },
    PrepareCandidate {
        recipients: RewardRecipients,
        reply: oneshot::Sender<Result<Candidate, NodeError>>,
    },
    Commit {
        candidate: Candidate,
        reply: oneshot::Sender<Result<CommitOutcome, NodeError>>,
    },
    Abandon {
        candidate: Candidate,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
}

pub(crate) struct Engine {
    chain: Blockchain,
    store: Box<dyn ChainStore>,
    index: TxIndex,
    credit_seq: u64,
}

impl Engine {
    pub(crate) fn new(chain: Blockchain, store: Box<dyn ChainStore>) -> Self {
        Engine {
            chain,
            store,
            index: TxIndex::new(),
            credit_seq: 0,
        }
    }

    /// Serve commands until shutdown. Must be called off the async runtime.
    pub(crate) fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        log::info!(
            "Chain engine started at height {} (difficulty {})",
            self.chain.height(),
            self.chain.difficulty()
        );
        while let Some(cmd) = commands.blocking_recv() {
            if !self.handle(cmd) {
                return;
            }
        }

        // every handle dropped without an explicit shutdown
        if let Err(e) = self.persist() {
            log::error!("Final snapshot failed: {}", e);
        }
    }

    /// Returns false once the engine should stop.
    fn handle(&mut self, cmd: Command) -> bool {
        // a dropped reply receiver just means the caller gave up waiting
        match cmd {
            Command::Ingest { transfer, reply } => {
                let _ = reply.send(self.ingest(transfer));
            }
            Command::Credit {
                sentinel,
                receiver,
                amount,
                reply,
            } => {
                let _ = reply.send(self.credit(sentinel, receiver, amount));
            }
            Command::Balance { address, reply } => {
                let _ = reply.send(self.chain.balance(&address));
            }
            Command::ChainInfo { reply } => {
                let _ = reply.send(self.chain_info());
            }
            Command::Block { index, reply } => {
                let _ = reply.send(self.chain.block(index).cloned());
            }
            Command::TxStatus { reference, reply } => {
                let _ = reply.send(self.index.status(&reference));
            }
            Command::TxCount { address, reply } => {
                let _ = reply.send(self.index.transaction_count(&address));
            }
            Command::PrepareCandidate { recipients, reply } => {
                let candidate = self.chain.prepare_candidate(&recipients).map_err(Into::into);
                if let Err(candidate) = reply.send(candidate) {
                    // miner went away between asking and receiving
                    if let Ok(candidate) = candidate {
                        self.chain.abandon(candidate);
                    }
                }
            }
            Command::Commit { candidate, reply } => {
                let _ = reply.send(self.commit(candidate));
            }
            Command::Abandon { candidate, reply } => {
                self.chain.abandon(candidate);
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.persist());
                log::info!("Chain engine stopped at height {}", self.chain.height());
                return false;
            }
        }
        true
    }

    fn chain_info(&self) -> Result<ChainInfo, NodeError> {
        Ok(ChainInfo {
            height: self.chain.height(),
            latest_hash: self.chain.latest_hash()?.to_string(),
            difficulty: self.chain.difficulty(),
            mempool_size: self.chain.mempool().len(),
        })
    }

    /// Balance check, enqueue and index insert as one step.
    fn ingest(&mut self, transfer: DecodedTransfer) -> Result<String, NodeError> {
        if self.index.contains(&transfer.reference) {
            log::info!("Transfer {} already accepted, not re-queued", transfer.reference);
            return Ok(transfer.reference);
        }

        let have = self.chain.balance(&transfer.sender);
        if have < transfer.amount {
            log::warn!(
                "🚫 Transfer rejected: {} has {} ZAR, needs {} ZAR",
                transfer.sender,
                have,
                transfer.amount
            );
            return Err(NodeError::InsufficientBalance {
                have,
                need: transfer.amount,
            });
        }

        let tx = transfer.to_transaction(Utc::now().timestamp());
        self.chain.submit(tx);
        self.index.insert(TxRecord::pending(&transfer));
        log::info!(
            "📥 Transfer accepted: {} -> {} | {} ZAR ({})",
            transfer.sender,
            transfer.receiver,
            transfer.amount,
            transfer.reference
        );
        Ok(transfer.reference)
    }

    fn credit(&mut self, sentinel: Sentinel, receiver: String, amount: Amount) -> String {
        self.credit_seq += 1;
        let tag = match sentinel {
            Sentinel::System => "system",
            Sentinel::Faucet => "faucet",
            Sentinel::Developer => "dev",
        };
        let id = format!(
            "credit-{}-{}-{}",
            tag,
            Utc::now().timestamp(),
            self.credit_seq
        );
        log::info!("💰 {} credit queued: {} ZAR -> {}", sentinel, amount, receiver);
        self.chain
            .submit(Transaction::issuance(sentinel, id.clone(), receiver, amount));
        id
    }

    fn commit(&mut self, candidate: Candidate) -> Result<CommitOutcome, NodeError> {
        let outcome = self.chain.commit(candidate)?;
        let block = self.chain.latest_block()?.clone();
        self.index.mark_included(&block);
        if let Err(e) = self.store.record_block(&self.chain, &block) {
            // the block stays applied in memory; the next checkpoint retries the write
            log::error!("Failed to persist block {}: {:#}", block.index, e);
        }
        Ok(outcome)
    }

    fn persist(&mut self) -> Result<(), NodeError> {
        self.store
            .save(&self.chain)
            .map_err(|e| NodeError::Persistence(format!("{:#}", e)))
    }
}
