use crate::engine::{ChainInfo, Command};
use crate::error::NodeError;
use crate::index::TxStatus;
use crate::miner::{self, MiningState, MiningStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use zar_core::config::{DEVELOPER_ADDRESS, FAUCET_AMOUNT, MAX_CREDIT_AMOUNT, developer_fee};
use zar_core::consensus::{Candidate, CommitOutcome, RewardRecipients};
use zar_core::decoder::RawTransactionDecoder;
use zar_core::{Amount, Block, Sentinel};

/// Cloneable entry point to a running node. Every call is a request to the chain engine.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<Command>,
    decoder: Arc<RawTransactionDecoder>,
    mining: Arc<MiningState>,
    recipients: RewardRecipients,
}

impl NodeHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, recipients: RewardRecipients) -> Self {
        NodeHandle {
            commands,
            decoder: Arc::new(RawTransactionDecoder::new()),
            mining: Arc::new(MiningState::default()),
            recipients,
        }
    }

    pub fn mining(&self) -> &Arc<MiningState> {
        &self.mining
    }

    /// Reward recipients used by the periodic loop and the faucet.
    pub fn recipients(&self) -> &RewardRecipients {
        &self.recipients
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| NodeError::EngineStopped)?;
        response.await.map_err(|_| NodeError::EngineStopped)
    }

    /// Decode a hex raw transfer, check the sender can cover it and queue it.
    /// Returns the transfer reference.
    pub async fn submit_transfer(&self, raw_hex: &str) -> Result<String, NodeError> {
        let transfer = match self.decoder.decode_hex(raw_hex) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("🚫 Raw transfer rejected: {}", e);
                return Err(e.into());
            }
        };
        self.request(|reply| Command::Ingest { transfer, reply })
            .await?
    }

    pub async fn get_balance(&self, address: &str) -> Result<Amount, NodeError> {
        let address = address.to_lowercase();
        self.request(|reply| Command::Balance { address, reply })
            .await
    }

    pub async fn chain_info(&self) -> Result<ChainInfo, NodeError> {
        self.request(|reply| Command::ChainInfo { reply }).await?
    }

    pub async fn get_height(&self) -> Result<u64, NodeError> {
        Ok(self.chain_info().await?.height)
    }

    pub async fn get_latest_block_hash(&self) -> Result<String, NodeError> {
        Ok(self.chain_info().await?.latest_hash)
    }

    pub async fn get_mempool_size(&self) -> Result<usize, NodeError> {
        Ok(self.chain_info().await?.mempool_size)
    }

    pub async fn get_block(&self, index: u64) -> Result<Block, NodeError> {
        self.request(|reply| Command::Block { index, reply })
            .await?
            .ok_or_else(|| NodeError::NotFound(format!("block {}", index)))
    }

    pub async fn get_transaction_status(&self, reference: &str) -> Result<TxStatus, NodeError> {
        let reference = reference.to_lowercase();
        let key = reference.clone();
        self.request(|reply| Command::TxStatus { reference: key, reply })
            .await?
            .ok_or(NodeError::NotFound(format!("transaction {}", reference)))
    }

    /// Number of transfers accepted from `address` (the wallet-facing nonce).
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64, NodeError> {
        let address = address.to_lowercase();
        self.request(|reply| Command::TxCount { address, reply })
            .await
    }

    /// Queue a sentinel-origin credit. `tag` is `SYSTEM`, `FAUCET` or the developer address.
    /// Returns the queued transaction id.
    pub async fn credit_external(
        &self,
        tag: &str,
        receiver: &str,
        amount: Amount,
    ) -> Result<String, NodeError> {
        let sentinel: Sentinel = tag
            .parse()
            .map_err(|_| NodeError::UnknownSentinel(tag.to_string()))?;
        if !amount.is_positive() {
            return Err(NodeError::NonPositiveCredit);
        }
        if amount > MAX_CREDIT_AMOUNT {
            return Err(NodeError::CreditTooLarge {
                amount,
                max: MAX_CREDIT_AMOUNT,
            });
        }
        let receiver = receiver.to_lowercase();
        self.request(|reply| Command::Credit {
            sentinel,
            receiver,
            amount,
            reply,
        })
        .await
    }

    /// Run one mining cycle now, waiting for any cycle already in progress.
    /// The cycle finishes even if this future is dropped.
    pub async fn trigger_mining_cycle(
        &self,
        recipients: &RewardRecipients,
    ) -> Result<CommitOutcome, NodeError> {
        miner::run_cycle(self, recipients).await
    }

    /// Credit the faucet amount (less the developer fee) to `address` and mine it
    /// in immediately. Returns the amount credited to `address`.
    pub async fn request_faucet(&self, address: &str) -> Result<Amount, NodeError> {
        let address = address.to_lowercase();
        if !is_hex_address(&address) {
            return Err(NodeError::InvalidAddress(address));
        }

        let fee = developer_fee(FAUCET_AMOUNT);
        let net = FAUCET_AMOUNT - fee;
        self.credit_external(Sentinel::Faucet.as_str(), &address, net)
            .await?;
        self.credit_external(Sentinel::Faucet.as_str(), DEVELOPER_ADDRESS, fee)
            .await?;
        log::info!("🚰 Faucet: {} ZAR -> {}", net, address);

        let recipients = self.recipients.clone();
        self.trigger_mining_cycle(&recipients).await?;
        Ok(net)
    }

    pub fn mining_status(&self) -> MiningStatus {
        self.mining.status()
    }

    /// Cancel any nonce search in progress and stop the periodic loop.
    pub fn stop_mining(&self) {
        self.mining.stop();
    }

    /// Stop mining, write a final snapshot and stop the engine.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.stop_mining();
        self.request(|reply| Command::Shutdown { reply }).await?
    }

    pub(crate) async fn prepare_candidate(
        &self,
        recipients: RewardRecipients,
    ) -> Result<Candidate, NodeError> {
        self.request(|reply| Command::PrepareCandidate { recipients, reply })
            .await?
    }

    pub(crate) async fn commit(&self, candidate: Candidate) -> Result<CommitOutcome, NodeError> {
        self.request(|reply| Command::Commit { candidate, reply })
            .await?
    }

    pub(crate) async fn abandon(&self, candidate: Candidate) -> Result<(), NodeError> {
        self.request(|reply| Command::Abandon { candidate, reply })
            .await
    }
}

/// `0x` followed by exactly 40 hex digits.
pub fn is_hex_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|digits| digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit()))
}
