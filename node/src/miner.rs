use crate::error::NodeError;
use crate::handle::NodeHandle;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::time::{Duration, sleep};
use zar_core::consensus::{self, CommitOutcome, RewardRecipients};

/// Shared mining flags and statistics.
pub struct MiningState {
    /// Set to abort the nonce search in progress
    pub cancel_flag: Arc<AtomicBool>,
    pub active: AtomicBool,
    stopping: AtomicBool,
    stop_signal: Notify,
    pub current_difficulty: AtomicU32,
    pub current_hashrate: Arc<Mutex<f64>>,
    pub blocks_mined: AtomicU64,
    /// Periodic and triggered cycles run one at a time.
    cycle: tokio::sync::Mutex<()>,
}

impl Default for MiningState {
    fn default() -> Self {
        Self {
            cancel_flag: Arc::new(AtomicBool::new(false)),
            active: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            stop_signal: Notify::new(),
            current_difficulty: AtomicU32::new(0),
            current_hashrate: Arc::new(Mutex::new(0.0)),
            blocks_mined: AtomicU64::new(0),
            cycle: tokio::sync::Mutex::new(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MiningStatus {
    pub active: bool,
    pub current_difficulty: u32,
    pub blocks_mined: u64,
    pub hashrate: f64,
}

impl MiningState {
    pub fn status(&self) -> MiningStatus {
        MiningStatus {
            active: self.active.load(Ordering::Relaxed),
            current_difficulty: self.current_difficulty.load(Ordering::Relaxed),
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            hashrate: *self.current_hashrate.lock(),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Abort the current search and end the periodic loop. Further cycles are refused.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
    }
}

/// Run one mining cycle in its own task and wait for it.
///
/// The task owns the drained candidate, so a caller that stops waiting cannot
/// strand it: the cycle still ends in a commit or a requeue.
pub(crate) async fn run_cycle(
    handle: &NodeHandle,
    recipients: &RewardRecipients,
) -> Result<CommitOutcome, NodeError> {
    let task = tokio::spawn(mine_one(handle.clone(), recipients.clone()));
    task.await
        .map_err(|e| NodeError::MiningTask(e.to_string()))?
}

/// Drain on the actor, seal off it, commit on the actor.
async fn mine_one(
    handle: NodeHandle,
    recipients: RewardRecipients,
) -> Result<CommitOutcome, NodeError> {
    let mining = handle.mining().clone();
    // held until commit or abandon, so the cancel flag is never reset under a live seal
    let _cycle = mining.cycle.lock().await;
    if mining.is_stopping() {
        return Err(consensus_cancelled());
    }
    mining.cancel_flag.store(false, Ordering::SeqCst);

    let candidate = handle.prepare_candidate(recipients).await?;
    let index = candidate.block.index;
    let difficulty = candidate.block.difficulty;
    log::info!(
        "⛏️ Mining block {} with {} pending tx(s) at difficulty {}",
        index,
        candidate.drained_transactions().len(),
        difficulty
    );
    mining.current_difficulty.store(difficulty, Ordering::Relaxed);
    mining.active.store(true, Ordering::Relaxed);

    // Run CPU-bound mining in a blocking task so we don't block the tokio runtime
    let backup = candidate.clone();
    let cancel = mining.cancel_flag.clone();
    let hashrate = mining.current_hashrate.clone();
    let sealed = tokio::task::spawn_blocking(move || {
        let mut candidate = candidate;
        let result = consensus::seal_with_progress(&mut candidate.block, &cancel, |rate| {
            *hashrate.lock() = rate;
            log::debug!("⛏️  Current hashrate: {:.2} H/s", rate);
        });
        (candidate, result)
    })
    .await;
    mining.active.store(false, Ordering::Relaxed);

    match sealed {
        Ok((candidate, Ok(()))) => {
            let outcome = handle.commit(candidate).await?;
            mining.blocks_mined.fetch_add(1, Ordering::Relaxed);
            if let Some(next) = outcome.difficulty_raised_to {
                mining.current_difficulty.store(next, Ordering::Relaxed);
            }
            log::info!(
                "✅ Mined new block index={} hash={}",
                outcome.index,
                outcome.hash
            );
            Ok(outcome)
        }
        Ok((candidate, Err(e))) => {
            handle.abandon(candidate).await?;
            Err(e.into())
        }
        Err(join_err) => {
            log::error!("⛏️ Mining task failed: {}", join_err);
            handle.abandon(backup).await?;
            Err(NodeError::MiningTask(join_err.to_string()))
        }
    }
}

fn consensus_cancelled() -> NodeError {
    NodeError::Consensus(zar_core::ConsensusError::Cancelled)
}

/// Sleep, mine, repeat, until [`MiningState::stop`] is called or the engine goes away.
pub async fn mining_loop(handle: NodeHandle, recipients: RewardRecipients, interval: Duration) {
    let mining = handle.mining().clone();
    log::info!("🚀 mining starting (every {:?})", interval);

    while !mining.is_stopping() {
        tokio::select! {
            _ = sleep(interval) => {}
            _ = mining.stop_signal.notified() => {}
        }
        if mining.is_stopping() {
            break;
        }

        match run_cycle(&handle, &recipients).await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => log::info!("⛔ Mining cycle cancelled"),
            Err(NodeError::EngineStopped) => break,
            Err(e) => log::warn!("⛏️ Mining cycle failed: {}", e),
        }
    }
    log::info!("Mining loop stopped");
}
