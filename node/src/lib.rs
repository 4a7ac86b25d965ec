mod engine;
pub mod error;
pub mod handle;
pub mod index;
pub mod miner;

pub use engine::ChainInfo;
pub use error::NodeError;
pub use handle::NodeHandle;
pub use index::{TxRecord, TxStatus};
pub use miner::{MiningState, MiningStatus};

use engine::Engine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use zar_core::consensus::RewardRecipients;
use zar_core::{Blockchain, ChainStore};

/// Pending requests the engine will buffer before callers wait.
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Spawn the chain engine on the blocking pool of the current tokio runtime.
/// `recipients` are the reward addresses used by the faucet and the periodic miner.
pub fn start(
    chain: Blockchain,
    store: Box<dyn ChainStore>,
    recipients: RewardRecipients,
) -> (NodeHandle, JoinHandle<()>) {
    let (commands, inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let engine = Engine::new(chain, store);
    let join = tokio::task::spawn_blocking(move || engine.run(inbox));
    (NodeHandle::new(commands, recipients), join)
}

/// Spawn the periodic sleep-then-mine loop.
pub fn spawn_miner(handle: NodeHandle, interval: Duration) -> JoinHandle<()> {
    let recipients = handle.recipients().clone();
    tokio::spawn(miner::mining_loop(handle, recipients, interval))
}
