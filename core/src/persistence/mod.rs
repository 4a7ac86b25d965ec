//! Durable chain state: a JSON snapshot (`chaindata.json`) plus a block WAL (`blocks.wal`).
//!
//! Every appended block is logged to the WAL first; every `checkpoint_interval`
//! blocks the whole state is written as a snapshot and the WAL is cleared.
//!
//! Durability risk: `load` treats a missing snapshot and a corrupt one the same
//! way and starts over from a fresh genesis block. A transient read failure
//! therefore discards history, and the next checkpoint overwrites the bad file.

mod wal;

pub use wal::{BINCODE_CONFIG, BlockWal};

use crate::block::Block;
use crate::blockchain::{Blockchain, Ledger};
use crate::error::ChainError;
use crate::mempool::Mempool;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FILE: &str = "chaindata.json";
pub const WAL_FILE: &str = "blocks.wal";

/// On-disk image of the full chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub mempool: Mempool,
    pub balances: Ledger,
}

impl Snapshot {
    pub fn capture(chain: &Blockchain) -> Self {
        Snapshot {
            blocks: chain.blocks.clone(),
            difficulty: chain.difficulty,
            mempool: chain.mempool.clone(),
            balances: chain.ledger.clone(),
        }
    }

    /// Rebuild a chain, rejecting block history that fails linkage or proof checks.
    ///
    /// The stored balance map is checked against a replay of the blocks; if they
    /// disagree the replayed ledger wins.
    pub fn restore(self) -> Result<Blockchain, ChainError> {
        let replayed = Ledger::replay(&self.blocks)?;
        let ledger = if replayed == self.balances {
            self.balances
        } else {
            log::warn!("⚠️  Snapshot balances disagree with block history; using replayed ledger");
            replayed
        };
        let chain = Blockchain::from_parts(self.blocks, self.difficulty, self.mempool, ledger)?;
        chain.verify()?;
        Ok(chain)
    }
}

/// Somewhere chain state can be written to and read back from.
pub trait ChainStore: Send {
    /// Write the complete state, replacing whatever was stored before.
    fn save(&mut self, chain: &Blockchain) -> Result<()>;

    /// Record `block`, which has just been appended to `chain`.
    fn record_block(&mut self, chain: &Blockchain, block: &Block) -> Result<()>;

    /// Restore the stored state, or a fresh genesis chain at `initial_difficulty`
    /// if there is none or it cannot be used.
    fn load(&mut self, initial_difficulty: u32) -> Result<Blockchain>;
}

/// File-backed store rooted at one data directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    wal: BlockWal,
    checkpoint_interval: u64,
    since_checkpoint: u64,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, checkpoint_interval: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create data dir {}", dir.display()))?;
        let wal = BlockWal::new(dir.join(WAL_FILE));
        Ok(FileStore {
            dir,
            wal,
            checkpoint_interval: checkpoint_interval.max(1),
            since_checkpoint: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn wal_path(&self) -> &Path {
        self.wal.path()
    }

    fn read_snapshot(&self) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        let snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parse snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }

    fn restore_snapshot(&self, initial_difficulty: u32) -> Result<Blockchain> {
        let fallback = |reason: String| -> Result<Blockchain> {
            log::warn!(
                "⚠️  {}; starting from a fresh genesis chain (stored history is discarded)",
                reason
            );
            Ok(Blockchain::new(initial_difficulty)?)
        };

        match self.read_snapshot() {
            Ok(Some(snapshot)) => match snapshot.restore() {
                Ok(chain) => {
                    log::info!(
                        "Loaded snapshot: height={} difficulty={} mempool={}",
                        chain.height(),
                        chain.difficulty(),
                        chain.mempool().len()
                    );
                    Ok(chain)
                }
                Err(e) => fallback(format!("Snapshot failed verification: {}", e)),
            },
            Ok(None) => {
                log::info!("No snapshot at {}, creating genesis", self.snapshot_path().display());
                Ok(Blockchain::new(initial_difficulty)?)
            }
            Err(e) => fallback(format!("Snapshot unreadable: {:#}", e)),
        }
    }

    /// Re-append logged blocks newer than the chain tip, through the normal append path.
    fn replay_wal(&self, chain: &mut Blockchain) -> Result<usize> {
        let mut replayed = 0;
        for block in self.wal.read_all()? {
            if block.index <= chain.height() {
                continue;
            }
            let included = block.transactions.clone();
            if let Err(e) = chain.apply_block(block) {
                log::warn!("⚠️  WAL replay stopped: {}", e);
                break;
            }
            chain.mempool.remove_included(&included);
            replayed += 1;
        }
        if replayed > 0 {
            log::info!("Replayed {} block(s) from WAL, height now {}", replayed, chain.height());
        }
        Ok(replayed)
    }
}

impl ChainStore for FileStore {
    fn save(&mut self, chain: &Blockchain) -> Result<()> {
        let path = self.snapshot_path();
        let tmp = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        let json = serde_json::to_vec_pretty(&Snapshot::capture(chain))
            .context("serialize snapshot")?;

        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        self.wal.truncate()?;
        self.since_checkpoint = 0;

        log::info!(
            "💾 Snapshot written: height={} difficulty={} ({})",
            chain.height(),
            chain.difficulty(),
            path.display()
        );
        Ok(())
    }

    fn record_block(&mut self, chain: &Blockchain, block: &Block) -> Result<()> {
        self.wal.append(block)?;
        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.checkpoint_interval {
            self.save(chain)?;
        }
        Ok(())
    }

    fn load(&mut self, initial_difficulty: u32) -> Result<Blockchain> {
        let mut chain = self.restore_snapshot(initial_difficulty)?;
        self.replay_wal(&mut chain)?;
        // fold the WAL into a fresh checkpoint so the two never disagree
        self.save(&chain)?;
        Ok(chain)
    }
}

/// In-memory store holding the last saved JSON snapshot. Logged blocks count
/// toward the checkpoint interval like the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Option<String>,
    pending: Vec<Block>,
    checkpoint_interval: u64,
    saves: usize,
}

impl MemoryStore {
    pub fn new(checkpoint_interval: u64) -> Self {
        MemoryStore {
            checkpoint_interval: checkpoint_interval.max(1),
            ..Default::default()
        }
    }

    /// Number of full snapshots written so far.
    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn snapshot_json(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }
}

impl ChainStore for MemoryStore {
    fn save(&mut self, chain: &Blockchain) -> Result<()> {
        self.snapshot = Some(serde_json::to_string(&Snapshot::capture(chain))?);
        self.pending.clear();
        self.saves += 1;
        Ok(())
    }

    fn record_block(&mut self, chain: &Blockchain, block: &Block) -> Result<()> {
        self.pending.push(block.clone());
        if self.pending.len() as u64 >= self.checkpoint_interval {
            self.save(chain)?;
        }
        Ok(())
    }

    fn load(&mut self, initial_difficulty: u32) -> Result<Blockchain> {
        let restored = self
            .snapshot
            .as_deref()
            .map(|json| -> Result<Blockchain> {
                let snapshot: Snapshot = serde_json::from_str(json)?;
                Ok(snapshot.restore()?)
            });
        let mut chain = match restored {
            Some(Ok(chain)) => chain,
            Some(Err(e)) => {
                log::warn!("⚠️  Stored snapshot unusable ({:#}); starting from genesis", e);
                Blockchain::new(initial_difficulty)?
            }
            None => Blockchain::new(initial_difficulty)?,
        };
        for block in std::mem::take(&mut self.pending) {
            if block.index <= chain.height() {
                continue;
            }
            let included = block.transactions.clone();
            chain.apply_block(block)?;
            chain.mempool.remove_included(&included);
        }
        Ok(chain)
    }
}
