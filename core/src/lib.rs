pub mod amount;
pub mod block;
pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod decoder;
pub mod error;
pub mod mempool;
pub mod persistence;
pub mod transaction;

// Explicit re-exports to avoid ambiguous glob re-exports
pub use amount::Amount;
pub use block::Block;
pub use blockchain::{Blockchain, Ledger};
pub use consensus::{Candidate, CommitOutcome, RewardRecipients};
pub use decoder::{DecodedTransfer, RawTransactionDecoder, SenderRecovery};
pub use error::{ChainError, ConsensusError, DecodeError};
pub use mempool::Mempool;
pub use persistence::{ChainStore, FileStore, MemoryStore, Snapshot};
pub use transaction::{Sentinel, Transaction};
