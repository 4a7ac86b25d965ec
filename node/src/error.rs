use thiserror::Error;
use zar_core::{Amount, ChainError, ConsensusError, DecodeError};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("insufficient balance: have {have} ZAR, need {need} ZAR")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("unknown sentinel tag: {0}")]
    UnknownSentinel(String),

    #[error("credit amount must be greater than 0")]
    NonPositiveCredit,

    #[error("credit amount {amount} ZAR exceeds the {max} ZAR limit")]
    CreditTooLarge { amount: Amount, max: Amount },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Consensus(ConsensusError),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("chain engine is not running")]
    EngineStopped,

    #[error("mining task failed: {0}")]
    MiningTask(String),
}

impl From<ConsensusError> for NodeError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::Chain(e) => NodeError::Chain(e),
            other => NodeError::Consensus(other),
        }
    }
}

impl NodeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::Consensus(ConsensusError::Cancelled))
    }
}
