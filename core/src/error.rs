//! Error types shared by the chain, consensus and decoder layers.

use thiserror::Error;

/// Rejections raised while extending or inspecting the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid linkage: block links to {found}, chain tip is {expected}")]
    InvalidLinkage { expected: String, found: String },

    #[error("invalid proof for block {index}: hash {hash} does not match its contents at difficulty {difficulty}")]
    InvalidProof {
        index: u64,
        hash: String,
        difficulty: u32,
    },

    #[error("block {index} would take the balance of {address} out of range")]
    BalanceOverflow { index: u64, address: String },

    /// Only reachable through a corrupted restore; a constructed chain always holds genesis.
    #[error("chain has no blocks")]
    EmptyChain,

    #[error("failed to encode block for hashing: {0}")]
    Encoding(#[from] bincode::error::EncodeError),
}

/// Failures of a mining cycle.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("mining cancelled")]
    Cancelled,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl From<bincode::error::EncodeError> for ConsensusError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ConsensusError::Chain(ChainError::Encoding(err))
    }
}

/// Rejections of an externally supplied raw transfer payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("unsupported transaction shape: {0}")]
    UnsupportedShape(String),

    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidAddressLength(usize),

    #[error("transaction value must be greater than 0")]
    NonPositiveValue,

    #[error("transaction value exceeds the ledger range")]
    ValueOverflow,
}

impl From<rlp::DecoderError> for DecodeError {
    fn from(err: rlp::DecoderError) -> Self {
        DecodeError::MalformedEncoding(err.to_string())
    }
}

impl From<hex::FromHexError> for DecodeError {
    fn from(err: hex::FromHexError) -> Self {
        DecodeError::MalformedEncoding(format!("invalid hex: {}", err))
    }
}
