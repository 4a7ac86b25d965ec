use crate::transaction::Transaction;
use bincode::{Decode, Encode};
use hex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Encode, Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64, // unix seconds
    pub previous_hash: String,
    pub hash: String, // hex, computed over everything except `hash` and `signature`
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub difficulty: u32,
    /// Reserved for a validator-signed path; unused by proof-of-work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let h1 = Sha256::digest(data);
    let h2 = Sha256::digest(h1);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h2);
    out
}

pub fn to_hex(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

/// Number of leading `'0'` nibbles in a hex digest.
pub fn leading_zero_nibbles(hash: &str) -> u32 {
    hash.bytes().take_while(|&b| b == b'0').count() as u32
}

/// Proof-of-work target: at least `difficulty` leading zero nibbles.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

impl Block {
    /// Build an unsealed block stamped with the current time and nonce 0.
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Self, bincode::error::EncodeError> {
        let mut block = Block {
            index,
            timestamp: chrono::Utc::now().timestamp(),
            previous_hash: previous_hash.into(),
            hash: String::new(),
            transactions,
            nonce: 0,
            difficulty,
            validator: None,
            signature: None,
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Canonical byte encoding fed to the digest.
    /// Uses fixed-length integers so the layout does not depend on magnitudes.
    pub fn serialize_for_hash(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        let config = bincode::config::standard().with_fixed_int_encoding();
        bincode::encode_to_vec(
            &(
                self.index,
                self.timestamp,
                self.previous_hash.as_str(),
                self.transactions.as_slice(),
                self.nonce,
                self.validator.as_deref(),
            ),
            config,
        )
    }

    pub fn compute_hash(&self) -> Result<String, bincode::error::EncodeError> {
        let bytes = self.serialize_for_hash()?;
        Ok(to_hex(&sha256d(&bytes)))
    }

    /// Stored hash is a faithful recomputation and meets the recorded difficulty.
    pub fn has_valid_proof(&self) -> Result<bool, bincode::error::EncodeError> {
        Ok(self.hash == self.compute_hash()? && meets_difficulty(&self.hash, self.difficulty))
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }
}
