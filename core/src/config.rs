// Token economics and fee configuration for the ZAR chain
use crate::amount::Amount;

// ========== Identities ==========

/// Developer fee recipient. Also a sentinel sender (issuance, never debited).
pub const DEVELOPER_ADDRESS: &str = "0xa048f7cffb548b05ea90ab94962ed0e9a7fc865b";

pub const SYSTEM_SENDER: &str = "SYSTEM";
pub const FAUCET_SENDER: &str = "FAUCET";

// ========== Fee Model ==========

/// Developer fee: 1 basis point (0.01%) of every user transfer and of every block reward.
pub const FEE_RATE_BPS: i128 = 1;
pub const BPS_DENOMINATOR: i128 = 10_000;

// ========== Block Reward ==========

/// Total issuance per mined block: 10 ZAR.
pub const BLOCK_REWARD: Amount = Amount::from_zar(10);

/// Split of the reward remaining after the developer fee.
pub const MINER_SHARE_PCT: i128 = 60;
pub const STAKER_SHARE_PCT: i128 = 30;
pub const TREASURY_SHARE_PCT: i128 = 10;

// ========== Difficulty ==========

/// Difficulty is raised by one every this many appended blocks.
/// This is a fixed ratchet, not feedback from observed block times.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

// ========== Faucet ==========

pub const FAUCET_AMOUNT: Amount = Amount::from_zar(10);

// ========== External Credits ==========

/// Largest single sentinel credit accepted from outside the node.
pub const MAX_CREDIT_AMOUNT: Amount = Amount::from_zar(1_000_000_000);

// ========== Helper Functions ==========

/// Developer fee owed on `amount`, truncated to whole base units.
pub fn developer_fee(amount: Amount) -> Amount {
    amount.mul_div(FEE_RATE_BPS, BPS_DENOMINATOR)
}

/// What the receiver of a user transfer is credited.
pub fn net_of_fee(amount: Amount) -> Amount {
    amount - developer_fee(amount)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardSplit {
    pub miner: Amount,
    pub staker: Amount,
    pub treasury: Amount,
    pub developer_fee: Amount,
}

impl RewardSplit {
    pub fn total(&self) -> Amount {
        self.miner + self.staker + self.treasury + self.developer_fee
    }
}

/// Split a block reward into miner / staker / treasury / developer shares.
///
/// The treasury takes whatever truncation leaves over, so the four shares always
/// sum to `total` exactly.
pub fn split_block_reward(total: Amount) -> RewardSplit {
    let developer_fee = developer_fee(total);
    let remaining = total - developer_fee;
    let miner = remaining.percent(MINER_SHARE_PCT);
    let staker = remaining.percent(STAKER_SHARE_PCT);
    let treasury = remaining - miner - staker;

    RewardSplit {
        miner,
        staker,
        treasury,
        developer_fee,
    }
}
