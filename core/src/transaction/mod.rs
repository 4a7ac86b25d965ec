use crate::amount::Amount;
use crate::config::{DEVELOPER_ADDRESS, FAUCET_SENDER, SYSTEM_SENDER};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved sender identities that issue value instead of spending it.
/// Transactions from a sentinel credit the receiver in full and debit nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    System,
    Faucet,
    Developer,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::System => SYSTEM_SENDER,
            Sentinel::Faucet => FAUCET_SENDER,
            Sentinel::Developer => DEVELOPER_ADDRESS,
        }
    }

    /// Classify a sender string. The developer address matches case-insensitively.
    pub fn from_sender(sender: &str) -> Option<Self> {
        if sender == SYSTEM_SENDER {
            Some(Sentinel::System)
        } else if sender == FAUCET_SENDER {
            Some(Sentinel::Faucet)
        } else if sender.eq_ignore_ascii_case(DEVELOPER_ADDRESS) {
            Some(Sentinel::Developer)
        } else {
            None
        }
    }

    pub fn is_sentinel(sender: &str) -> bool {
        Self::from_sender(sender).is_some()
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentinel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sentinel::from_sender(s).ok_or_else(|| format!("not a sentinel sender: {}", s))
    }
}

/// A value transfer. Fields are fixed at construction; there are no setters.
#[derive(Encode, Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: String,
    sender: String,
    receiver: String,
    amount: Amount,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: Amount,
        timestamp: i64,
    ) -> Self {
        Transaction {
            id: id.into(),
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp,
            signature: None,
        }
    }

    /// Issuance from a sentinel identity, stamped with the current time.
    pub fn issuance(
        sentinel: Sentinel,
        id: impl Into<String>,
        receiver: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Transaction::new(
            id,
            sentinel.as_str(),
            receiver,
            amount,
            chrono::Utc::now().timestamp(),
        )
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        Sentinel::from_sender(&self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_recognised() {
        assert_eq!(Sentinel::from_sender("SYSTEM"), Some(Sentinel::System));
        assert_eq!(Sentinel::from_sender("FAUCET"), Some(Sentinel::Faucet));
        assert_eq!(
            Sentinel::from_sender("0xA048F7cfFb548B05eA90ab94962ED0e9A7fC865b"),
            Some(Sentinel::Developer)
        );
        assert_eq!(Sentinel::from_sender("system"), None);
        assert_eq!(Sentinel::from_sender("0x1111111111111111111111111111111111111111"), None);
    }

    #[test]
    fn issuance_uses_sentinel_sender() {
        let tx = Transaction::issuance(Sentinel::Faucet, "faucet-1", "0xabc", Amount::from_zar(3));
        assert_eq!(tx.sender(), "FAUCET");
        assert_eq!(tx.sentinel(), Some(Sentinel::Faucet));
        assert!(tx.signature().is_none());
    }

    #[test]
    fn signature_is_optional_in_json() {
        let tx = Transaction::new("t", "a", "b", Amount::from_zar(1), 7);
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("signature").is_none());

        let signed = tx.with_signature("deadbeef");
        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["signature"], "deadbeef");
        assert_eq!(json["amount"], "1");
    }
}
