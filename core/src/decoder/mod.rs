//! Raw signed-transfer decoding.
//!
//! Accepts the Ethereum-style envelopes wallets produce:
//!
//! | layout      | tag        | fields | to | value | v, r, s    |
//! |-------------|------------|--------|----|-------|------------|
//! | legacy      | none       | 9      | 3  | 4     | 6, 7, 8    |
//! | access list | 0x01       | 12     | 5  | 6     | 9, 10, 11  |
//! | dynamic fee | 0x02       | 12     | 5  | 6     | 9, 10, 11  |
//! | legacy      | other tag  | 9      | 3  | 4     | 6, 7, 8    |
//!
//! Both typed envelopes are read with the same 12-field layout. Any other tag
//! byte is stripped and the rest is read as a legacy list.
//!
//! Everything except the destination, the value and the signature is ignored.
//! The sender comes from a [`SenderRecovery`]; the default
//! [`PlaceholderRecovery`] does not authenticate the signer.

mod recovery;

pub use recovery::{PlaceholderRecovery, SenderRecovery, SignatureParts};

use crate::amount::Amount;
use crate::error::DecodeError;
use crate::transaction::Transaction;
use primitive_types::U256;
use rlp::Rlp;
use sha2::{Digest, Sha256};
use std::fmt;

/// Shortest payload worth looking at.
const MIN_PAYLOAD_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLayout {
    Legacy,
    AccessList,
    DynamicFee,
}

impl TxLayout {
    /// Classify by first byte: a list prefix means legacy, a byte below 0x80 is a type tag.
    fn detect(payload: &[u8]) -> Result<(TxLayout, &[u8]), DecodeError> {
        match payload.first() {
            Some(&tag) if tag <= 0x7f => match tag {
                0x01 => Ok((TxLayout::AccessList, &payload[1..])),
                0x02 => Ok((TxLayout::DynamicFee, &payload[1..])),
                _ => Ok((TxLayout::Legacy, &payload[1..])),
            },
            Some(&prefix) if prefix >= 0xc0 => Ok((TxLayout::Legacy, payload)),
            Some(_) => Err(DecodeError::MalformedEncoding(
                "expected a list or a type tag".to_string(),
            )),
            None => Err(DecodeError::MalformedEncoding("empty payload".to_string())),
        }
    }

    pub fn type_tag(&self) -> Option<u8> {
        match self {
            TxLayout::Legacy => None,
            TxLayout::AccessList => Some(0x01),
            TxLayout::DynamicFee => Some(0x02),
        }
    }

    pub fn field_count(&self) -> usize {
        match self {
            TxLayout::Legacy => 9,
            TxLayout::AccessList | TxLayout::DynamicFee => 12,
        }
    }

    fn to_index(&self) -> usize {
        match self {
            TxLayout::Legacy => 3,
            TxLayout::AccessList | TxLayout::DynamicFee => 5,
        }
    }

    fn value_index(&self) -> usize {
        self.to_index() + 1
    }

    /// Index of `v`; `r` and `s` follow it and close the list.
    fn signature_index(&self) -> usize {
        self.field_count() - 3
    }
}

impl fmt::Display for TxLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxLayout::Legacy => "legacy",
            TxLayout::AccessList => "access-list",
            TxLayout::DynamicFee => "dynamic-fee",
        };
        f.write_str(name)
    }
}

/// A successfully decoded transfer intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    /// `0x` + hex sha256 of the raw payload.
    pub reference: String,
    pub layout: TxLayout,
    /// Lowercase `0x` address from the recovery strategy.
    pub sender: String,
    /// Lowercase `0x` address, 20 bytes.
    pub receiver: String,
    /// Wire value in base units.
    pub value: U256,
    pub amount: Amount,
}

impl DecodedTransfer {
    /// Mempool transaction id for this transfer.
    pub fn transaction_id(&self) -> String {
        format!("tx-{}", self.reference.trim_start_matches("0x"))
    }

    pub fn value_hex(&self) -> String {
        format!("0x{:x}", self.value)
    }

    pub fn to_transaction(&self, timestamp: i64) -> Transaction {
        Transaction::new(
            self.transaction_id(),
            self.sender.as_str(),
            self.receiver.as_str(),
            self.amount,
            timestamp,
        )
    }
}

/// `0x` + hex sha256 of the raw payload bytes.
pub fn transfer_reference(payload: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(payload)))
}

#[derive(Debug, Clone, Default)]
pub struct RawTransactionDecoder<R = PlaceholderRecovery> {
    recovery: R,
}

impl RawTransactionDecoder<PlaceholderRecovery> {
    pub fn new() -> Self {
        RawTransactionDecoder {
            recovery: PlaceholderRecovery,
        }
    }
}

impl<R: SenderRecovery> RawTransactionDecoder<R> {
    pub fn with_recovery(recovery: R) -> Self {
        RawTransactionDecoder { recovery }
    }

    /// Decode a hex payload; the `0x` prefix is optional.
    pub fn decode_hex(&self, raw: &str) -> Result<DecodedTransfer, DecodeError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)?;
        self.decode(&bytes)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<DecodedTransfer, DecodeError> {
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(DecodeError::MalformedEncoding(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        }

        let (layout, body) = TxLayout::detect(payload)?;
        let rlp = Rlp::new(body);
        if !rlp.is_list() {
            return Err(DecodeError::MalformedEncoding(
                "transaction body is not a list".to_string(),
            ));
        }
        let info = rlp.payload_info()?;
        if info.total() != body.len() {
            return Err(DecodeError::MalformedEncoding(format!(
                "list header covers {} bytes, payload has {}",
                info.total(),
                body.len()
            )));
        }

        let fields = rlp.item_count()?;
        if fields != layout.field_count() {
            return Err(DecodeError::UnsupportedShape(format!(
                "{} transaction needs {} fields, got {}",
                layout,
                layout.field_count(),
                fields
            )));
        }

        let to = rlp.at(layout.to_index())?.data()?;
        if to.len() != 20 {
            return Err(DecodeError::InvalidAddressLength(to.len()));
        }

        let value_bytes = rlp.at(layout.value_index())?.data()?;
        if value_bytes.len() > 32 {
            return Err(DecodeError::ValueOverflow);
        }
        let value = U256::from_big_endian(value_bytes);
        if value.is_zero() {
            return Err(DecodeError::NonPositiveValue);
        }
        let amount = Amount::from_wei(value).ok_or(DecodeError::ValueOverflow)?;

        let sig = layout.signature_index();
        let signature = SignatureParts {
            v: rlp.at(sig)?.data()?.to_vec(),
            r: rlp.at(sig + 1)?.data()?.to_vec(),
            s: rlp.at(sig + 2)?.data()?.to_vec(),
        };
        let sender = self
            .recovery
            .recover_sender(payload, &signature)?
            .to_lowercase();

        Ok(DecodedTransfer {
            reference: transfer_reference(payload),
            layout,
            sender,
            receiver: format!("0x{}", hex::encode(to)),
            value,
            amount,
        })
    }
}
