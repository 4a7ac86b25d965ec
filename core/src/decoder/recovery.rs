use crate::error::DecodeError;
use sha2::{Digest, Sha256};

/// Raw signature items as they appear in the payload (big-endian, leading zeros stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParts {
    pub v: Vec<u8>,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

/// Maps a decoded payload and its signature to a sender address.
pub trait SenderRecovery: Send + Sync {
    /// `payload` is the full raw transaction, including any type tag.
    fn recover_sender(
        &self,
        payload: &[u8],
        signature: &SignatureParts,
    ) -> Result<String, DecodeError>;
}

/// Pseudo-address derived from the signature bytes: `0x` + last 20 bytes of `sha256(r || s)`.
///
/// SECURITY: this does NOT authenticate anything. Nobody's public key is recovered
/// and the signature is never checked against the payload, so anyone who copies an
/// `(r, s)` pair can spend as that pseudo-address. It exists so the same signature
/// bytes always map to the same sender until real secp256k1 recovery is plugged in
/// through [`SenderRecovery`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRecovery;

impl SenderRecovery for PlaceholderRecovery {
    fn recover_sender(
        &self,
        _payload: &[u8],
        signature: &SignatureParts,
    ) -> Result<String, DecodeError> {
        let mut hasher = Sha256::new();
        hasher.update(&signature.r);
        hasher.update(&signature.s);
        let digest = hasher.finalize();
        Ok(format!("0x{}", hex::encode(&digest[12..])))
    }
}
