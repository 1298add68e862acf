//! The fixed-width transaction record: the node's only wire and disk
//! format. Every field is little-endian; there is no framing header and no
//! variable-length data, so encode/decode is a flat byte-for-byte copy.

use crate::constants::{PUBKEY_SIZE, RECORD_SIZE, SIGNATURE_SIZE};
use crate::crypto::{self, Digest32, PublicKeyBytes, SignatureBytes};
use crate::error::{Error, Result};

/// A single signed value transfer, or the unsigned genesis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    pub uid: u64,
    pub from: PublicKeyBytes,
    pub to: PublicKeyBytes,
    pub amount: u32,
    pub signature: SignatureBytes,
}

impl TxRecord {
    /// Builds the genesis record: `amount = u32::MAX`, `to = genesis key`,
    /// everything else zeroed. Not signed, not subject to admission checks.
    pub fn genesis() -> Self {
        Self {
            uid: 0,
            from: [0u8; PUBKEY_SIZE],
            to: crypto::genesis_pubkey(),
            amount: u32::MAX,
            signature: [0u8; SIGNATURE_SIZE],
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.amount == u32::MAX && self.to == crypto::genesis_pubkey()
    }

    /// A record is a free queue slot iff its amount is zero.
    pub fn is_free_slot(&self) -> bool {
        self.amount == 0
    }

    /// `from == to`: the transfer must not be appended to the ledger, but
    /// still consumes a uniqueness slot and refreshes the sender's peer
    /// registration.
    pub fn is_self_transfer(&self) -> bool {
        self.from == self.to
    }

    /// Digest signed by `signature`: SHA3-256 over the record with the
    /// signature field zeroed. Computing the hash before the signature is
    /// assigned (rather than after) is load-bearing — reimplementations
    /// that hash the full signed record will never verify against the
    /// reference network.
    pub fn signing_digest(&self) -> Digest32 {
        let mut unsigned = *self;
        unsigned.signature = [0u8; SIGNATURE_SIZE];
        crypto::sha3_256(&unsigned.to_bytes())
    }

    /// Signs this record in place with `keypair`, setting `from` to the
    /// keypair's public key.
    pub fn sign(&mut self, keypair: &crypto::Keypair) {
        self.from = keypair.public_bytes();
        self.signature = [0u8; SIGNATURE_SIZE];
        let digest = self.signing_digest();
        self.signature = keypair.sign_digest(&digest);
    }

    /// Verifies the signature against `from` over this record's signing
    /// digest. Always `false` for the genesis record, which is not signed.
    pub fn verify_signature(&self) -> bool {
        if self.is_genesis() {
            return false;
        }
        let digest = self.signing_digest();
        crypto::verify(&self.from, &digest, &self.signature)
    }

    /// Serializes to the fixed `RECORD_SIZE`-byte little-endian layout:
    /// `uid(8) || from(25) || to(25) || amount(4) || signature(48)`.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut offset = 0;
        buf[offset..offset + 8].copy_from_slice(&self.uid.to_le_bytes());
        offset += 8;
        buf[offset..offset + PUBKEY_SIZE].copy_from_slice(&self.from);
        offset += PUBKEY_SIZE;
        buf[offset..offset + PUBKEY_SIZE].copy_from_slice(&self.to);
        offset += PUBKEY_SIZE;
        buf[offset..offset + 4].copy_from_slice(&self.amount.to_le_bytes());
        offset += 4;
        buf[offset..offset + SIGNATURE_SIZE].copy_from_slice(&self.signature);
        buf
    }

    /// Parses a record from an exact `RECORD_SIZE`-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(Error::BadLength { expected: RECORD_SIZE, got: bytes.len() });
        }
        let mut offset = 0;
        let uid = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let mut from = [0u8; PUBKEY_SIZE];
        from.copy_from_slice(&bytes[offset..offset + PUBKEY_SIZE]);
        offset += PUBKEY_SIZE;
        let mut to = [0u8; PUBKEY_SIZE];
        to.copy_from_slice(&bytes[offset..offset + PUBKEY_SIZE]);
        offset += PUBKEY_SIZE;
        let amount = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[offset..offset + SIGNATURE_SIZE]);
        Ok(Self { uid, from, to, amount, signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn round_trips_through_bytes() {
        let mut rec = TxRecord {
            uid: 42,
            from: [1u8; PUBKEY_SIZE],
            to: [2u8; PUBKEY_SIZE],
            amount: 7000,
            signature: [3u8; SIGNATURE_SIZE],
        };
        rec.signature[0] = 9;
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), RECORD_SIZE);
        let back = TxRecord::from_bytes(&bytes).unwrap();
        assert_eq!(rec, back);
    }

    #[test]
    fn signed_record_verifies() {
        let kp = Keypair::generate();
        let mut rec = TxRecord {
            uid: 1,
            from: [0u8; PUBKEY_SIZE],
            to: [9u8; PUBKEY_SIZE],
            amount: 1000,
            signature: [0u8; SIGNATURE_SIZE],
        };
        rec.sign(&kp);
        assert!(rec.verify_signature());
    }

    #[test]
    fn tampering_with_amount_breaks_signature() {
        let kp = Keypair::generate();
        let mut rec = TxRecord {
            uid: 1,
            from: [0u8; PUBKEY_SIZE],
            to: [9u8; PUBKEY_SIZE],
            amount: 1000,
            signature: [0u8; SIGNATURE_SIZE],
        };
        rec.sign(&kp);
        rec.amount = 2000;
        assert!(!rec.verify_signature());
    }

    #[test]
    fn genesis_is_not_subject_to_verification() {
        let genesis = TxRecord::genesis();
        assert!(genesis.is_genesis());
        assert!(!genesis.verify_signature());
    }
}
