//! Cryptographic primitives: ECDSA over the reference client's 192-bit
//! curve, SHA3-256, the Redis/"Jones" CRC64 variant used for transaction
//! uids, and a checksum-free Base58 codec for textual key material.
//!
//! The curve choice is deliberate: NIST P-192 is the only common curve
//! whose SEC1-compressed public point (`1 + 24 = 25` bytes) and raw
//! fixed-size ECDSA signature (`24 + 24 = 48` bytes) match the reference
//! wire format exactly, so no extra packing/unpacking is needed anywhere
//! else in the codebase.

use crc::{Crc, CRC_64_REDIS};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use elliptic_curve::sec1::ToEncodedPoint;
use p192::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};

use crate::constants::{PUBKEY_SIZE, SIGNATURE_SIZE};
use crate::error::{Error, Result};

/// Raw compressed public key bytes.
pub type PublicKeyBytes = [u8; PUBKEY_SIZE];
/// Raw private scalar bytes.
pub type PrivateKeyBytes = [u8; crate::constants::ECC_CURVE];
/// Raw fixed-size `r || s` signature bytes.
pub type SignatureBytes = [u8; SIGNATURE_SIZE];
/// SHA3-256 digest.
pub type Digest32 = [u8; 32];

/// An ECDSA keypair over the network's curve.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh keypair from OS entropy.
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::random(&mut OsRng) }
    }

    /// Deterministically derives a keypair from a 4x64-bit seed.
    ///
    /// The seed is hashed with SHA3-256 together with an internal counter
    /// until the resulting 24 bytes decode to a valid nonzero scalar
    /// (rejection sampling); this mirrors how the reference client turns
    /// arbitrary seed material into a field element without introducing a
    /// modular-reduction bias.
    pub fn from_seed(seed: [u64; 4]) -> Self {
        let mut counter: u32 = 0;
        loop {
            let mut hasher = Sha3_256::new();
            for word in seed {
                hasher.update(word.to_le_bytes());
            }
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            if let Ok(signing_key) = SigningKey::from_bytes(digest[..24].into()) {
                return Self { signing_key };
            }
            counter += 1;
        }
    }

    /// Reconstructs a keypair from raw private scalar bytes.
    pub fn from_private_bytes(bytes: &PrivateKeyBytes) -> Result<Self> {
        let signing_key =
            SigningKey::from_bytes(bytes.into()).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn private_bytes(&self) -> PrivateKeyBytes {
        let mut out = [0u8; crate::constants::ECC_CURVE];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    pub fn public_bytes(&self) -> PublicKeyBytes {
        public_key_bytes(self.signing_key.verifying_key())
    }

    /// Signs a pre-hashed 32-byte digest, returning the raw `r || s` bytes.
    pub fn sign_digest(&self, digest: &Digest32) -> SignatureBytes {
        let sig: Signature = self
            .signing_key
            .sign_prehash(digest)
            .expect("sha3-256 digest is a valid prehash length for this curve");
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&sig.to_bytes());
        out
    }
}

fn public_key_bytes(vk: &VerifyingKey) -> PublicKeyBytes {
    let point = vk.to_encoded_point(true);
    let mut out = [0u8; PUBKEY_SIZE];
    out.copy_from_slice(point.as_bytes());
    out
}

/// Verifies `signature` over `digest` against `pubkey`.
///
/// Returns `false` (never an error) on any malformed input, matching the
/// reference client's `verify() -> bool` contract: a malformed signature is
/// just a signature that does not verify.
pub fn verify(pubkey: &PublicKeyBytes, digest: &Digest32, signature: &SignatureBytes) -> bool {
    let Ok(vk) = VerifyingKey::from_sec1_bytes(pubkey) else {
        return false;
    };
    let Ok(sig) = Signature::try_from(signature.as_slice()) else {
        return false;
    };
    vk.verify_prehash(digest, &sig).is_ok()
}

/// Computes the SHA3-256 digest of `data`.
pub fn sha3_256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// The Jones/Redis CRC64 variant used to derive transaction uids.
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// CRC64 (Jones polynomial) checksum of `data`, seeded from `crc`.
///
/// Matches the reference client's `crc64(crc, data, len)` signature so
/// callers can chain updates the same way (`crc64(0, a); crc64(prev, b)`
/// is *not* equivalent to hashing `a||b` in one call — callers that need
/// the latter should concatenate first).
pub fn crc64(seed: u64, data: &[u8]) -> u64 {
    let mut digest = CRC64.digest_with_initial(seed);
    digest.update(data);
    digest.finalize()
}

/// Base58 (no checksum) encode.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Base58 (no checksum) decode.
pub fn base58_decode(s: &str) -> Result<Vec<u8>> {
    Ok(bs58::decode(s).into_vec()?)
}

/// The genesis public key, decoded once from its Base58 literal.
pub fn genesis_pubkey() -> PublicKeyBytes {
    let bytes = base58_decode(crate::constants::GENESIS_PUBKEY_B58)
        .expect("genesis pubkey literal is valid base58");
    let mut out = [0u8; PUBKEY_SIZE];
    out.copy_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let kp = Keypair::generate();
        let digest = sha3_256(b"hello vfc");
        let sig = kp.sign_digest(&digest);
        assert!(verify(&kp.public_bytes(), &digest, &sig));
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let kp = Keypair::generate();
        let digest = sha3_256(b"hello vfc");
        let sig = kp.sign_digest(&digest);
        let mut other = sha3_256(b"goodbye vfc");
        other[0] ^= 0xFF;
        assert!(!verify(&kp.public_bytes(), &other, &sig));
    }

    #[test]
    fn seeded_keypair_is_deterministic() {
        let a = Keypair::from_seed([1, 2, 3, 4]);
        let b = Keypair::from_seed([1, 2, 3, 4]);
        assert_eq!(a.public_bytes(), b.public_bytes());
        assert_eq!(a.private_bytes(), b.private_bytes());
    }

    #[test]
    fn base58_round_trips_pubkey_width() {
        let kp = Keypair::generate();
        let encoded = base58_encode(&kp.public_bytes());
        let decoded = base58_decode(&encoded).unwrap();
        assert_eq!(decoded, kp.public_bytes());
    }

    #[test]
    fn genesis_pubkey_decodes_to_expected_width() {
        let pk = genesis_pubkey();
        assert_eq!(pk.len(), PUBKEY_SIZE);
        assert_eq!(base58_encode(&pk), crate::constants::GENESIS_PUBKEY_B58);
    }

    #[test]
    fn crc64_is_deterministic() {
        assert_eq!(crc64(0, b"abc"), crc64(0, b"abc"));
        assert_ne!(crc64(0, b"abc"), crc64(0, b"abd"));
    }
}
