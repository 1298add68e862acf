//! The geometric subgenesis predicate and keypair mining loop.
//!
//! A public key is mined by generating keypairs until one satisfies a
//! cosine-similarity predicate over five 3D vectors derived from the key's
//! bytes. A hit both authorizes the key to spend (as a "subgenesis
//! address") and fixes the coin value it may spend, computed once from the
//! same angles.

use crate::constants::{MAX_NODE_DIFFICULTY, MIN_NODE_DIFFICULTY, MINING_THRESHOLD};
use crate::crypto::{self, PublicKeyBytes};

#[derive(Clone, Copy, Debug, Default)]
struct Vec3 {
    x: u16,
    y: u16,
    z: u16,
}

/// Cosine of the angle between `a` and `b`. Returns `1.0` (an angle wide
/// enough to always fail the predicate) if either vector has zero
/// magnitude or the dot product is zero, matching the reference's `gNa`.
fn cosine(a: Vec3, b: Vec3) -> f64 {
    let dot = (a.x as f64) * (b.x as f64) + (a.y as f64) * (b.y as f64) + (a.z as f64) * (b.z as f64);
    let mag_a = ((a.x as f64).powi(2) + (a.y as f64).powi(2) + (a.z as f64).powi(2)).sqrt();
    let mag_b = ((b.x as f64).powi(2) + (b.y as f64).powi(2) + (b.z as f64).powi(2)).sqrt();
    if (mag_a == 0.0 && mag_b == 0.0) || dot == 0.0 {
        return 1.0;
    }
    dot / (mag_a * mag_b)
}

/// Expands a 25-byte compressed public key into the 30 bytes the
/// predicate's five vectors require.
///
/// The reference implementation reads this window directly out of
/// whichever struct happens to sit after the public key on the stack or
/// on the wire (the keypair's private scalar while mining, the
/// recipient's public key while validating a spend) — an accidental
/// artifact of C struct/stack layout rather than a portable protocol
/// definition; see `DESIGN.md` for the resolution. Here the extra 5 bytes
/// are instead derived deterministically from the key itself (the
/// leading bytes of its own SHA3-256 digest), so any party holding only
/// `from` computes the identical vectors the sender saw while mining.
fn predicate_input(pubkey: &PublicKeyBytes) -> [u8; 30] {
    let digest = crypto::sha3_256(pubkey);
    let mut buf = [0u8; 30];
    buf[..25].copy_from_slice(pubkey);
    buf[25..30].copy_from_slice(&digest[..5]);
    buf
}

fn vectors(bytes: &[u8; 30]) -> [Vec3; 5] {
    let mut v = [Vec3::default(); 5];
    for (i, slot) in v.iter_mut().enumerate() {
        let ofs = i * 6;
        slot.x = u16::from_le_bytes([bytes[ofs], bytes[ofs + 1]]);
        slot.y = u16::from_le_bytes([bytes[ofs + 2], bytes[ofs + 3]]);
        slot.z = u16::from_le_bytes([bytes[ofs + 4], bytes[ofs + 5]]);
    }
    v
}

/// The four angles the subgenesis predicate is built from.
#[derive(Debug, Clone, Copy)]
pub struct Angles {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub c4: f64,
}

impl Angles {
    pub fn mean(&self) -> f64 {
        (self.c1 + self.c2 + self.c3 + self.c4) / 4.0
    }

    pub fn sum(&self) -> f64 {
        self.c1 + self.c2 + self.c3 + self.c4
    }
}

/// Computes the four cosine similarities for `pubkey`.
pub fn angles(pubkey: &PublicKeyBytes) -> Angles {
    let v = vectors(&predicate_input(pubkey));
    Angles {
        c1: cosine(v[0], v[3]),
        c2: cosine(v[3], v[2]),
        c3: cosine(v[2], v[1]),
        c4: cosine(v[1], v[4]),
    }
}

/// Whether `pubkey` is a valid subgenesis address under the fixed mining
/// threshold (the miner always tests against `MINING_THRESHOLD`,
/// regardless of network difficulty).
pub fn is_subgenesis(pubkey: &PublicKeyBytes) -> bool {
    is_subgenesis_at(pubkey, MINING_THRESHOLD)
}

/// Whether `pubkey` is a valid subgenesis address under `threshold`, the
/// form admission-time balance lookups use (network difficulty, not the
/// fixed mining threshold).
pub fn is_subgenesis_at(pubkey: &PublicKeyBytes, threshold: f64) -> bool {
    let a = angles(pubkey);
    a.c1 < threshold && a.c2 < threshold && a.c3 < threshold && a.c4 < threshold && a.sum() > 0.0
}

/// Coin value, in 1/1000 units, of a hit computed against `threshold`.
/// Zero if the key is not a valid subgenesis address under that
/// threshold.
///
/// Only the predicate uses `threshold`: the value multiplier is always
/// taken against the fixed [`MINING_THRESHOLD`], matching the reference
/// (`mn = 1/0.24` is a constant regardless of the network-difficulty
/// argument the predicate itself varies with).
pub fn subgenesis_value_at(pubkey: &PublicKeyBytes, threshold: f64) -> u64 {
    if !is_subgenesis_at(pubkey, threshold) {
        return 0;
    }
    let a = angles(pubkey);
    let mean = a.mean();
    let value = 1000.0 + 10000.0 * (1.0 - mean * (1.0 / MINING_THRESHOLD));
    (value + 0.5).floor().max(0.0) as u64
}

/// Coin value as computed by the miner (fixed `MINING_THRESHOLD`).
pub fn subgenesis_value(pubkey: &PublicKeyBytes) -> u64 {
    subgenesis_value_at(pubkey, MINING_THRESHOLD)
}

/// Averages peer-advertised difficulties (already clamped to
/// `[MIN_NODE_DIFFICULTY, MAX_NODE_DIFFICULTY]`) together with this
/// node's own value, bounded to the same range.
pub fn network_difficulty(local: f32, peer_difficulties: &[f32]) -> f32 {
    let mut sum = local as f64;
    let mut count = 1usize;
    for &d in peer_difficulties {
        sum += d.clamp(MIN_NODE_DIFFICULTY, MAX_NODE_DIFFICULTY) as f64;
        count += 1;
    }
    ((sum / count as f64) as f32).clamp(MIN_NODE_DIFFICULTY, MAX_NODE_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn zero_vector_predicate_rejects() {
        let zero = [0u8; crate::constants::PUBKEY_SIZE];
        // digest of zero bytes is nonzero but vectors derived from the
        // zero key's leading bytes are themselves zero, which must always
        // fail (cosine undefined -> 1.0, the predicate-rejecting value).
        assert!(!is_subgenesis(&zero));
    }

    #[test]
    fn mining_eventually_finds_a_hit() {
        // Deterministic search over seeded keypairs; if this starts
        // failing after a predicate change, the search bound, not the
        // test, is what moved.
        let mut found = false;
        for i in 0..20_000u64 {
            let kp = Keypair::from_seed([i, i.wrapping_mul(7), i.wrapping_mul(13), i.wrapping_mul(31)]);
            if is_subgenesis(&kp.public_bytes()) {
                found = true;
                break;
            }
        }
        assert!(found, "expected at least one subgenesis hit within the search bound");
    }

    #[test]
    fn value_is_zero_when_not_a_hit() {
        let zero = [0u8; crate::constants::PUBKEY_SIZE];
        assert_eq!(subgenesis_value(&zero), 0);
    }

    #[test]
    fn network_difficulty_blends_peers_with_local() {
        let d = network_difficulty(0.1, &[0.2, 0.3]);
        assert!(d >= MIN_NODE_DIFFICULTY && d <= MAX_NODE_DIFFICULTY);
    }
}
