//! Key management and transaction building for a single node's wallet.
//!
//! This is the non-CLI half of what the reference client's `main()`
//! does inline for every argv form: generate or load a keypair, persist
//! it as Base58 text, look up a balance, and build a signed
//! [`vfc_core::record::TxRecord`] ready for broadcast.

use std::fs;
use std::path::Path;

use thiserror::Error;

use vfc_core::admission;
use vfc_core::crypto::{self, Keypair};
use vfc_core::ledger::LedgerStore;
use vfc_core::record::TxRecord;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("core error: {0}")]
    Core(#[from] vfc_core::Error),
    #[error("stored key file has the wrong width")]
    BadKeyWidth,
}

pub type Result<T> = core::result::Result<T, WalletError>;

/// Generates a fresh random keypair.
pub fn generate() -> Keypair {
    Keypair::generate()
}

/// Deterministically derives a keypair from a 4x64-bit seed, for
/// reproducible test wallets and the CLI's `keygen --seed` form.
pub fn generate_seeded(seed: [u64; 4]) -> Keypair {
    Keypair::from_seed(seed)
}

/// Writes `keypair`'s public and private keys as Base58 text to
/// `public.key` and `private.key` under `data_dir`, creating the
/// directory if needed.
pub fn save_keypair(data_dir: &Path, keypair: &Keypair) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    fs::write(data_dir.join("public.key"), crypto::base58_encode(&keypair.public_bytes()))?;
    fs::write(data_dir.join("private.key"), crypto::base58_encode(&keypair.private_bytes()))?;
    Ok(())
}

/// Loads a keypair from the `public.key`/`private.key` sidecar files
/// under `data_dir`. Only the private key is actually needed to
/// reconstruct the pair; the public key file is read back only to
/// confirm it matches.
pub fn load_keypair(data_dir: &Path) -> Result<Keypair> {
    let private_text = fs::read_to_string(data_dir.join("private.key"))?;
    let private_bytes = crypto::base58_decode(private_text.trim())?;
    if private_bytes.len() != vfc_core::constants::ECC_CURVE {
        return Err(WalletError::BadKeyWidth);
    }
    let mut buf = [0u8; vfc_core::constants::ECC_CURVE];
    buf.copy_from_slice(&private_bytes);
    Ok(Keypair::from_private_bytes(&buf)?)
}

/// Appends a `(base58_private_key, value)` line to `minted.priv`,
/// recording a keypair the mining thread found to be a valid subgenesis
/// address.
pub fn append_minted(data_dir: &Path, keypair: &Keypair, value: u64) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let line = format!("{} {}\n", crypto::base58_encode(&keypair.private_bytes()), value);
    use std::io::Write;
    let mut file = fs::OpenOptions::new().create(true).append(true).open(data_dir.join("minted.priv"))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Looks up `keypair`'s current spendable balance by scanning `ledger`.
pub fn balance(ledger: &LedgerStore, keypair: &Keypair, network_difficulty: f32) -> Result<i64> {
    Ok(admission::query_balance(ledger, &keypair.public_bytes(), network_difficulty)?)
}

/// Builds and signs a transaction record sending `amount` from `sender`
/// to `recipient`. `uid` is the caller's responsibility (typically
/// `crc64` over a timestamp-prefixed Base58 public key, per §4.1) so that
/// retries of a rejected send can reuse or change it deliberately.
pub fn build_transaction(
    sender: &Keypair,
    recipient_public_key: vfc_core::crypto::PublicKeyBytes,
    amount: u32,
    uid: u64,
) -> TxRecord {
    let mut record = TxRecord {
        uid,
        from: sender.public_bytes(),
        to: recipient_public_key,
        amount,
        signature: [0u8; vfc_core::constants::SIGNATURE_SIZE],
    };
    record.sign(sender);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("vfc-wallet-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&p);
        p
    }

    #[test]
    fn save_and_load_round_trips_private_key() {
        let dir = temp_dir("roundtrip");
        let kp = generate_seeded([1, 2, 3, 4]);
        save_keypair(&dir, &kp).unwrap();
        let loaded = load_keypair(&dir).unwrap();
        assert_eq!(loaded.public_bytes(), kp.public_bytes());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn built_transaction_verifies() {
        let sender = generate_seeded([5, 6, 7, 8]);
        let recipient = generate_seeded([9, 10, 11, 12]);
        let tx = build_transaction(&sender, recipient.public_bytes(), 500, 99);
        assert!(tx.verify_signature());
        assert_eq!(tx.uid, 99);
    }

    #[test]
    fn minted_log_appends_one_line_per_call() {
        let dir = temp_dir("minted");
        let kp = generate_seeded([1, 1, 1, 1]);
        append_minted(&dir, &kp, 2500).unwrap();
        append_minted(&dir, &kp, 3000).unwrap();
        let contents = std::fs::read_to_string(dir.join("minted.priv")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fresh_wallet_has_zero_balance() {
        let dir = temp_dir("balance");
        let ledger = LedgerStore::open(dir.join("blocks.dat")).unwrap();
        let kp = generate_seeded([2, 2, 2, 2]);
        let bal = balance(&ledger, &kp, vfc_core::constants::MIN_NODE_DIFFICULTY).unwrap();
        assert_eq!(bal, 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
