//! The admission pipeline: the single place a [`TxRecord`] is checked
//! against the ledger and, if it passes, committed.
//!
//! Balance and uid-presence are computed together in one sequential scan
//! (§4.6) rather than as two passes, since both require walking every
//! prior record anyway.

use tracing::{debug, warn};

use crate::constants::INFLATION_TAX;
use crate::crypto::PublicKeyBytes;
use crate::error::AdmissionError;
use crate::ledger::LedgerStore;
use crate::mining;
use crate::record::TxRecord;
use crate::uniqueness::RecentExecRing;

/// Computes `from`'s spendable balance as of the ledger's current tail,
/// scanning every record. Returns `Err(UidExist)` as soon as `record.uid`
/// is seen already committed, short-circuiting the rest of the scan.
///
/// `network_difficulty` is the threshold used to evaluate whether `from`
/// is a valid subgenesis address for the purpose of its implicit opening
/// balance — distinct from the fixed threshold the mining thread tests
/// new keypairs against.
fn compute_balance(
    ledger: &LedgerStore,
    from: &PublicKeyBytes,
    uid: u64,
    network_difficulty: f32,
) -> Result<i64, AdmissionError> {
    let genesis = crate::crypto::genesis_pubkey();
    let mut balance: i64 = if *from == genesis {
        0 // height-dependent; folded in below as records are counted.
    } else {
        mining::subgenesis_value_at(from, network_difficulty as f64) as i64
    };

    let mut height: i64 = 0;
    let mut uid_seen = false;
    ledger
        .scan(|_idx, rec| {
            height += 1;
            if rec.uid == uid {
                uid_seen = true;
            }
            if rec.to == *from {
                balance += rec.amount as i64;
            }
            if rec.from == *from {
                balance -= rec.amount as i64;
            }
        })
        .map_err(|_| AdmissionError::Write)?;

    if uid_seen {
        return Err(AdmissionError::UidExist);
    }

    if *from == genesis {
        // height includes the genesis record itself; the inflation tax
        // accrues once per prior (non-genesis) record.
        balance = (height - 1) * INFLATION_TAX as i64;
    }

    Ok(balance)
}

/// Computes `pubkey`'s current spendable balance without a uid check, for
/// read-only balance queries (the CLI's `balance` command and the wallet
/// crate's transaction builder).
pub fn query_balance(ledger: &LedgerStore, pubkey: &PublicKeyBytes, network_difficulty: f32) -> crate::error::Result<i64> {
    // `u64::MAX` never collides with a real uid (derived from crc64 over
    // a timestamp-prefixed string), so the uid-presence branch of
    // `compute_balance` never fires here.
    compute_balance(ledger, pubkey, u64::MAX, network_difficulty).map_err(Into::into)
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Appended to the ledger; caller should broadcast.
    Committed,
    /// `from == to`: valid but never touches the ledger.
    SelfTransfer,
    /// Already present in the recently-executed ring; a racing duplicate
    /// of a just-committed record, not an error.
    AlreadyCommitted,
}

/// Runs the full §4.6 pipeline against `record`.
pub fn admit(
    record: &TxRecord,
    ledger: &LedgerStore,
    rexi: &mut RecentExecRing,
    network_difficulty: f32,
) -> Result<AdmissionOutcome, AdmissionError> {
    if record.amount == 0 {
        debug!(uid = record.uid, "admission rejected: zero amount");
        return Err(AdmissionError::NoFunds);
    }

    if !record.verify_signature() {
        warn!(uid = record.uid, "admission rejected: signature verification failed");
        return Err(AdmissionError::SigFail);
    }

    let balance = compute_balance(ledger, &record.from, record.uid, network_difficulty)?;
    if balance < record.amount as i64 {
        debug!(uid = record.uid, balance, amount = record.amount, "admission rejected: insufficient funds");
        return Err(AdmissionError::NoFunds);
    }

    if record.is_self_transfer() {
        debug!(uid = record.uid, "admission: self-transfer, not appended");
        return Ok(AdmissionOutcome::SelfTransfer);
    }

    if rexi.check_and_insert(record.uid) {
        debug!(uid = record.uid, "admission: duplicate of a just-committed record");
        return Ok(AdmissionOutcome::AlreadyCommitted);
    }

    ledger.append(record).map_err(|_| AdmissionError::Write)?;
    debug!(uid = record.uid, amount = record.amount, "admission: committed");
    Ok(AdmissionOutcome::Committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MIN_NODE_DIFFICULTY, PUBKEY_SIZE, SIGNATURE_SIZE};
    use crate::crypto::Keypair;

    fn temp_ledger(name: &str) -> (LedgerStore, std::path::PathBuf) {
        let mut p = std::env::temp_dir();
        p.push(format!("vfc-admission-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        (LedgerStore::open(&p).unwrap(), p)
    }

    fn mined_subgenesis_keypair() -> Keypair {
        for i in 0..20_000u64 {
            let kp = Keypair::from_seed([i, i.wrapping_mul(7), i.wrapping_mul(13), i.wrapping_mul(31)]);
            if mining::is_subgenesis(&kp.public_bytes()) {
                return kp;
            }
        }
        panic!("no subgenesis hit within search bound");
    }

    #[test]
    fn genesis_only_ledger_has_zero_spendable_balance() {
        let (ledger, path) = temp_ledger("genesis-balance");
        let mut rexi = RecentExecRing::new();
        let genesis_pub = crate::crypto::genesis_pubkey();
        let mut rec = TxRecord {
            uid: 1,
            from: genesis_pub,
            to: [9u8; PUBKEY_SIZE],
            amount: 1,
            signature: [0u8; SIGNATURE_SIZE],
        };
        // genesis key cannot actually sign (no known private key); this
        // only exercises the balance computation, so force past SIGFAIL
        // by checking the error variant directly.
        rec.signature = [0u8; SIGNATURE_SIZE];
        let result = admit(&rec, &ledger, &mut rexi, MIN_NODE_DIFFICULTY);
        assert_eq!(result, Err(AdmissionError::SigFail));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn valid_subgenesis_spend_commits_and_balances() {
        let (ledger, path) = temp_ledger("subgenesis-spend");
        let mut rexi = RecentExecRing::new();
        let kp = mined_subgenesis_keypair();
        let value = mining::subgenesis_value_at(&kp.public_bytes(), MIN_NODE_DIFFICULTY as f64);
        assert!(value > 0);

        let mut rec = TxRecord {
            uid: 42,
            from: kp.public_bytes(),
            to: [7u8; PUBKEY_SIZE],
            amount: value as u32,
            signature: [0u8; SIGNATURE_SIZE],
        };
        rec.sign(&kp);

        let outcome = admit(&rec, &ledger, &mut rexi, MIN_NODE_DIFFICULTY).unwrap();
        assert_eq!(outcome, AdmissionOutcome::Committed);
        assert_eq!(ledger.height().unwrap(), 2);

        // spending again immediately is rejected: the balance is now 0 and
        // the prior scan already folded in the first spend.
        let mut rec2 = TxRecord { uid: 43, ..rec };
        rec2.sign(&kp);
        let result = admit(&rec2, &ledger, &mut rexi, MIN_NODE_DIFFICULTY);
        assert_eq!(result, Err(AdmissionError::NoFunds));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn repeated_uid_is_rejected() {
        let (ledger, path) = temp_ledger("dup-uid");
        let mut rexi = RecentExecRing::new();
        let kp = mined_subgenesis_keypair();
        let value = mining::subgenesis_value_at(&kp.public_bytes(), MIN_NODE_DIFFICULTY as f64);

        let mut rec = TxRecord {
            uid: 1,
            from: kp.public_bytes(),
            to: [7u8; PUBKEY_SIZE],
            amount: value as u32,
            signature: [0u8; SIGNATURE_SIZE],
        };
        rec.sign(&kp);
        assert_eq!(admit(&rec, &ledger, &mut rexi, MIN_NODE_DIFFICULTY).unwrap(), AdmissionOutcome::Committed);

        let mut rec_same_uid = TxRecord { to: [8u8; PUBKEY_SIZE], amount: 1, ..rec };
        rec_same_uid.sign(&kp);
        assert_eq!(admit(&rec_same_uid, &ledger, &mut rexi, MIN_NODE_DIFFICULTY), Err(AdmissionError::UidExist));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn self_transfer_does_not_append() {
        let (ledger, path) = temp_ledger("self-transfer");
        let mut rexi = RecentExecRing::new();
        let kp = mined_subgenesis_keypair();
        let mut rec = TxRecord {
            uid: 1,
            from: kp.public_bytes(),
            to: kp.public_bytes(),
            amount: 1,
            signature: [0u8; SIGNATURE_SIZE],
        };
        rec.sign(&kp);
        let outcome = admit(&rec, &ledger, &mut rexi, MIN_NODE_DIFFICULTY).unwrap();
        assert_eq!(outcome, AdmissionOutcome::SelfTransfer);
        assert_eq!(ledger.height().unwrap(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_amount_is_rejected_before_signature_check() {
        let (ledger, path) = temp_ledger("zero-amount");
        let mut rexi = RecentExecRing::new();
        let kp = mined_subgenesis_keypair();
        let rec = TxRecord {
            uid: 1,
            from: kp.public_bytes(),
            to: [7u8; PUBKEY_SIZE],
            amount: 0,
            signature: [0u8; SIGNATURE_SIZE],
        };
        // left unsigned: a zero-amount record is rejected before the
        // signature is ever consulted.
        assert_eq!(admit(&rec, &ledger, &mut rexi, MIN_NODE_DIFFICULTY), Err(AdmissionError::NoFunds));
        assert_eq!(ledger.height().unwrap(), 1);
        std::fs::remove_file(&path).ok();
    }
}
