//! End-to-end admission scenarios exercising the ledger, queue, and
//! mining predicate together, without any networking.

use std::net::Ipv4Addr;

use vfc_core::admission::{self, AdmissionOutcome};
use vfc_core::constants::{MIN_NODE_DIFFICULTY, PUBKEY_SIZE, SIGNATURE_SIZE};
use vfc_core::crypto::Keypair;
use vfc_core::error::AdmissionError;
use vfc_core::ledger::{BadBlocksLog, LedgerStore};
use vfc_core::mining;
use vfc_core::queue::{EnqueueOutcome, TxQueue};
use vfc_core::record::TxRecord;
use vfc_core::uniqueness::{RecentExecRing, UidFilter};

fn temp_dir(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("vfc-core-itest-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&p);
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn mined_subgenesis_keypair() -> (Keypair, u32) {
    for i in 0..50_000u64 {
        let kp = Keypair::from_seed([i, i.wrapping_mul(17), i.wrapping_mul(257), i.wrapping_mul(65537)]);
        let value = mining::subgenesis_value_at(&kp.public_bytes(), MIN_NODE_DIFFICULTY as f64);
        if value > 0 {
            return (kp, value as u32);
        }
    }
    panic!("no subgenesis hit within search bound");
}

#[test]
fn genesis_only_ledger_has_height_one_and_zero_balance() {
    let dir = temp_dir("genesis-only");
    let ledger = LedgerStore::open(dir.join("blocks.dat")).unwrap();
    assert_eq!(ledger.height().unwrap(), 1);

    let genesis_pub = vfc_core::crypto::genesis_pubkey();
    let mut balance: i64 = 0;
    ledger
        .scan(|idx, rec| {
            if idx > 0 && rec.from == genesis_pub {
                balance -= rec.amount as i64;
            }
        })
        .unwrap();
    // height-1 prior records each worth INFLATION_TAX; height is 1, so
    // there are zero prior records and the genesis key's implicit
    // balance is zero.
    assert_eq!(balance, 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn first_transfer_from_a_mined_subgenesis_address_commits() {
    let dir = temp_dir("first-transfer");
    let ledger = LedgerStore::open(dir.join("blocks.dat")).unwrap();
    let mut rexi = RecentExecRing::new();

    let (sender, value) = mined_subgenesis_keypair();
    let recipient = Keypair::generate();

    let mut record = TxRecord {
        uid: 1,
        from: sender.public_bytes(),
        to: recipient.public_bytes(),
        amount: value,
        signature: [0u8; SIGNATURE_SIZE],
    };
    record.sign(&sender);

    let outcome = admission::admit(&record, &ledger, &mut rexi, MIN_NODE_DIFFICULTY).unwrap();
    assert_eq!(outcome, AdmissionOutcome::Committed);
    assert_eq!(ledger.height().unwrap(), 2);

    let mut sender_balance: i64 = 0;
    let mut recipient_balance: i64 = 0;
    ledger
        .scan(|_idx, rec| {
            if rec.to == sender.public_bytes() {
                sender_balance += rec.amount as i64;
            }
            if rec.from == sender.public_bytes() {
                sender_balance -= rec.amount as i64;
            }
            if rec.to == recipient.public_bytes() {
                recipient_balance += rec.amount as i64;
            }
        })
        .unwrap();
    assert_eq!(sender_balance, 0);
    assert_eq!(recipient_balance, value as i64);

    let bad_blocks_path = dir.join("bad_blocks.dat");
    assert!(!bad_blocks_path.exists() || std::fs::metadata(&bad_blocks_path).unwrap().len() == 0);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn double_spend_in_the_queue_is_logged_and_both_sides_invalidated() {
    let dir = temp_dir("double-spend");
    let bad_blocks = BadBlocksLog::open(dir.join("bad_blocks.dat")).unwrap();
    let queue = TxQueue::new();
    let mut filter = UidFilter::new();

    let (sender, value) = mined_subgenesis_keypair();
    let recipient_a = Keypair::generate();
    let recipient_b = Keypair::generate();
    let source_ip = Ipv4Addr::new(203, 0, 113, 9);

    let mut first = TxRecord {
        uid: 100,
        from: sender.public_bytes(),
        to: recipient_a.public_bytes(),
        amount: value,
        signature: [0u8; SIGNATURE_SIZE],
    };
    first.sign(&sender);
    assert_eq!(
        queue.enqueue(first, source_ip, Ipv4Addr::UNSPECIFIED, true, &mut filter, &bad_blocks),
        EnqueueOutcome::Accepted
    );

    let mut conflicting = TxRecord {
        uid: 101,
        from: sender.public_bytes(),
        to: recipient_b.public_bytes(),
        amount: value,
        signature: [0u8; SIGNATURE_SIZE],
    };
    conflicting.sign(&sender);
    assert_eq!(
        queue.enqueue(conflicting, source_ip, Ipv4Addr::UNSPECIFIED, true, &mut filter, &bad_blocks),
        EnqueueOutcome::DoubleSpend
    );

    let bad_blocks_len = std::fs::metadata(dir.join("bad_blocks.dat")).unwrap().len();
    assert_eq!(bad_blocks_len as usize, vfc_core::constants::RECORD_SIZE * 2);

    // the new uid is now blocked for the uniqueness window.
    assert!(filter.has_uid(101));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn signature_failure_is_rejected_before_balance_is_consulted() {
    let dir = temp_dir("sig-fail");
    let ledger = LedgerStore::open(dir.join("blocks.dat")).unwrap();
    let mut rexi = RecentExecRing::new();

    let sender = Keypair::generate();
    let mut record = TxRecord {
        uid: 1,
        from: sender.public_bytes(),
        to: [7u8; PUBKEY_SIZE],
        amount: 1000,
        signature: [0u8; SIGNATURE_SIZE],
    };
    record.sign(&sender);
    record.amount = 2000; // invalidates the signature

    let result = admission::admit(&record, &ledger, &mut rexi, MIN_NODE_DIFFICULTY);
    assert_eq!(result, Err(AdmissionError::SigFail));
    assert_eq!(ledger.height().unwrap(), 1);
    std::fs::remove_dir_all(&dir).ok();
}
