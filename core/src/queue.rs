//! The bounded in-memory transaction queue and its double-spend detector.
//!
//! Mutation of the queue (both enqueue from the listener and dequeue by an
//! admission worker) is serialized by the queue's own internal lock,
//! standing in for the reference client's `mutex2` (§5).

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::info;

use crate::constants::{LIVE_TX_GRACE_SECONDS, MAX_TRANS_QUEUE, UID_BLOCK_SECONDS};
use crate::ledger::BadBlocksLog;
use crate::record::TxRecord;
use crate::uniqueness::UidFilter;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("time went backwards").as_secs()
}

#[derive(Clone, Copy)]
pub struct QueueEntry {
    pub record: TxRecord,
    pub immediate_ip: u32,
    pub referred_ip: u32,
    /// `true` for a live `t`/`d` transaction, `false` for a `p` replay
    /// record — the reference's own inverted naming for this flag,
    /// preserved bit-exactly rather than renamed to its true meaning.
    pub is_replay: bool,
    pub enqueue_time: u64,
}

impl QueueEntry {
    fn free() -> Self {
        Self {
            record: TxRecord { amount: 0, ..TxRecord::genesis() },
            immediate_ip: 0,
            referred_ip: 0,
            is_replay: false,
            enqueue_time: 0,
        }
    }

    fn is_free(&self) -> bool {
        self.record.is_free_slot()
    }
}

/// Outcome of attempting to enqueue a record. Determines whether the
/// caller should re-propagate the packet to other peers.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Installed in the queue; caller should propagate.
    Accepted,
    /// A repeat of an already-queued uid; not a double spend, do not
    /// propagate.
    DuplicateSilent,
    /// Zero amount, already-filtered uid, or the queue is full.
    Rejected,
    /// Conflicts with a pending entry from the same sender to a different
    /// recipient; both sides logged to bad-blocks and the uid blocked.
    /// Caller should propagate so peers invalidate the same pair.
    DoubleSpend,
}

pub struct TxQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl TxQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(vec![QueueEntry::free(); MAX_TRANS_QUEUE]) }
    }

    pub fn enqueue(
        &self,
        record: TxRecord,
        immediate_ip: Ipv4Addr,
        referred_ip: Ipv4Addr,
        is_replay: bool,
        filter: &mut UidFilter,
        bad_blocks: &BadBlocksLog,
    ) -> EnqueueOutcome {
        if record.amount == 0 {
            return EnqueueOutcome::Rejected;
        }
        if filter.has_uid(record.uid) {
            return EnqueueOutcome::Rejected;
        }

        let mut entries = self.entries.lock().unwrap();

        // `is_replay` is true for a live `t`/`d` transaction and false for
        // an actual `p` replay record (the reference's own inverted `ir`
        // naming, preserved bit-exactly — see §4.8's opcode table). A
        // double-spend conflict can only be detected between two live
        // entries: a replay stream is historical and already-admitted, so
        // it never competes with a pending spend.
        if is_replay {
            if let Some(conflict_idx) = entries.iter().position(|e| {
                !e.is_free()
                    && e.is_replay
                    && e.record.from == record.from
                    && e.record.to != record.to
            }) {
                let original = entries[conflict_idx].record;
                if bad_blocks.record_pair(&original, &record).is_err() {
                    tracing::warn!("failed to log double-spend pair to bad-blocks file");
                }
                entries[conflict_idx] = QueueEntry::free();
                filter.add_uid(record.uid, UID_BLOCK_SECONDS);
                info!(uid = record.uid, "double spend detected, invalidating pending entry");
                return EnqueueOutcome::DoubleSpend;
            }
        }

        if entries.iter().any(|e| !e.is_free() && e.record.uid == record.uid) {
            return EnqueueOutcome::DuplicateSilent;
        }

        let Some(slot) = entries.iter().position(|e| e.is_free()) else {
            return EnqueueOutcome::Rejected;
        };
        entries[slot] = QueueEntry {
            record,
            immediate_ip: u32::from(immediate_ip),
            referred_ip: u32::from(referred_ip),
            is_replay,
            enqueue_time: now(),
        };
        drop(entries);

        filter.add_uid(record.uid, UID_BLOCK_SECONDS);
        EnqueueOutcome::Accepted
    }

    /// Picks a random starting index and searches both directions for a
    /// non-empty slot that is either a replay record or old enough
    /// (`LIVE_TX_GRACE_SECONDS`) to give peers time to veto it. Removes and
    /// returns the entry.
    pub fn dequeue(&self) -> Option<QueueEntry> {
        let mut entries = self.entries.lock().unwrap();
        let n = entries.len();
        if n == 0 {
            return None;
        }
        let start = rand::thread_rng().gen_range(0..n);
        for offset in 0..n {
            for idx in [start.wrapping_add(offset) % n, (start + n - offset) % n] {
                let e = &entries[idx];
                if e.is_free() {
                    continue;
                }
                let eligible = e.is_replay || now().saturating_sub(e.enqueue_time) >= LIVE_TX_GRACE_SECONDS;
                if eligible {
                    let entry = *e;
                    entries[idx] = QueueEntry::free();
                    return Some(entry);
                }
            }
        }
        None
    }
}

impl Default for TxQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PUBKEY_SIZE, SIGNATURE_SIZE};

    fn rec(uid: u64, from: u8, to: u8, amount: u32) -> TxRecord {
        TxRecord {
            uid,
            from: [from; PUBKEY_SIZE],
            to: [to; PUBKEY_SIZE],
            amount,
            signature: [0u8; SIGNATURE_SIZE],
        }
    }

    fn fresh(dir_suffix: &str) -> (TxQueue, UidFilter, BadBlocksLog, std::path::PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!("vfc-queue-test-{}-{}", std::process::id(), dir_suffix));
        let _ = std::fs::remove_file(&path);
        (TxQueue::new(), UidFilter::new(), BadBlocksLog::open(&path).unwrap(), path)
    }

    #[test]
    fn zero_amount_is_rejected() {
        let (q, mut f, b, p) = fresh("zero");
        let outcome = q.enqueue(rec(1, 1, 2, 0), Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::UNSPECIFIED, true, &mut f, &b);
        assert_eq!(outcome, EnqueueOutcome::Rejected);
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn duplicate_uid_is_silent() {
        let (q, mut f, b, p) = fresh("dup");
        let ip = Ipv4Addr::new(1, 1, 1, 1);
        assert_eq!(q.enqueue(rec(1, 1, 2, 100), ip, Ipv4Addr::UNSPECIFIED, true, &mut f, &b), EnqueueOutcome::Accepted);
        assert_eq!(q.enqueue(rec(1, 1, 2, 100), ip, Ipv4Addr::UNSPECIFIED, true, &mut f, &b), EnqueueOutcome::Rejected);
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn conflicting_live_entries_are_double_spend() {
        let (q, mut f, b, p) = fresh("dspend");
        let ip = Ipv4Addr::new(1, 1, 1, 1);
        assert_eq!(
            q.enqueue(rec(1, 9, 2, 100), ip, Ipv4Addr::UNSPECIFIED, true, &mut f, &b),
            EnqueueOutcome::Accepted
        );
        assert_eq!(
            q.enqueue(rec(2, 9, 3, 100), ip, Ipv4Addr::UNSPECIFIED, true, &mut f, &b),
            EnqueueOutcome::DoubleSpend
        );
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn conflicting_replay_entries_do_not_double_spend() {
        let (q, mut f, b, p) = fresh("dspend-replay");
        let ip = Ipv4Addr::new(1, 1, 1, 1);
        assert_eq!(
            q.enqueue(rec(1, 9, 2, 100), ip, Ipv4Addr::UNSPECIFIED, false, &mut f, &b),
            EnqueueOutcome::Accepted
        );
        assert_eq!(
            q.enqueue(rec(2, 9, 3, 100), ip, Ipv4Addr::UNSPECIFIED, false, &mut f, &b),
            EnqueueOutcome::Accepted
        );
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn dequeue_skips_fresh_live_entries() {
        let (q, mut f, b, p) = fresh("dq");
        let ip = Ipv4Addr::new(1, 1, 1, 1);
        q.enqueue(rec(1, 1, 2, 100), ip, Ipv4Addr::UNSPECIFIED, false, &mut f, &b);
        assert!(q.dequeue().is_none());
        std::fs::remove_file(&p).ok();
    }

    #[test]
    fn dequeue_returns_replay_entries_immediately() {
        let (q, mut f, b, p) = fresh("dqreplay");
        let ip = Ipv4Addr::new(1, 1, 1, 1);
        q.enqueue(rec(1, 1, 2, 100), ip, Ipv4Addr::UNSPECIFIED, true, &mut f, &b);
        let entry = q.dequeue().expect("replay entry should be eligible immediately");
        assert_eq!(entry.record.uid, 1);
        std::fs::remove_file(&p).ok();
    }
}
