//! The uniqueness filter and the recently-executed ring.
//!
//! Two deliberately different precision tiers, per Design Note 3: the
//! filter is a coarse, racy, shed-load gate; the ring is an exact
//! short-window guard consulted only inside the ledger append lock. They
//! are not interchangeable and a correct reimplementation keeps both.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{MAX_REXI_SIZE, MAX_SITES, REXI_EXPIRE_SECONDS};

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("time went backwards").as_secs()
}

#[derive(Clone, Copy, Default)]
struct Bucket {
    low: u16,
    high: u16,
    expire_epoch: u64,
}

/// Bounded-memory, false-positive-permitting uid membership filter.
///
/// A uid hashes to a bucket by `uid % MAX_SITES`. Within the bucket, a
/// second projection of the uid is checked against a running `[low, high]`
/// range recorded for that bucket.
///
/// That second projection is `uid % (size_of::<u16>() - 1) + 1`, following
/// the reference client's `uid % (sizeof(unsigned short)-1) + 1` exactly.
/// Since `size_of::<u16>() - 1 == 1`, this evaluates to `1` for every uid:
/// the range check degenerates into "has this bucket ever recorded
/// anything". This is reproduced bit-exactly per Design Note 9 rather than
/// "fixed" into a real projection, which would be a protocol change.
pub struct UidFilter {
    buckets: Vec<Bucket>,
}

impl UidFilter {
    pub fn new() -> Self {
        Self { buckets: vec![Bucket::default(); MAX_SITES as usize] }
    }

    fn bucket_index(uid: u64) -> usize {
        (uid % MAX_SITES) as usize
    }

    fn projection(uid: u64) -> u16 {
        (uid % (std::mem::size_of::<u16>() as u64 - 1) + 1) as u16
    }

    /// Returns whether `uid` is currently recognized by the filter.
    pub fn has_uid(&mut self, uid: u64) -> bool {
        let idx = Self::bucket_index(uid);
        let bucket = &mut self.buckets[idx];
        if now() >= bucket.expire_epoch {
            *bucket = Bucket::default();
        }
        let projection = Self::projection(uid);
        bucket.low != 0 && projection >= bucket.low && projection <= bucket.high
    }

    /// Records `uid` as seen for `window_seconds`, widening the bucket's
    /// range to include the uid's projection. Logs (at debug level) when a
    /// bucket already held a range, since distinct uids sharing a bucket
    /// is an expected but noteworthy collision.
    pub fn add_uid(&mut self, uid: u64, window_seconds: u64) {
        let idx = Self::bucket_index(uid);
        let bucket = &mut self.buckets[idx];
        if now() >= bucket.expire_epoch {
            bucket.low = 0;
            bucket.high = 0;
            bucket.expire_epoch = now() + window_seconds;
        }
        if bucket.low != 0 {
            tracing::debug!(bucket = idx, "uid filter collision");
        }
        let projection = Self::projection(uid);
        if projection < bucket.low || bucket.low == 0 {
            bucket.low = projection;
        }
        if projection > bucket.high || bucket.high == 0 {
            bucket.high = projection;
        }
    }
}

impl Default for UidFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Default)]
struct RexiEntry {
    uid: u64,
    expire_epoch: u64,
}

/// A small, exact, linear last-line guard against a uid being committed to
/// the ledger twice by two workers racing past the coarse uniqueness
/// filter. Consulted only inside the append critical section.
pub struct RecentExecRing {
    entries: Vec<RexiEntry>,
}

impl RecentExecRing {
    pub fn new() -> Self {
        Self { entries: vec![RexiEntry::default(); MAX_REXI_SIZE] }
    }

    /// Returns true and leaves state unchanged if `uid` is present and
    /// unexpired. Otherwise evicts the first expired slot (or the first
    /// slot, if none are expired) and inserts `(uid, now + REXI_EXPIRE_SECONDS)`.
    pub fn check_and_insert(&mut self, uid: u64) -> bool {
        let t = now();
        for entry in &self.entries {
            if entry.uid == uid && entry.expire_epoch > t {
                return true;
            }
        }
        let slot = self
            .entries
            .iter()
            .position(|e| e.expire_epoch <= t)
            .unwrap_or(0);
        self.entries[slot] = RexiEntry { uid, expire_epoch: t + REXI_EXPIRE_SECONDS };
        false
    }
}

impl Default for RecentExecRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_uid_is_not_present() {
        let mut filter = UidFilter::new();
        assert!(!filter.has_uid(12345));
    }

    #[test]
    fn added_uid_is_present_until_window_expires() {
        let mut filter = UidFilter::new();
        filter.add_uid(12345, 3600);
        assert!(filter.has_uid(12345));
    }

    #[test]
    fn projection_degenerates_to_one_for_every_uid() {
        assert_eq!(UidFilter::projection(0), 1);
        assert_eq!(UidFilter::projection(987654321), 1);
        assert_eq!(UidFilter::projection(u64::MAX), 1);
    }

    #[test]
    fn same_bucket_blocks_any_uid_once_populated() {
        // Two different uids landing in the same bucket: because the
        // projection is degenerate, adding one blocks the other too.
        let mut filter = UidFilter::new();
        let a = 5u64;
        let b = a + MAX_SITES; // same bucket index as `a`
        filter.add_uid(a, 3600);
        assert!(filter.has_uid(b));
    }

    #[test]
    fn recent_exec_ring_blocks_repeat_within_window() {
        let mut ring = RecentExecRing::new();
        assert!(!ring.check_and_insert(42));
        assert!(ring.check_and_insert(42));
    }
}
