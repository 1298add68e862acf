//! Append-only ledger store for **vfc**.
//!
//! The ledger is a single flat file of fixed-width [`TxRecord`]s with no
//! header; `offset / RECORD_SIZE` is the record index (= height at the
//! tail). The only mutator is [`LedgerStore::append`], which retries
//! bounded-ly on short writes by truncating the tail back to the previous
//! record boundary (§4.2/§9: "partial-write recovery"). Reads are plain
//! sequential scans, memory-mapped on 64-bit hosts.
//!
//! [`BadBlocksLog`] is the parallel append-only file recording conflicting
//! record pairs whenever the queue detects a double spend.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, warn};

use crate::constants::{IO_RETRY_LIMIT, RECORD_SIZE};
use crate::error::{AdmissionError, Error, Result};
use crate::record::TxRecord;

/// The append-only transaction ledger backing a single node.
pub struct LedgerStore {
    path: PathBuf,
    write_handle: Mutex<File>,
}

impl LedgerStore {
    /// Opens (creating if absent) the ledger at `path`, truncating any
    /// partial tail record left by a crash and seeding the genesis record
    /// if the file is empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let store = Self { path, write_handle: Mutex::new(file) };
        store.recover_partial_tail()?;
        if store.height()? == 0 {
            store.append_unchecked(&TxRecord::genesis())?;
        }
        Ok(store)
    }

    fn recover_partial_tail(&self) -> Result<()> {
        let len = std::fs::metadata(&self.path)?.len();
        let remainder = len % RECORD_SIZE as u64;
        if remainder != 0 {
            warn!(remainder, "truncating partial tail record left by a crashed writer");
            let file = self.write_handle.lock().unwrap();
            file.set_len(len - remainder)?;
        }
        Ok(())
    }

    /// Total record count (`filesize / RECORD_SIZE`).
    pub fn height(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len() / RECORD_SIZE as u64)
    }

    /// Atomically appends one record at the tail, retrying up to
    /// `IO_RETRY_LIMIT` times on short writes.
    pub fn append(&self, record: &TxRecord) -> Result<()> {
        self.append_unchecked(record)
    }

    fn append_unchecked(&self, record: &TxRecord) -> Result<()> {
        let bytes = record.to_bytes();
        let mut file = self.write_handle.lock().unwrap();
        for attempt in 0..IO_RETRY_LIMIT {
            let before = file.seek(SeekFrom::End(0))?;
            match file.write(&bytes) {
                Ok(n) if n == bytes.len() => {
                    file.flush()?;
                    return Ok(());
                }
                Ok(n) => {
                    warn!(attempt, written = n, "short write appending ledger record, truncating tail and retrying");
                    file.set_len(before)?;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "transient error appending ledger record");
                    let _ = file.set_len(before);
                }
            }
        }
        error!("ledger append exhausted retry budget");
        Err(Error::Admission(AdmissionError::Write))
    }

    /// Scans every record in order, invoking `visit(index, record)`.
    ///
    /// Uses a memory map on 64-bit hosts and positioned reads (with
    /// bounded retry on transient read failure) elsewhere, per §4.2.
    pub fn scan<F: FnMut(u64, &TxRecord)>(&self, mut visit: F) -> Result<()> {
        #[cfg(target_pointer_width = "64")]
        {
            self.scan_mmap(&mut visit)
        }
        #[cfg(not(target_pointer_width = "64"))]
        {
            self.scan_positioned(&mut visit)
        }
    }

    #[cfg(target_pointer_width = "64")]
    fn scan_mmap<F: FnMut(u64, &TxRecord)>(&self, visit: &mut F) -> Result<()> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let usable = (len as usize / RECORD_SIZE) * RECORD_SIZE;
        for (idx, chunk) in mmap[..usable].chunks_exact(RECORD_SIZE).enumerate() {
            let record = TxRecord::from_bytes(chunk)?;
            visit(idx as u64, &record);
        }
        Ok(())
    }

    #[cfg_attr(target_pointer_width = "64", allow(dead_code))]
    fn scan_positioned<F: FnMut(u64, &TxRecord)>(&self, visit: &mut F) -> Result<()> {
        let mut file = File::open(&self.path)?;
        let mut buf = [0u8; RECORD_SIZE];
        let mut idx = 0u64;
        loop {
            let mut retries = 0;
            loop {
                match file.read_exact(&mut buf) {
                    Ok(()) => break,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => {
                        retries += 1;
                        if retries >= IO_RETRY_LIMIT {
                            return Err(Error::Io(e));
                        }
                        let pos = file.stream_position()?;
                        file.seek(SeekFrom::Start(pos))?;
                    }
                }
            }
            let record = TxRecord::from_bytes(&buf)?;
            visit(idx, &record);
            idx += 1;
        }
    }

    /// Reads a single record by index, for `find-by-uid` style queries.
    pub fn read_at(&self, index: u64) -> Result<Option<TxRecord>> {
        if index >= self.height()? {
            return Ok(None);
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(index * RECORD_SIZE as u64))?;
        let mut buf = [0u8; RECORD_SIZE];
        file.read_exact(&mut buf)?;
        Ok(Some(TxRecord::from_bytes(&buf)?))
    }

    /// Verifies the last `limit` records (excluding genesis) tail-to-head
    /// and truncates the file at the first signature failure.
    ///
    /// Returns the index truncation stopped at (== height if nothing was
    /// bad).
    pub fn truncate_from_first_bad(&self, limit: u64) -> Result<u64> {
        let height = self.height()?;
        let start = height.saturating_sub(limit).max(1);
        let mut first_bad: Option<u64> = None;
        let mut file = File::open(&self.path)?;
        for idx in start..height {
            file.seek(SeekFrom::Start(idx * RECORD_SIZE as u64))?;
            let mut buf = [0u8; RECORD_SIZE];
            file.read_exact(&mut buf)?;
            let record = TxRecord::from_bytes(&buf)?;
            if !record.verify_signature() {
                first_bad = Some(idx);
                break;
            }
        }
        if let Some(bad_idx) = first_bad {
            let write = self.write_handle.lock().unwrap();
            write.set_len(bad_idx * RECORD_SIZE as u64)?;
            warn!(bad_idx, "truncated ledger at first invalid signature");
        }
        Ok(first_bad.unwrap_or(height))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parallel append-only log of conflicting record pairs detected by the
/// transaction queue's double-spend check.
pub struct BadBlocksLog {
    file: Mutex<File>,
}

impl BadBlocksLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Appends the two conflicting records, original then challenger.
    pub fn record_pair(&self, original: &TxRecord, challenger: &TxRecord) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.write_all(&original.to_bytes())?;
        file.write_all(&challenger.to_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("vfc-core-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        p
    }

    #[test]
    fn open_seeds_genesis() {
        let path = temp_path("genesis");
        let store = LedgerStore::open(&path).unwrap();
        assert_eq!(store.height().unwrap(), 1);
        let genesis = store.read_at(0).unwrap().unwrap();
        assert!(genesis.is_genesis());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn append_and_scan_preserve_order() {
        let path = temp_path("scan");
        let store = LedgerStore::open(&path).unwrap();
        let kp = Keypair::generate();
        for uid in 1..=3u64 {
            let mut rec = TxRecord {
                uid,
                from: [0u8; crate::constants::PUBKEY_SIZE],
                to: [7u8; crate::constants::PUBKEY_SIZE],
                amount: 1000,
                signature: [0u8; crate::constants::SIGNATURE_SIZE],
            };
            rec.sign(&kp);
            store.append(&rec).unwrap();
        }
        assert_eq!(store.height().unwrap(), 4);
        let mut seen = vec![];
        store.scan(|idx, rec| seen.push((idx, rec.uid))).unwrap();
        assert_eq!(seen, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn truncate_from_first_bad_stops_at_tampered_record() {
        let path = temp_path("truncate");
        let store = LedgerStore::open(&path).unwrap();
        let kp = Keypair::generate();
        let mut good = TxRecord {
            uid: 1,
            from: [0u8; crate::constants::PUBKEY_SIZE],
            to: [7u8; crate::constants::PUBKEY_SIZE],
            amount: 1000,
            signature: [0u8; crate::constants::SIGNATURE_SIZE],
        };
        good.sign(&kp);
        store.append(&good).unwrap();

        let mut bad = TxRecord {
            uid: 2,
            from: [0u8; crate::constants::PUBKEY_SIZE],
            to: [8u8; crate::constants::PUBKEY_SIZE],
            amount: 500,
            signature: [0u8; crate::constants::SIGNATURE_SIZE],
        };
        bad.sign(&kp);
        bad.amount = 999; // invalidate signature after signing
        store.append(&bad).unwrap();

        let stopped_at = store.truncate_from_first_bad(10).unwrap();
        assert_eq!(stopped_at, 2);
        assert_eq!(store.height().unwrap(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bad_blocks_log_appends_pairs() {
        let path = temp_path("badblocks");
        let log = BadBlocksLog::open(&path).unwrap();
        let a = TxRecord::genesis();
        let b = TxRecord::genesis();
        log.record_pair(&a, &b).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len as usize, RECORD_SIZE * 2);
        std::fs::remove_file(&path).ok();
    }
}
