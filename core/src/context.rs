//! [`NodeContext`]: the shared state every protocol handler, admission
//! worker, replay worker and housekeeping tick operates on. One instance
//! is built at startup and handed to the node crate's threads as an
//! `Arc<NodeContext>`, standing in for the reference client's collection
//! of global statics behind `mutex1..mutex3`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::ledger::{BadBlocksLog, LedgerStore};
use crate::peers::PeerRegistry;
use crate::queue::TxQueue;
use crate::replay::{ReplayAllowList, ThreadIpTable};
use crate::uniqueness::{RecentExecRing, UidFilter};

/// All shared, mutable node state.
///
/// Interior mutability is pushed down to each field's own lock (the
/// ledger's write mutex, the queue's entry mutex, the peer registry's
/// mutex) rather than one coarse lock around the whole struct, matching
/// the reference client's `mutex1`/`mutex2`/`mutex3` split: peer table,
/// transaction queue, and ledger append each have independent critical
/// sections so one slow peer-table write cannot stall ledger commits.
pub struct NodeContext {
    pub config: Config,
    pub ledger: LedgerStore,
    pub bad_blocks: BadBlocksLog,
    pub peers: PeerRegistry,
    pub queue: TxQueue,
    pub replay_allow: ReplayAllowList,
    pub replay_threads: ThreadIpTable,

    uid_filter: Mutex<UidFilter>,
    rexi: Mutex<RecentExecRing>,

    /// Remote-advertised ledger byte length, tracked so it never
    /// regresses (§4.8: `h` packets only ever raise it).
    replay_height: AtomicU32,

    /// Running count of I/O and protocol errors, surfaced by the
    /// housekeeping stat line.
    error_count: AtomicU32,
}

impl NodeContext {
    /// Opens every on-disk component rooted at `config.data_dir` and
    /// returns a freshly assembled context. Sidecar files that do not yet
    /// exist are treated as empty, not an error.
    pub fn open(config: Config) -> Result<Self> {
        let ledger = LedgerStore::open(config.blocks_path())?;
        let bad_blocks = BadBlocksLog::open(config.bad_blocks_path())?;

        let peers = PeerRegistry::new();
        peers.load(&config.data_dir)?;

        let replay_allow = ReplayAllowList::new();
        replay_allow.load(&config.replay_allow_path())?;

        Ok(Self {
            config,
            ledger,
            bad_blocks,
            peers,
            queue: TxQueue::new(),
            replay_allow,
            replay_threads: ThreadIpTable::new(),
            uid_filter: Mutex::new(UidFilter::new()),
            rexi: Mutex::new(RecentExecRing::new()),
            replay_height: AtomicU32::new(0),
            error_count: AtomicU32::new(0),
        })
    }

    pub fn with_uid_filter<R>(&self, f: impl FnOnce(&mut UidFilter) -> R) -> R {
        f(&mut self.uid_filter.lock().unwrap())
    }

    pub fn with_rexi<R>(&self, f: impl FnOnce(&mut RecentExecRing) -> R) -> R {
        f(&mut self.rexi.lock().unwrap())
    }

    pub fn replay_height(&self) -> u32 {
        self.replay_height.load(Ordering::Relaxed)
    }

    /// Updates the tracked replay height, but only upward.
    pub fn advance_replay_height(&self, candidate: u32) {
        self.replay_height.fetch_max(candidate, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(total = self.error_count() + 1, "node error counter incremented");
    }

    /// Persists every sidecar file the node keeps outside the ledger
    /// (peer table, replay allow list), called from the housekeeping
    /// tick.
    pub fn persist_sidecars(&self) -> Result<()> {
        self.peers.save(&self.config.data_dir)?;
        self.replay_allow.save(&self.config.replay_allow_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str) -> Config {
        let mut dir = std::env::temp_dir();
        dir.push(format!("vfc-context-test-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        Config { data_dir: dir, ..Config::default() }
    }

    #[test]
    fn open_seeds_genesis_and_master_peer() {
        let cfg = temp_config("open");
        let ctx = NodeContext::open(cfg.clone()).unwrap();
        assert_eq!(ctx.ledger.height().unwrap(), 1);
        assert_eq!(ctx.peers.count_living(), 1);
        std::fs::remove_dir_all(&cfg.data_dir).ok();
    }

    #[test]
    fn replay_height_never_regresses() {
        let cfg = temp_config("height");
        let ctx = NodeContext::open(cfg.clone()).unwrap();
        ctx.advance_replay_height(100);
        ctx.advance_replay_height(10);
        assert_eq!(ctx.replay_height(), 100);
        std::fs::remove_dir_all(&cfg.data_dir).ok();
    }

    #[test]
    fn error_counter_increments() {
        let cfg = temp_config("errors");
        let ctx = NodeContext::open(cfg.clone()).unwrap();
        ctx.record_error();
        ctx.record_error();
        assert_eq!(ctx.error_count(), 2);
        std::fs::remove_dir_all(&cfg.data_dir).ok();
    }
}
