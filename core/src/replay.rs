//! Replay subsystem: who is allowed to stream us history, who we are
//! currently streaming to, and what window of the ledger a given replay
//! worker should send (§4.7).
//!
//! Actual socket I/O belongs to the node crate; this module only decides
//! *whether* a source is authorized and *which* records a worker should
//! emit, so the planning logic can be tested without a network.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;

use rand::Rng;

use crate::constants::{MASTER_IP, MAX_RALLOW, MAX_THREADS_BUFF, REPLAY_HEAD_SIZE, REPLAY_SIZE};
use crate::error::Result;

/// Sources permitted to stream `p`-opcode replay records to this node.
///
/// The master and loopback are always implicitly authorized; everything
/// else must be in this list, built by issuing `r` requests.
pub struct ReplayAllowList {
    addrs: Mutex<Vec<u32>>,
}

impl ReplayAllowList {
    pub fn new() -> Self {
        Self { addrs: Mutex::new(Vec::with_capacity(MAX_RALLOW)) }
    }

    /// Adds `ip` if not already present and the list has room.
    pub fn add(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        let mut addrs = self.addrs.lock().unwrap();
        if addrs.contains(&addr) {
            return true;
        }
        if addrs.len() >= MAX_RALLOW {
            return false;
        }
        addrs.push(addr);
        true
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.addrs.lock().unwrap().contains(&u32::from(ip))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let addrs = self.addrs.lock().unwrap();
        let mut buf = Vec::with_capacity(addrs.len() * 4);
        for a in addrs.iter() {
            buf.extend_from_slice(&a.to_le_bytes());
        }
        File::create(path)?.write_all(&buf)?;
        Ok(())
    }

    pub fn load(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let Ok(mut file) = File::open(path) else {
            return Ok(());
        };
        file.read_to_end(&mut buf)?;
        if buf.len() % 4 != 0 {
            return Ok(());
        }
        let addrs: Vec<u32> =
            buf.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect();
        *self.addrs.lock().unwrap() = addrs;
        Ok(())
    }
}

impl Default for ReplayAllowList {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `source` may send this node `p`-opcode replay records.
pub fn is_authorized_replay_source(source: Ipv4Addr, allow_list: &ReplayAllowList) -> bool {
    if source.is_loopback() {
        return true;
    }
    if let Ok(master) = MASTER_IP.parse::<Ipv4Addr>() {
        if source == master {
            return true;
        }
    }
    allow_list.contains(source)
}

/// Tracks destinations currently being streamed to, so a second `r`
/// request from the same peer does not spawn a duplicate worker.
pub struct ThreadIpTable {
    addrs: Mutex<Vec<u32>>,
}

impl ThreadIpTable {
    pub fn new() -> Self {
        Self { addrs: Mutex::new(Vec::with_capacity(MAX_THREADS_BUFF)) }
    }

    /// Registers `ip` as an active replay destination. Returns `false`
    /// (and does not register) if `ip` is already being streamed to or
    /// the table is full.
    pub fn try_start(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        let mut addrs = self.addrs.lock().unwrap();
        if addrs.contains(&addr) || addrs.len() >= MAX_THREADS_BUFF {
            return false;
        }
        addrs.push(addr);
        true
    }

    pub fn finish(&self, ip: Ipv4Addr) {
        let addr = u32::from(ip);
        self.addrs.lock().unwrap().retain(|&a| a != addr);
    }
}

impl Default for ThreadIpTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The record ranges a replay worker should send, as record indices into
/// the ledger (half-open `[start, start+len)`, ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayPlan {
    /// The requester is behind: send the most recent `REPLAY_HEAD_SIZE`
    /// records tail-to-head, then one randomly chosen `REPLAY_SIZE`-record
    /// window.
    Behind { head_window: (u64, usize), random_window: (u64, usize) },
    /// The requester is caught up or ahead: send the most recent
    /// `REPLAY_SIZE * 5` records, tail-to-head.
    CaughtUp { window: (u64, usize) },
}

/// Builds the plan a replay worker should follow given the local ledger
/// height and the requester's advertised height (parsed from their
/// user-agent string).
pub fn plan_replay(local_height: u64, peer_height: u64) -> ReplayPlan {
    if peer_height < local_height {
        let head_len = REPLAY_HEAD_SIZE.min(local_height as usize);
        let head_start = local_height - head_len as u64;

        let window_len = REPLAY_SIZE.min(local_height as usize);
        let max_start = local_height - window_len as u64;
        let window_start = if max_start == 0 { 0 } else { rand::thread_rng().gen_range(0..=max_start) };

        ReplayPlan::Behind { head_window: (head_start, head_len), random_window: (window_start, window_len) }
    } else {
        let window_len = (REPLAY_SIZE * 5).min(local_height as usize);
        let window_start = local_height - window_len as u64;
        ReplayPlan::CaughtUp { window: (window_start, window_len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_is_always_authorized() {
        let list = ReplayAllowList::new();
        assert!(is_authorized_replay_source(Ipv4Addr::LOCALHOST, &list));
    }

    #[test]
    fn unlisted_peer_is_not_authorized() {
        let list = ReplayAllowList::new();
        assert!(!is_authorized_replay_source(Ipv4Addr::new(8, 8, 8, 8), &list));
    }

    #[test]
    fn allow_list_add_persists_membership() {
        let list = ReplayAllowList::new();
        let ip = Ipv4Addr::new(8, 8, 8, 8);
        assert!(list.add(ip));
        assert!(list.contains(ip));
        assert!(is_authorized_replay_source(ip, &list));
    }

    #[test]
    fn thread_table_refuses_duplicate_destination() {
        let table = ThreadIpTable::new();
        let ip = Ipv4Addr::new(1, 2, 3, 4);
        assert!(table.try_start(ip));
        assert!(!table.try_start(ip));
        table.finish(ip);
        assert!(table.try_start(ip));
    }

    #[test]
    fn behind_peer_gets_head_then_random_window() {
        let plan = plan_replay(10_000, 100);
        match plan {
            ReplayPlan::Behind { head_window, random_window } => {
                assert_eq!(head_window.1, REPLAY_HEAD_SIZE);
                assert_eq!(random_window.1, REPLAY_SIZE);
            }
            _ => panic!("expected Behind"),
        }
    }

    #[test]
    fn caught_up_peer_gets_tail_quintuple_window() {
        let plan = plan_replay(100, 100);
        match plan {
            ReplayPlan::CaughtUp { window } => assert_eq!(window.0 + window.1 as u64, 100),
            _ => panic!("expected CaughtUp"),
        }
    }

    #[test]
    fn small_ledger_clamps_window_sizes() {
        let plan = plan_replay(10, 0);
        match plan {
            ReplayPlan::Behind { head_window, random_window } => {
                assert_eq!(head_window.1, 10);
                assert_eq!(random_window.1, 10);
            }
            _ => panic!("expected Behind"),
        }
    }
}
