//! Bounded peer registry.
//!
//! Index 0 is permanently reserved for the hardcoded master address and is
//! never evicted or expired (§3, §4.4). Every other slot tracks the last
//! time a peer was seen, a relayed-transaction counter, and a free-text
//! user-agent string the peer volunteers via the `a` opcode.
//!
//! Actual network I/O (sending packets) is a node-crate concern; this
//! module only decides *who* to send to.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;

use crate::constants::{
    LIVING_PING_INTERVALS, MASTER_IP, MAX_PEERS, MAX_PEER_EXPIRE_SECONDS, PING_INTERVAL,
    USER_AGENT_MAX,
};
use crate::error::Result;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("time went backwards").as_secs()
}

/// Returns true for loopback or RFC1918 private ranges, which are never
/// registered as peers (though they still receive protocol responses).
pub fn is_private_or_loopback(ip: Ipv4Addr) -> bool {
    if ip.is_loopback() {
        return true;
    }
    let o = ip.octets();
    match o[0] {
        10 => true,
        172 => (16..=31).contains(&o[1]),
        192 => o[1] == 168,
        _ => false,
    }
}

/// Builds this node's own user-agent string: `height,version,nodename,
/// machine,difficulty`, the five comma-delimited fields described in §3.
pub fn format_user_agent(height: u64, node_name: &str, difficulty: f32) -> String {
    format!(
        "{},{},{},{},{:.3}",
        height,
        crate::constants::CURRENT_VERSION,
        node_name,
        std::env::consts::ARCH,
        difficulty
    )
}

/// The `height` field (index 0) of a peer's advertised user-agent.
pub fn parse_height_field(user_agent: &str) -> Option<u64> {
    user_agent.split(',').next()?.trim().parse().ok()
}

/// The `version` field (index 1) of a peer's advertised user-agent.
pub fn parse_version_field(user_agent: &str) -> Option<&str> {
    user_agent.split(',').nth(1).map(str::trim)
}

/// The `difficulty` field (index 4) of a peer's advertised user-agent.
pub fn parse_difficulty_field(user_agent: &str) -> Option<f32> {
    user_agent.split(',').nth(4)?.trim().parse().ok()
}

#[derive(Clone, Debug, Default)]
pub struct PeerEntry {
    /// IPv4 address, network byte order as a plain integer. `0` means the
    /// slot is free.
    pub addr: u32,
    pub last_seen: u64,
    pub relayed_count: u32,
    pub user_agent: String,
}

impl PeerEntry {
    fn is_empty(&self) -> bool {
        self.addr == 0
    }

    fn is_expired(&self) -> bool {
        now() >= self.last_seen + MAX_PEER_EXPIRE_SECONDS
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }
}

pub struct PeerRegistry {
    entries: Mutex<Vec<PeerEntry>>,
}

impl PeerRegistry {
    /// Builds a fresh registry with the master installed at index 0.
    pub fn new() -> Self {
        let registry = Self { entries: Mutex::new(vec![PeerEntry::default(); MAX_PEERS]) };
        registry.set_master();
        registry
    }

    /// Clears the table and installs the hardcoded master at index 0.
    pub fn set_master(&self) {
        let mut entries = self.entries.lock().unwrap();
        *entries = vec![PeerEntry::default(); MAX_PEERS];
        let master_addr: Ipv4Addr = MASTER_IP.parse().expect("hardcoded master ip is valid");
        entries[0] = PeerEntry {
            addr: u32::from(master_addr),
            last_seen: now(),
            relayed_count: 0,
            user_agent: "VFC-MASTER".to_string(),
        };
    }

    /// Refuses loopback/RFC1918 sources. Refreshes an existing entry's
    /// expiry and bumps its relay counter; otherwise inserts into the
    /// first free slot, or the lowest-index expired non-master slot if
    /// the table is full. Returns whether a slot was taken.
    pub fn add(&self, ip: Ipv4Addr) -> bool {
        if is_private_or_loopback(ip) {
            return false;
        }
        let addr = u32::from(ip);
        let mut entries = self.entries.lock().unwrap();
        if let Some(slot) = entries.iter_mut().find(|e| e.addr == addr) {
            slot.last_seen = now();
            slot.relayed_count += 1;
            return true;
        }
        if let Some(slot) = entries.iter_mut().find(|e| e.is_empty()) {
            *slot = PeerEntry { addr, last_seen: now(), relayed_count: 1, user_agent: String::new() };
            return true;
        }
        if let Some(slot) = entries.iter_mut().skip(1).find(|e| e.is_expired()) {
            *slot = PeerEntry { addr, last_seen: now(), relayed_count: 1, user_agent: String::new() };
            return true;
        }
        false
    }

    pub fn is_peer(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        self.entries.lock().unwrap().iter().any(|e| e.addr == addr)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<PeerEntry> {
        let addr = u32::from(ip);
        self.entries.lock().unwrap().iter().find(|e| e.addr == addr).cloned()
    }

    pub fn index_of(&self, ip: Ipv4Addr) -> Option<usize> {
        let addr = u32::from(ip);
        self.entries.lock().unwrap().iter().position(|e| e.addr == addr)
    }

    /// The address held in slot `index`, if any.
    pub fn ip_at(&self, index: usize) -> Option<Ipv4Addr> {
        self.entries.lock().unwrap().get(index).filter(|e| !e.is_empty()).map(|e| e.ip())
    }

    pub fn set_user_agent(&self, index: usize, user_agent: &str) {
        let truncated: String = user_agent.chars().take(USER_AGENT_MAX).collect();
        if let Some(slot) = self.entries.lock().unwrap().get_mut(index) {
            slot.user_agent = truncated;
        }
    }

    pub fn user_agent(&self, index: usize) -> Option<String> {
        self.entries.lock().unwrap().get(index).map(|e| e.user_agent.clone())
    }

    /// A peer is "living" if seen within `LIVING_PING_INTERVALS` ping
    /// intervals. The master is always considered living.
    pub fn count_living(&self) -> usize {
        let threshold = PING_INTERVAL * LIVING_PING_INTERVALS;
        let t = now();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(idx, e)| *idx == 0 || (!e.is_empty() && t < e.last_seen + threshold))
            .count()
    }

    /// Every peer except the master (index 0), for broadcast.
    pub fn all_except_master(&self) -> Vec<Ipv4Addr> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .skip(1)
            .filter(|e| !e.is_empty())
            .map(|e| e.ip())
            .collect()
    }

    /// Up to three living peers (excluding master), for a shallow fan-out
    /// echo of a transaction record.
    pub fn sample_living_for_tri_broadcast(&self) -> Vec<Ipv4Addr> {
        let threshold = PING_INTERVAL * LIVING_PING_INTERVALS;
        let t = now();
        let mut living: Vec<Ipv4Addr> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .skip(1)
            .filter(|e| !e.is_empty() && t < e.last_seen + threshold)
            .map(|e| e.ip())
            .collect();
        if living.len() <= 3 {
            return living;
        }
        let mut rng = rand::thread_rng();
        living.shuffle(&mut rng);
        living.truncate(3);
        living
    }

    pub fn master_addr(&self) -> Ipv4Addr {
        self.entries.lock().unwrap()[0].ip()
    }

    /// Refreshes the master's last-seen timestamp. The master is already
    /// immune to eviction regardless (§4.4); this exists only so the
    /// housekeeping ping tick can refresh its expiry per §4.8, matching
    /// the reference client's bookkeeping even though it changes no
    /// observable admission behavior.
    pub fn touch_master(&self) {
        self.entries.lock().unwrap()[0].last_seen = now();
    }

    /// Advances `index` forward to the next living, non-master peer slot,
    /// wrapping around. Used by the master's reward rotation.
    pub fn next_living_non_master(&self, from: usize) -> Option<usize> {
        let threshold = PING_INTERVAL * LIVING_PING_INTERVALS;
        let t = now();
        let entries = self.entries.lock().unwrap();
        let n = entries.len();
        for step in 1..n {
            let idx = (from + step) % n;
            if idx == 0 {
                continue;
            }
            let e = &entries[idx];
            if !e.is_empty() && t < e.last_seen + threshold {
                return Some(idx);
            }
        }
        None
    }

    /// Persists the four sidecar files described in §6.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let entries = self.entries.lock().unwrap();
        let mut addrs = Vec::with_capacity(MAX_PEERS * 4);
        let mut relayed = Vec::with_capacity(MAX_PEERS * 4);
        let mut expiries = Vec::with_capacity(MAX_PEERS * 8);
        let mut uas = Vec::with_capacity(MAX_PEERS * 64);
        for e in entries.iter() {
            addrs.extend_from_slice(&e.addr.to_le_bytes());
            relayed.extend_from_slice(&e.relayed_count.to_le_bytes());
            let expiry = if e.is_empty() { 0u64 } else { e.last_seen + MAX_PEER_EXPIRE_SECONDS };
            expiries.extend_from_slice(&expiry.to_le_bytes());
            let mut ua_buf = [0u8; 64];
            let ua_bytes = e.user_agent.as_bytes();
            let n = ua_bytes.len().min(63);
            ua_buf[..n].copy_from_slice(&ua_bytes[..n]);
            uas.extend_from_slice(&ua_buf);
        }
        write_atomic(&dir.join("peers.mem"), &addrs)?;
        write_atomic(&dir.join("peers1.mem"), &relayed)?;
        write_atomic(&dir.join("peers2.mem"), &expiries)?;
        write_atomic(&dir.join("peers3.mem"), &uas)?;
        Ok(())
    }

    /// Loads the sidecar files written by [`Self::save`]. On short-read
    /// corruption the load is abandoned without clearing in-memory state,
    /// per §4.4.
    pub fn load(&self, dir: &Path) -> Result<()> {
        let Ok(addrs) = read_exact_file(&dir.join("peers.mem"), MAX_PEERS * 4) else {
            return Ok(());
        };
        let Ok(relayed) = read_exact_file(&dir.join("peers1.mem"), MAX_PEERS * 4) else {
            return Ok(());
        };
        let Ok(expiries) = read_exact_file(&dir.join("peers2.mem"), MAX_PEERS * 8) else {
            return Ok(());
        };
        let Ok(uas) = read_exact_file(&dir.join("peers3.mem"), MAX_PEERS * 64) else {
            return Ok(());
        };

        let mut loaded = vec![PeerEntry::default(); MAX_PEERS];
        for i in 0..MAX_PEERS {
            let addr = u32::from_le_bytes(addrs[i * 4..i * 4 + 4].try_into().unwrap());
            let relayed_count = u32::from_le_bytes(relayed[i * 4..i * 4 + 4].try_into().unwrap());
            let expiry = u64::from_le_bytes(expiries[i * 8..i * 8 + 8].try_into().unwrap());
            let ua_bytes = &uas[i * 64..i * 64 + 64];
            let end = ua_bytes.iter().position(|&b| b == 0).unwrap_or(ua_bytes.len());
            let user_agent = String::from_utf8_lossy(&ua_bytes[..end]).into_owned();
            loaded[i] = PeerEntry {
                addr,
                last_seen: expiry.saturating_sub(MAX_PEER_EXPIRE_SECONDS),
                relayed_count,
                user_agent,
            };
        }
        *self.entries.lock().unwrap() = loaded;
        Ok(())
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    Ok(())
}

fn read_exact_file(path: &Path, expected_len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() != expected_len {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "sidecar file length mismatch"));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_zero_is_master_and_immortal() {
        let registry = PeerRegistry::new();
        assert_eq!(registry.master_addr(), MASTER_IP.parse::<Ipv4Addr>().unwrap());
        assert_eq!(registry.user_agent(0).unwrap(), "VFC-MASTER");
    }

    #[test]
    fn private_ranges_are_refused() {
        let registry = PeerRegistry::new();
        assert!(!registry.add(Ipv4Addr::new(192, 168, 1, 5)));
        assert!(!registry.add(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!registry.add(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn add_then_refresh_bumps_relay_count() {
        let registry = PeerRegistry::new();
        let ip = Ipv4Addr::new(8, 8, 8, 8);
        assert!(registry.add(ip));
        assert!(registry.add(ip));
        let entry = registry.get(ip).unwrap();
        assert_eq!(entry.relayed_count, 2);
    }

    #[test]
    fn user_agent_round_trips_its_fields() {
        let ua = format_user_agent(42, "vfc-node", 0.125);
        assert_eq!(parse_height_field(&ua), Some(42));
        assert_eq!(parse_version_field(&ua), Some(crate::constants::CURRENT_VERSION));
        assert_eq!(parse_difficulty_field(&ua), Some(0.125));
    }

    #[test]
    fn malformed_user_agent_yields_no_difficulty() {
        assert_eq!(parse_difficulty_field("vfc-node"), None);
        assert_eq!(parse_difficulty_field("1,2.0,name"), None);
    }

    #[test]
    fn table_saturates_until_an_entry_expires() {
        let registry = PeerRegistry::new();
        for i in 0..(MAX_PEERS as u32 - 1) {
            let ip = Ipv4Addr::from(0x08000000u32 + i);
            assert!(registry.add(ip), "slot {i} should have been free");
        }
        let overflow_ip = Ipv4Addr::new(9, 9, 9, 9);
        assert!(!registry.add(overflow_ip));
    }
}
