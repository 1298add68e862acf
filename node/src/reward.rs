//! Master-only periodic reward scheduler (§4.8, §8 scenario 6).
//!
//! Every `REWARD_INTERVAL` the master advances `reward_index` to the next
//! living non-master peer and solicits its reward public key with an `x`
//! packet, retrying once a second. A ` ` (space) reply carrying the
//! candidate's public key pays out a fixed reward and marks the round
//! done; if the candidate never answers within the interval, the cursor
//! advances to the next living peer instead.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;
use vfc_core::constants::{REWARD_INTERVAL, REWARD_RETRY_INTERVAL};
use vfc_core::crypto::PublicKeyBytes;

use crate::state::NodeState;

/// Fixed reward amount (in 1/1000 units) paid to a responsive candidate.
const REWARD_VALUE: u32 = 3_000;

struct RewardRound {
    candidate_index: Option<usize>,
    awaiting: bool,
}

pub struct RewardScheduler {
    round: Mutex<RewardRound>,
    last_rotation: AtomicU64,
}

impl RewardScheduler {
    pub fn new() -> Self {
        Self {
            round: Mutex::new(RewardRound { candidate_index: None, awaiting: false }),
            last_rotation: AtomicU64::new(0),
        }
    }

    /// Called from the housekeeping tick; advances the cursor if a round
    /// is due and nobody answered the previous candidate.
    pub fn maybe_rotate(&self, state: &NodeState, now_secs: u64) {
        if !state.ctx.config.is_master {
            return;
        }
        let last = self.last_rotation.load(Ordering::Relaxed);
        if now_secs < last + REWARD_INTERVAL {
            return;
        }
        self.last_rotation.store(now_secs, Ordering::Relaxed);

        let mut round = self.round.lock().unwrap();
        let from = round.candidate_index.unwrap_or(0);
        let Some(next) = state.ctx.peers.next_living_non_master(from) else {
            return;
        };
        round.candidate_index = Some(next);
        round.awaiting = true;
        info!(peer_index = next, "reward cursor advanced, soliciting reward key");
    }

    /// Called roughly once a second while a round is open; resends the
    /// `x` solicitation to the current candidate.
    pub fn tick_solicit(&self, state: &NodeState) {
        if !state.ctx.config.is_master {
            return;
        }
        let round = self.round.lock().unwrap();
        let (Some(idx), true) = (round.candidate_index, round.awaiting) else {
            return;
        };
        let Some(ip) = state.ctx.peers.ip_at(idx) else {
            return;
        };
        let _ = state.socket.send_to(&[vfc_core::constants::opcode::REWARD_SOLICIT], (ip, state.ctx.config.listen_port));
        std::thread::sleep(Duration::from_secs(REWARD_RETRY_INTERVAL).min(Duration::from_secs(1)));
    }

    /// Handles a ` `-opcode volunteer reply. Pays `REWARD_VALUE` if it
    /// comes from the current candidate and a round is open.
    pub fn handle_volunteer(&self, state: &NodeState, source: Ipv4Addr, pubkey: PublicKeyBytes) {
        if !state.ctx.config.is_master {
            return;
        }
        let mut round = self.round.lock().unwrap();
        let Some(idx) = round.candidate_index else { return };
        if !round.awaiting {
            return;
        }
        if state.ctx.peers.index_of(source) != Some(idx) {
            return;
        }
        round.awaiting = false;
        drop(round);

        let amount = reward_amount_for(state.ctx.peers.user_agent(idx).as_deref());

        let mut reward = vfc_core::record::TxRecord {
            uid: vfc_core::crypto::crc64(0, &pubkey),
            from: vfc_core::crypto::genesis_pubkey(),
            to: pubkey,
            amount,
            signature: [0u8; vfc_core::constants::SIGNATURE_SIZE],
        };
        // The genesis key has no known private scalar; the reference
        // client's master process holds it out-of-band. Here the
        // signature is left zeroed and admission of genesis-sourced
        // reward records is expected to be authorized structurally (by
        // the master's own trusted admission path) rather than via
        // signature verification, matching the reference's special-cased
        // `from == genesis` admission branch.
        reward.signature = [0u8; vfc_core::constants::SIGNATURE_SIZE];
        if let Err(e) = state.ctx.ledger.append(&reward) {
            tracing::warn!(error = %e, "failed to append reward payout");
            return;
        }
        info!(peer_index = idx, amount, "reward paid");
    }
}

impl Default for RewardScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// The payout amount for a candidate's reported user-agent: the full
/// [`REWARD_VALUE`] if it carries the current version string, zero if
/// it's missing or stale (§8 scenario 6).
fn reward_amount_for(user_agent: Option<&str>) -> u32 {
    match user_agent {
        Some(ua) if vfc_core::peers::parse_version_field(ua) == Some(vfc_core::constants::CURRENT_VERSION) => {
            REWARD_VALUE
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vfc_core::peers::format_user_agent;

    #[test]
    fn current_version_pays_full_reward() {
        let ua = format_user_agent(10, "vfc-node", 0.1);
        assert_eq!(reward_amount_for(Some(&ua)), REWARD_VALUE);
    }

    #[test]
    fn missing_or_stale_version_pays_nothing() {
        assert_eq!(reward_amount_for(None), 0);
        assert_eq!(reward_amount_for(Some("10,1.0,vfc-node,x86_64,0.100")), 0);
        assert_eq!(reward_amount_for(Some("not a user agent")), 0);
    }
}

