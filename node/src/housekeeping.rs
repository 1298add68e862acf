//! Periodic housekeeping tick (§4.8): persist sidecars, recompute network
//! difficulty, reload the replay allow-list, and drive the reward
//! scheduler. Runs on its own thread every `housekeeping_interval_secs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use vfc_core::constants::{opcode, PING_INTERVAL};

use crate::reward::RewardScheduler;
use crate::state::NodeState;

const RESYNC_INTERVAL_SECS: u64 = 9 * 60;
const HOURLY_SECS: u64 = 3600;

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("time went backwards").as_secs()
}

/// Runs the housekeeping loop until `running` is cleared (set `false` by
/// the SIGINT handler).
pub fn run(state: &NodeState, rewards: &RewardScheduler, running: &std::sync::atomic::AtomicBool) {
    let last_resync = AtomicU64::new(now());
    let last_ping = AtomicU64::new(0);
    let last_ip_refresh = AtomicU64::new(now());

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(state.ctx.config.housekeeping_interval_secs));

        if let Err(e) = state.ctx.persist_sidecars() {
            warn!(error = %e, "failed to persist sidecar files");
            state.ctx.record_error();
        }

        recompute_network_difficulty(state);

        let t = now();
        if t >= last_resync.load(Ordering::Relaxed) + RESYNC_INTERVAL_SECS {
            last_resync.store(t, Ordering::Relaxed);
            trigger_resync(state);
        }

        if t >= last_ping.load(Ordering::Relaxed) + PING_INTERVAL {
            last_ping.store(t, Ordering::Relaxed);
            ping_all_peers(state);
        }

        if t >= last_ip_refresh.load(Ordering::Relaxed) + HOURLY_SECS {
            last_ip_refresh.store(t, Ordering::Relaxed);
            refresh_public_ip_registration(state);
        }

        rewards.maybe_rotate(state, t);
        rewards.tick_solicit(state);
    }

    if let Err(e) = state.ctx.persist_sidecars() {
        warn!(error = %e, "failed to persist sidecar files during shutdown");
    }
    info!("housekeeping thread exiting");
}

/// Recomputes the node's view of network difficulty from every peer's
/// last-advertised user-agent difficulty field, folded with the local
/// configured value (§4.9).
fn recompute_network_difficulty(state: &NodeState) {
    let mut peer_values = Vec::new();
    for ip in state.ctx.peers.all_except_master() {
        if let Some(index) = state.ctx.peers.index_of(ip) {
            if let Some(ua) = state.ctx.peers.user_agent(index) {
                if let Some(diff) = vfc_core::peers::parse_difficulty_field(&ua) {
                    peer_values.push(diff);
                }
            }
        }
    }
    let blended = vfc_core::mining::network_difficulty(state.ctx.config.node_difficulty, &peer_values);
    state.set_network_difficulty(blended);
}

/// Requests a fresh replay stream from a handful of peers (equivalent to
/// the reference's `resyncBlocks`; per Design Note in §9, the ambiguity
/// over which peer count to honor is resolved here by always asking a
/// small fixed set rather than threading a separately-scoped peer count
/// through a shared global).
fn trigger_resync(state: &NodeState) {
    let targets = state.ctx.peers.sample_living_for_tri_broadcast();
    for ip in targets {
        let _ = state.socket.send_to(&[opcode::REPLAY_REQUEST], (ip, state.ctx.config.listen_port));
    }
    info!("periodic resync requested");
}

fn ping_all_peers(state: &NodeState) {
    let mut probe = vec![opcode::DISCOVERY_PROBE];
    probe.extend_from_slice(&state.mid);
    let ua_request = [opcode::USER_AGENT];
    for ip in state.ctx.peers.all_except_master() {
        let _ = state.socket.send_to(&probe, (ip, state.ctx.config.listen_port));
        let _ = state.socket.send_to(&ua_request, (ip, state.ctx.config.listen_port));
    }
    state.ctx.peers.touch_master();
}

/// Spawns a detached self-transfer of 0.001 coin to the node's own
/// address, refreshing its last-seen entry in every peer it reaches.
fn refresh_public_ip_registration(state: &NodeState) {
    let Ok(exe) = std::env::current_exe() else { return };
    let data_dir = state.ctx.config.data_dir.clone();
    std::thread::spawn(move || {
        let _ = std::process::Command::new(exe)
            .args(["send", "--self-transfer", "--amount", "1", "--data-dir"])
            .arg(data_dir)
            .status();
    });
}
