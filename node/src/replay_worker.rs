//! Background replay streaming (§4.7): one thread per requester, capped
//! by `ThreadIpTable` so a peer cannot get two concurrent streams.

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::info;
use vfc_core::constants::{opcode, packet_len, RECORD_SIZE, REPLAY_PACKET_DELAY_MS};
use vfc_core::replay::{plan_replay, ReplayPlan};

use crate::state::NodeState;

/// Launches a replay worker for `destination` if one is not already
/// streaming to it.
pub fn spawn_for(state: &std::sync::Arc<NodeState>, destination: Ipv4Addr) {
    if !state.ctx.replay_threads.try_start(destination) {
        return;
    }
    let state = state.clone();
    std::thread::spawn(move || {
        info!(%destination, "replay worker started");
        run(&state, destination);
        state.ctx.replay_threads.finish(destination);
        info!(%destination, "replay worker finished");
    });
}

fn run(state: &NodeState, destination: Ipv4Addr) {
    let local_height = state.ctx.ledger.height().unwrap_or(0);

    // The reference sends the chain file's byte length, not its record
    // count, and the receiver compares it as bytes — send the same unit.
    let mut height_packet = vec![opcode::HEIGHT];
    height_packet.extend_from_slice(&((local_height * RECORD_SIZE as u64) as u32).to_le_bytes());
    let _ = state.socket.send_to(&height_packet, (destination, state.ctx.config.listen_port));

    let peer_height = state
        .ctx
        .peers
        .index_of(destination)
        .and_then(|idx| state.ctx.peers.user_agent(idx))
        .and_then(|ua| vfc_core::peers::parse_height_field(&ua))
        .unwrap_or(0);

    match plan_replay(local_height, peer_height) {
        ReplayPlan::Behind { head_window, random_window } => {
            send_window_tail_to_head(state, destination, head_window.0, head_window.1);
            send_window_head_to_tail(state, destination, random_window.0, random_window.1);
        }
        ReplayPlan::CaughtUp { window } => {
            send_window_tail_to_head(state, destination, window.0, window.1);
        }
    }
}

fn send_window_head_to_tail(state: &NodeState, destination: Ipv4Addr, start: u64, len: usize) {
    for idx in start..start + len as u64 {
        send_one(state, destination, idx);
    }
}

fn send_window_tail_to_head(state: &NodeState, destination: Ipv4Addr, start: u64, len: usize) {
    for idx in (start..start + len as u64).rev() {
        send_one(state, destination, idx);
    }
}

fn send_one(state: &NodeState, destination: Ipv4Addr, index: u64) {
    let Ok(Some(record)) = state.ctx.ledger.read_at(index) else {
        return;
    };
    let mut packet = Vec::with_capacity(packet_len::REPLAY_RECORD);
    packet.push(opcode::REPLAY_RECORD);
    packet.extend_from_slice(&record.to_bytes());
    let _ = state.socket.send_to(&packet, (destination, state.ctx.config.listen_port));
    std::thread::sleep(Duration::from_millis(REPLAY_PACKET_DELAY_MS));
}
