//! UDP protocol engine: opcode dispatch for the single listener socket
//! (§4.8).

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};
use vfc_core::admission::{self, AdmissionOutcome};
use vfc_core::constants::{opcode, packet_len, PUBKEY_SIZE, RECORD_SIZE};
use vfc_core::peers;
use vfc_core::queue::EnqueueOutcome;
use vfc_core::record::TxRecord;

use crate::reward::RewardScheduler;
use crate::state::NodeState;

/// Dispatches one received datagram. `source` is the UDP source address;
/// `data` is the full payload including the opcode byte.
pub fn handle_datagram(state: &NodeState, source: Ipv4Addr, data: &[u8], rewards: &RewardScheduler) {
    let Some(&op) = data.first() else { return };
    match op {
        // `handle_tx`'s `is_replay` flag is `true` here: per §4.8, `t`/`d`
        // carry a live transaction, and `TxQueue`'s `is_replay` keeps the
        // reference's own inverted naming for that flag (see queue.rs).
        opcode::NEW_TX if data.len() == packet_len::TX => handle_tx(state, source, data, true),
        opcode::ECHO_TX if data.len() == packet_len::TX => handle_tx(state, source, data, true),
        opcode::REPLAY_RECORD if data.len() == packet_len::REPLAY_RECORD => handle_replay_record(state, source, data),
        opcode::REPLAY_REQUEST if data.len() == packet_len::REPLAY_REQUEST => handle_replay_request(state, source),
        opcode::HEIGHT if data.len() == packet_len::HEIGHT => handle_height(state, source, data),
        opcode::USER_AGENT => handle_user_agent(state, source, data),
        opcode::REWARD_SOLICIT if data.len() == packet_len::REWARD_SOLICIT => handle_reward_solicit(state),
        opcode::DISCOVERY_PROBE if data.len() == 8 => handle_discovery_probe(state, source, data),
        opcode::DISCOVERY_ECHO if data.len() == 8 => handle_discovery_echo(state, source, data),
        opcode::REWARD_VOLUNTEER if data.len() == 1 + PUBKEY_SIZE => handle_reward_volunteer(state, source, data, rewards),
        _ => {
            state.ctx.record_error();
            debug!(opcode = op, len = data.len(), "dropped malformed or unrecognized datagram");
        }
    }
}

fn handle_tx(state: &NodeState, source: Ipv4Addr, data: &[u8], is_replay: bool) {
    let origin = Ipv4Addr::new(data[1], data[2], data[3], data[4]);
    let Ok(record) = TxRecord::from_bytes(&data[5..5 + RECORD_SIZE]) else {
        state.ctx.record_error();
        return;
    };
    enqueue_and_process(state, source, origin, record, is_replay);
}

fn handle_replay_record(state: &NodeState, source: Ipv4Addr, data: &[u8]) {
    if !vfc_core::replay::is_authorized_replay_source(source, &state.ctx.replay_allow) {
        debug!(%source, "ignoring replay record from unauthorized source");
        return;
    }
    let Ok(record) = TxRecord::from_bytes(&data[1..1 + RECORD_SIZE]) else {
        state.ctx.record_error();
        return;
    };
    enqueue_and_process(state, source, source, record, false);
}

fn enqueue_and_process(state: &NodeState, immediate_ip: Ipv4Addr, referred_ip: Ipv4Addr, record: TxRecord, is_replay: bool) {
    if !peers::is_private_or_loopback(immediate_ip) {
        state.ctx.peers.add(immediate_ip);
    }

    let outcome = state.ctx.with_uid_filter(|filter| {
        state.ctx.queue.enqueue(record, immediate_ip, referred_ip, is_replay, filter, &state.ctx.bad_blocks)
    });

    match outcome {
        EnqueueOutcome::Accepted | EnqueueOutcome::DoubleSpend => {
            rebroadcast_echo(state, &record);
        }
        EnqueueOutcome::DuplicateSilent | EnqueueOutcome::Rejected => {}
    }
}

fn rebroadcast_echo(state: &NodeState, record: &TxRecord) {
    let mut packet = Vec::with_capacity(packet_len::TX);
    packet.push(opcode::ECHO_TX);
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet.extend_from_slice(&record.to_bytes());
    for ip in state.ctx.peers.sample_living_for_tri_broadcast() {
        let _ = state.socket.send_to(&packet, (ip, state.ctx.config.listen_port));
    }
}

/// Drains one admitted queue entry; called from an admission worker, not
/// directly from the listener.
pub fn process_one_queue_entry(state: &NodeState) {
    let Some(entry) = state.ctx.queue.dequeue() else { return };
    let result = state.ctx.with_rexi(|rexi| {
        admission::admit(&entry.record, &state.ctx.ledger, rexi, state.network_difficulty())
    });
    match result {
        Ok(AdmissionOutcome::Committed) => {
            let mut packet = Vec::with_capacity(packet_len::TX);
            packet.push(opcode::NEW_TX);
            packet.extend_from_slice(&Ipv4Addr::from(entry.immediate_ip).octets());
            packet.extend_from_slice(&entry.record.to_bytes());
            for ip in state.ctx.peers.sample_living_for_tri_broadcast() {
                let _ = state.socket.send_to(&packet, (ip, state.ctx.config.listen_port));
            }
        }
        Ok(AdmissionOutcome::SelfTransfer) | Ok(AdmissionOutcome::AlreadyCommitted) => {}
        Err(e) => {
            warn!(uid = entry.record.uid, error = %e, "admission rejected");
        }
    }
}

fn handle_replay_request(state: &NodeState, source: Ipv4Addr) {
    crate::replay_worker::spawn_for(state, source);
}

fn handle_height(state: &NodeState, source: Ipv4Addr, data: &[u8]) {
    if !vfc_core::replay::is_authorized_replay_source(source, &state.ctx.replay_allow) {
        return;
    }
    let height = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    state.ctx.advance_replay_height(height);
}

fn handle_user_agent(state: &NodeState, source: Ipv4Addr, data: &[u8]) {
    if data.len() == 1 {
        let height = state.ctx.ledger.height().unwrap_or(0);
        let ua = peers::format_user_agent(height, &state.ctx.config.node_name, state.network_difficulty());
        let mut packet = vec![opcode::USER_AGENT];
        packet.extend_from_slice(ua.as_bytes());
        let _ = state.socket.send_to(&packet, (source, state.ctx.config.listen_port));
        return;
    }
    if let Some(index) = state.ctx.peers.index_of(source) {
        let ua = String::from_utf8_lossy(&data[1..]).into_owned();
        state.ctx.peers.set_user_agent(index, &ua);
        if let Some(diff) = peers::parse_difficulty_field(&ua) {
            info!(%source, difficulty = diff, "peer advertised difficulty");
        }
    }
}

fn handle_reward_solicit(state: &NodeState) {
    if state.ctx.config.is_master {
        return;
    }
    // Responding requires a locally available reward public key; a node
    // with no wallet configured simply does not volunteer.
    let Ok(pubkey_text) = std::fs::read_to_string(state.ctx.config.public_key_path()) else {
        return;
    };
    let Ok(pubkey) = vfc_core::crypto::base58_decode(pubkey_text.trim()) else {
        return;
    };
    if pubkey.len() != PUBKEY_SIZE {
        return;
    }
    let mut packet = vec![opcode::REWARD_VOLUNTEER];
    packet.extend_from_slice(&pubkey);
    let master_ip: Ipv4Addr = vfc_core::constants::MASTER_IP.parse().expect("hardcoded master ip is valid");
    let _ = state.socket.send_to(&packet, (master_ip, state.ctx.config.listen_port));
}

fn handle_reward_volunteer(state: &NodeState, source: Ipv4Addr, data: &[u8], rewards: &RewardScheduler) {
    let mut pubkey = [0u8; PUBKEY_SIZE];
    pubkey.copy_from_slice(&data[1..1 + PUBKEY_SIZE]);
    rewards.handle_volunteer(state, source, pubkey);
}

fn handle_discovery_probe(state: &NodeState, source: Ipv4Addr, data: &[u8]) {
    let mut reply = vec![opcode::DISCOVERY_ECHO];
    reply.extend_from_slice(&data[1..8]);
    let _ = state.socket.send_to(&reply, (source, state.ctx.config.listen_port));
}

fn handle_discovery_echo(state: &NodeState, source: Ipv4Addr, data: &[u8]) {
    if data[1..8] == state.mid {
        state.ctx.peers.add(source);
        info!(%source, "discovery handshake confirmed, peer added");
    }
}
