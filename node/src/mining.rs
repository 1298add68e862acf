//! The mining thread (§4.9): continuously generates fresh keypairs,
//! tests each against the fixed-threshold subgenesis predicate, and on a
//! hit pays the mined value to the node's own reward address and logs
//! the private key to `minted.priv`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;
use vfc_core::crypto::Keypair;
use vfc_core::mining;

use crate::state::NodeState;

const HASHRATE_REPORT_INTERVAL: Duration = Duration::from_secs(16);

/// Spawns `worker_count` mining threads (one per requested hardware
/// thread, per §4.9), returning their join handles.
pub fn spawn(state: Arc<NodeState>, worker_count: usize) -> Vec<std::thread::JoinHandle<()>> {
    let attempts = Arc::new(AtomicU64::new(0));
    (0..worker_count.max(1))
        .map(|worker_id| {
            let state = state.clone();
            let attempts = attempts.clone();
            std::thread::spawn(move || mine_forever(state, worker_id, attempts))
        })
        .collect()
}

fn mine_forever(state: Arc<NodeState>, worker_id: usize, attempts: Arc<AtomicU64>) {
    let mut last_report = Instant::now();
    loop {
        let keypair = Keypair::generate();
        attempts.fetch_add(1, Ordering::Relaxed);

        if mining::is_subgenesis(&keypair.public_bytes()) {
            let value = mining::subgenesis_value(&keypair.public_bytes());
            info!(worker_id, value, "mined a subgenesis address");
            handle_hit(&state, &keypair, value);
        }

        if last_report.elapsed() >= HASHRATE_REPORT_INTERVAL {
            let count = attempts.swap(0, Ordering::Relaxed);
            let rate = count as f64 / HASHRATE_REPORT_INTERVAL.as_secs_f64();
            info!(worker_id, keys_per_sec = rate, "mining hash rate");
            last_report = Instant::now();
        }
    }
}

fn handle_hit(state: &NodeState, keypair: &Keypair, value: u64) {
    if let Err(e) = vfc_wallet::append_minted(&state.ctx.config.data_dir, keypair, value) {
        tracing::warn!(error = %e, "failed to append to minted.priv");
    }

    let Ok(reward_pub_text) = std::fs::read_to_string(state.ctx.config.public_key_path()) else {
        return;
    };
    let Ok(reward_pub_bytes) = vfc_core::crypto::base58_decode(reward_pub_text.trim()) else {
        return;
    };
    if reward_pub_bytes.len() != vfc_core::constants::PUBKEY_SIZE {
        return;
    }
    let mut reward_pub = [0u8; vfc_core::constants::PUBKEY_SIZE];
    reward_pub.copy_from_slice(&reward_pub_bytes);

    let uid = vfc_core::crypto::crc64(0, &keypair.public_bytes());
    let tx = vfc_wallet::build_transaction(keypair, reward_pub, value as u32, uid);

    let outcome = state.ctx.with_uid_filter(|filter| {
        state.ctx.queue.enqueue(tx, std::net::Ipv4Addr::LOCALHOST, std::net::Ipv4Addr::UNSPECIFIED, true, filter, &state.ctx.bad_blocks)
    });
    info!(?outcome, "queued payout of mined value to the node's reward address");
}
