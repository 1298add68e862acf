//! VFC node runtime: UDP protocol engine, admission workers, replay
//! subsystem, housekeeping, and the optional mining and master-reward
//! loops, built on top of [`vfc_core::context::NodeContext`].

pub mod housekeeping;
pub mod mining;
pub mod protocol;
pub mod replay_worker;
pub mod reward;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};
use vfc_core::config::Config;
use vfc_core::context::NodeContext;

use crate::reward::RewardScheduler;
use crate::state::NodeState;

/// Runs a full node until SIGINT. Blocks the calling thread.
pub fn run(config: Config, enable_mining: bool, mining_workers: usize) -> std::io::Result<()> {
    let ctx = Arc::new(NodeContext::open(config).map_err(std::io::Error::other)?);
    let state = NodeState::bind(ctx)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        let state = state.clone();
        ctrlc::set_handler(move || {
            info!("signal received, flushing sidecars and exiting");
            let _ = state.ctx.persist_sidecars();
            running.store(false, Ordering::SeqCst);
        })
        .expect("failed to install signal handler");
    }

    let rewards = Arc::new(RewardScheduler::new());

    for _ in 0..state.ctx.config.admission_workers {
        let state = state.clone();
        std::thread::spawn(move || loop {
            protocol::process_one_queue_entry(&state);
            std::thread::sleep(std::time::Duration::from_millis(5));
        });
    }

    {
        let state = state.clone();
        let rewards = rewards.clone();
        let running = running.clone();
        std::thread::spawn(move || housekeeping::run(&state, &rewards, &running));
    }

    if enable_mining {
        mining::spawn(state.clone(), mining_workers);
    }

    let mut buf = [0u8; 4096];
    state.socket.set_read_timeout(Some(std::time::Duration::from_millis(500)))?;
    while running.load(Ordering::Relaxed) {
        match state.socket.recv_from(&mut buf) {
            Ok((n, src)) => {
                let std::net::SocketAddr::V4(src) = src else {
                    continue;
                };
                protocol::handle_datagram(&state, *src.ip(), &buf[..n], &rewards);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                state.ctx.record_error();
                error!(error = %e, "udp receive error");
            }
        }
    }

    info!("node shutting down");
    Ok(())
}
