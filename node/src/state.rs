//! Node-local runtime state that sits above [`vfc_core::context::NodeContext`]:
//! the bound UDP socket, this node's discovery token, and the locally
//! observed network difficulty average.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::RngCore;
use vfc_core::context::NodeContext;

/// A 7-byte random token emitted on discovery probes (§4.8's `\t`/`\r`
/// handshake) to prevent spoofed peer additions.
pub type Mid = [u8; 7];

pub struct NodeState {
    pub ctx: Arc<NodeContext>,
    pub socket: UdpSocket,
    pub mid: Mid,
    network_difficulty_bits: AtomicU32,
}

impl NodeState {
    pub fn bind(ctx: Arc<NodeContext>) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(("0.0.0.0", ctx.config.listen_port))?;
        let mut mid = [0u8; 7];
        rand::thread_rng().fill_bytes(&mut mid);
        Ok(Arc::new(Self {
            ctx,
            socket,
            mid,
            network_difficulty_bits: AtomicU32::new(vfc_core::constants::MAX_NODE_DIFFICULTY.to_bits()),
        }))
    }

    pub fn network_difficulty(&self) -> f32 {
        f32::from_bits(self.network_difficulty_bits.load(Ordering::Relaxed))
    }

    pub fn set_network_difficulty(&self, value: f32) {
        self.network_difficulty_bits.store(value.to_bits(), Ordering::Relaxed);
    }
}
