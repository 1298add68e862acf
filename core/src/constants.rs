//! Protocol constants shared by every component.
//!
//! These mirror the hardcoded `#define`s of the reference client (see
//! `DESIGN.md`). They are not part of [`crate::config::Config`] because they
//! define wire/disk compatibility, not node-local tuning; a node that used a
//! different `RECORD_SIZE` or `ECC_CURVE` could not talk to the rest of the
//! network at all.

/// Width in bytes of the ECDSA field element (and private key) used by the
/// curve. Public keys are `ECC_CURVE + 1` bytes (compressed point + tag).
pub const ECC_CURVE: usize = 24;

/// Compressed public key width: one tag byte plus the field width.
pub const PUBKEY_SIZE: usize = ECC_CURVE + 1;

/// Raw signature width: two field-width components, `r` then `s`.
pub const SIGNATURE_SIZE: usize = ECC_CURVE * 2;

/// On-disk/wire width of a single transaction record.
pub const RECORD_SIZE: usize =
    8 /* uid */ + PUBKEY_SIZE /* from */ + PUBKEY_SIZE /* to */ + 4 /* amount */ + SIGNATURE_SIZE;

/// UDP port used for both sending and receiving.
pub const PORT: u16 = 8787;

/// Hardcoded master node address.
pub const MASTER_IP: &str = "198.204.248.26";

/// Base58 encoding of the fixed genesis public key.
pub const GENESIS_PUBKEY_B58: &str = "foxXshGUtLFD24G9pz48hRh3LWM58GXPYiRhNHUyZAPJ";

/// Coin amount, in 1/1000ths, credited implicitly to the genesis key per
/// prior ledger record.
pub const INFLATION_TAX: u64 = 1000;

/// Prime-sized uniqueness filter bucket count (~11MB of buckets).
pub const MAX_SITES: u64 = 11_111_101;

/// Maximum pending transactions held in the in-memory queue.
pub const MAX_TRANS_QUEUE: usize = 4096;

/// Size of the recently-executed ring used as the commit-path race guard.
pub const MAX_REXI_SIZE: usize = 1024;

/// Seconds a recently-executed ring entry stays valid.
pub const REXI_EXPIRE_SECONDS: u64 = 3;

/// Maximum trackable peers.
pub const MAX_PEERS: usize = 3072;

/// Seconds before an idle peer slot may be reclaimed by another peer.
pub const MAX_PEER_EXPIRE_SECONDS: u64 = 10_800;

/// Seconds between housekeeping pings of the peer set.
pub const PING_INTERVAL: u64 = 540;

/// A peer is "living" if seen within this many ping intervals.
pub const LIVING_PING_INTERVALS: u64 = 4;

/// Records sent per replay-blocks window.
pub const REPLAY_SIZE: usize = 6944;

/// Records sent from the tail when catching a peer up via `replayHead`.
pub const REPLAY_HEAD_SIZE: usize = 3333;

/// Maximum concurrently active replay worker threads.
pub const MAX_THREADS_BUFF: usize = 512;

/// Maximum peers this node is simultaneously permitted to stream replay to.
pub const MAX_RALLOW: usize = 256;

/// Inter-packet delay enforced by replay workers, capping outbound rate to
/// ~100 packets/s per destination.
pub const REPLAY_PACKET_DELAY_MS: u64 = 10;

/// 9-hour uniqueness block applied to a uid on normal admission and on
/// double-spend detection.
pub const UID_BLOCK_SECONDS: u64 = 9 * 3600;

/// Seconds a live transaction sits in queue before it is eligible for
/// dequeue, giving peers time to veto it as a double spend.
pub const LIVE_TX_GRACE_SECONDS: u64 = 2;

/// Mining threshold `M`; the miner always tests against this value
/// regardless of network difficulty.
pub const MINING_THRESHOLD: f64 = 0.24;

/// Bounds on a peer's advertised difficulty contribution.
pub const MIN_NODE_DIFFICULTY: f32 = 0.030;
pub const MAX_NODE_DIFFICULTY: f32 = 0.240;

/// Master-only reward rotation interval, in seconds.
pub const REWARD_INTERVAL: u64 = 20;

/// How often the master pings a candidate reward recipient while waiting
/// for their reward address.
pub const REWARD_RETRY_INTERVAL: u64 = 3;

/// Bounded retry count for transient ledger I/O failures.
pub const IO_RETRY_LIMIT: u32 = 333;

/// Maximum free-text user-agent payload length.
pub const USER_AGENT_MAX: usize = 63;

/// Current protocol/client version string: the second comma-delimited
/// field of a node's user-agent (§3: `height, version, nodename,
/// machine, difficulty`). The master's reward scheduler pays zero to a
/// candidate whose advertised user-agent omits this exact string.
pub const CURRENT_VERSION: &str = "2.0";

/// Opcode bytes that select a protocol handler.
pub mod opcode {
    pub const NEW_TX: u8 = b't';
    pub const ECHO_TX: u8 = b'd';
    pub const REPLAY_RECORD: u8 = b'p';
    pub const REPLAY_REQUEST: u8 = b'r';
    pub const HEIGHT: u8 = b'h';
    pub const USER_AGENT: u8 = b'a';
    pub const REWARD_SOLICIT: u8 = b'x';
    pub const DISCOVERY_PROBE: u8 = b'\t';
    pub const DISCOVERY_ECHO: u8 = b'\r';
    pub const REWARD_VOLUNTEER: u8 = b' ';
}

/// Wire lengths, in bytes, for opcodes that carry a fixed-size payload.
pub mod packet_len {
    use super::RECORD_SIZE;

    /// `t`/`d`: origin IP (4 bytes) + record.
    pub const TX: usize = 1 + 4 + RECORD_SIZE;
    /// `p`: record only, no origin.
    pub const REPLAY_RECORD: usize = 1 + RECORD_SIZE;
    pub const REPLAY_REQUEST: usize = 1;
    pub const HEIGHT: usize = 1 + 4;
    pub const USER_AGENT_PROBE: usize = 1;
    pub const REWARD_SOLICIT: usize = 1;
    pub const MID_PROBE: usize = 1 + 7;
}
