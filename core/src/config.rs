//! Runtime configuration for the **vfc** node.
//!
//! The reference client hardcodes its tunables as C `#define`s. [`Config`]
//! turns the node-local subset of those (paths, thread-pool sizes, the
//! node's own mining/difficulty posture) into a runtime-overridable value,
//! constructed via the [`ConfigBuilder`] fluent builder. Protocol-level
//! constants that every node MUST agree on (record layout, opcode lengths,
//! `MAX_SITES`, the master IP) stay in [`crate::constants`] and are not
//! configurable.
//!
//! ```
//! use vfc_core::config::Config;
//!
//! let cfg = Config::default();
//! assert_eq!(cfg.listen_port, 8787);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants;

/// Runtime configuration shared across the node's worker threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Human-readable name identifying the network (e.g. "main", "test").
    pub network: String,

    /// Root directory holding `blocks.dat`, `bad_blocks.dat` and the peer
    /// sidecar files. Defaults to `$VFCDIR` or `$HOME/.vfc`.
    pub data_dir: PathBuf,

    /// UDP port bound for both send and receive.
    pub listen_port: u16,

    /// Whether this node is the reward-paying master.
    pub is_master: bool,

    /// Number of admission worker threads draining the transaction queue.
    /// Defaults to the host's available parallelism.
    pub admission_workers: usize,

    /// Maximum concurrently active replay worker threads.
    pub max_replay_threads: usize,

    /// This node's weighted contribution to the federated mining
    /// difficulty, advertised in its user-agent string.
    pub node_difficulty: f32,

    /// Seconds between housekeeping ticks.
    pub housekeeping_interval_secs: u64,

    /// Free-text node name advertised in the user-agent string.
    pub node_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "main".into(),
            data_dir: default_data_dir(),
            listen_port: constants::PORT,
            is_master: false,
            admission_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_replay_threads: 6,
            node_difficulty: constants::MAX_NODE_DIFFICULTY,
            housekeeping_interval_secs: 3,
            node_name: "vfc-node".into(),
        }
    }
}

/// Resolves the data directory the same way the reference client does:
/// `$VFCDIR` if set, otherwise `$HOME/.vfc`.
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VFCDIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    Path::new(&home).join(".vfc")
}

impl Config {
    pub fn blocks_path(&self) -> PathBuf {
        self.data_dir.join("blocks.dat")
    }

    pub fn bad_blocks_path(&self) -> PathBuf {
        self.data_dir.join("bad_blocks.dat")
    }

    pub fn peers_path(&self) -> PathBuf {
        self.data_dir.join("peers.mem")
    }

    pub fn peers_relayed_path(&self) -> PathBuf {
        self.data_dir.join("peers1.mem")
    }

    pub fn peers_expiry_path(&self) -> PathBuf {
        self.data_dir.join("peers2.mem")
    }

    pub fn peers_user_agent_path(&self) -> PathBuf {
        self.data_dir.join("peers3.mem")
    }

    pub fn replay_allow_path(&self) -> PathBuf {
        self.data_dir.join("rp.mem")
    }

    pub fn replay_height_path(&self) -> PathBuf {
        self.data_dir.join("rph.mem")
    }

    pub fn difficulty_path(&self) -> PathBuf {
        self.data_dir.join("diff.mem")
    }

    pub fn network_difficulty_path(&self) -> PathBuf {
        self.data_dir.join("netdiff.mem")
    }

    pub fn minted_path(&self) -> PathBuf {
        self.data_dir.join("minted.priv")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.data_dir.join("public.key")
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.data_dir.join("private.key")
    }
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    /// Starts a new builder pre-populated with [`Config::default`].
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn network<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.network = name.into();
        self
    }

    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.inner.data_dir = dir.into();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.inner.listen_port = port;
        self
    }

    pub fn is_master(mut self, master: bool) -> Self {
        self.inner.is_master = master;
        self
    }

    pub fn admission_workers(mut self, n: usize) -> Self {
        self.inner.admission_workers = n.max(1);
        self
    }

    pub fn max_replay_threads(mut self, n: usize) -> Self {
        self.inner.max_replay_threads = n.min(constants::MAX_THREADS_BUFF).max(1);
        self
    }

    pub fn node_difficulty(mut self, diff: f32) -> Self {
        self.inner.node_difficulty = diff.clamp(
            constants::MIN_NODE_DIFFICULTY,
            constants::MAX_NODE_DIFFICULTY,
        );
        self
    }

    pub fn node_name<S: Into<String>>(mut self, name: S) -> Self {
        self.inner.node_name = name.into();
        self
    }

    /// Consumes the builder returning an immutable configuration value.
    pub fn finish(self) -> Config {
        self.inner
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .network("test")
            .listen_port(9000)
            .is_master(true)
            .max_replay_threads(1000)
            .finish();
        assert_eq!(cfg.network, "test");
        assert_eq!(cfg.listen_port, 9000);
        assert!(cfg.is_master);
        assert_eq!(cfg.max_replay_threads, constants::MAX_THREADS_BUFF);
    }

    #[test]
    fn data_dir_defaults_under_home() {
        let cfg = Config::default();
        assert!(cfg.blocks_path().ends_with("blocks.dat"));
    }
}
