//! VFC core library.
//!
//! Protocol-level data structures and algorithms shared by every binary
//! in the workspace: the fixed-width transaction record, the append-only
//! ledger, the uniqueness and recently-executed guards, the peer
//! registry, the transaction queue, the admission pipeline, the replay
//! subsystem, the geometric mining predicate, and the configuration
//! layer tying them together into a [`context::NodeContext`].

pub mod admission;
pub mod config;
pub mod constants;
pub mod context;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod mining;
pub mod peers;
pub mod queue;
pub mod record;
pub mod replay;
pub mod uniqueness;

pub use error::{Error, Result};
