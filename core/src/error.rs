//! Error types for the **vfc-core** crate.
//!
//! [`AdmissionError`] is the taxonomy from the protocol's admission pipeline
//! (see `DESIGN.md`): callers branch on the specific variant to decide
//! whether to propagate a packet to peers. [`Error`] covers every other
//! fallible core operation (I/O, codec, persistence).
//!
//! All high-level operations return [`crate::Result`], a convenient alias
//! for `core::result::Result<T, Error>`.

use thiserror::Error;

/// Outcome of attempting to admit a transaction record onto the ledger.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum AdmissionError {
    /// Sender's computed balance is less than the requested amount.
    #[error("insufficient funds")]
    NoFunds,
    /// Signature did not verify against the sender's public key.
    #[error("signature verification failed")]
    SigFail,
    /// The uid is already present in the ledger (or filter/ring).
    #[error("uid already exists")]
    UidExist,
    /// The ledger append could not be completed after bounded retries.
    #[error("ledger write failed")]
    Write,
}

/// General core crate error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("base58 decode error: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("record has wrong length: expected {expected}, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid private key bytes")]
    InvalidPrivateKey,

    #[error("invalid signature bytes")]
    InvalidSignature,

    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("peer table is full")]
    PeerTableFull,

    #[error("transaction queue is full")]
    QueueFull,

    #[error("{0}")]
    Other(&'static str),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
