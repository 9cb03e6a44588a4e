//! Sync errors. Per spec §7 ("Sync I/O errors — transient: logged and
//! retried with backoff; permanent (bad handshake): connection torn down"),
//! `SyncNode::tick` swallows and logs most of these; only connection setup
//! (`SyncNode::new`) surfaces them to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("unknown frame tag: {0:#x}")]
    UnknownTag(u8),

    #[error("empty frame")]
    EmptyFrame,

    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
