//! Master/intermediate/leaf TCP synchronization protocol (spec §4.10):
//! corpus sample and crash propagation across a tree of fuzzer instances.

pub mod backoff;
pub mod error;
pub mod node;
pub mod outbox;
pub mod protocol;

pub use backoff::{Backoff, BackoffParams};
pub use error::{Result, SyncError};
pub use node::{Role, SyncConfig, SyncEvent, SyncNode, KEEP_ALIVE_INTERVAL};
pub use outbox::Outbox;
pub use protocol::{FrameReader, FrameWriter, Message};
