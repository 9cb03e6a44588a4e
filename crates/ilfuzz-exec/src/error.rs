use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn executor child: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error talking to executor child: {0}")]
    Io(#[from] std::io::Error),

    #[error("child did not complete the HELO handshake")]
    HandshakeFailed,

    #[error("child closed its pipes unexpectedly")]
    ChildDied,

    #[error("failed to map the coverage bitmap: {0}")]
    Bitmap(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
