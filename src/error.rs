use thiserror::Error;

/// A received byte did not carry the tag the receiver predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequence mismatch: {expected:#04x} expected, {received:#04x} received")]
pub struct SequenceMismatch {
    pub expected: u8,
    pub received: u8,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("shared memory: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid shared memory name {0:?}: must be \"/name\" with no other '/'")]
    InvalidShmName(String),

    #[error(transparent)]
    Mismatch(#[from] SequenceMismatch),

    #[error("privileged endpoint is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
