use crate::driver::DriverError;
use espnow_proto::{DecodeError, LengthError};

/// Errors surfaced to the application by an [`Endpoint`](crate::Endpoint).
///
/// Receive timeouts are not errors: they are reported as `Ok(None)`. Datagrams
/// dropped because the receive queue was full are only ever counted, see
/// [`Stats::dropped_rx_packets`](crate::Stats::dropped_rx_packets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("endpoint is not active")]
    NotInitialized,
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A frame boundary in the receive queue did not hold a valid header.
    #[error("receive buffer corrupted: {0}")]
    BufferCorruption(#[from] DecodeError),
    #[error("radio stack error: {0}")]
    Transport(#[from] DriverError),
    /// The radio stack never reported completion for some sent datagrams.
    #[error("send timeout on synchronous send ({pending} completions pending)")]
    SendBarrierExceeded { pending: usize },
}

impl From<LengthError> for Error {
    #[inline(always)]
    fn from(_: LengthError) -> Self {
        Self::InvalidArgument("bytes or bytearray wrong length")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
