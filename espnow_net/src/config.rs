use core::{num, time::Duration};
use serde::{Deserialize, Serialize};

use espnow_proto::{ETH_ALEN, HEADER_LEN, MAX_FRAME_LEN};

use crate::error::{Error, Result};

/// Default capacity of the receive queue: two of the largest frames.
pub const DEFAULT_RX_BUFFER_SIZE: usize = 2 * MAX_FRAME_LEN;

/// Default receive timeout, in milliseconds (five minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Smallest usable receive queue: room for one frame with an empty payload.
pub const MIN_RX_BUFFER_SIZE: usize = HEADER_LEN + ETH_ALEN;

/// Largest receive queue an endpoint will allocate (1 MiB).
pub const MAX_RX_BUFFER_SIZE: usize = 1 << 20;

/// Endpoint settings.
///
/// Missing fields take their default value when deserializing, e.g. from
///
/// ```toml
/// rx_buffer_size = 1028
/// timeout_ms = 1000
/// rate = 11
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity of the receive queue, in bytes. Takes effect on the next
    /// activation.
    pub rx_buffer_size: usize,
    /// Default timeout of blocking receives, in milliseconds.
    pub timeout_ms: u64,
    /// Transmit PHY rate, forwarded as is to the radio stack.
    pub rate: Option<u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rx_buffer_size: DEFAULT_RX_BUFFER_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rate: None,
        }
    }
}

impl Config {
    #[inline(always)]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.rx_buffer_size < MIN_RX_BUFFER_SIZE {
            return Err(Error::InvalidArgument(
                "rx_buffer_size is too small to hold a frame",
            ));
        }

        if self.rx_buffer_size > MAX_RX_BUFFER_SIZE {
            return Err(Error::InvalidArgument("rx_buffer_size is too large"));
        }

        Ok(())
    }

    #[inline(always)]
    pub(crate) fn rx_capacity(&self) -> Result<num::NonZeroUsize> {
        self.validate()?;
        num::NonZeroUsize::new(self.rx_buffer_size)
            .ok_or(Error::InvalidArgument("rx_buffer_size must be non-zero"))
    }
}
