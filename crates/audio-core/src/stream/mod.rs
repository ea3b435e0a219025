//! Stream capabilities
//!
//! Output and input streams are used through the [`AudioStream`],
//! [`StreamOut`] and [`StreamIn`] traits; callers never depend on the concrete
//! stream layout.

pub mod input;
pub mod output;

use crate::config::{HalConfig, TransferErrorPolicy};
use crate::error::{HalError, HalResult};
use crate::types::{ChannelMask, PcmFormat};
use std::time::Duration;
use tracing::debug;

pub use input::InputStream;
pub use output::OutputStream;

/// Operations shared by output and input streams
pub trait AudioStream {
    /// Sample rate seen by the client
    fn sample_rate(&self) -> u32;

    fn set_sample_rate(&self, rate: u32) -> HalResult<()>;

    /// Bytes per client buffer
    fn buffer_size(&self) -> usize;

    fn channels(&self) -> ChannelMask;

    fn format(&self) -> PcmFormat;

    fn set_format(&self, format: PcmFormat) -> HalResult<()>;

    /// Release the hardware until the next transfer
    fn standby(&self) -> HalResult<()>;

    /// Apply `key=value` parameters
    fn set_parameters(&self, kvpairs: &str) -> HalResult<()>;

    /// Answer a parameter query
    fn get_parameters(&self, keys: &str) -> String;
}

/// Playback stream
pub trait StreamOut: AudioStream {
    /// Latency of the kernel buffer in milliseconds
    fn latency_ms(&self) -> u32;

    fn set_volume(&self, left: f32, right: f32) -> HalResult<()>;

    /// Play interleaved samples, returning the number of bytes consumed
    ///
    /// The buffer is zeroed in place when the stream is muted.
    fn write(&self, buffer: &mut [i16]) -> HalResult<usize>;

    fn render_position(&self) -> HalResult<u32>;

    fn next_write_timestamp(&self) -> HalResult<i64>;

    /// Frames presented to the listener and the time they were sampled
    fn presentation_position(&self) -> HalResult<(u64, Duration)>;
}

/// Capture stream
pub trait StreamIn: AudioStream {
    fn set_gain(&self, gain: f32) -> HalResult<()>;

    /// Capture interleaved samples, returning the number of bytes produced
    fn read(&self, buffer: &mut [i16]) -> HalResult<usize>;

    fn input_frames_lost(&self) -> u32;
}

/// Real-time duration of `frames` frames at `rate`
pub(crate) fn transfer_duration(frames: usize, rate: u32) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(frames as u64 * 1_000_000 / rate as u64)
}

/// Turn the outcome of a transfer into what the caller sees
///
/// A failed transfer sleeps for the duration the transfer would have taken,
/// so a caller retrying in a loop keeps real-time pace. Broken pipes always
/// reach the caller; other failures follow the configured policy.
pub(crate) fn settle_transfer(
    result: HalResult<()>,
    bytes: usize,
    frames: usize,
    rate: u32,
    config: &HalConfig,
) -> HalResult<usize> {
    let err = match result {
        Ok(()) => return Ok(bytes),
        Err(err) => err,
    };

    if config.pace_on_error {
        std::thread::sleep(transfer_duration(frames, rate));
    }

    match (config.transfer_errors, &err) {
        (_, HalError::BrokenPipe { .. }) | (TransferErrorPolicy::Propagate, _) => Err(err),
        (TransferErrorPolicy::ReportFullTransfer, _) => {
            debug!("Transfer failed, reporting {} bytes: {}", bytes, err);
            Ok(bytes)
        }
    }
}
