//! # Audio-Core: Telephony Audio Routing
//!
//! Control plane of the audio driver of a phone-class device. It decides which
//! mixer paths are active for the current combination of output devices,
//! input source and call state, opens and closes PCM handles as playback and
//! capture streams start and stop, and drives the cellular modem through a
//! voice call.
//!
//! ## Overview
//!
//! - [`AudioHw`] owns the routing state and opens streams
//! - [`OutputStream`] plays to one of three outputs (deep buffer, low latency,
//!   HDMI multichannel)
//! - [`InputStream`] captures with optional resampling and mono folding
//! - The route table maps an input source class and an output device class to
//!   a pair of named mixer paths
//!
//! Hardware is reached only through the traits in [`hw`]; [`mock`] provides
//! recording fakes for tests and bring-up.
//!
//! ## Usage
//!
//! ```rust
//! use callroute_audio_core::mock::MockHardware;
//! use callroute_audio_core::{
//!     AudioConfig, AudioDevices, AudioHw, HalConfig, OutputFlags, StreamOut,
//! };
//!
//! let hardware = MockHardware::new();
//! let device = AudioHw::new(hardware.backends(), HalConfig::new())?;
//!
//! let mut config = AudioConfig::default();
//! let stream = device.open_output_stream(
//!     AudioDevices::OUT_SPEAKER,
//!     OutputFlags::PRIMARY,
//!     &mut config,
//! )?;
//!
//! let mut samples = vec![0i16; 480];
//! let written = stream.write(&mut samples)?;
//! assert_eq!(written, 960);
//! assert_eq!(hardware.mixer.active_paths(), vec!["media-speaker".to_string()]);
//!
//! device.close_output_stream(&stream);
//! # Ok::<(), callroute_audio_core::HalError>(())
//! ```

pub mod call;
pub mod classify;
pub mod config;
pub mod device;
pub mod error;
pub mod hw;
pub mod logging;
pub mod mock;
pub mod params;
pub mod resample;
pub mod route_table;
pub mod routing;
pub mod stream;
pub mod types;

pub use classify::{InputSourceId, OutputDeviceId, RouteId};
pub use config::{HalConfig, PcmProfiles, TransferErrorPolicy};
pub use device::{AudioHw, DeviceSnapshot};
pub use error::{ErrorCategory, HalError, HalResult};
pub use hw::HwBackends;
pub use logging::{setup_logging, LoggingConfig, LOG_TARGET};
pub use stream::{AudioStream, InputStream, OutputStream, StreamIn, StreamOut};
pub use types::{
    AudioConfig, AudioDevices, AudioMode, AudioSource, ChannelMask, InputFlags, OutputFlags,
    OutputKind, PcmConfig, PcmFormat,
};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Installs a default log subscriber unless one is already present. Safe to
/// call more than once.
pub fn init() {
    let _ = setup_logging(&LoggingConfig::default());
    tracing::info!("callroute-audio-core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_init_is_idempotent() {
        init();
        init();
        assert!(!VERSION.is_empty());
    }
}
