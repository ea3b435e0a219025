//! Hardware collaborator interfaces
//!
//! The routing core never talks to hardware directly. Mixer, PCM, modem and
//! HDMI access go through the traits in this module so that board support code
//! (or the recording fakes in [`crate::mock`]) can be plugged in.

use crate::error::HalResult;
use crate::resample::ResamplerFactory;
use crate::types::{PcmConfig, PcmDirection};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Primary sound card
pub const PCM_CARD: u32 = 0;
/// SPDIF sound card used by the digital dock
pub const PCM_CARD_SPDIF: u32 = 1;
/// Number of cards an output may drive at once
pub const PCM_CARD_COUNT: usize = 2;

/// Media and capture PCM device on the primary card
pub const PCM_DEVICE: u32 = 0;
/// Baseband voice PCM device
pub const PCM_DEVICE_VOICE: u32 = 1;
/// Bluetooth SCO PCM device
pub const PCM_DEVICE_SCO: u32 = 2;
/// Deep buffer PCM device
pub const PCM_DEVICE_DEEP: u32 = 3;

/// Routing mixer backend
pub trait Mixer: Send {
    /// Return every control to its neutral value (not yet committed)
    fn reset(&mut self);

    /// Stage the controls of a named path
    fn apply_path(&mut self, name: &str) -> HalResult<()>;

    /// Write the staged controls to the hardware
    fn commit(&mut self) -> HalResult<()>;
}

/// Hardware timestamp of a PCM handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmTimestamp {
    /// Frames the hardware can accept (playback) or has ready (capture)
    pub available: u64,
    /// Monotonic time at which `available` was sampled
    pub time: Duration,
}

/// An open PCM handle
///
/// Transfers are blocking and move interleaved signed 16-bit samples.
pub trait Pcm: Send {
    /// Start the transfer
    fn start(&mut self) -> HalResult<()>;

    /// Stop the transfer
    fn stop(&mut self) -> HalResult<()>;

    /// Write interleaved samples
    fn write(&mut self, samples: &[i16]) -> HalResult<()>;

    /// Fill `samples` with captured interleaved samples
    fn read(&mut self, samples: &mut [i16]) -> HalResult<()>;

    /// Query the hardware timestamp
    fn timestamp(&mut self) -> HalResult<PcmTimestamp>;

    /// Release the handle
    fn close(self: Box<Self>);
}

/// Opens PCM handles
pub trait PcmBackend: Send + Sync {
    /// Open `device` on `card` with the given geometry
    fn open(
        &self,
        card: u32,
        device: u32,
        direction: PcmDirection,
        config: &PcmConfig,
    ) -> HalResult<Box<dyn Pcm>>;
}

/// Call audio path pushed to the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAudioPath {
    Handset,
    Headset,
    Speaker,
    Bluetooth,
    BluetoothNoNr,
    Headphone,
}

/// Volume class of the call volume pushed to the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundType {
    Voice,
    Speaker,
    Headset,
    BtVoice,
}

/// Uplink mute state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteCondition {
    TxUnmute,
    TxMute,
}

/// Chip running the two-mic noise reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoMicDevice {
    Audience,
}

/// Two-mic noise reduction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoMicSolution {
    Off,
    On,
}

/// Call clock command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSync {
    Stop,
    Start,
}

/// Callback invoked by the modem when the network switches AMR-WB on or off
pub type WidebandListener = Box<dyn Fn(bool) + Send + Sync>;

/// Control channel of the cellular modem
pub trait ModemControl: Send {
    fn set_call_audio_path(&mut self, path: CallAudioPath) -> HalResult<()>;

    fn set_call_volume(&mut self, sound_type: SoundType, volume: f32) -> HalResult<()>;

    fn set_mute(&mut self, condition: MuteCondition) -> HalResult<()>;

    fn set_two_mic_control(
        &mut self,
        device: TwoMicDevice,
        solution: TwoMicSolution,
    ) -> HalResult<()>;

    fn set_clock_sync(&mut self, sync: ClockSync) -> HalResult<()>;

    /// Register the wideband notification callback
    ///
    /// The callback must not be invoked from inside any other method of this
    /// trait, since those run under the device lock.
    fn register_wideband_listener(&mut self, listener: WidebandListener);
}

/// HDMI audio side channel
pub trait HdmiControl: Send {
    /// Maximum channel count the sink accepts
    fn query_max_channels(&mut self) -> HalResult<u32>;

    fn set_channel_count(&mut self, channels: u32) -> HalResult<()>;

    fn enable(&mut self, enabled: bool) -> HalResult<()>;
}

/// Every collaborator the device needs
pub struct HwBackends {
    pub mixer: Box<dyn Mixer>,
    pub pcm: Arc<dyn PcmBackend>,
    pub modem: Box<dyn ModemControl>,
    /// Absent when the board has no HDMI audio node
    pub hdmi: Option<Box<dyn HdmiControl>>,
    pub resamplers: Arc<dyn ResamplerFactory>,
}

impl fmt::Debug for HwBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwBackends")
            .field("hdmi", &self.hdmi.is_some())
            .finish_non_exhaustive()
    }
}
