//! Core audio types
//!
//! Device bitmasks, input sources, channel masks, modes and PCM geometry shared
//! by every part of the routing core. Numeric values match the host framework
//! so masks received through the parameter protocol can be used directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitmask of audio devices
///
/// Output devices and input devices share the representation. Input masks are
/// always stored with [`AudioDevices::BIT_IN`] stripped so they can be compared
/// bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioDevices(u32);

impl AudioDevices {
    /// No device
    pub const NONE: Self = Self(0);

    /// Handset earpiece
    pub const OUT_EARPIECE: Self = Self(0x1);
    /// Loudspeaker
    pub const OUT_SPEAKER: Self = Self(0x2);
    /// Wired headset (with microphone)
    pub const OUT_WIRED_HEADSET: Self = Self(0x4);
    /// Wired headphone (no microphone)
    pub const OUT_WIRED_HEADPHONE: Self = Self(0x8);
    /// Bluetooth SCO
    pub const OUT_BLUETOOTH_SCO: Self = Self(0x10);
    /// Bluetooth SCO headset
    pub const OUT_BLUETOOTH_SCO_HEADSET: Self = Self(0x20);
    /// Bluetooth SCO car kit
    pub const OUT_BLUETOOTH_SCO_CARKIT: Self = Self(0x40);
    /// Any Bluetooth SCO output
    pub const OUT_ALL_SCO: Self = Self(0x10 | 0x20 | 0x40);
    /// HDMI
    pub const OUT_AUX_DIGITAL: Self = Self(0x400);
    /// Analog dock
    pub const OUT_ANLG_DOCK_HEADSET: Self = Self(0x800);
    /// Digital dock (SPDIF card)
    pub const OUT_DGTL_DOCK_HEADSET: Self = Self(0x1000);

    /// Marker bit carried by raw input device values
    pub const BIT_IN: u32 = 0x8000_0000;
    /// Communication input
    pub const IN_COMMUNICATION: Self = Self(0x1);
    /// Ambient input
    pub const IN_AMBIENT: Self = Self(0x2);
    /// Built-in microphone
    pub const IN_BUILTIN_MIC: Self = Self(0x4);
    /// Bluetooth SCO headset microphone
    pub const IN_BLUETOOTH_SCO_HEADSET: Self = Self(0x8);
    /// Wired headset microphone
    pub const IN_WIRED_HEADSET: Self = Self(0x10);
    /// Back microphone
    pub const IN_BACK_MIC: Self = Self(0x80);

    /// Build a mask from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Build an input mask from a raw value, stripping [`Self::BIT_IN`]
    pub const fn from_input_bits(bits: u32) -> Self {
        Self(bits & !Self::BIT_IN)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no device bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one bit
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of devices in the mask
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// True when the mask contains any Bluetooth SCO output
    pub const fn has_sco(self) -> bool {
        self.intersects(Self::OUT_ALL_SCO)
    }
}

impl BitOr for AudioDevices {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AudioDevices {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AudioDevices {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for AudioDevices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Capture use case requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioSource {
    /// No specific use case
    #[default]
    Default,
    /// Generic microphone capture
    Mic,
    /// Uplink of a voice call
    VoiceUplink,
    /// Downlink of a voice call
    VoiceDownlink,
    /// Both directions of a voice call
    VoiceCall,
    /// Video recording
    Camcorder,
    /// Speech recognition
    VoiceRecognition,
    /// VoIP
    VoiceCommunication,
    /// Value unknown to this driver
    Unknown(u32),
}

impl AudioSource {
    /// Map a raw source value from the parameter protocol
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::Default,
            1 => Self::Mic,
            2 => Self::VoiceUplink,
            3 => Self::VoiceDownlink,
            4 => Self::VoiceCall,
            5 => Self::Camcorder,
            6 => Self::VoiceRecognition,
            7 => Self::VoiceCommunication,
            other => Self::Unknown(other),
        }
    }

    /// Raw value for the parameter protocol
    pub fn raw(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Mic => 1,
            Self::VoiceUplink => 2,
            Self::VoiceDownlink => 3,
            Self::VoiceCall => 4,
            Self::Camcorder => 5,
            Self::VoiceRecognition => 6,
            Self::VoiceCommunication => 7,
            Self::Unknown(other) => other,
        }
    }
}

/// Telephony mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AudioMode {
    /// No call in progress
    #[default]
    Normal,
    /// Incoming call ringing
    Ringtone,
    /// Cellular call in progress
    InCall,
    /// VoIP call in progress
    InCommunication,
}

impl AudioMode {
    /// Map a raw mode value
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Ringtone),
            2 => Some(Self::InCall),
            3 => Some(Self::InCommunication),
            _ => None,
        }
    }
}

/// Channel layout bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// No channels
    pub const NONE: Self = Self(0);
    /// Stereo playback
    pub const OUT_STEREO: Self = Self(0x3);
    /// 5.1 playback
    pub const OUT_5POINT1: Self = Self(0x3F);
    /// 7.1 playback
    pub const OUT_7POINT1: Self = Self(0x63F);
    /// Mono capture
    pub const IN_MONO: Self = Self(0x10);
    /// Stereo capture
    pub const IN_STEREO: Self = Self(0xC);

    /// Build a mask from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True for the empty mask
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of channels in the layout
    pub const fn channel_count(self) -> u32 {
        self.0.count_ones()
    }

    /// Symbolic name used by the supported-channels query
    pub fn symbolic_name(self) -> Option<&'static str> {
        match self {
            Self::OUT_STEREO => Some("AUDIO_CHANNEL_OUT_STEREO"),
            Self::OUT_5POINT1 => Some("AUDIO_CHANNEL_OUT_5POINT1"),
            Self::OUT_7POINT1 => Some("AUDIO_CHANNEL_OUT_7POINT1"),
            _ => None,
        }
    }
}

/// Sample format of a PCM link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PcmFormat {
    /// Signed 16-bit little endian
    #[default]
    S16Le,
}

impl PcmFormat {
    /// Bytes per sample
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16Le => 2,
        }
    }
}

/// Data direction of a PCM handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmDirection {
    /// Host to hardware
    Playback,
    /// Hardware to host
    Capture,
}

/// Geometry of a PCM link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmConfig {
    /// Interleaved channel count
    pub channels: u32,
    /// Sample rate in Hz
    pub rate: u32,
    /// Frames per period
    pub period_size: u32,
    /// Periods in the kernel ring buffer
    pub period_count: u32,
    /// Sample format
    pub format: PcmFormat,
}

impl PcmConfig {
    /// Create a 16-bit PCM configuration
    pub const fn new(channels: u32, rate: u32, period_size: u32, period_count: u32) -> Self {
        Self {
            channels,
            rate,
            period_size,
            period_count,
            format: PcmFormat::S16Le,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /// Bytes in one period
    pub fn period_bytes(&self) -> usize {
        self.period_size as usize * self.frame_bytes()
    }

    /// Frames held by the whole kernel buffer
    pub fn buffer_frames(&self) -> u64 {
        self.period_size as u64 * self.period_count as u64
    }
}

/// Logical output endpoint, one live stream per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputKind {
    /// Long periods for music and media
    DeepBuffer,
    /// Short periods for system sounds and games
    LowLatency,
    /// Multichannel HDMI
    Hdmi,
}

impl OutputKind {
    /// Every kind in lock order
    pub const ALL: [OutputKind; 3] = [Self::DeepBuffer, Self::LowLatency, Self::Hdmi];

    /// Number of kinds
    pub const COUNT: usize = 3;

    /// Slot index in the output table
    pub const fn index(self) -> usize {
        match self {
            Self::DeepBuffer => 0,
            Self::LowLatency => 1,
            Self::Hdmi => 2,
        }
    }

    /// Human readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeepBuffer => "deep-buffer",
            Self::LowLatency => "low-latency",
            Self::Hdmi => "hdmi",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags passed when opening an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputFlags(u32);

impl OutputFlags {
    /// No flag
    pub const NONE: Self = Self(0);
    /// Direct output, no mixing
    pub const DIRECT: Self = Self(0x1);
    /// Primary output
    pub const PRIMARY: Self = Self(0x2);
    /// Low latency output
    pub const FAST: Self = Self(0x4);
    /// Deep buffer output
    pub const DEEP_BUFFER: Self = Self(0x8);

    /// Build flags from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OutputFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Flags passed when opening an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFlags(u32);

impl InputFlags {
    /// No flag
    pub const NONE: Self = Self(0);
    /// Low latency capture
    pub const FAST: Self = Self(0x1);

    /// Build flags from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Stream configuration negotiated at open time
///
/// Zero fields mean "driver default"; on success the driver fills in the
/// values it actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel layout
    pub channel_mask: ChannelMask,
    /// Sample format
    pub format: PcmFormat,
}

impl AudioConfig {
    /// Create a configuration
    pub fn new(sample_rate: u32, channel_mask: ChannelMask) -> Self {
        Self {
            sample_rate,
            channel_mask,
            format: PcmFormat::S16Le,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_bit_is_stripped() {
        let raw = AudioDevices::BIT_IN | AudioDevices::IN_WIRED_HEADSET.bits();
        assert_eq!(
            AudioDevices::from_input_bits(raw),
            AudioDevices::IN_WIRED_HEADSET
        );
    }

    #[test]
    fn test_sco_membership() {
        assert!(AudioDevices::OUT_BLUETOOTH_SCO_CARKIT.has_sco());
        assert!((AudioDevices::OUT_SPEAKER | AudioDevices::OUT_BLUETOOTH_SCO).has_sco());
        assert!(!AudioDevices::OUT_SPEAKER.has_sco());
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(ChannelMask::OUT_STEREO.channel_count(), 2);
        assert_eq!(ChannelMask::OUT_5POINT1.channel_count(), 6);
        assert_eq!(ChannelMask::OUT_7POINT1.channel_count(), 8);
        assert_eq!(ChannelMask::IN_MONO.channel_count(), 1);
        assert_eq!(ChannelMask::IN_STEREO.channel_count(), 2);
    }

    #[test]
    fn test_source_roundtrip_for_unknown() {
        assert_eq!(AudioSource::from_raw(1999), AudioSource::Unknown(1999));
        assert_eq!(AudioSource::from_raw(4), AudioSource::VoiceCall);
        assert_eq!(AudioSource::VoiceCall.raw(), 4);
    }

    #[test]
    fn test_pcm_geometry() {
        let config = PcmConfig::new(2, 48000, 240, 2);
        assert_eq!(config.frame_bytes(), 4);
        assert_eq!(config.period_bytes(), 960);
        assert_eq!(config.buffer_frames(), 480);
    }
}
