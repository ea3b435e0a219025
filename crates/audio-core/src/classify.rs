//! Device classification
//!
//! Reduces raw output device masks and input sources to the small ordinals that
//! index the route table, and combines them into a [`RouteId`].

use crate::types::{AudioDevices, AudioSource};
use std::fmt;

/// Output device class used as the column index of the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputDeviceId {
    Speaker,
    Earpiece,
    Headset,
    Headphones,
    BtSco,
    BtScoHeadsetOut,
    BtScoCarkit,
    SpeakerAndHeadset,
    SpeakerAndEarpiece,
    /// No routable output device
    None,
}

impl OutputDeviceId {
    /// Number of classes with a route table column
    pub const TABLE_SIZE: usize = 9;

    /// Number of ordinals, including [`OutputDeviceId::None`]
    pub const COUNT: u32 = 10;

    /// Every class that has a route table column
    pub const ROUTABLE: [OutputDeviceId; Self::TABLE_SIZE] = [
        Self::Speaker,
        Self::Earpiece,
        Self::Headset,
        Self::Headphones,
        Self::BtSco,
        Self::BtScoHeadsetOut,
        Self::BtScoCarkit,
        Self::SpeakerAndHeadset,
        Self::SpeakerAndEarpiece,
    ];

    /// Ordinal of the class
    pub const fn ordinal(self) -> u32 {
        match self {
            Self::Speaker => 0,
            Self::Earpiece => 1,
            Self::Headset => 2,
            Self::Headphones => 3,
            Self::BtSco => 4,
            Self::BtScoHeadsetOut => 5,
            Self::BtScoCarkit => 6,
            Self::SpeakerAndHeadset => 7,
            Self::SpeakerAndEarpiece => 8,
            Self::None => 9,
        }
    }

    /// Route table column, `None` for [`OutputDeviceId::None`]
    pub fn table_index(self) -> Option<usize> {
        match self {
            Self::None => None,
            other => Some(other.ordinal() as usize),
        }
    }
}

/// Input source class used as the row index of the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSourceId {
    Mic,
    Camcorder,
    VoiceRecognition,
    VoiceCommunication,
    VoiceCall,
    VoiceCallWb,
    /// No capture use case
    None,
}

impl InputSourceId {
    /// Number of classes with a route table row
    pub const TABLE_SIZE: usize = 6;

    /// Every class that has a route table row
    pub const ROUTABLE: [InputSourceId; Self::TABLE_SIZE] = [
        Self::Mic,
        Self::Camcorder,
        Self::VoiceRecognition,
        Self::VoiceCommunication,
        Self::VoiceCall,
        Self::VoiceCallWb,
    ];

    /// Ordinal of the class
    pub const fn ordinal(self) -> u32 {
        match self {
            Self::Mic => 0,
            Self::Camcorder => 1,
            Self::VoiceRecognition => 2,
            Self::VoiceCommunication => 3,
            Self::VoiceCall => 4,
            Self::VoiceCallWb => 5,
            Self::None => 6,
        }
    }

    /// Route table row, `None` for [`InputSourceId::None`]
    pub fn table_index(self) -> Option<usize> {
        match self {
            Self::None => None,
            other => Some(other.ordinal() as usize),
        }
    }
}

/// Classify an aggregated output device mask
///
/// Two-device masks only classify for the speaker+headset(phone) and
/// speaker+earpiece pairs; every other multi-device mask is unroutable.
pub fn classify_output_device(devices: AudioDevices) -> OutputDeviceId {
    if devices.is_empty() {
        return OutputDeviceId::None;
    }

    if devices.count() == 2 {
        let speaker_and = |other: AudioDevices| devices == (AudioDevices::OUT_SPEAKER | other);

        if speaker_and(AudioDevices::OUT_WIRED_HEADSET)
            || speaker_and(AudioDevices::OUT_WIRED_HEADPHONE)
        {
            return OutputDeviceId::SpeakerAndHeadset;
        }
        if speaker_and(AudioDevices::OUT_EARPIECE) {
            return OutputDeviceId::SpeakerAndEarpiece;
        }
        return OutputDeviceId::None;
    }

    if devices.count() != 1 {
        return OutputDeviceId::None;
    }

    match devices {
        AudioDevices::OUT_SPEAKER => OutputDeviceId::Speaker,
        AudioDevices::OUT_EARPIECE => OutputDeviceId::Earpiece,
        AudioDevices::OUT_WIRED_HEADSET => OutputDeviceId::Headset,
        AudioDevices::OUT_WIRED_HEADPHONE => OutputDeviceId::Headphones,
        AudioDevices::OUT_BLUETOOTH_SCO => OutputDeviceId::BtSco,
        AudioDevices::OUT_BLUETOOTH_SCO_HEADSET => OutputDeviceId::BtScoHeadsetOut,
        AudioDevices::OUT_BLUETOOTH_SCO_CARKIT => OutputDeviceId::BtScoCarkit,
        _ => OutputDeviceId::None,
    }
}

/// Classify the current input source, selecting the wideband voice row when
/// the baseband runs AMR-WB
pub fn classify_input_source(source: AudioSource, wideband: bool) -> InputSourceId {
    match source {
        AudioSource::Mic => InputSourceId::Mic,
        AudioSource::Camcorder => InputSourceId::Camcorder,
        AudioSource::VoiceRecognition => InputSourceId::VoiceRecognition,
        AudioSource::VoiceCommunication => InputSourceId::VoiceCommunication,
        AudioSource::VoiceCall if wideband => InputSourceId::VoiceCallWb,
        AudioSource::VoiceCall => InputSourceId::VoiceCall,
        _ => InputSourceId::None,
    }
}

/// Identifier of a (input class, output class) combination
///
/// Two routes are the same hardware configuration exactly when their ids are
/// equal. The zero id is never produced by [`RouteId::new`], so it serves as
/// the "nothing applied yet" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RouteId(u32);

impl RouteId {
    /// Id cached before the first route is applied
    pub const UNSET: Self = Self(0);

    /// Combine an input and an output class
    pub const fn new(input: InputSourceId, output: OutputDeviceId) -> Self {
        Self((1 << (input.ordinal() + OutputDeviceId::COUNT)) | (1 << output.ordinal()))
    }

    /// Compute the id for a device mask and source
    pub fn compute(devices: AudioDevices, source: AudioSource, wideband: bool) -> Self {
        Self::new(
            classify_input_source(source, wideband),
            classify_output_device(devices),
        )
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
