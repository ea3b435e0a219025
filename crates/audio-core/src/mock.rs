//! Recording fakes of the hardware collaborators
//!
//! Every fake is a cheap handle around shared state: clone one into the
//! [`HwBackends`] given to the device and keep the other to inspect what the
//! device did or to inject faults.

use crate::error::{HalError, HalResult};
use crate::hw::{
    CallAudioPath, ClockSync, HdmiControl, HwBackends, Mixer, ModemControl, MuteCondition, Pcm,
    PcmBackend, PcmTimestamp, SoundType, TwoMicDevice, TwoMicSolution, WidebandListener,
};
use crate::resample::LinearResamplerFactory;
use crate::types::{PcmConfig, PcmDirection};
use parking_lot::Mutex;
use std::sync::Arc;

/// Mixer operation seen by [`MockMixer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerEvent {
    Reset,
    ApplyPath(String),
    Commit,
}

/// Mixer recording every operation
#[derive(Debug, Clone, Default)]
pub struct MockMixer {
    events: Arc<Mutex<Vec<MixerEvent>>>,
}

impl MockMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MixerEvent> {
        self.events.lock().clone()
    }

    /// Paths applied since the last reset
    pub fn active_paths(&self) -> Vec<String> {
        let events = self.events.lock();
        let start = events
            .iter()
            .rposition(|event| *event == MixerEvent::Reset)
            .map_or(0, |i| i + 1);
        events[start..]
            .iter()
            .filter_map(|event| match event {
                MixerEvent::ApplyPath(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of resets, one per route change
    pub fn reset_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| **event == MixerEvent::Reset)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Mixer for MockMixer {
    fn reset(&mut self) {
        self.events.lock().push(MixerEvent::Reset);
    }

    fn apply_path(&mut self, name: &str) -> HalResult<()> {
        self.events.lock().push(MixerEvent::ApplyPath(name.to_string()));
        Ok(())
    }

    fn commit(&mut self) -> HalResult<()> {
        self.events.lock().push(MixerEvent::Commit);
        Ok(())
    }
}

/// A PCM open request seen by [`MockPcmBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmOpen {
    pub card: u32,
    pub device: u32,
    pub direction: PcmDirection,
    pub config: PcmConfig,
}

#[derive(Default)]
struct PcmLog {
    opens: Vec<PcmOpen>,
    live: usize,
    closed: usize,
    started: usize,
    fail_open: Vec<(u32, u32, PcmDirection)>,
    write_error: Option<HalError>,
    read_error: Option<HalError>,
    timestamp: Option<PcmTimestamp>,
    /// Samples written, per (card, device)
    written: Vec<((u32, u32), usize)>,
    /// Next frame value produced by captures
    capture_counter: u32,
}

/// PCM backend producing in-memory handles
///
/// Capture handles produce frames `(n, -n)` where `n` counts captured frames,
/// so the left channel of a capture is always non-negative and increasing
/// (until it wraps at 30000).
#[derive(Clone, Default)]
pub struct MockPcmBackend {
    log: Arc<Mutex<PcmLog>>,
}

impl MockPcmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opens of `(card, device, direction)` fail
    pub fn fail_open(&self, card: u32, device: u32, direction: PcmDirection) {
        self.log.lock().fail_open.push((card, device, direction));
    }

    pub fn allow_all_opens(&self) {
        self.log.lock().fail_open.clear();
    }

    pub fn set_write_error(&self, error: Option<HalError>) {
        self.log.lock().write_error = error;
    }

    pub fn set_read_error(&self, error: Option<HalError>) {
        self.log.lock().read_error = error;
    }

    /// Timestamp reported by every handle, `None` to fail the query
    pub fn set_timestamp(&self, timestamp: Option<PcmTimestamp>) {
        self.log.lock().timestamp = timestamp;
    }

    pub fn opens(&self) -> Vec<PcmOpen> {
        self.log.lock().opens.clone()
    }

    /// Open requests that hit `(card, device, direction)`
    pub fn open_count(&self, card: u32, device: u32, direction: PcmDirection) -> usize {
        self.log
            .lock()
            .opens
            .iter()
            .filter(|open| open.card == card && open.device == device && open.direction == direction)
            .count()
    }

    /// Handles opened and not yet closed
    pub fn live_handles(&self) -> usize {
        self.log.lock().live
    }

    pub fn closed_handles(&self) -> usize {
        self.log.lock().closed
    }

    pub fn started_handles(&self) -> usize {
        self.log.lock().started
    }

    /// Samples written to `(card, device)` over every handle
    pub fn samples_written(&self, card: u32, device: u32) -> usize {
        self.log
            .lock()
            .written
            .iter()
            .filter(|(key, _)| *key == (card, device))
            .map(|(_, samples)| samples)
            .sum()
    }
}

impl PcmBackend for MockPcmBackend {
    fn open(
        &self,
        card: u32,
        device: u32,
        direction: PcmDirection,
        config: &PcmConfig,
    ) -> HalResult<Box<dyn Pcm>> {
        let mut log = self.log.lock();
        log.opens.push(PcmOpen {
            card,
            device,
            direction,
            config: *config,
        });
        if log.fail_open.contains(&(card, device, direction)) {
            return Err(HalError::device_io(
                "pcm_open",
                format!("card {} device {} unavailable", card, device),
            ));
        }
        log.live += 1;

        Ok(Box::new(MockPcm {
            log: Arc::clone(&self.log),
            card,
            device,
            channels: config.channels.max(1) as usize,
        }))
    }
}

struct MockPcm {
    log: Arc<Mutex<PcmLog>>,
    card: u32,
    device: u32,
    channels: usize,
}

impl Pcm for MockPcm {
    fn start(&mut self) -> HalResult<()> {
        self.log.lock().started += 1;
        Ok(())
    }

    fn stop(&mut self) -> HalResult<()> {
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> HalResult<()> {
        let mut log = self.log.lock();
        if let Some(error) = log.write_error.clone() {
            return Err(error);
        }
        log.written.push(((self.card, self.device), samples.len()));
        Ok(())
    }

    fn read(&mut self, samples: &mut [i16]) -> HalResult<()> {
        let mut log = self.log.lock();
        if let Some(error) = log.read_error.clone() {
            return Err(error);
        }
        for frame in samples.chunks_mut(self.channels) {
            let value = (log.capture_counter % 30000) as i16;
            log.capture_counter += 1;
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = if channel % 2 == 0 { value } else { -value };
            }
        }
        Ok(())
    }

    fn timestamp(&mut self) -> HalResult<PcmTimestamp> {
        self.log
            .lock()
            .timestamp
            .ok_or_else(|| HalError::device_io("pcm_get_htimestamp", "no timestamp"))
    }

    fn close(self: Box<Self>) {
        let mut log = self.log.lock();
        log.live -= 1;
        log.closed += 1;
    }
}

/// Modem command seen by [`MockModem`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModemCall {
    AudioPath(CallAudioPath),
    Volume(SoundType, f32),
    Mute(MuteCondition),
    TwoMic(TwoMicDevice, TwoMicSolution),
    Clock(ClockSync),
}

#[derive(Default)]
struct ModemLog {
    calls: Vec<ModemCall>,
    listener: Option<Arc<dyn Fn(bool) + Send + Sync>>,
    failing: bool,
}

/// Modem control channel recording every command
#[derive(Clone, Default)]
pub struct MockModem {
    log: Arc<Mutex<ModemLog>>,
}

impl MockModem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ModemCall> {
        self.log.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.log.lock().calls.clear();
    }

    pub fn has_listener(&self) -> bool {
        self.log.lock().listener.is_some()
    }

    /// Make every command fail
    pub fn set_failing(&self, failing: bool) {
        self.log.lock().failing = failing;
    }

    /// Deliver an AMR-WB notification the way the modem thread would
    pub fn notify_wideband(&self, enabled: bool) {
        let listener = self.log.lock().listener.clone();
        if let Some(listener) = listener {
            listener(enabled);
        }
    }

    fn record(&mut self, call: ModemCall) -> HalResult<()> {
        let mut log = self.log.lock();
        log.calls.push(call);
        if log.failing {
            return Err(HalError::device_io("modem", "control channel closed"));
        }
        Ok(())
    }
}

impl ModemControl for MockModem {
    fn set_call_audio_path(&mut self, path: CallAudioPath) -> HalResult<()> {
        self.record(ModemCall::AudioPath(path))
    }

    fn set_call_volume(&mut self, sound_type: SoundType, volume: f32) -> HalResult<()> {
        self.record(ModemCall::Volume(sound_type, volume))
    }

    fn set_mute(&mut self, condition: MuteCondition) -> HalResult<()> {
        self.record(ModemCall::Mute(condition))
    }

    fn set_two_mic_control(
        &mut self,
        device: TwoMicDevice,
        solution: TwoMicSolution,
    ) -> HalResult<()> {
        self.record(ModemCall::TwoMic(device, solution))
    }

    fn set_clock_sync(&mut self, sync: ClockSync) -> HalResult<()> {
        self.record(ModemCall::Clock(sync))
    }

    fn register_wideband_listener(&mut self, listener: WidebandListener) {
        self.log.lock().listener = Some(Arc::from(listener));
    }
}

#[derive(Debug, Default)]
struct HdmiLog {
    max_channels: u32,
    channel_counts: Vec<u32>,
    enables: Vec<bool>,
}

/// HDMI side channel of a sink with a fixed channel capability
#[derive(Debug, Clone)]
pub struct MockHdmi {
    log: Arc<Mutex<HdmiLog>>,
}

impl MockHdmi {
    pub fn new(max_channels: u32) -> Self {
        Self {
            log: Arc::new(Mutex::new(HdmiLog {
                max_channels,
                ..Default::default()
            })),
        }
    }

    pub fn channel_counts(&self) -> Vec<u32> {
        self.log.lock().channel_counts.clone()
    }

    /// Every enable/disable pushed, in order
    pub fn enables(&self) -> Vec<bool> {
        self.log.lock().enables.clone()
    }
}

impl HdmiControl for MockHdmi {
    fn query_max_channels(&mut self) -> HalResult<u32> {
        Ok(self.log.lock().max_channels)
    }

    fn set_channel_count(&mut self, channels: u32) -> HalResult<()> {
        self.log.lock().channel_counts.push(channels);
        Ok(())
    }

    fn enable(&mut self, enabled: bool) -> HalResult<()> {
        self.log.lock().enables.push(enabled);
        Ok(())
    }
}

/// A full set of fakes plus the handles to inspect them
#[derive(Clone)]
pub struct MockHardware {
    pub mixer: MockMixer,
    pub pcm: MockPcmBackend,
    pub modem: MockModem,
    pub hdmi: Option<MockHdmi>,
}

impl MockHardware {
    /// Fakes for a board with an 8 channel HDMI sink
    pub fn new() -> Self {
        Self::with_hdmi(Some(MockHdmi::new(8)))
    }

    pub fn with_hdmi(hdmi: Option<MockHdmi>) -> Self {
        Self {
            mixer: MockMixer::new(),
            pcm: MockPcmBackend::new(),
            modem: MockModem::new(),
            hdmi,
        }
    }

    /// Backends sharing state with these handles
    pub fn backends(&self) -> HwBackends {
        HwBackends {
            mixer: Box::new(self.mixer.clone()),
            pcm: Arc::new(self.pcm.clone()),
            modem: Box::new(self.modem.clone()),
            hdmi: self
                .hdmi
                .clone()
                .map(|hdmi| Box::new(hdmi) as Box<dyn HdmiControl>),
            resamplers: Arc::new(LinearResamplerFactory),
        }
    }
}
