//! Output stream lifecycle
//!
//! Each output moves between standby (no PCM handle open) and active. It is
//! started lazily by the first write after standby. The HDMI output and the
//! primary codec outputs share one physical link: starting HDMI puts the other
//! outputs in standby, and while HDMI is active the other outputs start
//! "disabled" and refuse to write.

use crate::device::{AllOutputs, DeviceShared};
use crate::error::{HalError, HalResult};
use crate::hw::{Pcm, PCM_CARD, PCM_CARD_COUNT, PCM_CARD_SPDIF};
use crate::params::{ParamReply, StrParams, KEY_ROUTING, KEY_SUP_CHANNELS};
use crate::stream::{settle_transfer, AudioStream, StreamOut};
use crate::types::{AudioDevices, ChannelMask, OutputKind, PcmConfig, PcmDirection, PcmFormat};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Devices served by the primary card
const PRIMARY_CARD_DEVICES: AudioDevices = AudioDevices::from_bits(
    AudioDevices::OUT_SPEAKER.bits()
        | AudioDevices::OUT_WIRED_HEADSET.bits()
        | AudioDevices::OUT_WIRED_HEADPHONE.bits()
        | AudioDevices::OUT_AUX_DIGITAL.bits()
        | AudioDevices::OUT_ALL_SCO.bits(),
);

/// Mutable part of an output, guarded by the stream lock
pub(crate) struct OutputState {
    pub(crate) device: AudioDevices,
    pub(crate) standby: bool,
    /// Started while HDMI owned the link; writes fail until next start
    pub(crate) disabled: bool,
    pub(crate) muted: bool,
    pub(crate) closed: bool,
    /// Frames written since open, never reset
    pub(crate) written: u64,
    /// Open handles indexed by card
    pub(crate) pcm: [Option<Box<dyn Pcm>>; PCM_CARD_COUNT],
}

impl OutputState {
    fn close_pcms(&mut self) {
        for pcm in self.pcm.iter_mut().filter_map(Option::take) {
            pcm.close();
        }
    }
}

/// Playback stream of one [`OutputKind`]
pub struct OutputStream {
    kind: OutputKind,
    shared: Arc<DeviceShared>,
    pcm_device: u32,
    config: PcmConfig,
    channel_mask: ChannelMask,
    supported_channel_masks: Vec<ChannelMask>,
    pub(crate) state: Mutex<OutputState>,
}

impl OutputStream {
    pub(crate) fn new(
        kind: OutputKind,
        shared: Arc<DeviceShared>,
        device: AudioDevices,
        pcm_device: u32,
        config: PcmConfig,
        channel_mask: ChannelMask,
        supported_channel_masks: Vec<ChannelMask>,
    ) -> Self {
        Self {
            kind,
            shared,
            pcm_device,
            config,
            channel_mask,
            supported_channel_masks,
            state: Mutex::new(OutputState {
                device,
                standby: true,
                disabled: false,
                muted: false,
                closed: false,
                written: 0,
                pcm: Default::default(),
            }),
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Negotiated PCM geometry
    pub fn pcm_config(&self) -> &PcmConfig {
        &self.config
    }

    /// Devices this stream plays to
    pub fn devices(&self) -> AudioDevices {
        self.state.lock().device
    }

    pub fn is_standby(&self) -> bool {
        self.state.lock().standby
    }

    /// True while HDMI preempts this stream
    pub fn is_disabled(&self) -> bool {
        self.state.lock().disabled
    }

    /// Frames written since the stream was opened
    pub fn frames_written(&self) -> u64 {
        self.state.lock().written
    }

    pub fn supported_channel_masks(&self) -> &[ChannelMask] {
        &self.supported_channel_masks
    }

    fn frame_channels(&self) -> usize {
        self.config.channels.max(1) as usize
    }

    /// Standby followed by refusing any further transfer
    pub(crate) fn close_standby(&self) {
        self.shared.with_all_outputs(|all| {
            let registered = all.streams[self.kind.index()]
                .as_ref()
                .is_some_and(|open| std::ptr::eq(Arc::as_ptr(open), self));
            if !registered {
                return;
            }
            all.standby_output(self.kind);
            if let Some(state) = all.states[self.kind.index()].as_deref_mut() {
                state.closed = true;
            }
        });
    }

    fn write_frames(&self, buffer: &mut [i16]) -> HalResult<()> {
        let mut state = self.state.lock();
        while state.standby {
            if state.closed {
                return Err(HalError::no_device(format!("{} output is closed", self.kind)));
            }
            drop(state);
            self.shared
                .with_all_outputs(|all| all.start_if_standby(self.kind))?;
            state = self.state.lock();
        }

        if state.disabled {
            return Err(HalError::broken_pipe(format!(
                "{} output is preempted by HDMI",
                self.kind
            )));
        }

        if state.muted {
            buffer.fill(0);
        }

        for pcm in state.pcm.iter_mut().flatten() {
            pcm.write(buffer)?;
        }
        state.written += (buffer.len() / self.frame_channels()) as u64;
        Ok(())
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("kind", &self.kind)
            .field("pcm_device", &self.pcm_device)
            .field("config", &self.config)
            .field("channel_mask", &self.channel_mask)
            .finish_non_exhaustive()
    }
}

impl AudioStream for OutputStream {
    fn sample_rate(&self) -> u32 {
        self.config.rate
    }

    fn set_sample_rate(&self, _rate: u32) -> HalResult<()> {
        Err(HalError::unsupported("output set_sample_rate"))
    }

    fn buffer_size(&self) -> usize {
        self.config.period_bytes()
    }

    fn channels(&self) -> ChannelMask {
        self.channel_mask
    }

    fn format(&self) -> PcmFormat {
        PcmFormat::S16Le
    }

    fn set_format(&self, _format: PcmFormat) -> HalResult<()> {
        Err(HalError::unsupported("output set_format"))
    }

    fn standby(&self) -> HalResult<()> {
        self.shared
            .with_all_outputs(|all| all.standby_output(self.kind));
        Ok(())
    }

    /// Handles `routing=<mask>`
    fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        debug!(kind = %self.kind, "Output parameters: {}", kvpairs);
        let params = StrParams::parse(kvpairs);

        if let Some(mask) = params.get_mask(KEY_ROUTING)? {
            let devices = AudioDevices::from_bits(mask);
            self.shared
                .with_all_outputs(|all| all.route_output(self.kind, devices));
        }
        Ok(())
    }

    /// Answers `sup_channels`; any other query is echoed back
    fn get_parameters(&self, keys: &str) -> String {
        let query = StrParams::parse(keys);
        if !query.has_key(KEY_SUP_CHANNELS) {
            return keys.to_string();
        }

        let names: Vec<&str> = self
            .supported_channel_masks
            .iter()
            .filter_map(|mask| mask.symbolic_name())
            .collect();
        ParamReply::new()
            .add(KEY_SUP_CHANNELS, names.join("|"))
            .to_string()
    }
}

impl StreamOut for OutputStream {
    fn latency_ms(&self) -> u32 {
        (self.config.buffer_frames() * 1000 / self.config.rate.max(1) as u64) as u32
    }

    /// Only the HDMI output has a volume, and only mute is honored
    fn set_volume(&self, left: f32, _right: f32) -> HalResult<()> {
        if self.kind != OutputKind::Hdmi {
            return Err(HalError::unsupported("volume on non-HDMI output"));
        }
        self.state.lock().muted = left == 0.0;
        Ok(())
    }

    fn write(&self, buffer: &mut [i16]) -> HalResult<usize> {
        let bytes = buffer.len() * self.config.format.bytes_per_sample();
        let frames = buffer.len() / self.frame_channels();
        let result = self.write_frames(buffer);
        settle_transfer(result, bytes, frames, self.config.rate, &self.shared.config)
    }

    fn render_position(&self) -> HalResult<u32> {
        Err(HalError::invalid_argument("render position is not reported"))
    }

    fn next_write_timestamp(&self) -> HalResult<i64> {
        Err(HalError::invalid_argument("next write timestamp is not reported"))
    }

    fn presentation_position(&self) -> HalResult<(u64, Duration)> {
        let mut state = self.state.lock();
        let written = state.written as i64;
        let kernel_frames = self.config.buffer_frames() as i64;

        for pcm in state.pcm.iter_mut().flatten() {
            if let Ok(timestamp) = pcm.timestamp() {
                let frames = written - kernel_frames + timestamp.available as i64;
                if frames >= 0 {
                    return Ok((frames as u64, timestamp.time));
                }
                break;
            }
        }

        Err(HalError::device_io(
            "presentation_position",
            "no valid hardware timestamp",
        ))
    }
}

impl AllOutputs<'_> {
    /// OR of the devices of every active output other than `except`
    fn other_devices(&self, except: OutputKind) -> AudioDevices {
        OutputKind::ALL
            .iter()
            .filter(|kind| **kind != except)
            .filter_map(|kind| self.states[kind.index()].as_deref())
            .filter(|state| !state.standby)
            .fold(AudioDevices::NONE, |acc, state| acc | state.device)
    }

    fn is_active(&self, kind: OutputKind) -> bool {
        self.states[kind.index()]
            .as_deref()
            .is_some_and(|state| !state.standby)
    }

    /// Start `kind` unless another thread already did
    pub(crate) fn start_if_standby(&mut self, kind: OutputKind) -> HalResult<()> {
        match self.states[kind.index()].as_deref() {
            None => {
                return Err(HalError::no_device(format!("{} output is closed", kind)));
            }
            Some(state) if state.closed => {
                return Err(HalError::no_device(format!("{} output is closed", kind)));
            }
            Some(state) if !state.standby => return Ok(()),
            Some(_) => {}
        }

        self.start_output(kind)?;
        if let Some(state) = self.states[kind.index()].as_deref_mut() {
            state.standby = false;
        }
        Ok(())
    }

    fn start_output(&mut self, kind: OutputKind) -> HalResult<()> {
        debug!(kind = %kind, "Starting output");

        if kind == OutputKind::Hdmi {
            self.force_non_hdmi_standby();
        } else if self.is_active(OutputKind::Hdmi) {
            if let Some(state) = self.states[kind.index()].as_deref_mut() {
                state.disabled = true;
            }
            debug!(kind = %kind, "HDMI active, output disabled");
            return Ok(());
        }

        let Some(stream) = self.streams[kind.index()].clone() else {
            return Err(HalError::no_device(format!("{} output is closed", kind)));
        };
        let Some(state) = self.states[kind.index()].as_deref_mut() else {
            return Err(HalError::no_device(format!("{} output is closed", kind)));
        };
        state.disabled = false;

        let backend = Arc::clone(&self.dev.pcm);
        let open_card = |card: u32| {
            backend
                .open(card, stream.pcm_device, PcmDirection::Playback, &stream.config)
                .map_err(|e| {
                    error!(card, device = stream.pcm_device, "Output PCM open failed: {}", e);
                    HalError::out_of_resources(format!("output PCM {}:{}", card, stream.pcm_device))
                })
        };

        if state.device.intersects(PRIMARY_CARD_DEVICES) {
            state.pcm[PCM_CARD as usize] = Some(open_card(PCM_CARD)?);
        }
        if state.device.contains(AudioDevices::OUT_DGTL_DOCK_HEADSET) {
            match open_card(PCM_CARD_SPDIF) {
                Ok(pcm) => state.pcm[PCM_CARD_SPDIF as usize] = Some(pcm),
                Err(e) => {
                    state.close_pcms();
                    return Err(e);
                }
            }
        }

        let device = state.device;
        if !self.dev.in_call {
            self.dev.out_device |= device;
            self.dev.select_devices();
        }

        if device.contains(AudioDevices::OUT_AUX_DIGITAL) {
            if let Some(hdmi) = self.dev.hdmi.as_mut() {
                if let Err(e) = hdmi.set_channel_count(stream.config.channels) {
                    warn!("Failed to set HDMI channel count: {}", e);
                }
            }
        }

        debug!(
            kind = %kind,
            device = %device,
            aggregated = %self.dev.out_device,
            "Output started"
        );
        Ok(())
    }

    /// Close the handles of `kind` and reroute for the remaining outputs
    pub(crate) fn standby_output(&mut self, kind: OutputKind) {
        let Some(state) = self.states[kind.index()].as_deref_mut() else {
            return;
        };
        if state.standby {
            return;
        }

        state.close_pcms();
        state.standby = true;
        state.disabled = false;
        debug!(kind = %kind, "Output in standby");

        if kind == OutputKind::Hdmi {
            self.force_non_hdmi_standby();
        }

        self.dev.out_device = self.other_devices(kind);
        if !self.dev.out_device.is_empty() {
            self.dev.select_devices();
        }
    }

    fn force_non_hdmi_standby(&mut self) {
        for kind in [OutputKind::DeepBuffer, OutputKind::LowLatency] {
            self.standby_output(kind);
        }
    }

    /// Move `kind` to a new device mask
    pub(crate) fn route_output(&mut self, kind: OutputKind, devices: AudioDevices) {
        let Some(current) = self.states[kind.index()].as_deref().map(|state| state.device) else {
            return;
        };
        if devices == current || devices.is_empty() {
            return;
        }

        let dock = AudioDevices::OUT_DGTL_DOCK_HEADSET;
        if (devices & dock) != (self.dev.out_device & dock) || self.dev.out_device.intersects(dock) {
            self.standby_output(kind);
        }
        if (devices & AudioDevices::OUT_ALL_SCO) != (current & AudioDevices::OUT_ALL_SCO) {
            self.standby_output(kind);
        }

        if let Some(state) = self.states[kind.index()].as_deref_mut() {
            state.device = devices;
        }
        self.dev.out_device = self.other_devices(kind) | devices;
        debug!(kind = %kind, devices = %devices, "Output rerouted");

        if self.dev.in_call {
            if self.dev.route_changed() {
                self.dev.restart_call();
            }
        } else {
            self.dev.select_devices();
        }

        // Outside a call nothing closes this pair when routing leaves SCO
        // again; the link stays open until a call ends. Kept deliberately to
        // match the vendor driver.
        if devices.has_sco() {
            self.dev.start_sco();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::MockHardware;
    use crate::types::{AudioConfig, AudioDevices, AudioMode, OutputFlags};
    use crate::{AudioHw, AudioStream, HalConfig, HalError, StreamOut};

    #[test]
    fn test_closed_output_is_never_restarted() {
        let hardware = MockHardware::new();
        let device =
            AudioHw::new(hardware.backends(), HalConfig::new().with_pacing(false)).unwrap();
        let mut config = AudioConfig::default();
        let stream = device
            .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::PRIMARY, &mut config)
            .unwrap();
        let mut samples = vec![0i16; 480];
        stream.write(&mut samples).unwrap();

        // Closed but still in the table, as seen by a writer racing the close
        stream.close_standby();
        let kind = stream.kind();
        let result = stream
            .shared
            .with_all_outputs(|all| all.start_if_standby(kind));
        assert!(matches!(result, Err(HalError::NoDevice { .. })));
        assert!(stream.is_standby());
        assert_eq!(hardware.pcm.live_handles(), 0);
        assert!(device.snapshot().out_device.is_empty());
    }

    #[test]
    fn test_sco_link_outlives_routing_outside_call() {
        let hardware = MockHardware::new();
        let device =
            AudioHw::new(hardware.backends(), HalConfig::new().with_pacing(false)).unwrap();
        let mut config = AudioConfig::default();
        let stream = device
            .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::PRIMARY, &mut config)
            .unwrap();

        let sco = AudioDevices::OUT_BLUETOOTH_SCO.bits();
        stream.set_parameters(&format!("routing={}", sco)).unwrap();
        assert!(device.snapshot().sco_pcms_open);

        let speaker = AudioDevices::OUT_SPEAKER.bits();
        stream.set_parameters(&format!("routing={}", speaker)).unwrap();
        assert!(device.snapshot().sco_pcms_open);

        // The next call that ends takes the link down
        device.set_mode(AudioMode::InCall).unwrap();
        device.set_mode(AudioMode::Normal).unwrap();
        assert!(!device.snapshot().sco_pcms_open);
    }

    #[test]
    fn test_stale_close_leaves_replacement_running() {
        let hardware = MockHardware::new();
        let device =
            AudioHw::new(hardware.backends(), HalConfig::new().with_pacing(false)).unwrap();
        let mut config = AudioConfig::default();
        let first = device
            .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::PRIMARY, &mut config)
            .unwrap();
        device.close_output_stream(&first);

        let second = device
            .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::PRIMARY, &mut config)
            .unwrap();
        let mut samples = vec![0i16; 480];
        second.write(&mut samples).unwrap();

        device.close_output_stream(&first);
        assert!(!second.is_standby());
        assert_eq!(second.write(&mut samples), Ok(960));
        assert_eq!(device.snapshot().out_device, AudioDevices::OUT_SPEAKER);
    }
}
