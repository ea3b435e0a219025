//! Input stream lifecycle
//!
//! Capture always runs at the native rate in stereo. Mono clients get the left
//! channel, and clients asking for another rate go through the resampler built
//! when the stream was opened. The first read after standby opens the PCM,
//! routes the capture path and starts a short volume ramp that hides the
//! codec's power-up pop.

use crate::config::CAPTURE_START_RAMP_MS;
use crate::device::{DeviceShared, DeviceState};
use crate::error::{HalError, HalResult};
use crate::hw::{Pcm, PCM_CARD, PCM_DEVICE};
use crate::params::{StrParams, KEY_INPUT_SOURCE, KEY_ROUTING};
use crate::resample::{FrameSource, Resampler};
use crate::stream::{settle_transfer, AudioStream, StreamIn};
use crate::types::{
    AudioConfig, AudioDevices, AudioMode, AudioSource, ChannelMask, InputFlags, PcmConfig,
    PcmDirection, PcmFormat,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

/// Client buffer size in bytes for a capture profile
///
/// The period is scaled to the client rate and rounded up to a multiple of 16
/// frames.
pub fn input_buffer_size(profile: &PcmConfig, sample_rate: u32, channels: u32) -> usize {
    let frames = profile.period_size as u64 * sample_rate as u64 / profile.rate.max(1) as u64;
    let frames = (frames as usize).div_ceil(16) * 16;
    frames * channels as usize * PcmFormat::S16Le.bytes_per_sample()
}

/// One period of native frames read from the capture PCM
struct CaptureBuffer {
    pcm: Option<Box<dyn Pcm>>,
    buffer: Vec<i16>,
    /// Frames of the current period not yet consumed
    frames_in: usize,
    period_size: usize,
    pcm_channels: usize,
    /// Channels per frame after mono folding
    channels: usize,
}

impl CaptureBuffer {
    fn new(config: &PcmConfig, channels: usize) -> Self {
        let period_size = config.period_size as usize;
        let pcm_channels = config.channels as usize;
        Self {
            pcm: None,
            buffer: vec![0; period_size * pcm_channels],
            frames_in: 0,
            period_size,
            pcm_channels,
            channels,
        }
    }

    fn close(&mut self) {
        if let Some(pcm) = self.pcm.take() {
            pcm.close();
        }
        self.frames_in = 0;
    }

    /// Keep the first channel of every frame, packed at the start of the buffer
    fn fold_to_mono(&mut self) {
        for i in 1..self.period_size {
            self.buffer[i] = self.buffer[i * self.pcm_channels];
        }
    }
}

impl FrameSource for CaptureBuffer {
    fn next_frames(&mut self, max_frames: usize) -> HalResult<&[i16]> {
        let Some(pcm) = self.pcm.as_mut() else {
            return Err(HalError::no_device("capture PCM is not open"));
        };

        if self.frames_in == 0 {
            pcm.read(&mut self.buffer).map_err(|e| {
                error!("Capture PCM read failed: {}", e);
                e
            })?;
            self.frames_in = self.period_size;
            if self.channels == 1 && self.pcm_channels > 1 {
                self.fold_to_mono();
            }
        }

        let frames = max_frames.min(self.frames_in);
        let start = (self.period_size - self.frames_in) * self.channels;
        Ok(&self.buffer[start..start + frames * self.channels])
    }

    fn release(&mut self, frames: usize) {
        self.frames_in -= frames.min(self.frames_in);
    }
}

/// Linear fade-in applied to the first frames after a capture start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct CaptureRamp {
    frames_left: usize,
    volume: u16,
    step: u16,
}

impl CaptureRamp {
    /// Ramp lasting [`CAPTURE_START_RAMP_MS`] at `rate`
    pub(crate) fn start(rate: u32) -> Self {
        let frames = (CAPTURE_START_RAMP_MS as u64 * rate as u64 / 1000) as usize;
        if frames == 0 {
            return Self::default();
        }
        Self {
            frames_left: frames,
            volume: 0,
            step: (u16::MAX as usize / frames) as u16,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.frames_left > 0
    }

    /// Scale the leading frames of `buffer` and advance the ramp
    pub(crate) fn apply(&mut self, buffer: &mut [i16], channels: usize) {
        let frames = (buffer.len() / channels.max(1)).min(self.frames_left);
        for frame in buffer.chunks_exact_mut(channels.max(1)).take(frames) {
            for sample in frame {
                *sample = ((*sample as i32 * self.volume as i32) >> 16) as i16;
            }
            self.volume = self.volume.wrapping_add(self.step);
        }
        self.frames_left -= frames;
    }
}

/// Mutable part of an input, guarded by the stream lock
struct InputState {
    standby: bool,
    closed: bool,
    source: AudioSource,
    device: AudioDevices,
    capture: CaptureBuffer,
    resampler: Option<Box<dyn Resampler>>,
    ramp: CaptureRamp,
}

/// Capture stream
pub struct InputStream {
    shared: Arc<DeviceShared>,
    requested_rate: u32,
    channel_mask: ChannelMask,
    flags: InputFlags,
    config: PcmConfig,
    state: Mutex<InputState>,
}

impl InputStream {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        device: AudioDevices,
        source: AudioSource,
        client: AudioConfig,
        flags: InputFlags,
        config: PcmConfig,
        resampler: Option<Box<dyn Resampler>>,
    ) -> Self {
        let channels = client.channel_mask.channel_count() as usize;
        Self {
            shared,
            requested_rate: client.sample_rate,
            channel_mask: client.channel_mask,
            flags,
            config,
            state: Mutex::new(InputState {
                standby: true,
                closed: false,
                source,
                device,
                capture: CaptureBuffer::new(&config, channels),
                resampler,
                ramp: CaptureRamp::default(),
            }),
        }
    }

    pub fn flags(&self) -> InputFlags {
        self.flags
    }

    /// Native capture geometry
    pub fn pcm_config(&self) -> &PcmConfig {
        &self.config
    }

    pub fn source(&self) -> AudioSource {
        self.state.lock().source
    }

    pub fn devices(&self) -> AudioDevices {
        self.state.lock().device
    }

    pub fn is_standby(&self) -> bool {
        self.state.lock().standby
    }

    /// True while the start-up fade-in is still running
    pub fn is_ramping(&self) -> bool {
        self.state.lock().ramp.is_active()
    }

    fn frame_channels(&self) -> usize {
        self.channel_mask.channel_count().max(1) as usize
    }

    /// Standby that also refuses any further read
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        {
            let mut dev = self.shared.state.lock();
            Self::standby_locked(&mut state, &mut dev);
        }
        state.closed = true;
        state.resampler = None;
        debug!("Closed input stream");
    }

    fn start_locked(&self, state: &mut InputState, dev: &mut DeviceState) -> HalResult<()> {
        let pcm = dev
            .pcm
            .open(PCM_CARD, PCM_DEVICE, PcmDirection::Capture, &self.config)
            .map_err(|e| {
                error!("Cannot open capture PCM: {}", e);
                HalError::out_of_resources("capture PCM")
            })?;
        state.capture.pcm = Some(pcm);
        state.capture.frames_in = 0;

        if let Some(resampler) = state.resampler.as_mut() {
            resampler.reset();
        }

        // In-call routing only changes through set_parameters
        if !dev.in_call {
            dev.input_source = state.source;
            dev.in_device = state.device;
            dev.in_channel_mask = self.channel_mask;
            dev.select_devices();
        }

        state.ramp = CaptureRamp::start(self.requested_rate);
        debug!(
            source = ?state.source,
            device = %state.device,
            rate = self.requested_rate,
            "Input started"
        );
        Ok(())
    }

    fn standby_locked(state: &mut InputState, dev: &mut DeviceState) {
        if state.standby {
            return;
        }

        state.capture.close();
        if dev.mode != AudioMode::InCall {
            dev.input_source = AudioSource::Default;
            dev.in_device = AudioDevices::NONE;
            dev.in_channel_mask = ChannelMask::NONE;
            dev.select_devices();
        }
        state.standby = true;
        debug!("Input in standby");
    }

    /// Fill `frames` frames of `out`, resampling when needed
    fn read_frames(&self, state: &mut InputState, out: &mut [i16], frames: usize) -> HalResult<()> {
        let channels = self.frame_channels();
        let mut done = 0;

        while done < frames {
            let mut count = frames - done;
            let dest = &mut out[done * channels..frames * channels];

            match state.resampler.as_mut() {
                Some(resampler) => resampler.pull(&mut state.capture, dest, &mut count)?,
                None => {
                    let src = state.capture.next_frames(count)?;
                    count = src.len() / channels;
                    dest[..src.len()].copy_from_slice(src);
                    state.capture.release(count);
                }
            }

            if count == 0 {
                return Err(HalError::device_io("read", "capture source produced no frames"));
            }
            done += count;
        }
        Ok(())
    }

    fn read_locked(&self, buffer: &mut [i16]) -> HalResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(HalError::no_device("input is closed"));
        }

        if state.standby {
            let mut dev = self.shared.state.lock();
            self.start_locked(state, &mut dev)?;
            state.standby = false;
        }

        let channels = self.frame_channels();
        let frames = buffer.len() / channels;
        let samples = &mut buffer[..frames * channels];

        let result = self.read_frames(state, samples, frames);
        if state.ramp.is_active() {
            state.ramp.apply(samples, channels);
        }

        if result.is_ok() && self.shared.state.lock().mic_mute {
            samples.fill(0);
        }
        result
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("requested_rate", &self.requested_rate)
            .field("channel_mask", &self.channel_mask)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AudioStream for InputStream {
    fn sample_rate(&self) -> u32 {
        self.requested_rate
    }

    /// Accepted and ignored; the rate is fixed at open
    fn set_sample_rate(&self, _rate: u32) -> HalResult<()> {
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        input_buffer_size(
            &self.config,
            self.requested_rate,
            self.channel_mask.channel_count(),
        )
    }

    fn channels(&self) -> ChannelMask {
        self.channel_mask
    }

    fn format(&self) -> PcmFormat {
        PcmFormat::S16Le
    }

    fn set_format(&self, _format: PcmFormat) -> HalResult<()> {
        Err(HalError::unsupported("input set_format"))
    }

    fn standby(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        let mut dev = self.shared.state.lock();
        Self::standby_locked(&mut state, &mut dev);
        Ok(())
    }

    /// Handles `input_source=<n>` and `routing=<mask>`
    ///
    /// A change is routed immediately only while the stream is capturing.
    fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        debug!("Input parameters: {}", kvpairs);
        let params = StrParams::parse(kvpairs);
        let source = params.get_int(KEY_INPUT_SOURCE)?;
        let routing = params.get_mask(KEY_ROUTING)?;

        let mut state = self.state.lock();
        let mut dev = self.shared.state.lock();
        let mut apply_now = false;

        if let Some(value) = source.filter(|value| *value != 0) {
            let source = AudioSource::from_raw(value as u32);
            if source != state.source {
                state.source = source;
                apply_now = !state.standby;
            }
        }

        if let Some(bits) = routing {
            let device = AudioDevices::from_input_bits(bits);
            if !device.is_empty() && device != state.device {
                let sco = AudioDevices::IN_BLUETOOTH_SCO_HEADSET;
                if (device & sco) != (state.device & sco) {
                    Self::standby_locked(&mut state, &mut dev);
                }
                state.device = device;
                apply_now = !state.standby;
            }
        }

        if apply_now {
            dev.input_source = state.source;
            dev.in_device = state.device;
            dev.select_devices();
        }
        Ok(())
    }

    fn get_parameters(&self, _keys: &str) -> String {
        String::new()
    }
}

impl StreamIn for InputStream {
    /// Capture gain is fixed
    fn set_gain(&self, _gain: f32) -> HalResult<()> {
        Ok(())
    }

    fn read(&self, buffer: &mut [i16]) -> HalResult<usize> {
        let bytes = buffer.len() * PcmFormat::S16Le.bytes_per_sample();
        let frames = buffer.len() / self.frame_channels();
        let result = self.read_locked(buffer);
        settle_transfer(
            result,
            bytes,
            frames,
            self.requested_rate,
            &self.shared.config,
        )
    }

    fn input_frames_lost(&self) -> u32 {
        0
    }
}
