//! Audio device context
//!
//! [`AudioHw`] is the single owner of the shared routing state. Client threads
//! reach that state through three kinds of locks, which are always taken in
//! the same order:
//!
//! 1. the outputs list,
//! 2. each open output stream, in [`OutputKind`] order,
//! 3. the device state.
//!
//! An input stream lock may be held while taking the device lock, but is
//! never combined with output stream locks. Locks are released in reverse.

use crate::classify::RouteId;
use crate::config::{HalConfig, PcmProfiles, NATIVE_RATE};
use crate::error::{HalError, HalResult};
use crate::hw::{
    HdmiControl, HwBackends, Mixer, ModemControl, MuteCondition, PcmBackend, PCM_DEVICE,
    PCM_DEVICE_DEEP,
};
use crate::call::PcmPair;
use crate::params::{StrParams, KEY_BT_NREC, KEY_NOISE_SUPPRESSION, VALUE_OFF, VALUE_ON};
use crate::resample::{ResamplerFactory, ResamplerQuality};
use crate::stream::input::{input_buffer_size, InputStream};
use crate::stream::output::{OutputState, OutputStream};
use crate::types::{
    AudioConfig, AudioDevices, AudioMode, AudioSource, ChannelMask, InputFlags, OutputFlags,
    OutputKind, PcmFormat,
};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Table of live outputs, one slot per kind
pub(crate) type OutputTable = [Option<Arc<OutputStream>>; OutputKind::COUNT];

/// Routing state guarded by the device lock
pub(crate) struct DeviceState {
    pub(crate) mode: AudioMode,
    /// OR of the devices of every active output
    pub(crate) out_device: AudioDevices,
    pub(crate) in_device: AudioDevices,
    pub(crate) input_source: AudioSource,
    pub(crate) in_channel_mask: ChannelMask,
    pub(crate) in_call: bool,
    pub(crate) mic_mute: bool,
    pub(crate) bluetooth_nrec: bool,
    pub(crate) wideband: bool,
    pub(crate) two_mic_control: bool,
    pub(crate) two_mic_disabled: bool,
    pub(crate) voice_volume: f32,
    /// Route applied to the mixer last
    pub(crate) route_id: RouteId,
    pub(crate) hdmi_audio_enabled: Option<bool>,
    pub(crate) voice: PcmPair,
    pub(crate) sco: PcmPair,
    pub(crate) mixer: Box<dyn Mixer>,
    pub(crate) modem: Box<dyn ModemControl>,
    pub(crate) hdmi: Option<Box<dyn HdmiControl>>,
    pub(crate) pcm: Arc<dyn PcmBackend>,
    pub(crate) profiles: PcmProfiles,
}

/// State shared by the device handle and every stream it opened
pub(crate) struct DeviceShared {
    pub(crate) config: HalConfig,
    pub(crate) profiles: PcmProfiles,
    pub(crate) outputs: Mutex<OutputTable>,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) resamplers: Arc<dyn ResamplerFactory>,
}

/// Every output stream lock plus the device lock, taken in order
pub(crate) struct AllOutputs<'a> {
    pub(crate) dev: MutexGuard<'a, DeviceState>,
    pub(crate) states: [Option<MutexGuard<'a, OutputState>>; OutputKind::COUNT],
    pub(crate) streams: &'a OutputTable,
}

impl DeviceShared {
    /// Run `f` holding the outputs list, every output stream and the device
    ///
    /// The caller must not hold any output stream lock.
    pub(crate) fn with_all_outputs<R>(&self, f: impl FnOnce(&mut AllOutputs<'_>) -> R) -> R {
        let table = self.outputs.lock();
        let slots: &OutputTable = &table;
        let states = std::array::from_fn(|i| slots[i].as_ref().map(|stream| stream.state.lock()));
        let dev = self.state.lock();

        let mut all = AllOutputs {
            dev,
            states,
            streams: slots,
        };
        let result = f(&mut all);
        drop(all);
        drop(table);
        result
    }
}

/// Point-in-time view of the routing state
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub mode: AudioMode,
    pub out_device: AudioDevices,
    pub in_device: AudioDevices,
    pub input_source: AudioSource,
    pub in_channel_mask: ChannelMask,
    pub in_call: bool,
    pub mic_mute: bool,
    pub bluetooth_nrec: bool,
    pub wideband: bool,
    pub two_mic_control: bool,
    pub voice_volume: f32,
    pub route_id: RouteId,
    pub voice_pcms_open: bool,
    pub sco_pcms_open: bool,
}

/// Telephony audio device
///
/// Streams keep the device alive; close every stream with
/// [`AudioHw::close_output_stream`] / [`AudioHw::close_input_stream`] before
/// dropping the device.
#[derive(Clone)]
pub struct AudioHw {
    pub(crate) shared: Arc<DeviceShared>,
}

impl AudioHw {
    /// Create a new device on top of the given hardware backends
    pub fn new(backends: HwBackends, config: HalConfig) -> HalResult<Self> {
        config.validate()?;
        let profiles = PcmProfiles::from_config(&config);

        let HwBackends {
            mixer,
            pcm,
            modem,
            hdmi,
            resamplers,
        } = backends;

        let state = DeviceState {
            mode: AudioMode::Normal,
            out_device: AudioDevices::NONE,
            in_device: AudioDevices::NONE,
            input_source: AudioSource::Default,
            in_channel_mask: ChannelMask::NONE,
            in_call: false,
            mic_mute: false,
            bluetooth_nrec: false,
            wideband: config.force_wideband,
            two_mic_control: false,
            two_mic_disabled: config.disable_two_mic,
            voice_volume: 1.0,
            route_id: RouteId::UNSET,
            hdmi_audio_enabled: None,
            voice: PcmPair::default(),
            sco: PcmPair::default(),
            mixer,
            modem,
            hdmi,
            pcm,
            profiles,
        };

        let shared = Arc::new(DeviceShared {
            config,
            profiles,
            outputs: Mutex::new(Default::default()),
            state: Mutex::new(state),
            resamplers,
        });

        if shared.config.force_wideband {
            info!("Wideband forced on, ignoring modem notifications");
        } else {
            let weak = Arc::downgrade(&shared);
            shared
                .state
                .lock()
                .modem
                .register_wideband_listener(Box::new(move |enabled| {
                    if let Some(shared) = weak.upgrade() {
                        shared.state.lock().set_wideband(enabled);
                    }
                }));
        }

        info!(
            "Audio device ready (two-mic {}, wideband {})",
            if shared.config.disable_two_mic { "disabled" } else { "enabled" },
            shared.config.force_wideband
        );
        Ok(Self { shared })
    }

    /// Always succeeds once the device is constructed
    pub fn init_check(&self) -> HalResult<()> {
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &HalConfig {
        &self.shared.config
    }

    /// Open an output stream
    ///
    /// The kind is picked from the flags and devices: a direct stream to HDMI
    /// becomes the multichannel output, a deep buffer flag the deep buffer
    /// output, anything else the low-latency output. `config` is updated with
    /// the negotiated rate, channel mask and format. Fails with a busy error
    /// when an output of the same kind is already open.
    pub fn open_output_stream(
        &self,
        devices: AudioDevices,
        flags: OutputFlags,
        config: &mut AudioConfig,
    ) -> HalResult<Arc<OutputStream>> {
        let devices = if devices.is_empty() {
            AudioDevices::OUT_SPEAKER
        } else {
            devices
        };

        let profiles = &self.shared.profiles;
        let (kind, pcm_config, pcm_device, channel_mask, supported) = if flags
            .contains(OutputFlags::DIRECT)
            && devices == AudioDevices::OUT_AUX_DIGITAL
        {
            let supported = self.read_hdmi_channel_masks()?;
            if config.sample_rate == 0 {
                config.sample_rate = crate::config::HDMI_DEFAULT_RATE;
            }
            if config.channel_mask.is_empty() {
                config.channel_mask = ChannelMask::OUT_5POINT1;
            }
            let mut pcm_config = profiles.hdmi_multi;
            pcm_config.rate = config.sample_rate;
            pcm_config.channels = config.channel_mask.channel_count();
            (
                OutputKind::Hdmi,
                pcm_config,
                PCM_DEVICE,
                config.channel_mask,
                supported,
            )
        } else if flags.contains(OutputFlags::DEEP_BUFFER) {
            (
                OutputKind::DeepBuffer,
                profiles.deep,
                PCM_DEVICE_DEEP,
                ChannelMask::OUT_STEREO,
                vec![ChannelMask::OUT_STEREO],
            )
        } else {
            (
                OutputKind::LowLatency,
                profiles.fast,
                PCM_DEVICE,
                ChannelMask::OUT_STEREO,
                vec![ChannelMask::OUT_STEREO],
            )
        };

        config.format = PcmFormat::S16Le;
        config.channel_mask = channel_mask;
        config.sample_rate = pcm_config.rate;

        let stream = Arc::new(OutputStream::new(
            kind,
            Arc::clone(&self.shared),
            devices,
            pcm_device,
            pcm_config,
            channel_mask,
            supported,
        ));

        let mut table = self.shared.outputs.lock();
        if table[kind.index()].is_some() {
            return Err(HalError::busy(format!("{} output", kind)));
        }
        table[kind.index()] = Some(Arc::clone(&stream));

        debug!(
            kind = %kind,
            devices = %devices,
            rate = pcm_config.rate,
            channels = pcm_config.channels,
            "Opened output stream"
        );
        Ok(stream)
    }

    fn read_hdmi_channel_masks(&self) -> HalResult<Vec<ChannelMask>> {
        let mut dev = self.shared.state.lock();
        let hdmi = dev
            .hdmi
            .as_mut()
            .ok_or_else(|| HalError::no_device("HDMI control channel"))?;

        let max_channels = hdmi.query_max_channels()?;
        debug!("HDMI sink accepts {} channels", max_channels);
        match max_channels {
            6 => Ok(vec![ChannelMask::OUT_5POINT1]),
            8 => Ok(vec![ChannelMask::OUT_5POINT1, ChannelMask::OUT_7POINT1]),
            other => Err(HalError::unsupported(format!(
                "HDMI sink with {} channels",
                other
            ))),
        }
    }

    /// Put an output in standby and release its kind slot
    ///
    /// Closing a stream twice is a no-op.
    pub fn close_output_stream(&self, stream: &Arc<OutputStream>) {
        stream.close_standby();

        let mut table = self.shared.outputs.lock();
        let slot = &mut table[stream.kind().index()];
        if slot.as_ref().is_some_and(|open| Arc::ptr_eq(open, stream)) {
            *slot = None;
            debug!(kind = %stream.kind(), "Closed output stream");
        }
    }

    /// Open an input stream
    ///
    /// Stereo and mono capture are accepted; any other channel mask is
    /// rejected with `config.channel_mask` set to stereo as the suggested
    /// alternative. A zero sample rate selects the native capture rate.
    pub fn open_input_stream(
        &self,
        devices: AudioDevices,
        config: &mut AudioConfig,
        flags: InputFlags,
        source: AudioSource,
    ) -> HalResult<Arc<InputStream>> {
        if config.channel_mask != ChannelMask::IN_STEREO
            && config.channel_mask != ChannelMask::IN_MONO
        {
            let requested = config.channel_mask;
            config.channel_mask = ChannelMask::IN_STEREO;
            return Err(HalError::invalid_argument(format!(
                "unsupported capture channel mask {:#x}, use stereo",
                requested.bits()
            )));
        }
        if config.sample_rate == 0 {
            config.sample_rate = NATIVE_RATE;
        }
        config.format = PcmFormat::S16Le;

        let pcm_config = *self
            .shared
            .profiles
            .capture(flags.contains(InputFlags::FAST));
        let channels = config.channel_mask.channel_count() as usize;

        let resampler = if config.sample_rate != pcm_config.rate {
            let resampler = self
                .shared
                .resamplers
                .create(
                    pcm_config.rate,
                    config.sample_rate,
                    channels,
                    ResamplerQuality::Default,
                )
                .map_err(|e| HalError::invalid_argument(format!("resampler: {}", e)))?;
            debug!(
                "Created resampler converting {} -> {}",
                pcm_config.rate, config.sample_rate
            );
            Some(resampler)
        } else {
            None
        };

        debug!(
            rate = config.sample_rate,
            channel_mask = config.channel_mask.bits(),
            "Opened input stream"
        );
        Ok(Arc::new(InputStream::new(
            Arc::clone(&self.shared),
            AudioDevices::from_input_bits(devices.bits()),
            source,
            *config,
            flags,
            pcm_config,
            resampler,
        )))
    }

    /// Put an input in standby and release its resampler
    pub fn close_input_stream(&self, stream: &Arc<InputStream>) {
        stream.close();
    }

    /// Change the telephony mode, entering or leaving the call session
    pub fn set_mode(&self, mode: AudioMode) -> HalResult<()> {
        let mut dev = self.shared.state.lock();
        if dev.mode == mode {
            return Ok(());
        }

        let previous = dev.mode;
        dev.mode = mode;

        if mode == AudioMode::InCall {
            info!("Entering in-call mode");
            if let Err(e) = dev.start_call() {
                dev.mode = previous;
                return Err(e);
            }
        } else {
            info!(mode = ?mode, "Leaving in-call mode");
            dev.stop_call();
        }
        Ok(())
    }

    /// Current telephony mode
    pub fn mode(&self) -> AudioMode {
        self.shared.state.lock().mode
    }

    /// Mute or unmute the microphone, including the call uplink
    pub fn set_mic_mute(&self, muted: bool) -> HalResult<()> {
        let mut dev = self.shared.state.lock();
        debug!("Set mic mute: {}", muted);

        if dev.in_call {
            let condition = if muted {
                MuteCondition::TxMute
            } else {
                MuteCondition::TxUnmute
            };
            if let Err(e) = dev.modem.set_mute(condition) {
                warn!("Failed to set uplink mute: {}", e);
            }
        }
        dev.mic_mute = muted;
        Ok(())
    }

    pub fn mic_mute(&self) -> bool {
        self.shared.state.lock().mic_mute
    }

    /// Store the call volume and push it to the modem while in call mode
    pub fn set_voice_volume(&self, volume: f32) -> HalResult<()> {
        let mut dev = self.shared.state.lock();
        dev.voice_volume = volume;
        dev.push_voice_volume();
        Ok(())
    }

    /// Master volume is fixed in hardware
    pub fn set_master_volume(&self, _volume: f32) -> HalResult<()> {
        Err(HalError::unsupported("set_master_volume"))
    }

    /// Apply device-wide parameters (`bt_headset_nrec`, `noise_suppression`)
    pub fn set_parameters(&self, kvpairs: &str) -> HalResult<()> {
        let params = StrParams::parse(kvpairs);
        let mut dev = self.shared.state.lock();

        if let Some(value) = params.get(KEY_BT_NREC) {
            dev.bluetooth_nrec = value == VALUE_ON;
            debug!("Bluetooth NREC {}", dev.bluetooth_nrec);
        }

        if let Some(value) = params.get(KEY_NOISE_SUPPRESSION) {
            debug!("noise_suppression={}", value);
            dev.set_noise_suppression(value != VALUE_OFF);
        }

        Ok(())
    }

    /// No device-wide parameter can be queried
    pub fn get_parameters(&self, _keys: &str) -> String {
        String::new()
    }

    /// Capture buffer size for a configuration, assuming normal latency
    pub fn input_buffer_size(&self, config: &AudioConfig) -> usize {
        input_buffer_size(
            &self.shared.profiles.capture,
            config.sample_rate,
            config.channel_mask.channel_count(),
        )
    }

    /// Snapshot of the routing state
    pub fn snapshot(&self) -> DeviceSnapshot {
        let dev = self.shared.state.lock();
        DeviceSnapshot {
            mode: dev.mode,
            out_device: dev.out_device,
            in_device: dev.in_device,
            input_source: dev.input_source,
            in_channel_mask: dev.in_channel_mask,
            in_call: dev.in_call,
            mic_mute: dev.mic_mute,
            bluetooth_nrec: dev.bluetooth_nrec,
            wideband: dev.wideband,
            two_mic_control: dev.two_mic_control,
            voice_volume: dev.voice_volume,
            route_id: dev.route_id,
            voice_pcms_open: dev.voice.is_open(),
            sco_pcms_open: dev.sco.is_open(),
        }
    }
}

impl std::fmt::Debug for AudioHw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioHw")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
