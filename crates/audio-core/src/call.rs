//! Call session management
//!
//! A cellular call runs audio over the baseband voice PCM pair (and the
//! Bluetooth SCO pair when a headset is used) while the modem is told which
//! acoustic path, volume and noise reduction to use. Entering and leaving a
//! call is driven by mode changes; a wideband switch from the network tears the
//! call audio down and builds it again at the new rate.
//!
//! Everything here runs under the device lock.

use crate::device::DeviceState;
use crate::error::{HalError, HalResult};
use crate::hw::{
    CallAudioPath, ClockSync, Pcm, PcmBackend, SoundType, TwoMicDevice, TwoMicSolution, PCM_CARD,
    PCM_DEVICE_SCO, PCM_DEVICE_VOICE,
};
use crate::types::{AudioDevices, AudioMode, AudioSource, PcmConfig, PcmDirection};
use tracing::{debug, error, info, warn};

/// Receive/transmit pair of PCM handles of a voice link
#[derive(Default)]
pub(crate) struct PcmPair {
    rx: Option<Box<dyn Pcm>>,
    tx: Option<Box<dyn Pcm>>,
}

impl PcmPair {
    pub(crate) fn is_open(&self) -> bool {
        self.rx.is_some() || self.tx.is_some()
    }

    /// Open and start RX then TX
    ///
    /// When either direction fails to open, whatever was opened is closed
    /// again and the pair stays empty.
    fn open(
        &mut self,
        backend: &dyn PcmBackend,
        device: u32,
        config: &PcmConfig,
        name: &str,
    ) -> HalResult<()> {
        let rx = backend
            .open(PCM_CARD, device, PcmDirection::Playback, config)
            .map_err(|e| {
                error!("Cannot open {} RX PCM: {}", name, e);
                HalError::out_of_resources(format!("{} RX PCM", name))
            })?;

        let tx = match backend.open(PCM_CARD, device, PcmDirection::Capture, config) {
            Ok(tx) => tx,
            Err(e) => {
                error!("Cannot open {} TX PCM: {}", name, e);
                rx.close();
                return Err(HalError::out_of_resources(format!("{} TX PCM", name)));
            }
        };

        let rx = self.rx.insert(rx);
        if let Err(e) = rx.start() {
            warn!("Failed to start {} RX PCM: {}", name, e);
        }
        let tx = self.tx.insert(tx);
        if let Err(e) = tx.start() {
            warn!("Failed to start {} TX PCM: {}", name, e);
        }
        Ok(())
    }

    /// Stop and close each open direction independently
    ///
    /// Returns the number of handles closed.
    fn close(&mut self) -> usize {
        let mut closed = 0;
        for mut pcm in [self.rx.take(), self.tx.take()].into_iter().flatten() {
            if let Err(e) = pcm.stop() {
                debug!("PCM stop before close failed: {}", e);
            }
            pcm.close();
            closed += 1;
        }
        closed
    }
}

/// Modem call audio path for an output device mask
pub fn call_audio_path(out_device: AudioDevices, bluetooth_nrec: bool) -> CallAudioPath {
    match out_device {
        AudioDevices::OUT_SPEAKER => CallAudioPath::Speaker,
        AudioDevices::OUT_EARPIECE => CallAudioPath::Handset,
        AudioDevices::OUT_WIRED_HEADSET => CallAudioPath::Headset,
        AudioDevices::OUT_WIRED_HEADPHONE => CallAudioPath::Headphone,
        AudioDevices::OUT_BLUETOOTH_SCO
        | AudioDevices::OUT_BLUETOOTH_SCO_HEADSET
        | AudioDevices::OUT_BLUETOOTH_SCO_CARKIT => {
            if bluetooth_nrec {
                CallAudioPath::Bluetooth
            } else {
                CallAudioPath::BluetoothNoNr
            }
        }
        _ => CallAudioPath::Handset,
    }
}

/// Modem volume class for an output device mask
pub fn sound_type(out_device: AudioDevices) -> SoundType {
    match out_device {
        AudioDevices::OUT_EARPIECE => SoundType::Voice,
        AudioDevices::OUT_SPEAKER => SoundType::Speaker,
        AudioDevices::OUT_WIRED_HEADSET | AudioDevices::OUT_WIRED_HEADPHONE => SoundType::Headset,
        AudioDevices::OUT_BLUETOOTH_SCO
        | AudioDevices::OUT_BLUETOOTH_SCO_HEADSET
        | AudioDevices::OUT_BLUETOOTH_SCO_CARKIT
        | AudioDevices::OUT_ALL_SCO => SoundType::BtVoice,
        _ => SoundType::Voice,
    }
}

impl DeviceState {
    /// Enter the call session
    ///
    /// No-op when a call is already running. Fails with an out-of-resources
    /// error, without entering the call, if the voice PCMs cannot be opened;
    /// the routing context is then restored to what it was before.
    pub(crate) fn start_call(&mut self) -> HalResult<()> {
        if self.in_call {
            return Ok(());
        }

        let previous_out = self.out_device;
        let previous_source = self.input_source;

        if self.out_device.is_empty() && self.in_device.is_empty() {
            debug!("No device selected, using earpiece for the call");
            self.out_device = AudioDevices::OUT_EARPIECE;
        }
        self.input_source = AudioSource::VoiceCall;

        self.select_devices();
        if let Err(e) = self.start_voice_pcms() {
            self.out_device = previous_out;
            self.input_source = previous_source;
            self.select_devices();
            return Err(e);
        }
        self.in_call = true;

        self.two_mic_control = matches!(
            self.out_device,
            AudioDevices::OUT_EARPIECE | AudioDevices::OUT_SPEAKER
        ) && !self.two_mic_disabled;

        self.push_two_mic_control();
        self.push_call_audio_path();
        self.push_voice_volume();

        if let Err(e) = self.modem.set_clock_sync(ClockSync::Start) {
            warn!("Failed to start call clock: {}", e);
        }

        if self.out_device.has_sco() {
            self.start_sco();
        }

        info!(
            out_device = %self.out_device,
            wideband = self.wideband,
            "Call audio started"
        );
        Ok(())
    }

    /// Leave the call session
    ///
    /// Unless the device mode is still in-call (a rebuild in progress), the
    /// output falls back to speaker when it was empty or earpiece and the
    /// input source returns to default.
    pub(crate) fn stop_call(&mut self) {
        if !self.in_call {
            return;
        }

        if let Err(e) = self.modem.set_clock_sync(ClockSync::Stop) {
            warn!("Failed to stop call clock: {}", e);
        }
        let closed = self.stop_voice_pcms() + self.stop_sco();
        debug!("Closed {} call PCMs", closed);

        if self.mode != AudioMode::InCall {
            if self.out_device.is_empty() || self.out_device == AudioDevices::OUT_EARPIECE {
                self.out_device = AudioDevices::OUT_SPEAKER;
            }
            self.input_source = AudioSource::Default;
            debug!(
                out_device = %self.out_device,
                "Resetting route after call"
            );
            self.select_devices();
        }

        self.in_call = false;
        info!("Call audio stopped");
    }

    /// Open the baseband voice pair at the current AMR rate
    pub(crate) fn start_voice_pcms(&mut self) -> HalResult<()> {
        if self.voice.is_open() {
            warn!("Voice PCMs already open");
            return Ok(());
        }

        let config = *self.profiles.voice(self.wideband);
        debug!(rate = config.rate, "Opening voice PCMs");
        self.voice
            .open(self.pcm.as_ref(), PCM_DEVICE_VOICE, &config, "voice")
    }

    /// Close the baseband voice pair, returning the number of handles closed
    pub(crate) fn stop_voice_pcms(&mut self) -> usize {
        self.voice.close()
    }

    /// Open the Bluetooth SCO pair
    ///
    /// Best effort: a failure is logged and leaves the voice link untouched.
    pub(crate) fn start_sco(&mut self) {
        if self.sco.is_open() {
            warn!("SCO PCMs already open");
            return;
        }

        let config = self.profiles.sco;
        if let Err(e) = self
            .sco
            .open(self.pcm.as_ref(), PCM_DEVICE_SCO, &config, "SCO")
        {
            warn!("Bluetooth SCO link not started: {}", e);
        }
    }

    /// Close the Bluetooth SCO pair, returning the number of handles closed
    pub(crate) fn stop_sco(&mut self) -> usize {
        self.sco.close()
    }

    fn push_two_mic_control(&mut self) {
        let solution = if self.two_mic_control {
            TwoMicSolution::On
        } else {
            TwoMicSolution::Off
        };
        debug!("Two-mic control {:?}", solution);
        if let Err(e) = self
            .modem
            .set_two_mic_control(TwoMicDevice::Audience, solution)
        {
            warn!("Failed to set two-mic control: {}", e);
        }
    }

    /// Switch the uplink noise suppression
    ///
    /// Stays off when two-mic control is disabled on this board. Pushed to the
    /// modem only during a call; call entry picks its own setting.
    pub(crate) fn set_noise_suppression(&mut self, enabled: bool) {
        self.two_mic_control = enabled && !self.two_mic_disabled;
        if self.in_call {
            self.push_two_mic_control();
        }
    }

    fn push_call_audio_path(&mut self) {
        let path = call_audio_path(self.out_device, self.bluetooth_nrec);
        debug!("Call audio path {:?}", path);
        if let Err(e) = self.modem.set_call_audio_path(path) {
            warn!("Failed to set call audio path: {}", e);
        }
    }

    /// Push the stored voice volume to the modem while in call mode
    pub(crate) fn push_voice_volume(&mut self) {
        if self.mode != AudioMode::InCall {
            return;
        }
        let sound_type = sound_type(self.out_device);
        if let Err(e) = self.modem.set_call_volume(sound_type, self.voice_volume) {
            warn!("Failed to set call volume: {}", e);
        }
    }

    /// Handle an AMR-WB notification from the modem
    ///
    /// A running call whose route changes is torn down and restarted, since
    /// the baseband link rate cannot change while it is open.
    pub(crate) fn set_wideband(&mut self, enabled: bool) {
        if self.wideband == enabled {
            return;
        }
        self.wideband = enabled;

        if self.in_call && self.route_changed() {
            info!(
                "{} in-call wideband",
                if enabled { "Turning on" } else { "Turning off" }
            );
            self.restart_call();
        }
    }

    /// Full stop/start of the call audio
    pub(crate) fn restart_call(&mut self) {
        self.stop_call();
        if let Err(e) = self.start_call() {
            error!("Failed to restart call audio: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_audio_path_mapping() {
        assert_eq!(
            call_audio_path(AudioDevices::OUT_SPEAKER, true),
            CallAudioPath::Speaker
        );
        assert_eq!(
            call_audio_path(AudioDevices::OUT_WIRED_HEADPHONE, true),
            CallAudioPath::Headphone
        );
        assert_eq!(
            call_audio_path(AudioDevices::OUT_BLUETOOTH_SCO_HEADSET, true),
            CallAudioPath::Bluetooth
        );
        assert_eq!(
            call_audio_path(AudioDevices::OUT_BLUETOOTH_SCO_CARKIT, false),
            CallAudioPath::BluetoothNoNr
        );
        assert_eq!(
            call_audio_path(
                AudioDevices::OUT_SPEAKER | AudioDevices::OUT_WIRED_HEADSET,
                true
            ),
            CallAudioPath::Handset
        );
    }

    #[test]
    fn test_sound_type_mapping() {
        assert_eq!(sound_type(AudioDevices::OUT_EARPIECE), SoundType::Voice);
        assert_eq!(sound_type(AudioDevices::OUT_SPEAKER), SoundType::Speaker);
        assert_eq!(sound_type(AudioDevices::OUT_WIRED_HEADSET), SoundType::Headset);
        assert_eq!(sound_type(AudioDevices::OUT_ALL_SCO), SoundType::BtVoice);
        assert_eq!(sound_type(AudioDevices::NONE), SoundType::Voice);
    }
}
