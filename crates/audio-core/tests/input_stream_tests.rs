//! Input stream integration tests
//!
//! Capture start and standby routing, resampling, mono folding, the start-up
//! ramp and microphone mute.

use callroute_audio_core::hw::{PCM_CARD, PCM_DEVICE};
use callroute_audio_core::mock::MockHardware;
use callroute_audio_core::types::PcmDirection;
use callroute_audio_core::{
    AudioConfig, AudioDevices, AudioHw, AudioMode, AudioSource, AudioStream, ChannelMask,
    HalConfig, HalError, InputFlags, InputStream, StreamIn, TransferErrorPolicy,
};
use std::sync::Arc;

/// Frames covered by the start-up ramp at 48 kHz
const RAMP_FRAMES_48K: usize = 4800;

fn setup_with(config: HalConfig) -> (MockHardware, AudioHw) {
    let hardware = MockHardware::new();
    let device = AudioHw::new(hardware.backends(), config.with_pacing(false)).unwrap();
    (hardware, device)
}

fn setup() -> (MockHardware, AudioHw) {
    setup_with(HalConfig::new())
}

fn open_input(
    device: &AudioHw,
    rate: u32,
    mask: ChannelMask,
    source: AudioSource,
) -> Arc<InputStream> {
    let mut config = AudioConfig::new(rate, mask);
    device
        .open_input_stream(
            AudioDevices::IN_BUILTIN_MIC,
            &mut config,
            InputFlags::NONE,
            source,
        )
        .unwrap()
}

/// Read past the start-up ramp so later reads carry unscaled samples
fn skip_ramp(stream: &InputStream, channels: usize) {
    let mut buffer = vec![0i16; RAMP_FRAMES_48K * channels];
    stream.read(&mut buffer).unwrap();
    assert!(!stream.is_ramping());
}

#[test]
fn test_open_rejects_unsupported_channel_mask() {
    let (_hardware, device) = setup();
    let mut config = AudioConfig::new(48000, ChannelMask::OUT_5POINT1);

    let result = device.open_input_stream(
        AudioDevices::IN_BUILTIN_MIC,
        &mut config,
        InputFlags::NONE,
        AudioSource::Mic,
    );
    assert!(matches!(result, Err(HalError::InvalidArgument { .. })));
    assert_eq!(config.channel_mask, ChannelMask::IN_STEREO);
}

#[test]
fn test_open_defaults_to_native_rate() {
    let (_hardware, device) = setup();
    let mut config = AudioConfig::new(0, ChannelMask::IN_STEREO);
    let stream = device
        .open_input_stream(
            AudioDevices::IN_BUILTIN_MIC,
            &mut config,
            InputFlags::NONE,
            AudioSource::Mic,
        )
        .unwrap();

    assert_eq!(config.sample_rate, 48000);
    assert_eq!(stream.sample_rate(), 48000);
    assert_eq!(stream.buffer_size(), 320 * 4);
    assert_eq!(
        device.input_buffer_size(&AudioConfig::new(16000, ChannelMask::IN_MONO)),
        112 * 2
    );
}

#[test]
fn test_start_and_standby_route_capture() {
    let (hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);

    let mut buffer = vec![0i16; 640];
    assert_eq!(stream.read(&mut buffer), Ok(1280));
    assert!(!stream.is_standby());
    assert_eq!(
        hardware.pcm.open_count(PCM_CARD, PCM_DEVICE, PcmDirection::Capture),
        1
    );

    let snapshot = device.snapshot();
    assert_eq!(snapshot.input_source, AudioSource::Mic);
    assert_eq!(snapshot.in_device, AudioDevices::IN_BUILTIN_MIC);
    assert_eq!(hardware.mixer.active_paths(), vec!["media-main-mic".to_string()]);

    stream.standby().unwrap();
    let snapshot = device.snapshot();
    assert_eq!(snapshot.input_source, AudioSource::Default);
    assert!(snapshot.in_device.is_empty());
    assert!(hardware.mixer.active_paths().is_empty());
    assert_eq!(hardware.pcm.live_handles(), 0);
}

#[test]
fn test_routing_parameter_while_capturing() {
    let (hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    let mut buffer = vec![0i16; 640];
    stream.read(&mut buffer).unwrap();

    // Input masks carry the top bit and arrive as negative numbers
    let headset = (AudioDevices::BIT_IN | AudioDevices::IN_WIRED_HEADSET.bits()) as i32;
    stream.set_parameters(&format!("routing={}", headset)).unwrap();

    assert_eq!(stream.devices(), AudioDevices::IN_WIRED_HEADSET);
    assert_eq!(device.snapshot().in_device, AudioDevices::IN_WIRED_HEADSET);
    // Route ids key on the source class, so the mixer follows on the next
    // source change
    assert_eq!(hardware.mixer.active_paths(), vec!["media-main-mic".to_string()]);

    stream.set_parameters("input_source=5").unwrap();
    assert_eq!(stream.source(), AudioSource::Camcorder);
    assert_eq!(
        hardware.mixer.active_paths(),
        vec!["camcorder-headset-mic".to_string()]
    );
}

#[test]
fn test_parameters_in_standby_wait_for_start() {
    let (hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);

    stream.set_parameters("input_source=6").unwrap();
    assert_eq!(stream.source(), AudioSource::VoiceRecognition);
    assert_eq!(hardware.mixer.reset_count(), 0);

    let mut buffer = vec![0i16; 640];
    stream.read(&mut buffer).unwrap();
    assert_eq!(
        hardware.mixer.active_paths(),
        vec!["recognition-main-mic".to_string()]
    );
}

#[test]
fn test_stereo_capture_passes_frames_through() {
    let (_hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    skip_ramp(&stream, 2);

    let mut buffer = vec![0i16; 16];
    stream.read(&mut buffer).unwrap();
    let first = RAMP_FRAMES_48K as i16;
    for (i, frame) in buffer.chunks(2).enumerate() {
        assert_eq!(frame, &[first + i as i16, -(first + i as i16)]);
    }
}

#[test]
fn test_mono_capture_keeps_left_channel() {
    let (hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_MONO, AudioSource::Mic);
    skip_ramp(&stream, 1);

    let mut buffer = vec![0i16; 320];
    stream.read(&mut buffer).unwrap();
    for (i, sample) in buffer.iter().enumerate() {
        assert_eq!(*sample, (RAMP_FRAMES_48K + i) as i16);
    }

    // The hardware still captures stereo
    let capture = hardware
        .pcm
        .opens()
        .into_iter()
        .find(|open| open.direction == PcmDirection::Capture)
        .unwrap();
    assert_eq!(capture.config.channels, 2);
}

#[test]
fn test_resampled_reads_fill_the_buffer() {
    let (_hardware, device) = setup();
    let stream = open_input(&device, 16000, ChannelMask::IN_MONO, AudioSource::Mic);

    for _ in 0..10 {
        let mut buffer = vec![-1i16; 160];
        assert_eq!(stream.read(&mut buffer), Ok(320));
        assert!(buffer.iter().all(|sample| *sample >= 0));
    }

    // Past the ramp, every output frame advances three native frames
    let mut buffer = vec![0i16; 1600];
    stream.read(&mut buffer).unwrap();
    let mut buffer = vec![0i16; 64];
    stream.read(&mut buffer).unwrap();
    for pair in buffer.windows(2) {
        assert_eq!(pair[1] - pair[0], 3);
    }
}

#[test]
fn test_ramp_fades_in_after_each_start() {
    let (_hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_MONO, AudioSource::Mic);

    let mut buffer = vec![0i16; 320];
    stream.read(&mut buffer).unwrap();
    assert_eq!(buffer[0], 0);
    assert!(stream.is_ramping());
    // Input ramps up by one per frame, so the scaled signal never decreases
    for pair in buffer.windows(2) {
        assert!(pair[0] <= pair[1]);
    }

    skip_ramp(&stream, 1);
    stream.standby().unwrap();
    let mut buffer = vec![0i16; 320];
    stream.read(&mut buffer).unwrap();
    assert!(stream.is_ramping());
    assert_eq!(buffer[0], 0);
}

#[test]
fn test_mic_mute_zeroes_capture() {
    let (_hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    skip_ramp(&stream, 2);

    device.set_mic_mute(true).unwrap();
    let mut buffer = vec![1i16; 640];
    assert_eq!(stream.read(&mut buffer), Ok(1280));
    assert!(buffer.iter().all(|sample| *sample == 0));
}

#[test]
fn test_read_errors_follow_policy() {
    let (hardware, device) = setup();
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    hardware
        .pcm
        .set_read_error(Some(HalError::device_io("pcm_read", "overrun")));

    let mut buffer = vec![0i16; 640];
    assert_eq!(stream.read(&mut buffer), Ok(1280));

    let (hardware, device) =
        setup_with(HalConfig::new().with_transfer_errors(TransferErrorPolicy::Propagate));
    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    hardware
        .pcm
        .set_read_error(Some(HalError::device_io("pcm_read", "overrun")));
    assert!(matches!(
        stream.read(&mut buffer),
        Err(HalError::DeviceIo { .. })
    ));
}

#[test]
fn test_closed_input_refuses_reads() {
    let (hardware, device) =
        setup_with(HalConfig::new().with_transfer_errors(TransferErrorPolicy::Propagate));
    let stream = open_input(&device, 16000, ChannelMask::IN_STEREO, AudioSource::Mic);
    let mut buffer = vec![0i16; 320];
    stream.read(&mut buffer).unwrap();

    device.close_input_stream(&stream);
    assert_eq!(hardware.pcm.live_handles(), 0);
    assert!(matches!(
        stream.read(&mut buffer),
        Err(HalError::NoDevice { .. })
    ));
}

#[test]
fn test_capture_during_call_keeps_call_routing() {
    let (hardware, device) = setup();
    device.set_mode(AudioMode::InCall).unwrap();
    let paths = hardware.mixer.active_paths();

    let stream = open_input(&device, 48000, ChannelMask::IN_STEREO, AudioSource::Mic);
    let mut buffer = vec![0i16; 640];
    stream.read(&mut buffer).unwrap();
    assert_eq!(device.snapshot().input_source, AudioSource::VoiceCall);

    stream.standby().unwrap();
    assert_eq!(device.snapshot().input_source, AudioSource::VoiceCall);
    assert_eq!(hardware.mixer.active_paths(), paths);
}
