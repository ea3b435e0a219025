//! Lock ordering under concurrent use
//!
//! Several client threads write, read, reroute and switch modes while the
//! modem thread delivers wideband notifications. A deadlock shows up as a
//! worker that never reports back.

use callroute_audio_core::mock::MockHardware;
use callroute_audio_core::{
    AudioConfig, AudioDevices, AudioHw, AudioMode, AudioSource, AudioStream, ChannelMask,
    HalConfig, HalError, InputFlags, OutputFlags, StreamIn, StreamOut,
};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const ITERATIONS: usize = 200;

#[test]
fn test_concurrent_clients_make_progress() {
    let hardware = MockHardware::new();
    let device = AudioHw::new(hardware.backends(), HalConfig::new().with_pacing(false)).unwrap();

    let mut config = AudioConfig::default();
    let fast = device
        .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::PRIMARY, &mut config)
        .unwrap();
    let deep = device
        .open_output_stream(AudioDevices::OUT_SPEAKER, OutputFlags::DEEP_BUFFER, &mut config)
        .unwrap();
    let hdmi = device
        .open_output_stream(AudioDevices::OUT_AUX_DIGITAL, OutputFlags::DIRECT, &mut config)
        .unwrap();
    let mut input_config = AudioConfig::new(16000, ChannelMask::IN_MONO);
    let input = device
        .open_input_stream(
            AudioDevices::IN_BUILTIN_MIC,
            &mut input_config,
            InputFlags::NONE,
            AudioSource::Mic,
        )
        .unwrap();

    let (done_tx, done_rx) = mpsc::channel::<&'static str>();
    let mut workers = Vec::new();

    {
        let stream = fast.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            let mut samples = vec![0i16; 480];
            for _ in 0..ITERATIONS {
                match stream.write(&mut samples) {
                    Ok(_) | Err(HalError::BrokenPipe { .. }) => {}
                    Err(e) => panic!("unexpected write error: {}", e),
                }
            }
            done.send("low-latency writer").unwrap();
        }));
    }

    {
        let stream = deep.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            let mut samples = vec![0i16; 1920];
            for i in 0..ITERATIONS {
                let _ = stream.write(&mut samples);
                if i % 10 == 0 {
                    stream.standby().unwrap();
                }
            }
            done.send("deep buffer writer").unwrap();
        }));
    }

    {
        let stream = hdmi.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            let mut samples = vec![0i16; 6 * 64];
            for i in 0..ITERATIONS {
                stream.write(&mut samples).unwrap();
                if i % 5 == 0 {
                    stream.standby().unwrap();
                }
            }
            done.send("hdmi writer").unwrap();
        }));
    }

    {
        let stream = fast.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            let routes = [
                AudioDevices::OUT_WIRED_HEADSET,
                AudioDevices::OUT_SPEAKER,
                AudioDevices::OUT_BLUETOOTH_SCO,
                AudioDevices::OUT_EARPIECE,
            ];
            for i in 0..ITERATIONS {
                let route = routes[i % routes.len()].bits();
                stream.set_parameters(&format!("routing={}", route)).unwrap();
            }
            done.send("router").unwrap();
        }));
    }

    {
        let stream = input.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            let mut buffer = vec![0i16; 160];
            for i in 0..ITERATIONS {
                stream.read(&mut buffer).unwrap();
                if i % 7 == 0 {
                    stream.standby().unwrap();
                }
            }
            done.send("reader").unwrap();
        }));
    }

    {
        let device = device.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            for i in 0..ITERATIONS / 4 {
                let mode = if i % 2 == 0 {
                    AudioMode::InCall
                } else {
                    AudioMode::Normal
                };
                device.set_mode(mode).unwrap();
                device.set_mic_mute(i % 3 == 0).unwrap();
            }
            device.set_mode(AudioMode::Normal).unwrap();
            done.send("mode switcher").unwrap();
        }));
    }

    {
        let modem = hardware.modem.clone();
        let done = done_tx.clone();
        workers.push(thread::spawn(move || {
            for i in 0..ITERATIONS {
                modem.notify_wideband(i % 2 == 0);
            }
            done.send("modem").unwrap();
        }));
    }
    drop(done_tx);

    let expected = workers.len();
    let mut finished = Vec::new();
    while finished.len() < expected {
        match done_rx.recv_timeout(Duration::from_secs(30)) {
            Ok(name) => finished.push(name),
            Err(_) => panic!("workers stalled, finished so far: {:?}", finished),
        }
    }
    for worker in workers {
        worker.join().unwrap();
    }

    device.close_input_stream(&input);
    for stream in [&fast, &deep, &hdmi] {
        device.close_output_stream(stream);
    }

    let snapshot = device.snapshot();
    assert!(!snapshot.in_call);
    assert!(!snapshot.voice_pcms_open);
    // Only the SCO link opened by Bluetooth routing may outlive its streams
    let sco_handles = if snapshot.sco_pcms_open { 2 } else { 0 };
    assert_eq!(hardware.pcm.live_handles(), sco_handles);
}
