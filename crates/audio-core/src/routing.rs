//! Route selection
//!
//! Decides which mixer paths the current combination of aggregated output
//! devices, input device and input source needs, and reprograms the mixer only
//! when that combination maps to a different [`RouteId`] than the one applied
//! last. All functions here run under the device lock.

use crate::classify::{classify_input_source, classify_output_device, InputSourceId, OutputDeviceId, RouteId};
use crate::device::DeviceState;
use crate::route_table;
use crate::types::{AudioDevices, AudioSource};
use tracing::{debug, trace, warn};

/// Mixer paths resolved for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedRoute {
    pub output_path: Option<&'static str>,
    pub input_path: Option<&'static str>,
}

/// Resolve the mixer paths for a routing context
///
/// With an active input but no routable output, the output column is implied
/// from the input device and only the capture path is used. With no input,
/// the playback path comes from the plain microphone row.
pub fn resolve_route(
    out_device: AudioDevices,
    in_device: AudioDevices,
    source: AudioSource,
    wideband: bool,
) -> ResolvedRoute {
    let output = classify_output_device(out_device);
    let input = classify_input_source(source, wideband);

    if input != InputSourceId::None {
        if output != OutputDeviceId::None {
            return route_table::lookup(input, output)
                .map(|route| ResolvedRoute {
                    output_path: Some(route.output_path),
                    input_path: Some(route.input_path),
                })
                .unwrap_or_default();
        }

        let implied = match in_device {
            AudioDevices::IN_WIRED_HEADSET => OutputDeviceId::Headset,
            AudioDevices::IN_BLUETOOTH_SCO_HEADSET => OutputDeviceId::BtScoHeadsetOut,
            _ if source == AudioSource::VoiceCall => OutputDeviceId::Earpiece,
            _ => OutputDeviceId::Speaker,
        };
        return ResolvedRoute {
            output_path: None,
            input_path: route_table::lookup(input, implied).map(|route| route.input_path),
        };
    }

    ResolvedRoute {
        output_path: route_table::lookup(InputSourceId::Mic, output).map(|route| route.output_path),
        input_path: None,
    }
}

impl DeviceState {
    /// Route id of the current routing context
    pub(crate) fn current_route(&self) -> RouteId {
        RouteId::compute(self.out_device, self.input_source, self.wideband)
    }

    /// True when the routing context maps to a route other than the applied one
    pub(crate) fn route_changed(&self) -> bool {
        self.current_route() != self.route_id
    }

    /// Apply the route of the current routing context
    ///
    /// A no-op when the route id did not change. Otherwise the mixer is reset
    /// and committed before the new paths are applied, so no control of the
    /// previous route survives.
    pub(crate) fn select_devices(&mut self) {
        self.sync_hdmi_audio();

        let route = self.current_route();
        if route == self.route_id {
            trace!("Routing unchanged ({})", route);
            return;
        }
        self.route_id = route;

        let resolved = resolve_route(
            self.out_device,
            self.in_device,
            self.input_source,
            self.wideband,
        );

        debug!(
            out_device = %self.out_device,
            input_source = ?self.input_source,
            output_path = resolved.output_path.unwrap_or("none"),
            input_path = resolved.input_path.unwrap_or("none"),
            "Selecting route {}",
            route
        );

        self.mixer.reset();
        if let Err(e) = self.mixer.commit() {
            warn!("Mixer reset commit failed: {}", e);
        }

        for path in [resolved.output_path, resolved.input_path].into_iter().flatten() {
            if let Err(e) = self.mixer.apply_path(path) {
                warn!("Failed to apply mixer path {}: {}", path, e);
            }
        }
        if let Err(e) = self.mixer.commit() {
            warn!("Mixer commit failed: {}", e);
        }
    }

    fn sync_hdmi_audio(&mut self) {
        let wanted = self.out_device.contains(AudioDevices::OUT_AUX_DIGITAL);
        let Some(hdmi) = self.hdmi.as_mut() else {
            return;
        };
        if self.hdmi_audio_enabled == Some(wanted) {
            return;
        }

        match hdmi.enable(wanted) {
            Ok(()) => self.hdmi_audio_enabled = Some(wanted),
            Err(e) => warn!("Failed to {} HDMI audio: {}", if wanted { "enable" } else { "disable" }, e),
        }
    }
}
