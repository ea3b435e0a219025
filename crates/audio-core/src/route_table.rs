//! Static route table
//!
//! One mixer path pair per (input source class, output device class). Path
//! names are resolved by the mixer backend from its board description.

use crate::classify::{InputSourceId, OutputDeviceId};

/// Mixer path pair for one route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteConfig {
    /// Playback path name
    pub output_path: &'static str,
    /// Capture path name
    pub input_path: &'static str,
}

const fn route(output_path: &'static str, input_path: &'static str) -> RouteConfig {
    RouteConfig {
        output_path,
        input_path,
    }
}

const ROW_LEN: usize = OutputDeviceId::TABLE_SIZE;

// Columns: speaker, earpiece, headset, headphones, bt-sco, bt-sco-headset,
// bt-sco-carkit, speaker+headset, speaker+earpiece
const MEDIA: [RouteConfig; ROW_LEN] = [
    route("media-speaker", "media-main-mic"),
    route("media-earpiece", "media-main-mic"),
    route("media-headphones", "media-headset-mic"),
    route("media-headphones", "media-main-mic"),
    route("media-bt-sco", "media-bt-sco-mic"),
    route("media-bt-sco-headset", "media-bt-sco-mic"),
    route("media-bt-sco-carkit", "media-bt-sco-mic"),
    route("media-speaker-and-headphones", "media-main-mic"),
    route("media-speaker-and-earpiece", "media-main-mic"),
];

const CAMCORDER: [RouteConfig; ROW_LEN] = [
    route("media-speaker", "camcorder-mic"),
    route("media-earpiece", "camcorder-mic"),
    route("media-headphones", "camcorder-headset-mic"),
    route("media-headphones", "camcorder-mic"),
    route("media-bt-sco", "camcorder-bt-sco-mic"),
    route("media-bt-sco-headset", "camcorder-bt-sco-mic"),
    route("media-bt-sco-carkit", "camcorder-bt-sco-mic"),
    route("media-speaker-and-headphones", "camcorder-mic"),
    route("media-speaker-and-earpiece", "camcorder-mic"),
];

const VOICE_RECOGNITION: [RouteConfig; ROW_LEN] = [
    route("media-speaker", "recognition-main-mic"),
    route("media-earpiece", "recognition-main-mic"),
    route("media-headphones", "recognition-headset-mic"),
    route("media-headphones", "recognition-main-mic"),
    route("media-bt-sco", "recognition-bt-sco-mic"),
    route("media-bt-sco-headset", "recognition-bt-sco-mic"),
    route("media-bt-sco-carkit", "recognition-bt-sco-mic"),
    route("media-speaker-and-headphones", "recognition-main-mic"),
    route("media-speaker-and-earpiece", "recognition-main-mic"),
];

const VOICE_COMMUNICATION: [RouteConfig; ROW_LEN] = [
    route("communication-speaker", "communication-speaker-mic"),
    route("communication-earpiece", "communication-main-mic"),
    route("communication-headphones", "communication-headset-mic"),
    route("communication-headphones", "communication-main-mic"),
    route("communication-bt-sco", "communication-bt-sco-mic"),
    route("communication-bt-sco-headset", "communication-bt-sco-mic"),
    route("communication-bt-sco-carkit", "communication-bt-sco-mic"),
    route("communication-speaker-and-headphones", "communication-main-mic"),
    route("communication-speaker-and-earpiece", "communication-main-mic"),
];

const VOICE_CALL_NB: [RouteConfig; ROW_LEN] = [
    route("incall_nb-speaker", "incall_nb-speaker-mic"),
    route("incall_nb-earpiece", "incall_nb-main-mic"),
    route("incall_nb-headphones", "incall_nb-headset-mic"),
    route("incall_nb-headphones", "incall_nb-main-mic"),
    route("incall_nb-bt-sco", "incall_nb-bt-sco-mic"),
    route("incall_nb-bt-sco-headset", "incall_nb-bt-sco-mic"),
    route("incall_nb-bt-sco-carkit", "incall_nb-bt-sco-mic"),
    route("incall_nb-speaker-and-headphones", "incall_nb-main-mic"),
    route("incall_nb-speaker-and-earpiece", "incall_nb-main-mic"),
];

const VOICE_CALL_WB: [RouteConfig; ROW_LEN] = [
    route("incall_wb-speaker", "incall_wb-speaker-mic"),
    route("incall_wb-earpiece", "incall_wb-main-mic"),
    route("incall_wb-headphones", "incall_wb-headset-mic"),
    route("incall_wb-headphones", "incall_wb-main-mic"),
    route("incall_wb-bt-sco", "incall_wb-bt-sco-mic"),
    route("incall_wb-bt-sco-headset", "incall_wb-bt-sco-mic"),
    route("incall_wb-bt-sco-carkit", "incall_wb-bt-sco-mic"),
    route("incall_wb-speaker-and-headphones", "incall_wb-main-mic"),
    route("incall_wb-speaker-and-earpiece", "incall_wb-main-mic"),
];

/// Route table indexed by `[input row][output column]`
pub static ROUTE_CONFIGS: [[RouteConfig; ROW_LEN]; InputSourceId::TABLE_SIZE] = [
    MEDIA,
    CAMCORDER,
    VOICE_RECOGNITION,
    VOICE_COMMUNICATION,
    VOICE_CALL_NB,
    VOICE_CALL_WB,
];

/// Look up the route for a pair of classes
///
/// Returns `None` when either class has no table entry.
pub fn lookup(input: InputSourceId, output: OutputDeviceId) -> Option<&'static RouteConfig> {
    let row = input.table_index()?;
    let column = output.table_index()?;
    Some(&ROUTE_CONFIGS[row][column])
}
