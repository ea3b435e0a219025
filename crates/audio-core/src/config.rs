//! Driver configuration
//!
//! [`HalConfig`] gathers the board tunables of the driver: wideband and
//! two-mic overrides, PCM period sizes and the policy applied when a PCM
//! transfer fails. It can be built in code with the `with_*` methods, parsed
//! from JSON, or derived from the system properties the driver historically
//! read at startup.
//!
//! [`PcmProfiles`] turns a configuration into the concrete PCM geometries used
//! by every stream kind and by the voice and SCO links.
//!
//! # Usage Examples
//!
//! ```rust
//! use callroute_audio_core::config::{HalConfig, PcmProfiles, TransferErrorPolicy};
//!
//! let config = HalConfig::new()
//!     .with_low_latency_period_size(192)
//!     .with_transfer_errors(TransferErrorPolicy::Propagate);
//!
//! let profiles = PcmProfiles::from_config(&config);
//! assert_eq!(profiles.fast.period_size, 192);
//! assert_eq!(profiles.capture.period_size, 192);
//! assert_eq!(profiles.deep.period_size, 960);
//! ```
//!
//! ## Loading from properties
//!
//! ```rust
//! use callroute_audio_core::config::HalConfig;
//! use std::collections::HashMap;
//!
//! let mut properties = HashMap::new();
//! properties.insert("audio_hal.force_wideband".to_string(), "true".to_string());
//! properties.insert("audio_hal.in_period_size".to_string(), "480".to_string());
//!
//! let config = HalConfig::from_properties(&properties).unwrap();
//! assert!(config.force_wideband);
//! assert_eq!(config.capture_period_size, Some(480));
//! ```

use crate::error::{HalError, HalResult};
use crate::types::PcmConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property forcing AMR-WB on and disabling the modem notification
pub const PROP_FORCE_WIDEBAND: &str = "audio_hal.force_wideband";
/// Property disabling two-mic noise reduction for every call
pub const PROP_DISABLE_TWO_MIC: &str = "audio_hal.disable_two_mic";
/// Property overriding the low-latency playback and capture period size
pub const PROP_PERIOD_SIZE: &str = "audio_hal.period_size";
/// Property overriding the capture period size only
pub const PROP_IN_PERIOD_SIZE: &str = "audio_hal.in_period_size";

/// Native rate of the primary codec link
pub const NATIVE_RATE: u32 = 48000;
/// Default rate of the HDMI multichannel output
pub const HDMI_DEFAULT_RATE: u32 = 48000;
/// Duration of the capture fade-in after each start
pub const CAPTURE_START_RAMP_MS: u32 = 100;

/// What a stream reports when a PCM transfer fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferErrorPolicy {
    /// Report the whole buffer as transferred, after pacing
    #[default]
    ReportFullTransfer,
    /// Return the error to the caller, after pacing
    Propagate,
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Run every call in wideband and ignore modem notifications
    pub force_wideband: bool,
    /// Never enable two-mic noise reduction
    pub disable_two_mic: bool,
    /// Period size of low-latency playback (and of capture unless overridden)
    pub low_latency_period_size: Option<u32>,
    /// Period size of normal capture
    pub capture_period_size: Option<u32>,
    /// Transfer failure reporting
    pub transfer_errors: TransferErrorPolicy,
    /// Sleep for the duration of a failed transfer before returning
    pub pace_on_error: bool,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            force_wideband: false,
            disable_two_mic: false,
            low_latency_period_size: None,
            capture_period_size: None,
            transfer_errors: TransferErrorPolicy::default(),
            pace_on_error: true,
        }
    }
}

impl HalConfig {
    /// Create a configuration with driver defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Force wideband calls
    pub fn with_force_wideband(mut self, enabled: bool) -> Self {
        self.force_wideband = enabled;
        self
    }

    /// Disable two-mic noise reduction
    pub fn with_two_mic_disabled(mut self, disabled: bool) -> Self {
        self.disable_two_mic = disabled;
        self
    }

    /// Override the low-latency period size
    pub fn with_low_latency_period_size(mut self, frames: u32) -> Self {
        self.low_latency_period_size = Some(frames);
        self
    }

    /// Override the capture period size
    pub fn with_capture_period_size(mut self, frames: u32) -> Self {
        self.capture_period_size = Some(frames);
        self
    }

    /// Set the transfer failure policy
    pub fn with_transfer_errors(mut self, policy: TransferErrorPolicy) -> Self {
        self.transfer_errors = policy;
        self
    }

    /// Enable or disable pacing after failed transfers
    pub fn with_pacing(mut self, enabled: bool) -> Self {
        self.pace_on_error = enabled;
        self
    }

    /// Build a configuration from system properties
    ///
    /// Unknown keys are ignored. Boolean properties accept the usual
    /// `1/0`, `true/false`, `y/n`, `yes/no` and `on/off` spellings.
    pub fn from_properties(properties: &HashMap<String, String>) -> HalResult<Self> {
        let mut config = Self::default();

        if let Some(value) = properties.get(PROP_FORCE_WIDEBAND) {
            config.force_wideband = parse_bool_property(PROP_FORCE_WIDEBAND, value)?;
        }
        if let Some(value) = properties.get(PROP_DISABLE_TWO_MIC) {
            config.disable_two_mic = parse_bool_property(PROP_DISABLE_TWO_MIC, value)?;
        }
        if let Some(value) = properties.get(PROP_PERIOD_SIZE) {
            config.low_latency_period_size = Some(parse_frames_property(PROP_PERIOD_SIZE, value)?);
        }
        if let Some(value) = properties.get(PROP_IN_PERIOD_SIZE) {
            config.capture_period_size = Some(parse_frames_property(PROP_IN_PERIOD_SIZE, value)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> HalResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> HalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration for values the hardware cannot use
    pub fn validate(&self) -> HalResult<()> {
        if self.low_latency_period_size == Some(0) {
            return Err(HalError::invalid_config(
                "low-latency period size must be non-zero",
            ));
        }
        if self.capture_period_size == Some(0) {
            return Err(HalError::invalid_config("capture period size must be non-zero"));
        }
        Ok(())
    }
}

fn parse_bool_property(key: &str, value: &str) -> HalResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "y" | "yes" | "on" => Ok(true),
        "0" | "false" | "n" | "no" | "off" => Ok(false),
        other => Err(HalError::invalid_config(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_frames_property(key: &str, value: &str) -> HalResult<u32> {
    value.trim().parse().map_err(|_| {
        HalError::invalid_config(format!("{} expects a frame count, got '{}'", key, value.trim()))
    })
}

/// PCM geometry of every link the driver opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmProfiles {
    /// Low-latency playback
    pub fast: PcmConfig,
    /// Deep buffer playback
    pub deep: PcmConfig,
    /// Normal capture
    pub capture: PcmConfig,
    /// Low-latency capture
    pub capture_low_latency: PcmConfig,
    /// Bluetooth SCO link
    pub sco: PcmConfig,
    /// Narrowband baseband voice
    pub voice_nb: PcmConfig,
    /// Wideband baseband voice
    pub voice_wb: PcmConfig,
    /// HDMI multichannel playback, before rate and channel negotiation
    pub hdmi_multi: PcmConfig,
}

impl Default for PcmProfiles {
    fn default() -> Self {
        Self {
            fast: PcmConfig::new(2, NATIVE_RATE, 240, 2),
            deep: PcmConfig::new(2, NATIVE_RATE, 960, 5),
            capture: PcmConfig::new(2, NATIVE_RATE, 320, 2),
            capture_low_latency: PcmConfig::new(2, NATIVE_RATE, 240, 2),
            sco: PcmConfig::new(1, 8000, 240, 2),
            voice_nb: PcmConfig::new(2, 8000, 320, 2),
            voice_wb: PcmConfig::new(2, 16000, 320, 2),
            hdmi_multi: PcmConfig::new(6, HDMI_DEFAULT_RATE, 336, 8),
        }
    }
}

impl PcmProfiles {
    /// Apply the period size overrides of a configuration
    pub fn from_config(config: &HalConfig) -> Self {
        let mut profiles = Self::default();

        if let Some(frames) = config.low_latency_period_size {
            profiles.fast.period_size = frames;
            profiles.capture.period_size = frames;
        }
        if let Some(frames) = config.capture_period_size {
            profiles.capture.period_size = frames;
        }

        profiles
    }

    /// Voice link geometry for the current AMR mode
    pub fn voice(&self, wideband: bool) -> &PcmConfig {
        if wideband {
            &self.voice_wb
        } else {
            &self.voice_nb
        }
    }

    /// Capture geometry for the given flags
    pub fn capture(&self, low_latency: bool) -> &PcmConfig {
        if low_latency {
            &self.capture_low_latency
        } else {
            &self.capture
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = HalConfig::default();
        assert!(!config.force_wideband);
        assert!(!config.disable_two_mic);
        assert!(config.pace_on_error);
        assert_eq!(config.transfer_errors, TransferErrorPolicy::ReportFullTransfer);
    }

    #[test]
    fn test_period_size_property_covers_capture() {
        let config = HalConfig::from_properties(&props(&[(PROP_PERIOD_SIZE, "128")])).unwrap();
        let profiles = PcmProfiles::from_config(&config);
        assert_eq!(profiles.fast.period_size, 128);
        assert_eq!(profiles.capture.period_size, 128);
        assert_eq!(profiles.capture_low_latency.period_size, 240);
    }

    #[test]
    fn test_in_period_size_wins_over_period_size() {
        let config = HalConfig::from_properties(&props(&[
            (PROP_PERIOD_SIZE, "128"),
            (PROP_IN_PERIOD_SIZE, "512"),
        ]))
        .unwrap();
        let profiles = PcmProfiles::from_config(&config);
        assert_eq!(profiles.fast.period_size, 128);
        assert_eq!(profiles.capture.period_size, 512);
    }

    #[test]
    fn test_bool_spellings() {
        for value in ["1", "true", "Y", "yes", "on"] {
            let config =
                HalConfig::from_properties(&props(&[(PROP_DISABLE_TWO_MIC, value)])).unwrap();
            assert!(config.disable_two_mic, "{value}");
        }
        assert!(HalConfig::from_properties(&props(&[(PROP_FORCE_WIDEBAND, "maybe")])).is_err());
    }

    #[test]
    fn test_invalid_period_sizes() {
        for (key, value) in [
            (PROP_PERIOD_SIZE, "abc"),
            (PROP_IN_PERIOD_SIZE, "-1"),
            (PROP_IN_PERIOD_SIZE, "0"),
        ] {
            let result = HalConfig::from_properties(&props(&[(key, value)]));
            assert!(
                matches!(result, Err(HalError::InvalidConfig { .. })),
                "{key}={value}"
            );
        }
    }

    #[test]
    fn test_json_roundtrip_with_partial_input() {
        let config = HalConfig::from_json(r#"{ "transfer_errors": "propagate" }"#).unwrap();
        assert_eq!(config.transfer_errors, TransferErrorPolicy::Propagate);
        assert!(config.pace_on_error);

        let json = config.to_json().unwrap();
        assert_eq!(HalConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_voice_profile_selection() {
        let profiles = PcmProfiles::default();
        assert_eq!(profiles.voice(false).rate, 8000);
        assert_eq!(profiles.voice(true).rate, 16000);
    }
}
