//! Key-value parameter protocol
//!
//! Runtime routing changes reach the driver as `key=value` pairs separated by
//! `;`, for example `routing=2;input_source=1`. Queries use the same syntax
//! with bare keys. Replies are built with [`ParamReply`].

use crate::error::{HalError, HalResult};
use std::fmt;

/// Device mask of a stream (decimal, may be negative for input devices)
pub const KEY_ROUTING: &str = "routing";
/// Capture source of an input stream
pub const KEY_INPUT_SOURCE: &str = "input_source";
/// Bluetooth headset noise reduction
pub const KEY_BT_NREC: &str = "bt_headset_nrec";
/// Two-mic noise suppression, `off` or `auto`
pub const KEY_NOISE_SUPPRESSION: &str = "noise_suppression";
/// Supported channel masks of an output
pub const KEY_SUP_CHANNELS: &str = "sup_channels";

pub const VALUE_ON: &str = "on";
pub const VALUE_OFF: &str = "off";

/// Parsed parameter string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrParams {
    pairs: Vec<(String, String)>,
}

impl StrParams {
    /// Parse a `key=value;key2=value2` string
    ///
    /// Keys without `=` are kept with an empty value so queries can be tested
    /// with [`StrParams::has_key`]. Later duplicates win.
    pub fn parse(kvpairs: &str) -> Self {
        let mut params = Self::default();

        for pair in kvpairs.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let value = parts.next().unwrap_or_default().trim();
            if key.is_empty() {
                continue;
            }
            params.insert(key, value);
        }

        params
    }

    fn insert(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    /// Value of `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True when `key` appears, with or without a value
    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Integer value of `key`
    pub fn get_int(&self, key: &str) -> HalResult<Option<i64>> {
        match self.get(key) {
            Some(value) => value
                .parse::<i64>()
                .map(Some)
                .map_err(|e| HalError::invalid_argument(format!("{}={}: {}", key, value, e))),
            None => Ok(None),
        }
    }

    /// Integer value of `key` reinterpreted as a 32-bit mask
    ///
    /// Input device masks carry the top bit and are often sent as negative
    /// decimal numbers.
    pub fn get_mask(&self, key: &str) -> HalResult<Option<u32>> {
        Ok(self.get_int(key)?.map(|value| value as u32))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Builder for `key=value` replies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamReply {
    pairs: Vec<(String, String)>,
}

impl ParamReply {
    /// Create an empty reply
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ParamReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
