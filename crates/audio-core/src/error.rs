//! Error handling for the audio routing core
//!
//! Every fallible operation of the device, its streams and the hardware
//! collaborators returns [`HalError`]. The variants follow the failure classes
//! a host audio framework distinguishes, and [`HalError::errno`] maps each one
//! onto the negative errno value such a framework expects to receive.

use std::fmt;
use thiserror::Error;

/// Result type alias for audio routing operations
pub type HalResult<T> = std::result::Result<T, HalError>;

/// Error type for device, stream and collaborator operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// A hardware handle could not be opened or allocated
    #[error("Out of resources: {resource}")]
    OutOfResources { resource: String },

    /// A stream of the requested kind is already open
    #[error("Device busy: {what} is already open")]
    Busy { what: String },

    /// The arguments or configuration were rejected before any allocation
    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },

    /// The operation is fixed-function and cannot be changed
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    /// The output is preempted by the HDMI multichannel stream
    #[error("Broken pipe: {details}")]
    BrokenPipe { details: String },

    /// The hardware node needed by the operation is not present
    #[error("No such device: {device}")]
    NoDevice { device: String },

    /// A PCM transfer or control call failed at runtime
    #[error("Device I/O failed: {operation} - {reason}")]
    DeviceIo { operation: String, reason: String },

    /// Configuration could not be parsed or is inconsistent
    #[error("Invalid configuration: {details}")]
    InvalidConfig { details: String },
}

impl HalError {
    /// Create an out-of-resources error
    pub fn out_of_resources(resource: impl Into<String>) -> Self {
        Self::OutOfResources {
            resource: resource.into(),
        }
    }

    /// Create a busy error
    pub fn busy(what: impl Into<String>) -> Self {
        Self::Busy { what: what.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::InvalidArgument {
            details: details.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a broken pipe error
    pub fn broken_pipe(details: impl Into<String>) -> Self {
        Self::BrokenPipe {
            details: details.into(),
        }
    }

    /// Create a missing device error
    pub fn no_device(device: impl Into<String>) -> Self {
        Self::NoDevice {
            device: device.into(),
        }
    }

    /// Create a device I/O error
    pub fn device_io(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceIo {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    /// Negative errno value reported across the host ABI
    pub fn errno(&self) -> i32 {
        match self {
            Self::OutOfResources { .. } => -12, // ENOMEM
            Self::Busy { .. } => -16,           // EBUSY
            Self::InvalidArgument { .. } | Self::InvalidConfig { .. } => -22, // EINVAL
            Self::Unsupported { .. } => -38,    // ENOSYS
            Self::BrokenPipe { .. } => -32,     // EPIPE
            Self::NoDevice { .. } => -19,       // ENODEV
            Self::DeviceIo { .. } => -5,        // EIO
        }
    }

    /// Check if the caller may simply try again later
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidArgument { .. }
            | Self::InvalidConfig { .. }
            | Self::Unsupported { .. } => false,

            Self::OutOfResources { .. }
            | Self::Busy { .. }
            | Self::BrokenPipe { .. }
            | Self::NoDevice { .. }
            | Self::DeviceIo { .. } => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OutOfResources { .. } | Self::Busy { .. } => ErrorCategory::Resource,
            Self::InvalidArgument { .. } | Self::InvalidConfig { .. } => {
                ErrorCategory::Configuration
            }
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::BrokenPipe { .. } | Self::NoDevice { .. } | Self::DeviceIo { .. } => {
                ErrorCategory::Transfer
            }
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Hardware handles or stream slots are exhausted
    Resource,
    /// Arguments or configuration were rejected
    Configuration,
    /// Fixed-function setters
    Unsupported,
    /// Runtime PCM transfer problems
    Transfer,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "Resource"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Transfer => write!(f, "Transfer"),
        }
    }
}

impl From<serde_json::Error> for HalError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidConfig {
            details: error.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for HalError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::InvalidArgument {
            details: error.to_string(),
        }
    }
}
