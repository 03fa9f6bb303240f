use thiserror::Error;

/// Classification of a capture-device failure reported by the platform.
///
/// All device faults are fatal to the current session and recoverable by
/// reopening the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// Device exists but is held by another client
    Unavailable,
    /// Device access is administratively disabled
    Disabled,
    /// Device driver crashed or the device disappeared
    Crashed,
    /// The capture service backing the device crashed
    ServiceCrashed,
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "device unavailable"),
            Self::Disabled => write!(f, "device disabled"),
            Self::Crashed => write!(f, "device crashed"),
            Self::ServiceCrashed => write!(f, "capture service crashed"),
        }
    }
}

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("capture device fault [{device}]: {fault}: {reason}")]
    Device {
        device: String,
        fault: DeviceFault,
        reason: String,
    },

    #[error("session configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("no open capture session")]
    SessionNotOpen,

    #[error("no active repeating request")]
    NoActiveRequest,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Build a device fault for a named device.
    pub fn device(device: impl Into<String>, fault: DeviceFault, reason: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            fault,
            reason: reason.into(),
        }
    }

    /// Whether this error is a platform device fault (recoverable by reopen).
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Device { .. })
    }

    /// Whether this error aborts only the attempted start (retry with
    /// adjusted targets is possible).
    pub fn is_config_fault(&self) -> bool {
        matches!(self, Self::ConfigurationFailed(_))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
