// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the FIMC driver core

use std::fmt;

/// Result type alias using FimcError
pub type FimcResult<T> = Result<T, FimcError>;

/// Driver error type
///
/// Negotiation errors are returned synchronously and never leave a
/// partially applied configuration behind. Interrupt-path anomalies are
/// logged and never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FimcError {
    /// Bad direction, buffer type, index, control id or value
    InvalidArgument(String),
    /// Fourcc not found or capability mismatch
    InvalidFormat(String),
    /// Non-positive or out-of-scaler-range dimensions
    InvalidGeometry(String),
    /// Queue already streaming or resource already owned
    Busy(String),
    /// Bounded wait exceeded during shutdown
    Timeout(String),
    /// Hardware did not acknowledge a suspend request; try again later
    Retry(String),
    /// Allocation failure (DMA pool exhausted, context limit)
    NoMemory(String),
    /// Missing hardware resource at attach time
    NoDevice(String),
    /// Configuration errors
    Config(String),
    /// I/O errors (configuration file access)
    Io(String),
}

impl FimcError {
    /// Short errno-style name, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            FimcError::InvalidArgument(_) => "EINVAL",
            FimcError::InvalidFormat(_) => "EINVAL",
            FimcError::InvalidGeometry(_) => "EINVAL",
            FimcError::Busy(_) => "EBUSY",
            FimcError::Timeout(_) => "ETIMEDOUT",
            FimcError::Retry(_) => "EAGAIN",
            FimcError::NoMemory(_) => "ENOMEM",
            FimcError::NoDevice(_) => "ENODEV",
            FimcError::Config(_) => "EINVAL",
            FimcError::Io(_) => "EIO",
        }
    }
}

impl fmt::Display for FimcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FimcError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            FimcError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            FimcError::InvalidGeometry(msg) => write!(f, "Invalid geometry: {}", msg),
            FimcError::Busy(msg) => write!(f, "Device or resource busy: {}", msg),
            FimcError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            FimcError::Retry(msg) => write!(f, "Try again: {}", msg),
            FimcError::NoMemory(msg) => write!(f, "Out of memory: {}", msg),
            FimcError::NoDevice(msg) => write!(f, "No such device: {}", msg),
            FimcError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FimcError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for FimcError {}

// Conversions for I/O errors
impl From<std::io::Error> for FimcError {
    fn from(err: std::io::Error) -> Self {
        FimcError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FimcError {
    fn from(err: serde_json::Error) -> Self {
        FimcError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FimcError::Timeout("x".into()).kind(), "ETIMEDOUT");
        assert_eq!(FimcError::Retry("x".into()).kind(), "EAGAIN");
        assert_eq!(FimcError::Busy("x".into()).kind(), "EBUSY");
    }

    #[test]
    fn test_display_includes_message() {
        let err = FimcError::InvalidGeometry("out of scaler range".into());
        assert_eq!(err.to_string(), "Invalid geometry: out of scaler range");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FimcError = io.into();
        assert!(matches!(err, FimcError::Io(_)));
    }
}
