//! Error types for rd200-core.
//!
//! This module defines the errors that can end an RD200 session early.
//!
//! # What is an error and what is not
//!
//! Most trouble on the notify channel is *not* an error. A transaction that
//! times out, or a frame whose length does not match the command's layout,
//! only makes that command's metrics absent from the snapshot; the session
//! carries on with its next command. Those cases are logged and never reach
//! the caller as an [`Error`].
//!
//! What does end a session:
//!
//! | Error Type | Session outcome | Next cycle |
//! |------------|-----------------|------------|
//! | [`Error::CharacteristicNotFound`] | Service cache cleared, link closed | Fresh connect rediscovers services |
//! | [`Error::ConnectionFailed`] | Retried with backoff, then no snapshot | Retry on next poll |
//! | [`Error::Bluetooth`] | Link closed, no snapshot | Retry on next poll |
//! | [`Error::Timeout`] (connect) | Retried with backoff, then no snapshot | Retry on next poll |
//! | [`Error::Timeout`] (write) | Link closed, no snapshot | Retry on next poll |
//! | [`Error::UnclassifiableDevice`] | Session never started | Do not retry |
//! | [`Error::InvalidConfig`] | Session never started | Fix configuration |
//!
//! ## Error Classification
//!
//! [`Error::is_retryable`] is what the connection retry policy in
//! [`crate::retry`] consults. Retryable:
//!
//! - [`Error::Timeout`] - BLE operations can time out due to interference
//! - [`Error::Bluetooth`] - Generic BLE errors are often transient
//! - [`Error::NotConnected`] - Connection may have been lost
//! - [`Error::ConnectionFailed`] with `OutOfRange`, `Timeout`, or `BleError` reasons
//! - [`Error::WriteFailed`] - the write may land on the next link
//!
//! Everything else is final for the current attempt.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to an RD200.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required GATT characteristic (or its service) is missing on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The advertised name does not belong to a supported RD200 model.
    #[error("Unsupported device name: {name:?}")]
    UnclassifiableDevice {
        /// The advertised name that was rejected.
        name: String,
    },

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The adapter lost track of the device.
    OutOfRange,
    /// The host refused the connection.
    Rejected,
    /// Connection attempt timed out.
    Timeout,
    /// Any other BLE stack failure.
    BleError(String),
}

impl From<&btleplug::Error> for ConnectionFailureReason {
    fn from(err: &btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound => Self::OutOfRange,
            btleplug::Error::PermissionDenied => Self::Rejected,
            btleplug::Error::TimedOut(_) => Self::Timeout,
            other => Self::BleError(other.to_string()),
        }
    }
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Rejected => write!(f, "connection rejected by device"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

/// Reason why a device was not found.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified name/address not found.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create an unclassifiable device error.
    pub fn unclassifiable(name: impl Into<String>) -> Self {
        Self::UnclassifiableDevice { name: name.into() }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Whether the device lacks a service or characteristic the driver needs.
    ///
    /// A session that fails this way clears the transport's service cache
    /// before disconnecting.
    pub fn is_missing_characteristic(&self) -> bool {
        matches!(self, Error::CharacteristicNotFound { .. })
    }

    /// Whether another attempt at the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. }
            | Error::Bluetooth(_)
            | Error::NotConnected
            | Error::WriteFailed { .. } => true,
            Error::ConnectionFailed { reason, .. } => matches!(
                reason,
                ConnectionFailureReason::OutOfRange
                    | ConnectionFailureReason::Timeout
                    | ConnectionFailureReason::BleError(_)
            ),
            _ => false,
        }
    }
}

/// Result type alias using rd200-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
