//! Error types for acquisition operations.

use thiserror::Error;

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating the capture device.
///
/// Only open- and close-path failures reach the caller. Steady-state
/// capture faults (transfer timeouts, failed completions, pool overflow)
/// are recovered by the acquisition thread and logged, never surfaced to
/// the consumer.
#[derive(Debug, Error)]
pub enum Error {
    /// USB operation failed.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// No front-end device matched the requested bus/port.
    #[error("no matching front-end device found")]
    DeviceNotFound,

    /// Reading the RF front end's sampling configuration failed.
    #[error("sample format negotiation failed: {0}")]
    FormatNegotiation(String),

    /// Transport-level failure (submit, event loop, thread plumbing).
    #[error("transport error: {0}")]
    Transport(String),

    /// A single completion wait exceeded its bound.
    #[error("bulk transfer timeout")]
    TransferTimeout,
}
