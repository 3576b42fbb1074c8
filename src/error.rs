//! Custom error types for the alignment library.
//!
//! This module defines the primary error type, `AlignError`, used by every axis,
//! stage and scan operation. Using the `thiserror` crate, it provides a single,
//! consistent way to report what went wrong and where.
//!
//! ## Error Hierarchy
//!
//! - **`OutOfRange`**: a requested position falls outside an axis's limits. Always
//!   raised before any hardware command is issued; positions are never clamped.
//! - **`Transport`**: the device transport timed out or returned a malformed reply.
//!   Propagated unchanged; this crate never retries.
//! - **`Configuration`**: invalid construction-time parameters (offset length
//!   mismatch, malformed pattern parameters, missing axis role, ...).
//! - **`Aborted`**: a scan was cancelled between two coordinate visits.
//! - **`InvalidPower`**: the power meter returned NaN or an infinite value.
//! - **`EmptyStack`**: a rig position stack was popped without a matching push.
//! - **`Io` / `Json` / `Csv` / `Config`**: wrapped errors from persistence and
//!   configuration loading.
//!
//! A failed operation never triggers an automatic recovery move; the rig is left at
//! the last position it successfully reached.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure category reported by a device transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The device did not answer in time.
    Timeout,
    /// The device answered with something that could not be parsed.
    MalformedReply,
    /// The link itself failed (port closed, bus error, ...).
    Communication,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::MalformedReply => "malformed_reply",
            TransportErrorKind::Communication => "communication",
        };
        write!(f, "{}", label)
    }
}

/// Error raised by an [`AxisTransport`](crate::hardware::AxisTransport) or a
/// [`PowerMeter`](crate::hardware::PowerMeter).
#[derive(Error, Debug, Clone)]
#[error("Transport '{device}' {kind} error: {message}")]
pub struct TransportError {
    /// Device or channel identifier.
    pub device: String,
    /// Failure category.
    pub kind: TransportErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl TransportError {
    /// Build a transport error.
    pub fn new(
        device: impl Into<String>,
        kind: TransportErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a timeout.
    pub fn timeout(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(device, TransportErrorKind::Timeout, message)
    }

    /// Shorthand for a reply that could not be parsed.
    pub fn malformed(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(device, TransportErrorKind::MalformedReply, message)
    }

    /// Wrap an `anyhow` error coming out of a driver layer.
    pub fn from_anyhow(
        device: impl Into<String>,
        kind: TransportErrorKind,
        err: &anyhow::Error,
    ) -> Self {
        Self::new(device, kind, format!("{:#}", err))
    }
}

// =============================================================================
// Library Errors
// =============================================================================

/// Coarse classification of an [`AlignError`], used by callers deciding on a
/// recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target outside an axis's limits.
    Range,
    /// Device transport failure.
    Transport,
    /// Invalid construction parameters or configuration.
    Configuration,
    /// Cooperative cancellation.
    Aborted,
    /// Faulty power reading.
    InvalidPower,
    /// Position stack underflow.
    EmptyStack,
    /// File or serialization failure.
    Persistence,
}

/// Convenience alias for results using the library error type.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

/// Primary error type for axis, stage and scan operations.
#[derive(Error, Debug)]
pub enum AlignError {
    /// A commanded position is outside the axis limits.
    ///
    /// `value`, `min` and `max` are expressed in `unit`.
    #[error("{axis}-axis target `{value:.3}` [{unit}] is outside [{min:.3}, {max:.3}]")]
    OutOfRange {
        /// Axis label (e.g. `input.x`).
        axis: String,
        /// Offending target.
        value: f64,
        /// Lower limit.
        min: f64,
        /// Upper limit.
        max: f64,
        /// Unit of the three values above.
        unit: &'static str,
    },

    /// Transport failure, propagated from the device layer.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid construction-time parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scan cancelled between coordinate visits.
    #[error("Scan aborted: {0}")]
    Aborted(String),

    /// Power meter returned a non-finite reading.
    #[error("Power meter returned a non-finite reading ({value}) at coordinate {index}")]
    InvalidPower {
        /// Index of the coordinate being visited.
        index: usize,
        /// The reading itself.
        value: f64,
    },

    /// `pop_pos_xyz_stack` called on an empty stack.
    #[error("Position stack is empty")]
    EmptyStack,

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file parsing failure.
    #[error("Configuration file error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl AlignError {
    /// Shorthand for [`AlignError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        AlignError::Configuration(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AlignError::OutOfRange { .. } => ErrorKind::Range,
            AlignError::Transport(_) => ErrorKind::Transport,
            AlignError::Configuration(_) => ErrorKind::Configuration,
            AlignError::Aborted(_) => ErrorKind::Aborted,
            AlignError::InvalidPower { .. } => ErrorKind::InvalidPower,
            AlignError::EmptyStack => ErrorKind::EmptyStack,
            AlignError::Io(_) | AlignError::Json(_) | AlignError::Csv(_) => {
                ErrorKind::Persistence
            }
            AlignError::Config(_) => ErrorKind::Configuration,
        }
    }
}

impl From<figment::Error> for AlignError {
    fn from(value: figment::Error) -> Self {
        AlignError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_axis_and_value() {
        let err = AlignError::OutOfRange {
            axis: "input.x".into(),
            value: 30.0,
            min: 0.0,
            max: 25.0,
            unit: "um",
        };
        let msg = err.to_string();
        assert!(msg.contains("input.x"));
        assert!(msg.contains("30.000"));
        assert_eq!(err.kind(), ErrorKind::Range);
    }

    #[test]
    fn transport_error_converts_transparently() {
        let err: AlignError = TransportError::timeout("zaber:1", "no reply after 2s").into();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.to_string(),
            "Transport 'zaber:1' timeout error: no reply after 2s"
        );
    }

    #[test]
    fn anyhow_context_is_flattened() {
        let inner = anyhow::anyhow!("checksum mismatch").context("reading position");
        let err = TransportError::from_anyhow("apt", TransportErrorKind::MalformedReply, &inner);
        assert!(err.message.contains("reading position"));
        assert!(err.message.contains("checksum mismatch"));
    }
}
