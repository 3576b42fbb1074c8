//! Hardware Capabilities
//!
//! The alignment core never talks to an instrument directly. Instead, drivers
//! implement a small set of capability traits and the core consumes them:
//!
//! - A motor channel implements: `AxisTransport`
//! - An optical power meter implements: `PowerMeter`
//! - Anything that wants to observe committed moves implements: `MoveLogger`
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous and blocking (one bus, one request in flight)
//! - Takes `&self`; drivers use interior mutability for their state
//! - Is `Send + Sync` so a rig can be handed to a worker thread as a whole
//! - Reports failures as [`TransportError`] and never retries internally
//!
//! # Example
//!
//! ```rust,ignore
//! struct ZaberChannel {
//!     port: parking_lot::Mutex<SerialLink>,
//!     device: u8,
//! }
//!
//! impl AxisTransport for ZaberChannel {
//!     fn move_to(&self, position: f64) -> Result<f64, TransportError> {
//!         let steps = (position / NM_PER_STEP).round() as i64;
//!         let reply = self.port.lock().command(self.device, MOVE_ABSOLUTE, steps)?;
//!         Ok(reply as f64 * NM_PER_STEP)
//!     }
//!
//!     fn read_position(&self) -> Result<f64, TransportError> {
//!         let reply = self.port.lock().command(self.device, RETURN_POSITION, 0)?;
//!         Ok(reply as f64 * NM_PER_STEP)
//!     }
//! }
//! ```

use crate::error::TransportError;

/// Capability: single motor channel
///
/// Positions are absolute, in the canonical unit of the axis the transport backs
/// (nanometres for linear channels, arc-seconds for rotational ones). Reversal
/// and bounds are handled by [`Axis`](crate::stage::Axis); the transport only
/// sees physical targets that have already been validated.
pub trait AxisTransport: Send + Sync {
    /// Move to an absolute position and block until the device acknowledges.
    ///
    /// Returns the position the device reports after the move. Drivers that
    /// cannot confirm return the commanded target.
    fn move_to(&self, position: f64) -> Result<f64, TransportError>;

    /// Query the device for its current absolute position.
    fn read_position(&self) -> Result<f64, TransportError>;
}

/// Capability: optical power measurement
///
/// Returns one reading in watts per call. Any averaging over repeated samples
/// happens inside the driver and is opaque to scans.
pub trait PowerMeter: Send + Sync {
    /// Read the current optical power in watts.
    fn get_power(&self) -> Result<f64, TransportError>;
}

/// A committed (non no-op) axis move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    /// Axis label, `stage.role` once the axis belongs to a stage.
    pub axis: String,
    /// New absolute (unreversed) position in canonical units.
    pub position_absolute: f64,
    /// Canonical unit of `position_absolute` (`nm` or `arcsec`).
    pub unit: &'static str,
}

/// Capability: observer of committed moves
///
/// Invoked once after every move that actually reached the hardware. No-op moves
/// (target equal to the cached position) are never reported.
pub trait MoveLogger: Send + Sync {
    /// Record a committed move.
    fn log(&self, record: &MoveRecord);
}
