//! Hardware capabilities consumed by the alignment core.
//!
//! Instrument drivers (Zaber, Newport, Thorlabs APT, Agilent power meters) live
//! outside this crate and plug in through the traits re-exported here.

pub mod bus;
pub mod capabilities;
pub mod mock;

pub use bus::{BusChannel, MultiAxisController, SharedBus};
pub use capabilities::{AxisTransport, MoveLogger, MoveRecord, PowerMeter};
