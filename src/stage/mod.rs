//! Stage and axis coordinate model.
//!
//! Leaf first:
//!
//! - [`Axis`]: one motor channel with reversal, bounds and a cached position
//! - [`ChipAxis`]: a derived axis along a calibrated chip line
//! - [`Stage`]: up to six axes with logical x/y/z remapping
//! - [`Stages2`] / [`Stages3`]: fibre rigs with a position stack and centring
//!
//! Everything here is synchronous. A move returns once the transport has
//! acknowledged it.

pub mod axis;
pub mod chip;
pub mod logger;
pub mod position;
pub mod resolve;
pub mod rig;
#[allow(clippy::module_inception)]
pub mod stage;

pub use axis::{Axis, AxisConfig, AxisKind, AxisLimits, Unit, DEFAULT_REFRESH_INTERVAL};
pub use chip::{ChipAxis, ChipCalibration};
pub use logger::{CsvPositionLogger, TracingMoveLogger};
pub use position::{StagePosition, XyzPosition};
pub use resolve::{AxisId, AxisResolver};
pub use rig::{
    LongMove, RetractSettings, RigSnapshot, StageRole, Stages2, Stages3,
    DEFAULT_CENTRING_RETRACT_UM, DEFAULT_RETRACT_UM,
};
pub use stage::{AxisMapping, AxisRole, Stage, StageBuilder};
