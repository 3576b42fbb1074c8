//! Scan patterns, power scans and multi-step scan recipes.
//!
//! - [`pattern`]: relative coordinate grids (rectangle, line, cross, diamond)
//! - [`Scan`]: a pattern bound to axes and a power meter
//! - [`ScannerDesign`]: sequential and nested combinations of scans
//! - [`ScanRoutines`]: ready-made alignment routines for a fibre rig
//! - [`ScanAbort`]: cooperative cancellation checked once per coordinate

pub mod abort;
pub mod design;
pub mod pattern;
pub mod routines;
#[allow(clippy::module_inception)]
pub mod scan;

pub use abort::ScanAbort;
pub use design::{
    AxisPositions, DesignStep, EachMaxOutcome, NestedOutcome, NestedSample, ScannerDesign,
    StepOutcome, XyzGrid,
};
pub use pattern::{
    CrossShape, DiamondShape, LineOrigin, LineShape, Pattern, RectOrigin, RectangleShape,
    ScanShape,
};
pub use routines::{ScanRoutines, XyGrid, DEFAULT_CENTRE_UM, WAVEGUIDE_OFFSET_UM};
pub use scan::{BestPoint, Scan, ScanOutcome, Traversal, TraverseOptions};
