//! Stage: a named bundle of up to six axes.
//!
//! Axes are stored under their *physical* role. A logical x/y/z → physical
//! permutation ([`AxisMapping`]) lets a stage mounted sideways be driven in the
//! rig's coordinate frame; rotational roles are never remapped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_align::hardware::mock::MockAxisTransport;
//! use rust_align::stage::{Axis, AxisConfig, AxisLimits, AxisMapping, AxisRole, Stage};
//!
//! let limits = AxisLimits::new(0.0, 25_000_000.0).unwrap();
//! let axis = |name: &str| {
//!     let transport = Arc::new(MockAxisTransport::new(name, 0.0));
//!     Axis::new(AxisConfig::linear(name, limits), transport).unwrap()
//! };
//!
//! // x and z swapped: logical x drives the physical z channel.
//! let mut stage = Stage::builder("input")
//!     .axis(AxisRole::X, axis("x"))
//!     .axis(AxisRole::Y, axis("y"))
//!     .axis(AxisRole::Z, axis("z"))
//!     .mapping(AxisMapping::new(AxisRole::Z, AxisRole::Y, AxisRole::X).unwrap())
//!     .build()
//!     .unwrap();
//!
//! stage.move_abs_um(Some(10.0), None, None).unwrap();
//! assert_eq!(stage.axis(AxisRole::X).unwrap().name(), "input.x");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::axis::{Axis, AxisKind, Unit};
use super::chip::ChipAxis;
use super::position::{StagePosition, XyzPosition};
use crate::error::{AlignError, AlignResult};
use crate::hardware::MoveLogger;

// =============================================================================
// Roles
// =============================================================================

/// Axis role within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisRole {
    /// x
    X,
    /// y
    Y,
    /// z
    Z,
    /// roll
    Roll,
    /// pitch
    Pitch,
    /// yaw
    Yaw,
}

impl AxisRole {
    /// Every role.
    pub const ALL: [AxisRole; 6] = [
        AxisRole::X,
        AxisRole::Y,
        AxisRole::Z,
        AxisRole::Roll,
        AxisRole::Pitch,
        AxisRole::Yaw,
    ];

    /// Translational roles.
    pub const LINEAR: [AxisRole; 3] = [AxisRole::X, AxisRole::Y, AxisRole::Z];

    /// Rotational roles.
    pub const ROTATIONAL: [AxisRole; 3] = [AxisRole::Roll, AxisRole::Pitch, AxisRole::Yaw];

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            AxisRole::X => "x",
            AxisRole::Y => "y",
            AxisRole::Z => "z",
            AxisRole::Roll => "roll",
            AxisRole::Pitch => "pitch",
            AxisRole::Yaw => "yaw",
        }
    }

    /// Kind of axis that may fill this role.
    pub fn kind(self) -> AxisKind {
        match self {
            AxisRole::X | AxisRole::Y | AxisRole::Z => AxisKind::Linear,
            AxisRole::Roll | AxisRole::Pitch | AxisRole::Yaw => AxisKind::Rotate,
        }
    }
}

impl fmt::Display for AxisRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisRole {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AxisRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AlignError::config(format!("unknown axis role `{}`", s)))
    }
}

/// Logical x/y/z → physical channel permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMapping {
    /// Physical axis driven by logical x.
    pub x: AxisRole,
    /// Physical axis driven by logical y.
    pub y: AxisRole,
    /// Physical axis driven by logical z.
    pub z: AxisRole,
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            x: AxisRole::X,
            y: AxisRole::Y,
            z: AxisRole::Z,
        }
    }
}

impl AxisMapping {
    /// Validated mapping.
    pub fn new(x: AxisRole, y: AxisRole, z: AxisRole) -> AlignResult<Self> {
        let mapping = Self { x, y, z };
        mapping.validate()?;
        Ok(mapping)
    }

    /// Must be a permutation of {x, y, z}.
    pub fn validate(&self) -> AlignResult<()> {
        let targets = [self.x, self.y, self.z];
        if let Some(bad) = targets.iter().find(|r| r.kind() != AxisKind::Linear) {
            return Err(AlignError::config(format!(
                "axis mapping may only target x, y or z, got `{}`",
                bad
            )));
        }
        if self.x == self.y || self.y == self.z || self.x == self.z {
            return Err(AlignError::config(format!(
                "axis mapping ({}, {}, {}) is not a permutation of (x, y, z)",
                self.x, self.y, self.z
            )));
        }
        Ok(())
    }

    /// Physical role driven by `logical`.
    pub fn physical(&self, logical: AxisRole) -> AxisRole {
        match logical {
            AxisRole::X => self.x,
            AxisRole::Y => self.y,
            AxisRole::Z => self.z,
            rotational => rotational,
        }
    }

    /// Logical role that drives `physical`.
    pub fn logical(&self, physical: AxisRole) -> AxisRole {
        AxisRole::LINEAR
            .into_iter()
            .find(|logical| self.physical(*logical) == physical)
            .unwrap_or(physical)
    }
}

// =============================================================================
// Stage
// =============================================================================

/// A named set of axes with an optional chip axis.
#[derive(Debug)]
pub struct Stage {
    name: String,
    axes: BTreeMap<AxisRole, Axis>,
    mapping: AxisMapping,
    chip: Option<ChipAxis>,
}

/// Builder for [`Stage`].
#[derive(Debug)]
pub struct StageBuilder {
    name: String,
    axes: Vec<(AxisRole, Axis)>,
    mapping: AxisMapping,
    chip: Option<ChipAxis>,
}

impl StageBuilder {
    /// Add an axis under its physical role.
    pub fn axis(mut self, physical: AxisRole, axis: Axis) -> Self {
        self.axes.push((physical, axis));
        self
    }

    /// Logical → physical mapping; identity by default.
    pub fn mapping(mut self, mapping: AxisMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Attach a chip axis. Requires logical x, y and z.
    pub fn chip(mut self, chip: ChipAxis) -> Self {
        self.chip = Some(chip);
        self
    }

    /// Validate and assemble.
    pub fn build(self) -> AlignResult<Stage> {
        self.mapping.validate()?;

        let mut axes = BTreeMap::new();
        for (role, mut axis) in self.axes {
            if axis.kind() != role.kind() {
                return Err(AlignError::config(format!(
                    "stage `{}`: {:?} axis cannot fill the `{}` role",
                    self.name,
                    axis.kind(),
                    role
                )));
            }
            axis.set_label(format!("{}.{}", self.name, self.mapping.logical(role)));
            if axes.insert(role, axis).is_some() {
                return Err(AlignError::config(format!(
                    "stage `{}`: `{}` axis supplied twice",
                    self.name, role
                )));
            }
        }

        let mut stage = Stage {
            name: self.name,
            axes,
            mapping: self.mapping,
            chip: None,
        };
        stage.set_chip(self.chip)?;
        Ok(stage)
    }
}

impl Stage {
    /// Start building a stage called `name`.
    pub fn builder(name: impl Into<String>) -> StageBuilder {
        StageBuilder {
            name: name.into(),
            axes: Vec::new(),
            mapping: AxisMapping::default(),
            chip: None,
        }
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical → physical mapping.
    pub fn mapping(&self) -> AxisMapping {
        self.mapping
    }

    /// Axis filling logical `role`.
    pub fn axis(&self, role: AxisRole) -> Option<&Axis> {
        self.axes.get(&self.mapping.physical(role))
    }

    /// Mutable axis filling logical `role`.
    pub fn axis_mut(&mut self, role: AxisRole) -> Option<&mut Axis> {
        self.axes.get_mut(&self.mapping.physical(role))
    }

    /// Like [`axis`](Self::axis), failing with a configuration error.
    pub fn require_axis(&self, role: AxisRole) -> AlignResult<&Axis> {
        let name = &self.name;
        self.axis(role)
            .ok_or_else(|| AlignError::config(format!("stage `{}` has no {} axis", name, role)))
    }

    /// Like [`axis_mut`](Self::axis_mut), failing with a configuration error.
    pub fn require_axis_mut(&mut self, role: AxisRole) -> AlignResult<&mut Axis> {
        let physical = self.mapping.physical(role);
        let name = &self.name;
        self.axes
            .get_mut(&physical)
            .ok_or_else(|| AlignError::config(format!("stage `{}` has no {} axis", name, role)))
    }

    /// `true` when a logical role is populated.
    pub fn has_axis(&self, role: AxisRole) -> bool {
        self.axis(role).is_some()
    }

    /// Axes under their physical (unpermuted) roles.
    pub fn physical_axes(&self) -> impl Iterator<Item = (AxisRole, &Axis)> {
        self.axes.iter().map(|(role, axis)| (*role, axis))
    }

    /// Chip axis, if calibrated.
    pub fn chip(&self) -> Option<&ChipAxis> {
        self.chip.as_ref()
    }

    /// Replace the chip axis.
    pub fn set_chip(&mut self, chip: Option<ChipAxis>) -> AlignResult<()> {
        if chip.is_some() {
            if let Some(missing) = AxisRole::LINEAR.into_iter().find(|r| !self.has_axis(*r)) {
                return Err(AlignError::config(format!(
                    "stage `{}`: a chip axis needs x, y and z, `{}` is missing",
                    self.name, missing
                )));
            }
        }
        self.chip = chip;
        Ok(())
    }

    /// Attach (or detach, with `None`) a move logger on every axis.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn MoveLogger>>) {
        for axis in self.axes.values_mut() {
            axis.set_logger(logger.clone());
        }
    }

    // -------------------------------------------------------------------------
    // Readouts
    // -------------------------------------------------------------------------

    fn read_in(&mut self, roles: [AxisRole; 3], unit: Unit) -> AlignResult<[Option<f64>; 3]> {
        let mut out = [None; 3];
        for (slot, role) in out.iter_mut().zip(roles) {
            if let Some(axis) = self.axis_mut(role) {
                *slot = Some(axis.current_position_in(unit)?);
            }
        }
        Ok(out)
    }

    /// Logical x/y/z in µm (`None` for missing axes).
    pub fn position_um(&mut self) -> AlignResult<[Option<f64>; 3]> {
        self.read_in(AxisRole::LINEAR, Unit::Micrometre)
    }

    /// Roll/pitch/yaw in degrees (`None` for missing axes).
    pub fn position_degree(&mut self) -> AlignResult<[Option<f64>; 3]> {
        self.read_in(AxisRole::ROTATIONAL, Unit::Degree)
    }

    /// Every populated axis as a persistable record.
    pub fn position(&mut self) -> AlignResult<StagePosition> {
        let [x, y, z] = self.position_um()?;
        let [roll, pitch, yaw] = self.position_degree()?;
        Ok(StagePosition {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        })
    }

    /// Logical x/y/z in canonical nm. All three axes must exist.
    pub fn snapshot_xyz(&mut self) -> AlignResult<XyzPosition> {
        Ok(XyzPosition {
            x: self.require_axis_mut(AxisRole::X)?.current_position()?,
            y: self.require_axis_mut(AxisRole::Y)?.current_position()?,
            z: self.require_axis_mut(AxisRole::Z)?.current_position()?,
        })
    }

    // -------------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------------

    fn move_abs_roles(
        &mut self,
        roles: [AxisRole; 3],
        targets: [Option<f64>; 3],
        unit: Unit,
    ) -> AlignResult<()> {
        for (role, target) in roles.into_iter().zip(targets) {
            if let Some(target) = target {
                self.require_axis_mut(role)?.move_abs_in(target, unit)?;
            }
        }
        Ok(())
    }

    /// Absolute move of logical x, y, z in µm, in that order. `None` leaves an
    /// axis where it is.
    pub fn move_abs_um(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>) -> AlignResult<()> {
        self.move_abs_roles(AxisRole::LINEAR, [x, y, z], Unit::Micrometre)
    }

    /// Absolute move of roll, pitch, yaw in degrees, in that order.
    pub fn move_abs_degree(
        &mut self,
        roll: Option<f64>,
        pitch: Option<f64>,
        yaw: Option<f64>,
    ) -> AlignResult<()> {
        self.move_abs_roles(AxisRole::ROTATIONAL, [roll, pitch, yaw], Unit::Degree)
    }

    /// Move every axis named in `position`.
    pub fn move_to_position(&mut self, position: &StagePosition) -> AlignResult<()> {
        self.move_abs_um(position.x, position.y, position.z)?;
        self.move_abs_degree(position.roll, position.pitch, position.yaw)
    }

    /// Move `distance` µm along the chip axis.
    ///
    /// Returns the x/y/z component moves that were issued.
    pub fn move_rel_c_um(&mut self, distance: f64) -> AlignResult<[f64; 3]> {
        let chip = self.chip.as_ref().ok_or_else(|| {
            AlignError::config(format!("stage `{}` has no chip axis", self.name))
        })?;
        let moves = chip.ordered_moves(distance);
        let components = chip.component_moves(distance);
        debug!(stage = %self.name, distance, ?components, "chip axis move");
        for (role, delta) in moves {
            self.require_axis_mut(role)?.move_rel_um(delta)?;
        }
        Ok(components)
    }

    /// Move along the chip axis when one is calibrated, otherwise along x.
    pub fn move_rel_xc_um(&mut self, distance: f64) -> AlignResult<()> {
        if self.chip.is_some() {
            self.move_rel_c_um(distance)?;
        } else {
            self.require_axis_mut(AxisRole::X)?.move_rel_um(distance)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Save the current position to a JSON file and return it.
    pub fn write_position_json(&mut self, path: impl AsRef<Path>) -> AlignResult<StagePosition> {
        let position = self.position()?;
        position.write_json(path)?;
        Ok(position)
    }

    /// Load a JSON position file and move there.
    pub fn restore_position_json(&mut self, path: impl AsRef<Path>) -> AlignResult<StagePosition> {
        let position = StagePosition::load_json(path)?;
        self.move_to_position(&position)?;
        Ok(position)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<&str> = self.axes.keys().map(|r| r.as_str()).collect();
        write!(f, "Stage `{}` with {} axes", self.name, roles.join(", "))?;
        if self.chip.is_some() {
            write!(f, " and a chip axis")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hardware::mock::{MockAxisTransport, TransportJournal};
    use crate::stage::axis::{AxisConfig, AxisLimits};

    fn linear(name: &str, journal: &TransportJournal) -> Axis {
        let transport = Arc::new(MockAxisTransport::new(name, 1_000_000.0).with_journal(journal.clone()));
        let limits = AxisLimits::new(0.0, 25_000_000.0).unwrap();
        Axis::new(AxisConfig::linear(name, limits), transport).unwrap()
    }

    fn xyz_stage(journal: &TransportJournal) -> StageBuilder {
        Stage::builder("input")
            .axis(AxisRole::X, linear("x", journal))
            .axis(AxisRole::Y, linear("y", journal))
            .axis(AxisRole::Z, linear("z", journal))
    }

    #[test]
    fn mapping_must_be_a_permutation() {
        let err = AxisMapping::new(AxisRole::X, AxisRole::X, AxisRole::Z).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(AxisMapping::new(AxisRole::Roll, AxisRole::Y, AxisRole::Z).is_err());
        assert!(AxisMapping::new(AxisRole::Z, AxisRole::X, AxisRole::Y).is_ok());
    }

    #[test]
    fn remapped_axes_keep_physical_roles() {
        let journal = TransportJournal::new();
        let mut stage = xyz_stage(&journal)
            .mapping(AxisMapping::new(AxisRole::Z, AxisRole::Y, AxisRole::X).unwrap())
            .build()
            .unwrap();
        journal.clear();

        stage.move_abs_um(Some(2_000.0), None, None).unwrap();
        assert_eq!(journal.moves(), vec![("z".to_string(), 2_000_000.0)]);

        let physical: Vec<(AxisRole, &str)> =
            stage.physical_axes().map(|(r, a)| (r, a.name())).collect();
        assert_eq!(
            physical,
            vec![
                (AxisRole::X, "input.z"),
                (AxisRole::Y, "input.y"),
                (AxisRole::Z, "input.x"),
            ]
        );
    }

    #[test]
    fn rotational_axis_in_linear_role_is_rejected() {
        let transport = Arc::new(MockAxisTransport::new("roll", 0.0));
        let limits = AxisLimits::new(-3600.0, 3600.0).unwrap();
        let roll = Axis::new(AxisConfig::rotate("roll", limits), transport).unwrap();
        let err = Stage::builder("s").axis(AxisRole::X, roll).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn chip_axis_requires_xyz() {
        let journal = TransportJournal::new();
        let chip = ChipAxis::new([0.0; 3], [1.0, 0.0, 1.0], None, false).unwrap();
        let err = Stage::builder("s")
            .axis(AxisRole::X, linear("x", &journal))
            .chip(chip)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn xc_falls_back_to_x_without_chip() {
        let journal = TransportJournal::new();
        let mut stage = xyz_stage(&journal).build().unwrap();
        journal.clear();
        stage.move_rel_xc_um(5.0).unwrap();
        assert_eq!(journal.moves(), vec![("x".to_string(), 1_005_000.0)]);
        assert_eq!(stage.move_rel_c_um(5.0).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn position_readout_skips_missing_axes() {
        let journal = TransportJournal::new();
        let mut stage = Stage::builder("out")
            .axis(AxisRole::X, linear("x", &journal))
            .build()
            .unwrap();
        assert_eq!(stage.position_um().unwrap(), [Some(1_000.0), None, None]);
        assert_eq!(stage.position_degree().unwrap(), [None, None, None]);
        assert!(stage.snapshot_xyz().is_err());
        assert_eq!(stage.to_string(), "Stage `out` with x axes");
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Yaw".parse::<AxisRole>().unwrap(), AxisRole::Yaw);
        assert!("w".parse::<AxisRole>().is_err());
    }
}
