//! Single degree of freedom with reversal, bounds and position caching.
//!
//! An [`Axis`] wraps one motor channel. Positions are held in a canonical unit
//! (nanometres for linear axes, arc-seconds for rotational ones) and every target
//! is validated against [`AxisLimits`] before the transport is touched.
//!
//! Reversed axes mirror user coordinates about the axis maximum:
//! `physical = max - user`. The cache always stores the physical (unreversed)
//! position.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{AlignError, AlignResult};
use crate::hardware::{AxisTransport, MoveLogger, MoveRecord};

/// Default number of operations between two hardware position refreshes.
pub const DEFAULT_REFRESH_INTERVAL: u32 = 100;

// =============================================================================
// Kinds and units
// =============================================================================

/// What an axis moves along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// Translation, canonical unit nanometres.
    Linear,
    /// Rotation, canonical unit arc-seconds.
    Rotate,
}

impl AxisKind {
    /// Unit positions are cached in.
    pub fn canonical_unit(self) -> Unit {
        match self {
            AxisKind::Linear => Unit::Nanometre,
            AxisKind::Rotate => Unit::ArcSecond,
        }
    }

    /// Unit scan patterns and stage snapshots are expressed in.
    pub fn scan_unit(self) -> Unit {
        match self {
            AxisKind::Linear => Unit::Micrometre,
            AxisKind::Rotate => Unit::Degree,
        }
    }
}

/// Position units accepted by the convenience wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// nm (canonical linear)
    Nanometre,
    /// µm
    Micrometre,
    /// mm
    Millimetre,
    /// arc-second (canonical rotational)
    ArcSecond,
    /// degree
    Degree,
}

impl Unit {
    /// Kind of axis this unit applies to.
    pub fn kind(self) -> AxisKind {
        match self {
            Unit::Nanometre | Unit::Micrometre | Unit::Millimetre => AxisKind::Linear,
            Unit::ArcSecond | Unit::Degree => AxisKind::Rotate,
        }
    }

    /// Canonical units per one of this unit.
    pub fn factor(self) -> f64 {
        match self {
            Unit::Nanometre | Unit::ArcSecond => 1.0,
            Unit::Micrometre => 1e3,
            Unit::Millimetre => 1e6,
            Unit::Degree => 3600.0,
        }
    }

    /// Short symbol used in messages and CSV headers.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Nanometre => "nm",
            Unit::Micrometre => "um",
            Unit::Millimetre => "mm",
            Unit::ArcSecond => "arcsec",
            Unit::Degree => "degree",
        }
    }

    /// Convert a value in this unit to canonical units.
    pub fn to_canonical(self, value: f64) -> f64 {
        value * self.factor()
    }

    /// Convert a canonical value to this unit.
    pub fn from_canonical(self, value: f64) -> f64 {
        value / self.factor()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Absolute travel limits in canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    /// Lowest reachable absolute position.
    pub min: f64,
    /// Highest reachable absolute position.
    pub max: f64,
}

impl AxisLimits {
    /// Validated limits.
    pub fn new(min: f64, max: f64) -> AlignResult<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(AlignError::config(format!(
                "invalid axis limits [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// `true` when `position` lies within `[min, max]`.
    pub fn contains(&self, position: f64) -> bool {
        (self.min..=self.max).contains(&position)
    }

    /// Travel span.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Static description of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisConfig {
    /// Name used in logs and errors until the axis joins a stage.
    pub name: String,
    /// Linear or rotational.
    pub kind: AxisKind,
    /// Travel limits, canonical units.
    pub limits: AxisLimits,
    /// Mirror user coordinates about `limits.max`.
    pub reversed: bool,
    /// Operations between hardware refreshes of the cache; `0` disables.
    pub refresh_interval: u32,
}

impl AxisConfig {
    /// Linear axis with limits in nanometres.
    pub fn linear(name: impl Into<String>, limits: AxisLimits) -> Self {
        Self {
            name: name.into(),
            kind: AxisKind::Linear,
            limits,
            reversed: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    /// Rotational axis with limits in arc-seconds.
    pub fn rotate(name: impl Into<String>, limits: AxisLimits) -> Self {
        Self {
            kind: AxisKind::Rotate,
            ..Self::linear(name, limits)
        }
    }

    /// Set reversal.
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    /// Set the refresh interval.
    pub fn refresh_every(mut self, operations: u32) -> Self {
        self.refresh_interval = operations;
        self
    }
}

// =============================================================================
// Axis
// =============================================================================

/// One motor channel with cached, bounds-checked absolute positioning.
pub struct Axis {
    config: AxisConfig,
    label: String,
    transport: Arc<dyn AxisTransport>,
    logger: Option<Arc<dyn MoveLogger>>,
    position_absolute: f64,
    position_absolute_start: f64,
    ops_since_refresh: u32,
}

impl fmt::Debug for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Axis")
            .field("label", &self.label)
            .field("kind", &self.config.kind)
            .field("limits", &self.config.limits)
            .field("reversed", &self.config.reversed)
            .field("position_absolute", &self.position_absolute)
            .finish()
    }
}

impl Axis {
    /// Create an axis, reading its starting position from the hardware.
    pub fn new(config: AxisConfig, transport: Arc<dyn AxisTransport>) -> AlignResult<Self> {
        let position = transport.read_position()?;
        if !config.limits.contains(position) {
            warn!(
                axis = %config.name,
                position,
                min = config.limits.min,
                max = config.limits.max,
                "axis starts outside its configured limits"
            );
        }
        Ok(Self {
            label: config.name.clone(),
            config,
            transport,
            logger: None,
            position_absolute: position,
            position_absolute_start: position,
            ops_since_refresh: 0,
        })
    }

    /// Label used in logs and errors (`stage.role` once attached to a stage).
    pub fn name(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = label;
    }

    /// Static configuration.
    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    /// Linear or rotational.
    pub fn kind(&self) -> AxisKind {
        self.config.kind
    }

    /// Whether user coordinates are mirrored.
    pub fn is_reversed(&self) -> bool {
        self.config.reversed
    }

    /// Absolute limits, canonical units.
    pub fn limits(&self) -> AxisLimits {
        self.config.limits
    }

    /// Attach or detach a move logger.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn MoveLogger>>) {
        self.logger = logger;
    }

    /// Cached absolute (unreversed) position, canonical units.
    pub fn position_absolute(&self) -> f64 {
        self.position_absolute
    }

    /// Absolute position read from the hardware at construction.
    pub fn position_absolute_start(&self) -> f64 {
        self.position_absolute_start
    }

    /// Range of valid user coordinates, canonical units.
    ///
    /// Equal to the limits unless the axis is reversed, in which case the range
    /// is mirrored about `max`.
    pub fn user_bounds(&self) -> (f64, f64) {
        let AxisLimits { min, max } = self.config.limits;
        if self.config.reversed {
            (0.0, max - min)
        } else {
            (min, max)
        }
    }

    fn to_physical(&self, user: f64) -> f64 {
        if self.config.reversed {
            self.config.limits.max - user
        } else {
            user
        }
    }

    fn to_user(&self, physical: f64) -> f64 {
        // Mirroring is its own inverse.
        self.to_physical(physical)
    }

    /// Check an absolute (physical) target against the limits.
    ///
    /// The error reports the target and bounds in user coordinates and in the
    /// axis's scan unit (µm or degrees).
    pub fn check_bounds(&self, absolute: f64) -> AlignResult<f64> {
        if self.config.limits.contains(absolute) {
            return Ok(absolute);
        }
        let unit = self.kind().scan_unit();
        let (min, max) = self.user_bounds();
        Err(AlignError::OutOfRange {
            axis: self.label.clone(),
            value: unit.from_canonical(self.to_user(absolute)),
            min: unit.from_canonical(min),
            max: unit.from_canonical(max),
            unit: unit.symbol(),
        })
    }

    fn commit(&mut self, absolute: f64) -> AlignResult<f64> {
        let confirmed = self.transport.move_to(absolute)?;
        self.position_absolute = absolute;
        debug!(
            axis = %self.label,
            target = absolute,
            confirmed,
            unit = self.kind().canonical_unit().symbol(),
            "axis moved"
        );
        if let Some(logger) = &self.logger {
            logger.log(&MoveRecord {
                axis: self.label.clone(),
                position_absolute: absolute,
                unit: self.kind().canonical_unit().symbol(),
            });
        }
        Ok(confirmed)
    }

    fn tick_refresh(&mut self) -> AlignResult<()> {
        if self.config.refresh_interval == 0 {
            return Ok(());
        }
        self.ops_since_refresh += 1;
        if self.ops_since_refresh >= self.config.refresh_interval {
            self.refresh_position()?;
        }
        Ok(())
    }

    /// Re-read the absolute position from hardware, replacing the cache.
    ///
    /// Returns the refreshed user-coordinate position.
    pub fn refresh_position(&mut self) -> AlignResult<f64> {
        let position = self.transport.read_position()?;
        if position != self.position_absolute {
            debug!(
                axis = %self.label,
                cached = self.position_absolute,
                hardware = position,
                "position cache drifted from hardware"
            );
        }
        self.position_absolute = position;
        self.ops_since_refresh = 0;
        Ok(self.to_user(position))
    }

    /// Move to an absolute user-coordinate position (canonical units).
    ///
    /// A target equal to the cached position touches neither the hardware nor
    /// the logger. Returns the resulting position in user coordinates, as
    /// confirmed by the hardware when a move was issued.
    pub fn move_abs(&mut self, target: f64) -> AlignResult<f64> {
        let absolute = self.to_physical(target);
        let reached = if absolute == self.position_absolute {
            trace!(axis = %self.label, target, "move skipped, already in position");
            absolute
        } else {
            self.check_bounds(absolute)?;
            self.commit(absolute)?
        };
        self.tick_refresh()?;
        Ok(self.to_user(reached))
    }

    /// Move by `delta` from the cached position (canonical units).
    ///
    /// On a reversed axis a positive delta decreases the physical position.
    pub fn move_rel(&mut self, delta: f64) -> AlignResult<f64> {
        let delta = if self.config.reversed { -delta } else { delta };
        let reached = if delta == 0.0 {
            trace!(axis = %self.label, "relative move of zero skipped");
            self.position_absolute
        } else {
            let absolute = self.check_bounds(self.position_absolute + delta)?;
            self.commit(absolute)?
        };
        self.tick_refresh()?;
        Ok(self.to_user(reached))
    }

    /// Current user-coordinate position, canonical units.
    ///
    /// Counts as an operation for the periodic hardware refresh.
    pub fn current_position(&mut self) -> AlignResult<f64> {
        self.tick_refresh()?;
        Ok(self.to_user(self.position_absolute))
    }

    /// Cached user-coordinate position without any hardware access.
    pub fn cached_position(&self) -> f64 {
        self.to_user(self.position_absolute)
    }

    // -------------------------------------------------------------------------
    // Unit wrappers
    // -------------------------------------------------------------------------

    fn ensure_unit(&self, unit: Unit) -> AlignResult<()> {
        if unit.kind() != self.kind() {
            return Err(AlignError::config(format!(
                "unit `{}` cannot be used on {:?} axis `{}`",
                unit,
                self.kind(),
                self.label
            )));
        }
        Ok(())
    }

    /// [`move_abs`](Self::move_abs) with the target expressed in `unit`.
    pub fn move_abs_in(&mut self, target: f64, unit: Unit) -> AlignResult<f64> {
        self.ensure_unit(unit)?;
        let reached = self.move_abs(unit.to_canonical(target))?;
        Ok(unit.from_canonical(reached))
    }

    /// [`move_rel`](Self::move_rel) with the delta expressed in `unit`.
    pub fn move_rel_in(&mut self, delta: f64, unit: Unit) -> AlignResult<f64> {
        self.ensure_unit(unit)?;
        let reached = self.move_rel(unit.to_canonical(delta))?;
        Ok(unit.from_canonical(reached))
    }

    /// [`current_position`](Self::current_position) expressed in `unit`.
    pub fn current_position_in(&mut self, unit: Unit) -> AlignResult<f64> {
        self.ensure_unit(unit)?;
        Ok(unit.from_canonical(self.current_position()?))
    }

    /// Limits expressed in `unit`.
    pub fn limits_in(&self, unit: Unit) -> AlignResult<(f64, f64)> {
        self.ensure_unit(unit)?;
        let AxisLimits { min, max } = self.config.limits;
        Ok((unit.from_canonical(min), unit.from_canonical(max)))
    }

    /// User-coordinate bounds expressed in `unit`.
    pub fn user_bounds_in(&self, unit: Unit) -> AlignResult<(f64, f64)> {
        self.ensure_unit(unit)?;
        let (min, max) = self.user_bounds();
        Ok((unit.from_canonical(min), unit.from_canonical(max)))
    }

    /// Move to an absolute position in µm.
    pub fn move_abs_um(&mut self, target: f64) -> AlignResult<f64> {
        self.move_abs_in(target, Unit::Micrometre)
    }

    /// Move to an absolute position in mm.
    pub fn move_abs_mm(&mut self, target: f64) -> AlignResult<f64> {
        self.move_abs_in(target, Unit::Millimetre)
    }

    /// Relative move in µm.
    pub fn move_rel_um(&mut self, delta: f64) -> AlignResult<f64> {
        self.move_rel_in(delta, Unit::Micrometre)
    }

    /// Relative move in mm.
    pub fn move_rel_mm(&mut self, delta: f64) -> AlignResult<f64> {
        self.move_rel_in(delta, Unit::Millimetre)
    }

    /// Current position in µm.
    pub fn current_position_um(&mut self) -> AlignResult<f64> {
        self.current_position_in(Unit::Micrometre)
    }

    /// Current position in mm.
    pub fn current_position_mm(&mut self) -> AlignResult<f64> {
        self.current_position_in(Unit::Millimetre)
    }

    /// Move to an absolute angle in degrees.
    pub fn move_abs_degree(&mut self, target: f64) -> AlignResult<f64> {
        self.move_abs_in(target, Unit::Degree)
    }

    /// Relative rotation in degrees.
    pub fn move_rel_degree(&mut self, delta: f64) -> AlignResult<f64> {
        self.move_rel_in(delta, Unit::Degree)
    }

    /// Current angle in degrees.
    pub fn current_position_degree(&mut self) -> AlignResult<f64> {
        self.current_position_in(Unit::Degree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::hardware::mock::{MockAxisTransport, RecordingLogger};

    fn linear_axis(reversed: bool, start: f64) -> (Axis, Arc<MockAxisTransport>) {
        let transport = Arc::new(MockAxisTransport::new("x", start));
        let limits = AxisLimits::new(0.0, 25_000_000.0).unwrap();
        let config = AxisConfig::linear("x", limits).reversed(reversed);
        let axis = Axis::new(config, transport.clone()).unwrap();
        transport.journal().clear();
        (axis, transport)
    }

    #[test]
    fn initial_position_comes_from_hardware() {
        let (axis, _) = linear_axis(false, 1_250.0);
        assert_eq!(axis.position_absolute(), 1_250.0);
        assert_eq!(axis.position_absolute_start(), 1_250.0);
    }

    #[test]
    fn reversed_relative_move_goes_the_other_way() {
        let (mut axis, transport) = linear_axis(true, 10_000_000.0);
        assert_eq!(axis.cached_position(), 15_000_000.0);

        axis.move_rel(1_000.0).unwrap();
        assert_eq!(transport.position(), 9_999_000.0);
        assert_eq!(axis.cached_position(), 15_001_000.0);
    }

    #[test]
    fn zero_relative_move_is_a_no_op() {
        let (mut axis, transport) = linear_axis(false, 0.0);
        axis.move_rel(0.0).unwrap();
        assert!(transport.journal().is_empty());
    }

    #[test]
    fn relative_move_out_of_range_keeps_cache() {
        let (mut axis, transport) = linear_axis(false, 100.0);
        let err = axis.move_rel(-200.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(axis.position_absolute(), 100.0);
        assert!(transport.journal().is_empty());
    }

    #[test]
    fn reversed_bounds_are_reported_in_user_coordinates() {
        let (axis, _) = linear_axis(true, 0.0);
        match axis.check_bounds(-1_000.0).unwrap_err() {
            AlignError::OutOfRange { value, min, max, unit, .. } => {
                assert_eq!(unit, "um");
                assert_eq!(value, 25_001.0);
                assert_eq!((min, max), (0.0, 25_000.0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn reversed_user_bounds_start_at_zero_for_offset_limits() {
        let transport = Arc::new(MockAxisTransport::new("x", 1_000.0));
        let limits = AxisLimits::new(1_000.0, 25_000_000.0).unwrap();
        let axis = Axis::new(AxisConfig::linear("x", limits).reversed(true), transport).unwrap();
        assert_eq!(axis.user_bounds(), (0.0, 24_999_000.0));
        assert_eq!(axis.cached_position(), 24_999_000.0);

        let plain = Axis::new(
            AxisConfig::linear("x", limits),
            Arc::new(MockAxisTransport::new("x", 1_000.0)),
        )
        .unwrap();
        assert_eq!(plain.user_bounds(), (1_000.0, 25_000_000.0));
    }

    #[test]
    fn transport_failure_propagates_and_keeps_cache() {
        let (mut axis, transport) = linear_axis(false, 0.0);
        transport.fail_next(TransportError::timeout("x", "no reply"));
        let err = axis.move_abs(5_000.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(axis.position_absolute(), 0.0);
    }

    #[test]
    fn cache_is_refreshed_after_interval() {
        let transport = Arc::new(MockAxisTransport::new("x", 0.0));
        let limits = AxisLimits::new(0.0, 1e6).unwrap();
        let mut axis = Axis::new(AxisConfig::linear("x", limits).refresh_every(3), transport.clone())
            .unwrap();

        // Someone jogs the stage by hand.
        transport.jog_to(500.0);
        assert_eq!(axis.current_position().unwrap(), 0.0);
        assert_eq!(axis.current_position().unwrap(), 0.0);
        assert_eq!(axis.current_position().unwrap(), 500.0);
    }

    #[test]
    fn logger_sees_only_committed_moves() {
        let (mut axis, _) = linear_axis(false, 0.0);
        let logger = Arc::new(RecordingLogger::new());
        axis.set_logger(Some(logger.clone()));

        axis.move_abs(2_000.0).unwrap();
        axis.move_abs(2_000.0).unwrap();
        axis.move_rel(0.0).unwrap();

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].position_absolute, 2_000.0);
        assert_eq!(records[0].unit, "nm");
    }

    #[test]
    fn wrong_unit_kind_is_rejected() {
        let (mut axis, transport) = linear_axis(false, 0.0);
        let err = axis.move_abs_degree(1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(transport.journal().is_empty());
    }

    #[test]
    fn rotational_axis_uses_degrees() {
        let transport = Arc::new(MockAxisTransport::new("roll", 0.0));
        let limits = AxisLimits::new(-36_000.0, 36_000.0).unwrap();
        let mut axis = Axis::new(AxisConfig::rotate("roll", limits), transport.clone()).unwrap();

        axis.move_abs_degree(2.5).unwrap();
        assert_eq!(transport.position(), 9_000.0);
        assert_eq!(axis.current_position_degree().unwrap(), 2.5);
        assert_eq!(axis.limits_in(Unit::Degree).unwrap(), (-10.0, 10.0));
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert!(AxisLimits::new(5.0, 1.0).is_err());
        assert!(AxisLimits::new(f64::NAN, 1.0).is_err());
    }
}
