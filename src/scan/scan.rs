//! N-dimensional scans.
//!
//! A [`Scan`] pairs a relative [`Pattern`] with the axes it drives and a power
//! meter. Running it regenerates absolute coordinates from wherever the axes
//! currently are, validates every coordinate against every axis's bounds, then
//! visits the coordinates one absolute move at a time.
//!
//! Coordinates are expressed in each axis's scan unit: µm for linear axes and
//! degrees for rotational ones.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_align::hardware::mock::{MockAxisTransport, MockPowerMeter};
//! use rust_align::scan::{LineShape, Scan};
//! use rust_align::stage::{Axis, AxisConfig, AxisId, AxisLimits, AxisRole, Stage};
//!
//! let transport = Arc::new(MockAxisTransport::new("x", 10_000.0));
//! let limits = AxisLimits::new(0.0, 1e6).unwrap();
//! let x = Axis::new(AxisConfig::linear("x", limits), transport).unwrap();
//! let mut stage = Stage::builder("input").axis(AxisRole::X, x).build().unwrap();
//!
//! let meter = Arc::new(MockPowerMeter::sequence(vec![1.0, 3.0, 2.0]));
//! let scan = Scan::line(AxisId::local(AxisRole::X), meter, LineShape::new(3, 1.0)).unwrap();
//!
//! let outcome = scan.scan(&mut stage, true).unwrap();
//! assert_eq!(outcome.best.coordinate, vec![10.0]);
//! ```

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::abort::ScanAbort;
use super::pattern::{CrossShape, DiamondShape, LineShape, Pattern, RectangleShape, ScanShape};
use crate::error::{AlignError, AlignResult};
use crate::hardware::PowerMeter;
use crate::stage::{AxisId, AxisResolver, Unit};

/// Traversal behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraverseOptions {
    /// Add the scan's offsets to the starting position.
    pub apply_offsets: bool,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            apply_offsets: true,
        }
    }
}

/// Absolute coordinates visited and what the visitor returned at each.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal<T> {
    /// Absolute coordinates in traversal order, scan units.
    pub coordinates: Vec<Vec<f64>>,
    /// Visitor results, one per coordinate.
    pub results: Vec<T>,
}

/// Highest-power coordinate of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestPoint {
    /// Index into the traversal.
    pub index: usize,
    /// Absolute coordinate, scan units.
    pub coordinate: Vec<f64>,
    /// Power, W.
    pub power: f64,
}

/// Result of [`Scan::scan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    /// Axis labels, in scan order.
    pub axes: Vec<String>,
    /// Unit of each coordinate component.
    pub units: Vec<Unit>,
    /// Absolute coordinates visited.
    pub coordinates: Vec<Vec<f64>>,
    /// Power read at each coordinate, W.
    pub powers: Vec<f64>,
    /// First coordinate reaching the maximum power.
    pub best: BestPoint,
}

impl ScanOutcome {
    /// Write one row per coordinate: each axis position, then the power.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> AlignResult<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header: Vec<String> = self
            .axes
            .iter()
            .zip(&self.units)
            .map(|(axis, unit)| format!("{} [{}]", axis, unit))
            .collect();
        header.push("power [W]".to_string());
        writer.write_record(&header)?;

        for (coordinate, power) in self.coordinates.iter().zip(&self.powers) {
            let row: Vec<String> = coordinate
                .iter()
                .chain(std::iter::once(power))
                .map(|v| v.to_string())
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Index of the first maximum. NaN never wins.
pub(crate) fn argmax_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            None if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

// =============================================================================
// Scan
// =============================================================================

/// A pattern bound to axes and a power meter.
#[derive(Clone)]
pub struct Scan {
    axes: Vec<AxisId>,
    shape: ScanShape,
    pattern: Pattern,
    offsets: Vec<f64>,
    power_meter: Arc<dyn PowerMeter>,
    abort: ScanAbort,
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan")
            .field("axes", &self.axes)
            .field("shape", &self.shape)
            .field("points", &self.pattern.len())
            .field("offsets", &self.offsets)
            .finish()
    }
}

impl Scan {
    /// Bind `shape` to `axes` (one per pattern dimension).
    pub fn new(
        axes: Vec<AxisId>,
        shape: impl Into<ScanShape>,
        power_meter: Arc<dyn PowerMeter>,
    ) -> AlignResult<Self> {
        let shape = shape.into();
        if axes.len() != shape.dimensions() {
            return Err(AlignError::config(format!(
                "{} scan drives {} axes, {} given",
                shape,
                shape.dimensions(),
                axes.len()
            )));
        }
        if let Some(dup) = axes
            .iter()
            .enumerate()
            .find_map(|(i, id)| axes[..i].contains(id).then_some(id))
        {
            return Err(AlignError::config(format!(
                "axis `{}` appears twice in one scan",
                dup
            )));
        }
        let pattern = shape.pattern()?;
        Ok(Self {
            axes,
            shape,
            pattern,
            offsets: Vec::new(),
            power_meter,
            abort: ScanAbort::default(),
        })
    }

    /// Rectangle over `axis_1` (within rows) and `axis_2` (across rows).
    pub fn rectangle(
        axis_1: AxisId,
        axis_2: AxisId,
        power_meter: Arc<dyn PowerMeter>,
        shape: RectangleShape,
    ) -> AlignResult<Self> {
        Self::new(vec![axis_1, axis_2], shape, power_meter)
    }

    /// Line along one axis.
    pub fn line(axis: AxisId, power_meter: Arc<dyn PowerMeter>, shape: LineShape) -> AlignResult<Self> {
        Self::new(vec![axis], shape, power_meter)
    }

    /// Cross over two axes.
    pub fn cross(
        axis_1: AxisId,
        axis_2: AxisId,
        power_meter: Arc<dyn PowerMeter>,
        shape: CrossShape,
    ) -> AlignResult<Self> {
        Self::new(vec![axis_1, axis_2], shape, power_meter)
    }

    /// Diamond over two axes.
    pub fn diamond(
        axis_1: AxisId,
        axis_2: AxisId,
        power_meter: Arc<dyn PowerMeter>,
        shape: DiamondShape,
    ) -> AlignResult<Self> {
        Self::new(vec![axis_1, axis_2], shape, power_meter)
    }

    /// Per-axis offsets added to the starting position; empty for none.
    pub fn with_offsets(mut self, offsets: Vec<f64>) -> AlignResult<Self> {
        if !offsets.is_empty() && offsets.len() != self.axes.len() {
            return Err(AlignError::config(format!(
                "{} offsets given for a {}-axis scan",
                offsets.len(),
                self.axes.len()
            )));
        }
        if offsets.iter().any(|o| !o.is_finite()) {
            return Err(AlignError::config("scan offsets must be finite"));
        }
        self.offsets = offsets;
        Ok(self)
    }

    /// Share a cancellation flag.
    pub fn with_abort(mut self, abort: ScanAbort) -> Self {
        self.abort = abort;
        self
    }

    /// Axes in pattern order.
    pub fn axes(&self) -> &[AxisId] {
        &self.axes
    }

    /// Shape parameters.
    pub fn shape(&self) -> &ScanShape {
        &self.shape
    }

    /// Relative pattern.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Offsets (empty for none).
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    /// Power meter read at each coordinate.
    pub fn power_meter(&self) -> &Arc<dyn PowerMeter> {
        &self.power_meter
    }

    /// Cancellation flag.
    pub fn abort_flag(&self) -> &ScanAbort {
        &self.abort
    }

    // -------------------------------------------------------------------------
    // Positioning
    // -------------------------------------------------------------------------

    /// Current position of each axis, scan units.
    pub fn positions<R: AxisResolver + ?Sized>(&self, rig: &mut R) -> AlignResult<Vec<f64>> {
        self.axes
            .iter()
            .map(|id| {
                let axis = rig.resolve_mut(*id)?;
                let unit = axis.kind().scan_unit();
                axis.current_position_in(unit)
            })
            .collect()
    }

    /// Absolute move of every axis, scan units, in axis order.
    pub fn move_to<R: AxisResolver + ?Sized>(&self, rig: &mut R, coordinate: &[f64]) -> AlignResult<()> {
        for (id, value) in self.axes.iter().zip(coordinate) {
            let axis = rig.resolve_mut(*id)?;
            let unit = axis.kind().scan_unit();
            axis.move_abs_in(*value, unit)?;
        }
        Ok(())
    }

    fn canonical_positions<R: AxisResolver + ?Sized>(&self, rig: &mut R) -> AlignResult<Vec<f64>> {
        self.axes
            .iter()
            .map(|id| rig.resolve_mut(*id)?.current_position())
            .collect()
    }

    fn restore_canonical<R: AxisResolver + ?Sized>(&self, rig: &mut R, positions: &[f64]) -> AlignResult<()> {
        for (id, position) in self.axes.iter().zip(positions) {
            rig.resolve_mut(*id)?.move_abs(*position)?;
        }
        Ok(())
    }

    /// Move to the current position plus the offsets. No-op without offsets.
    pub fn apply_offsets<R: AxisResolver + ?Sized>(&self, rig: &mut R) -> AlignResult<()> {
        if self.offsets.is_empty() {
            return Ok(());
        }
        let target: Vec<f64> = self
            .positions(rig)?
            .iter()
            .zip(&self.offsets)
            .map(|(p, o)| p + o)
            .collect();
        self.move_to(rig, &target)
    }

    fn check_bounds<R: AxisResolver + ?Sized>(&self, rig: &R, coordinates: &[Vec<f64>]) -> AlignResult<()> {
        for (i, id) in self.axes.iter().enumerate() {
            let axis = rig.resolve(*id)?;
            let unit = axis.kind().scan_unit();
            let (min, max) = axis.user_bounds_in(unit)?;
            if let Some(value) = coordinates
                .iter()
                .map(|c| c[i])
                .find(|v| !(min..=max).contains(v))
            {
                return Err(AlignError::OutOfRange {
                    axis: axis.name().to_string(),
                    value,
                    min,
                    max,
                    unit: unit.symbol(),
                });
            }
        }
        Ok(())
    }

    fn labels<R: AxisResolver + ?Sized>(&self, rig: &R) -> AlignResult<(Vec<String>, Vec<Unit>)> {
        let mut labels = Vec::with_capacity(self.axes.len());
        let mut units = Vec::with_capacity(self.axes.len());
        for id in &self.axes {
            let axis = rig.resolve(*id)?;
            labels.push(axis.name().to_string());
            units.push(axis.kind().scan_unit());
        }
        Ok((labels, units))
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Visit every pattern coordinate, calling `visit` after each move.
    ///
    /// Every coordinate is checked against every axis before the first move.
    /// The cancellation flag is checked before each coordinate. The rig is left
    /// at the last coordinate.
    pub fn traverse_pattern<R, T, F>(
        &self,
        rig: &mut R,
        options: TraverseOptions,
        mut visit: F,
    ) -> AlignResult<Traversal<T>>
    where
        R: AxisResolver + ?Sized,
        F: FnMut(&mut R) -> AlignResult<T>,
    {
        let mut origin = self.positions(rig)?;
        if options.apply_offsets && !self.offsets.is_empty() {
            for (o, offset) in origin.iter_mut().zip(&self.offsets) {
                *o += offset;
            }
        }

        let coordinates: Vec<Vec<f64>> = self
            .pattern
            .points()
            .iter()
            .map(|point| point.iter().zip(&origin).map(|(p, o)| p + o).collect())
            .collect();
        self.check_bounds(rig, &coordinates)?;

        debug!(scan = %self, points = coordinates.len(), ?origin, "traversing pattern");
        let mut results = Vec::with_capacity(coordinates.len());
        for (index, coordinate) in coordinates.iter().enumerate() {
            self.abort.check(index)?;
            self.move_to(rig, coordinate)?;
            results.push(visit(rig)?);
        }

        Ok(Traversal {
            coordinates,
            results,
        })
    }

    /// Measure power over the pattern.
    ///
    /// Afterwards the axes return to where they started; with `goto_max` they
    /// then move to the first coordinate that reached the maximum power.
    pub fn scan<R: AxisResolver + ?Sized>(&self, rig: &mut R, goto_max: bool) -> AlignResult<ScanOutcome> {
        self.scan_with(rig, goto_max, TraverseOptions::default())
    }

    pub(crate) fn scan_with<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        goto_max: bool,
        options: TraverseOptions,
    ) -> AlignResult<ScanOutcome> {
        let initial = self.canonical_positions(rig)?;
        let (axes, units) = self.labels(rig)?;

        let meter = &self.power_meter;
        let mut index = 0;
        let traversal = self.traverse_pattern(rig, options, |_| {
            let power = meter.get_power()?;
            let at = index;
            index += 1;
            if power.is_finite() {
                Ok(power)
            } else {
                Err(AlignError::InvalidPower { index: at, value: power })
            }
        })?;

        let best_index = argmax_first(&traversal.results)
            .ok_or_else(|| AlignError::config("scan pattern produced no readings"))?;
        let best = BestPoint {
            index: best_index,
            coordinate: traversal.coordinates[best_index].clone(),
            power: traversal.results[best_index],
        };

        self.restore_canonical(rig, &initial)?;
        if goto_max {
            self.move_to(rig, &best.coordinate)?;
        }
        info!(
            scan = %self,
            points = traversal.coordinates.len(),
            best_power_w = best.power,
            best_coordinate = ?best.coordinate,
            goto_max,
            "scan finished"
        );

        Ok(ScanOutcome {
            axes,
            units,
            coordinates: traversal.coordinates,
            powers: traversal.results,
            best,
        })
    }
}

impl fmt::Display for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axes: Vec<String> = self.axes.iter().map(ToString::to_string).collect();
        write!(f, "{} USING {}", self.shape, axes.join(","))
    }
}
