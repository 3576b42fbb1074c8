//! Multi-step scan recipes.
//!
//! A [`ScannerDesign`] is an ordered list of steps, each one of:
//!
//! - [`DesignStep::Scans`]: run scans one after another
//! - [`DesignStep::Nested`]: run an inner scan at every coordinate of an outer
//!   scan and pick the best point over the whole cross product
//! - [`DesignStep::NestedGotoMax`]: at every outer coordinate, run each inner
//!   scan to its maximum and keep the outer coordinate with the highest result
//!
//! The design tracks every axis its steps touch so a step can snapshot and
//! restore the whole set before placing the rig at the best point.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::abort::ScanAbort;
use super::pattern::{LineOrigin, LineShape, RectangleShape};
use super::scan::{argmax_first, Scan, ScanOutcome, TraverseOptions};
use crate::error::{AlignError, AlignResult};
use crate::hardware::PowerMeter;
use crate::stage::{AxisId, AxisResolver, AxisRole, StageRole};

/// Canonical positions (nm or arc-seconds) of a set of axes.
pub type AxisPositions = Vec<(AxisId, f64)>;

/// One step of a [`ScannerDesign`].
#[derive(Debug, Clone)]
pub enum DesignStep {
    /// Sequential scans.
    Scans(Vec<Scan>),
    /// `inner` run in full at every coordinate of `outer`.
    Nested {
        /// Scan run at each outer coordinate.
        inner: Scan,
        /// Scan whose coordinates are stepped through.
        outer: Scan,
    },
    /// Every scan in `inner` run to its maximum at each coordinate of `outer`.
    NestedGotoMax {
        /// Scans run in order at each outer coordinate.
        inner: Vec<Scan>,
        /// Scan whose coordinates are stepped through.
        outer: Scan,
    },
}

impl DesignStep {
    fn scans(&self) -> Box<dyn Iterator<Item = &Scan> + '_> {
        match self {
            DesignStep::Scans(scans) => Box::new(scans.iter()),
            DesignStep::Nested { inner, outer } => Box::new([inner, outer].into_iter()),
            DesignStep::NestedGotoMax { inner, outer } => {
                Box::new(inner.iter().chain(std::iter::once(outer)))
            }
        }
    }

    fn scans_mut(&mut self) -> Vec<&mut Scan> {
        match self {
            DesignStep::Scans(scans) => scans.iter_mut().collect(),
            DesignStep::Nested { inner, outer } => vec![inner, outer],
            DesignStep::NestedGotoMax { inner, outer } => {
                inner.iter_mut().chain(std::iter::once(outer)).collect()
            }
        }
    }
}

/// One point of a nested step's cross product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedSample {
    /// Outer scan coordinate, scan units.
    pub outer: Vec<f64>,
    /// Inner scan coordinate, scan units.
    pub inner: Vec<f64>,
    /// Power, W.
    pub power: f64,
}

/// Result of a [`DesignStep::Nested`] step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedOutcome {
    /// Every sample, outer-major.
    pub samples: Vec<NestedSample>,
    /// Index of the first sample reaching the maximum power.
    pub best_index: usize,
}

impl NestedOutcome {
    /// Best sample.
    pub fn best(&self) -> &NestedSample {
        &self.samples[self.best_index]
    }
}

/// Result of a [`DesignStep::NestedGotoMax`] step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EachMaxOutcome {
    /// Outer coordinates visited.
    pub outer: Vec<Vec<f64>>,
    /// Best power of the last inner scan at each outer coordinate.
    pub powers: Vec<f64>,
    /// Design axis positions reached at each outer coordinate.
    pub positions: Vec<AxisPositions>,
    /// Index of the first outer coordinate reaching the maximum power.
    pub best_index: usize,
}

impl EachMaxOutcome {
    /// Highest recorded power.
    pub fn best_power(&self) -> f64 {
        self.powers[self.best_index]
    }

    /// Axis positions that produced [`best_power`](Self::best_power).
    pub fn best_positions(&self) -> &AxisPositions {
        &self.positions[self.best_index]
    }
}

/// Result of one design step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Outcomes of sequential scans.
    Scans {
        /// One outcome per scan.
        outcomes: Vec<ScanOutcome>,
    },
    /// Nested cross product.
    Nested(NestedOutcome),
    /// Nested with per-coordinate optimisation.
    NestedGotoMax(EachMaxOutcome),
}

/// Grid parameters for the z-optimising prebuilt designs, µm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyzGrid {
    /// Points along x.
    pub x_pts: usize,
    /// Points along y.
    pub y_pts: usize,
    /// Points along z.
    pub z_pts: usize,
    /// Step along x.
    pub x_step: f64,
    /// Step along y.
    pub y_step: f64,
    /// Step along z; always walked backwards (away from the sample).
    pub z_step: f64,
}

// =============================================================================
// ScannerDesign
// =============================================================================

/// Ordered recipe of scan steps.
#[derive(Debug, Clone, Default)]
pub struct ScannerDesign {
    steps: Vec<DesignStep>,
    axes: Vec<AxisId>,
    abort: Option<ScanAbort>,
}

impl ScannerDesign {
    /// Empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// Share one cancellation flag across every scan, present and future.
    pub fn with_abort(mut self, abort: ScanAbort) -> Self {
        for step in &mut self.steps {
            for scan in step.scans_mut() {
                *scan = scan.clone().with_abort(abort.clone());
            }
        }
        self.abort = Some(abort);
        self
    }

    /// Steps in order.
    pub fn steps(&self) -> &[DesignStep] {
        &self.steps
    }

    /// Every axis touched by any step, in first-seen order.
    pub fn axes(&self) -> &[AxisId] {
        &self.axes
    }

    fn push(&mut self, mut step: DesignStep) {
        if let Some(abort) = &self.abort {
            for scan in step.scans_mut() {
                *scan = scan.clone().with_abort(abort.clone());
            }
        }
        for scan in step.scans() {
            for id in scan.axes() {
                if !self.axes.contains(id) {
                    self.axes.push(*id);
                }
            }
        }
        self.steps.push(step);
    }

    /// Append a step running `scans` sequentially.
    pub fn add(&mut self, scans: Vec<Scan>) -> AlignResult<()> {
        if scans.is_empty() {
            return Err(AlignError::config("a scan step needs at least one scan"));
        }
        self.push(DesignStep::Scans(scans));
        Ok(())
    }

    /// Append a step running `inner` at every coordinate of `outer`.
    pub fn add_nested(&mut self, inner: Scan, outer: Scan) -> AlignResult<()> {
        check_disjoint(std::slice::from_ref(&inner), &outer)?;
        self.push(DesignStep::Nested { inner, outer });
        Ok(())
    }

    /// Append a step running each of `inner` to its maximum at every
    /// coordinate of `outer`.
    pub fn add_nested_goto_max(&mut self, inner: Vec<Scan>, outer: Scan) -> AlignResult<()> {
        if inner.is_empty() {
            return Err(AlignError::config("a nested step needs at least one inner scan"));
        }
        check_disjoint(&inner, &outer)?;
        self.push(DesignStep::NestedGotoMax { inner, outer });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Prebuilt designs
    // -------------------------------------------------------------------------

    /// Centred line on `axis_2`, then a centred line on `axis_1`.
    pub fn line2(
        axis_1: AxisId,
        axis_2: AxisId,
        power_meter: Arc<dyn PowerMeter>,
        pts: [usize; 2],
        steps: [f64; 2],
    ) -> AlignResult<Self> {
        let line_1 = Scan::line(axis_1, power_meter.clone(), LineShape::new(pts[0], steps[0]))?;
        let line_2 = Scan::line(axis_2, power_meter, LineShape::new(pts[1], steps[1]))?;
        let mut design = Self::new();
        design.add(vec![line_2])?;
        design.add(vec![line_1])?;
        Ok(design)
    }

    /// x/y rectangle on `stage` run at every step of a backwards z line.
    ///
    /// `offsets` apply to the rectangle and may be empty.
    pub fn optimise_rect_z(
        stage: Option<StageRole>,
        power_meter: Arc<dyn PowerMeter>,
        grid: XyzGrid,
        offsets: Vec<f64>,
    ) -> AlignResult<Self> {
        let id = |role| AxisId { stage, role };
        let rect = Scan::rectangle(
            id(AxisRole::X),
            id(AxisRole::Y),
            power_meter.clone(),
            RectangleShape::new(grid.x_pts, grid.y_pts, grid.x_step, grid.y_step),
        )?
        .with_offsets(offsets)?;
        let z_line = backwards_z_line(id(AxisRole::Z), power_meter, &grid)?;

        let mut design = Self::new();
        design.add_nested(rect, z_line)?;
        Ok(design)
    }

    /// y then x lines, each to its maximum, at every step of a backwards z line.
    pub fn optimise_line2_xy_z(
        stage: Option<StageRole>,
        power_meter: Arc<dyn PowerMeter>,
        grid: XyzGrid,
    ) -> AlignResult<Self> {
        let id = |role| AxisId { stage, role };
        let line_y = Scan::line(id(AxisRole::Y), power_meter.clone(), LineShape::new(grid.y_pts, grid.y_step))?;
        let line_x = Scan::line(id(AxisRole::X), power_meter.clone(), LineShape::new(grid.x_pts, grid.x_step))?;
        let z_line = backwards_z_line(id(AxisRole::Z), power_meter, &grid)?;

        let mut design = Self::new();
        design.add_nested_goto_max(vec![line_y, line_x], z_line)?;
        Ok(design)
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Run every step in order.
    pub fn scan<R: AxisResolver + ?Sized>(&self, rig: &mut R, goto_max: bool) -> AlignResult<Vec<StepOutcome>> {
        if self.steps.is_empty() {
            return Err(AlignError::config("scanner design has no steps"));
        }
        info!(steps = self.steps.len(), axes = self.axes.len(), goto_max, "scanner design started");

        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let outcome = match step {
                DesignStep::Scans(scans) => StepOutcome::Scans {
                    outcomes: scans
                        .iter()
                        .map(|scan| scan.scan(rig, goto_max))
                        .collect::<AlignResult<_>>()?,
                },
                DesignStep::Nested { inner, outer } => {
                    StepOutcome::Nested(self.scan_nested(rig, inner, outer, goto_max)?)
                }
                DesignStep::NestedGotoMax { inner, outer } => {
                    StepOutcome::NestedGotoMax(self.scan_nested_goto_max(rig, inner, outer, goto_max)?)
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Current canonical position of every design axis.
    pub fn positions<R: AxisResolver + ?Sized>(&self, rig: &mut R) -> AlignResult<AxisPositions> {
        self.axes
            .iter()
            .map(|id| Ok((*id, rig.resolve_mut(*id)?.current_position()?)))
            .collect()
    }

    /// Move every listed axis back to its recorded position, in order.
    pub fn restore<R: AxisResolver + ?Sized>(&self, rig: &mut R, positions: &AxisPositions) -> AlignResult<()> {
        for (id, position) in positions {
            rig.resolve_mut(*id)?.move_abs(*position)?;
        }
        Ok(())
    }

    fn scan_nested<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        inner: &Scan,
        outer: &Scan,
        goto_max: bool,
    ) -> AlignResult<NestedOutcome> {
        let initial = self.positions(rig)?;
        outer.apply_offsets(rig)?;
        inner.apply_offsets(rig)?;

        let suspended = TraverseOptions {
            apply_offsets: false,
        };
        let traversal = outer.traverse_pattern(rig, suspended, |rig| {
            inner.scan_with(rig, false, suspended)
        })?;

        let samples: Vec<NestedSample> = traversal
            .coordinates
            .iter()
            .zip(&traversal.results)
            .flat_map(|(outer_coordinate, result)| {
                result
                    .coordinates
                    .iter()
                    .zip(&result.powers)
                    .map(move |(inner_coordinate, power)| NestedSample {
                        outer: outer_coordinate.clone(),
                        inner: inner_coordinate.clone(),
                        power: *power,
                    })
            })
            .collect();
        let powers: Vec<f64> = samples.iter().map(|s| s.power).collect();
        let best_index = argmax_first(&powers)
            .ok_or_else(|| AlignError::config("nested scan produced no readings"))?;

        self.restore(rig, &initial)?;
        if goto_max {
            let best = &samples[best_index];
            inner.move_to(rig, &best.inner)?;
            outer.move_to(rig, &best.outer)?;
        }
        info!(
            inner = %inner,
            outer = %outer,
            samples = samples.len(),
            best_power_w = samples[best_index].power,
            "nested scan finished"
        );

        Ok(NestedOutcome { samples, best_index })
    }

    fn scan_nested_goto_max<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        inner: &[Scan],
        outer: &Scan,
        goto_max: bool,
    ) -> AlignResult<EachMaxOutcome> {
        let initial = self.positions(rig)?;

        let traversal = outer.traverse_pattern(rig, TraverseOptions::default(), |rig| {
            let mut last = None;
            for scan in inner {
                last = Some(scan.scan(rig, true)?);
            }
            let last = last.ok_or_else(|| AlignError::config("nested goto-max step has no inner scans"))?;
            Ok((last.best.power, self.positions(rig)?))
        })?;

        let (powers, positions): (Vec<f64>, Vec<AxisPositions>) = traversal.results.into_iter().unzip();
        let best_index = argmax_first(&powers)
            .ok_or_else(|| AlignError::config("nested scan produced no readings"))?;

        self.restore(rig, &initial)?;
        if goto_max {
            self.restore(rig, &positions[best_index])?;
        }
        info!(
            outer = %outer,
            points = powers.len(),
            best_power_w = powers[best_index],
            "nested goto-max scan finished"
        );

        Ok(EachMaxOutcome {
            outer: traversal.coordinates,
            powers,
            positions,
            best_index,
        })
    }
}

fn check_disjoint(inner: &[Scan], outer: &Scan) -> AlignResult<()> {
    match inner
        .iter()
        .flat_map(|scan| scan.axes())
        .find(|id| outer.axes().contains(id))
    {
        Some(id) => Err(AlignError::config(format!(
            "axis `{}` is driven by both the inner and the outer scan",
            id
        ))),
        None => Ok(()),
    }
}

fn backwards_z_line(axis: AxisId, power_meter: Arc<dyn PowerMeter>, grid: &XyzGrid) -> AlignResult<Scan> {
    let shape = LineShape::new(grid.z_pts, -grid.z_step.abs()).origin(LineOrigin::Left);
    Scan::line(axis, power_meter, shape)
}

impl fmt::Display for ScannerDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            let step_str = format!("STEP {}:  ", i);
            let (inner, outer): (Vec<&Scan>, Option<&Scan>) = match step {
                DesignStep::Scans(scans) => (scans.iter().collect(), None),
                DesignStep::Nested { inner, outer } => (vec![inner], Some(outer)),
                DesignStep::NestedGotoMax { inner, outer } => (inner.iter().collect(), Some(outer)),
            };

            let scan_str = "    SCAN  ";
            let join = format!("\n{}   THEN  ", " ".repeat(step_str.len() + scan_str.len()));
            let scans: Vec<String> = inner.iter().map(ToString::to_string).collect();
            write!(f, "{}{}{}", step_str, scan_str, scans.join(&join))?;
            if let Some(outer) = outer {
                write!(f, "\n{}FOR EACH  {}", " ".repeat(step_str.len()), outer)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hardware::mock::{MockAxisTransport, MockPowerMeter, TransportJournal};
    use crate::stage::{Axis, AxisConfig, AxisLimits, Stage};

    fn stage(journal: &TransportJournal) -> Stage {
        let limits = AxisLimits::new(0.0, 1_000_000.0).unwrap();
        let mut builder = Stage::builder("s");
        for role in AxisRole::LINEAR {
            let transport = Arc::new(
                MockAxisTransport::new(role.as_str(), 500_000.0).with_journal(journal.clone()),
            );
            builder = builder.axis(role, Axis::new(AxisConfig::linear(role.as_str(), limits), transport).unwrap());
        }
        builder.build().unwrap()
    }

    const X: AxisId = AxisId::local(AxisRole::X);
    const Y: AxisId = AxisId::local(AxisRole::Y);
    const Z: AxisId = AxisId::local(AxisRole::Z);

    #[test]
    fn nested_places_global_maximum_directly() {
        let journal = TransportJournal::new();
        let mut stage = stage(&journal);
        let meter = Arc::new(MockPowerMeter::sequence(vec![1.0, 2.0, 9.0, 3.0]));
        let inner = Scan::line(X, meter.clone(), LineShape::new(2, 1.0).origin(LineOrigin::Left)).unwrap();
        let outer = Scan::line(Y, meter, LineShape::new(2, 1.0).origin(LineOrigin::Left)).unwrap();

        let mut design = ScannerDesign::new();
        design.add_nested(inner, outer).unwrap();
        let outcomes = design.scan(&mut stage, true).unwrap();

        let StepOutcome::Nested(nested) = &outcomes[0] else {
            panic!("expected nested outcome");
        };
        assert_eq!(nested.samples.len(), 4);
        assert_eq!(nested.best_index, 2);
        assert_eq!(nested.best().outer, vec![501.0]);
        assert_eq!(nested.best().inner, vec![500.0]);

        assert_eq!(stage.position_um().unwrap(), [Some(500.0), Some(501.0), Some(500.0)]);
        assert_eq!(journal.moves().last(), Some(&("y".to_string(), 501_000.0)));
    }

    #[test]
    fn nested_goto_max_restores_best_snapshot() {
        let journal = TransportJournal::new();
        let mut stage = stage(&journal);
        // Each inner line has 2 points; the best of the last inner scan is what
        // gets recorded for each z step.
        let meter = Arc::new(MockPowerMeter::sequence(vec![
            1.0, 2.0, 1.0, 2.0, // z step 0
            5.0, 4.0, 7.0, 6.0, // z step 1
        ]));
        let ly = Scan::line(Y, meter.clone(), LineShape::new(2, 1.0).origin(LineOrigin::Left)).unwrap();
        let lx = Scan::line(X, meter.clone(), LineShape::new(2, 1.0).origin(LineOrigin::Left)).unwrap();
        let lz = Scan::line(Z, meter, LineShape::new(2, -1.0).origin(LineOrigin::Left)).unwrap();

        let mut design = ScannerDesign::new();
        design.add_nested_goto_max(vec![ly, lx], lz).unwrap();
        let outcomes = design.scan(&mut stage, true).unwrap();

        let StepOutcome::NestedGotoMax(each) = &outcomes[0] else {
            panic!("expected nested goto-max outcome");
        };
        assert_eq!(each.powers, vec![2.0, 7.0]);
        assert_eq!(each.best_index, 1);
        assert_eq!(stage.position_um().unwrap(), [Some(501.0), Some(501.0), Some(499.0)]);
    }

    #[test]
    fn overlapping_nested_axes_are_rejected() {
        let meter = Arc::new(MockPowerMeter::constant(1.0));
        let inner = Scan::line(X, meter.clone(), LineShape::new(2, 1.0)).unwrap();
        let outer = Scan::line(X, meter, LineShape::new(2, 1.0)).unwrap();
        let err = ScannerDesign::new().add_nested(inner, outer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn nested_goto_max_without_inner_scans_is_rejected() {
        let journal = TransportJournal::new();
        let mut stage = stage(&journal);
        let meter = Arc::new(MockPowerMeter::constant(1.0));
        let outer = Scan::line(Z, meter, LineShape::new(2, 1.0)).unwrap();

        let err = ScannerDesign::new()
            .add_nested_goto_max(Vec::new(), outer.clone())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut design = ScannerDesign::new();
        design.push(DesignStep::NestedGotoMax {
            inner: Vec::new(),
            outer,
        });
        let err = design.scan(&mut stage, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn empty_design_is_a_configuration_error() {
        let journal = TransportJournal::new();
        let mut stage = stage(&journal);
        let err = ScannerDesign::new().scan(&mut stage, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn prebuilt_designs_collect_axes_in_order() {
        let meter = Arc::new(MockPowerMeter::constant(1.0));
        let line2 = ScannerDesign::line2(X, Y, meter.clone(), [3, 3], [1.0, 1.0]).unwrap();
        assert_eq!(line2.axes(), &[Y, X]);

        let grid = XyzGrid {
            x_pts: 3,
            y_pts: 3,
            z_pts: 4,
            x_step: 1.0,
            y_step: 1.0,
            z_step: 2.0,
        };
        let rect_z = ScannerDesign::optimise_rect_z(Some(StageRole::Input), meter, grid, vec![0.0, -3.0]).unwrap();
        let DesignStep::Nested { inner, outer } = &rect_z.steps()[0] else {
            panic!("expected nested step");
        };
        assert_eq!(inner.offsets(), &[0.0, -3.0]);
        assert_eq!(outer.pattern().points()[1], vec![-2.0]);
    }

    #[test]
    fn display_lists_steps() {
        let meter = Arc::new(MockPowerMeter::constant(1.0));
        let design = ScannerDesign::optimise_line2_xy_z(
            None,
            meter,
            XyzGrid {
                x_pts: 3,
                y_pts: 3,
                z_pts: 2,
                x_step: 1.0,
                y_step: 1.0,
                z_step: 1.0,
            },
        )
        .unwrap();
        let text = design.to_string();
        assert!(text.starts_with("STEP 0:      SCAN  Line USING y"));
        assert!(text.contains("THEN  Line USING x"));
        assert!(text.contains("FOR EACH  Line USING z"));
    }
}
