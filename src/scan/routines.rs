//! Everyday alignment routines for a fibre rig.
//!
//! Each routine names a stage by [`StageRole`] and works on anything that
//! resolves rig axes, usually [`Stages2`](crate::stage::Stages2) or
//! [`Stages3`](crate::stage::Stages3).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::abort::ScanAbort;
use super::design::{ScannerDesign, StepOutcome, XyzGrid};
use super::pattern::{CrossShape, RectangleShape};
use super::scan::{Scan, ScanOutcome};
use crate::error::AlignResult;
use crate::hardware::PowerMeter;
use crate::stage::{AxisId, AxisResolver, AxisRole, StageRole};

/// Default x/y position for [`ScanRoutines::centre_x_y`], µm.
pub const DEFAULT_CENTRE_UM: f64 = 250.0;

/// Offset applied to both waveguide search patterns, µm.
pub const WAVEGUIDE_OFFSET_UM: [f64; 2] = [0.0, -3.0];

/// Points and steps of an x/y grid, µm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyGrid {
    /// Points along x.
    pub x_pts: usize,
    /// Points along y.
    pub y_pts: usize,
    /// Step along x.
    pub x_step: f64,
    /// Step along y.
    pub y_step: f64,
}

impl XyGrid {
    /// Grid of `x_pts` × `y_pts` points.
    pub fn new(x_pts: usize, y_pts: usize, x_step: f64, y_step: f64) -> Self {
        Self {
            x_pts,
            y_pts,
            x_step,
            y_step,
        }
    }

    /// 7 × 7 points at 1 µm.
    pub fn waveguide_rect() -> Self {
        Self::new(7, 7, 1.0, 1.0)
    }

    /// 7 + 7 points at 3 µm.
    pub fn waveguide_cross() -> Self {
        Self::new(7, 7, 3.0, 3.0)
    }

    fn rectangle(&self) -> RectangleShape {
        RectangleShape::new(self.x_pts, self.y_pts, self.x_step, self.y_step)
    }

    fn cross(&self) -> CrossShape {
        CrossShape::new(self.x_pts, self.y_pts, self.x_step, self.y_step)
    }

    fn with_z(&self, z_pts: usize, z_step: f64) -> XyzGrid {
        XyzGrid {
            x_pts: self.x_pts,
            y_pts: self.y_pts,
            z_pts,
            x_step: self.x_step,
            y_step: self.y_step,
            z_step,
        }
    }
}

/// Prebuilt scans bound to one power meter.
#[derive(Clone)]
pub struct ScanRoutines {
    power_meter: Arc<dyn PowerMeter>,
    abort: ScanAbort,
}

impl ScanRoutines {
    /// Routines reading `power_meter`.
    pub fn new(power_meter: Arc<dyn PowerMeter>) -> Self {
        Self {
            power_meter,
            abort: ScanAbort::default(),
        }
    }

    /// Share a cancellation flag with every scan these routines build.
    pub fn with_abort(mut self, abort: ScanAbort) -> Self {
        self.abort = abort;
        self
    }

    /// Cancellation flag.
    pub fn abort_flag(&self) -> &ScanAbort {
        &self.abort
    }

    fn xy_rectangle(&self, stage: StageRole, shape: RectangleShape) -> AlignResult<Scan> {
        Ok(Scan::rectangle(
            AxisId::on(stage, AxisRole::X),
            AxisId::on(stage, AxisRole::Y),
            self.power_meter.clone(),
            shape,
        )?
        .with_abort(self.abort.clone()))
    }

    fn xy_cross(&self, stage: StageRole, grid: &XyGrid) -> AlignResult<Scan> {
        Ok(Scan::cross(
            AxisId::on(stage, AxisRole::X),
            AxisId::on(stage, AxisRole::Y),
            self.power_meter.clone(),
            grid.cross(),
        )?
        .with_abort(self.abort.clone()))
    }

    /// Raster `stage` in x/y without meandering, optionally writing the image
    /// to `csv_path`.
    pub fn take_image<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
        csv_path: Option<&Path>,
        goto_max: bool,
    ) -> AlignResult<ScanOutcome> {
        let scan = self.xy_rectangle(stage, grid.rectangle().meander(false))?;
        let outcome = scan.scan(rig, goto_max)?;
        if let Some(path) = csv_path {
            outcome.write_csv(path)?;
            info!(%stage, path = %path.display(), "image written");
        }
        Ok(outcome)
    }

    /// Raster `stage` in x/y and move to the brightest point.
    pub fn goto_max_rect<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
    ) -> AlignResult<ScanOutcome> {
        self.xy_rectangle(stage, grid.rectangle().meander(false))?
            .scan(rig, true)
    }

    /// Line in y then line in x on `stage`, each to its maximum.
    pub fn goto_max_line2<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
    ) -> AlignResult<Vec<StepOutcome>> {
        ScannerDesign::line2(
            AxisId::on(stage, AxisRole::X),
            AxisId::on(stage, AxisRole::Y),
            self.power_meter.clone(),
            [grid.x_pts, grid.y_pts],
            [grid.x_step, grid.y_step],
        )?
        .with_abort(self.abort.clone())
        .scan(rig, true)
    }

    /// y/x line optimisation at every step of a backwards z line.
    pub fn goto_max_line2_z<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
        z_pts: usize,
        z_step: f64,
    ) -> AlignResult<Vec<StepOutcome>> {
        ScannerDesign::optimise_line2_xy_z(Some(stage), self.power_meter.clone(), grid.with_z(z_pts, z_step))?
            .with_abort(self.abort.clone())
            .scan(rig, true)
    }

    /// x/y rectangle at every step of a backwards z line.
    pub fn goto_max_rect_z<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
        z_pts: usize,
        z_step: f64,
    ) -> AlignResult<Vec<StepOutcome>> {
        ScannerDesign::optimise_rect_z(
            Some(stage),
            self.power_meter.clone(),
            grid.with_z(z_pts, z_step),
            Vec::new(),
        )?
        .with_abort(self.abort.clone())
        .scan(rig, true)
    }

    /// x/y cross on `stage`, then move to the brightest point.
    pub fn goto_max_cross<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        stage: StageRole,
        grid: XyGrid,
    ) -> AlignResult<ScanOutcome> {
        self.xy_cross(stage, &grid)?.scan(rig, true)
    }

    /// Output rectangle nested in an input rectangle, both offset by
    /// [`WAVEGUIDE_OFFSET_UM`]. Usually run with [`XyGrid::waveguide_rect`].
    pub fn find_waveguide_rect<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        grid: XyGrid,
    ) -> AlignResult<Vec<StepOutcome>> {
        let input = self
            .xy_rectangle(StageRole::Input, grid.rectangle())?
            .with_offsets(WAVEGUIDE_OFFSET_UM.to_vec())?;
        let output = self
            .xy_rectangle(StageRole::Output, grid.rectangle())?
            .with_offsets(WAVEGUIDE_OFFSET_UM.to_vec())?;
        let mut design = ScannerDesign::new();
        design.add_nested(output, input)?;
        design.scan(rig, true)
    }

    /// Output cross nested in an input cross, both offset by
    /// [`WAVEGUIDE_OFFSET_UM`]. Usually run with [`XyGrid::waveguide_cross`].
    pub fn find_waveguide_cross<R: AxisResolver + ?Sized>(
        &self,
        rig: &mut R,
        grid: XyGrid,
    ) -> AlignResult<Vec<StepOutcome>> {
        let input = self
            .xy_cross(StageRole::Input, &grid)?
            .with_offsets(WAVEGUIDE_OFFSET_UM.to_vec())?;
        let output = self
            .xy_cross(StageRole::Output, &grid)?
            .with_offsets(WAVEGUIDE_OFFSET_UM.to_vec())?;
        let mut design = ScannerDesign::new();
        design.add_nested(output, input)?;
        design.scan(rig, true)
    }

    /// Move input and output x/y to `centre_um`.
    pub fn centre_x_y<R: AxisResolver + ?Sized>(&self, rig: &mut R, centre_um: f64) -> AlignResult<()> {
        for role in [AxisRole::X, AxisRole::Y] {
            for stage in [StageRole::Input, StageRole::Output] {
                rig.resolve_mut(AxisId::on(stage, role))?.move_abs_um(centre_um)?;
            }
        }
        info!(centre_um, "input and output centred in x/y");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockAxisTransport, MockPowerMeter, TransportJournal};
    use crate::stage::{Axis, AxisConfig, AxisLimits, Stage, Stages2};

    fn stage(name: &str, journal: &TransportJournal) -> Stage {
        let limits = AxisLimits::new(0.0, 1_000_000.0).unwrap();
        let mut builder = Stage::builder(name);
        for role in AxisRole::LINEAR {
            let channel = format!("{}.{}", name, role);
            let transport = Arc::new(MockAxisTransport::new(channel.clone(), 100_000.0).with_journal(journal.clone()));
            builder = builder.axis(role, Axis::new(AxisConfig::linear(channel, limits), transport).unwrap());
        }
        builder.build().unwrap()
    }

    fn rig(journal: &TransportJournal) -> Stages2 {
        Stages2::new(stage("input", journal), stage("output", journal))
    }

    #[test]
    fn take_image_writes_raster_without_meander() {
        let journal = TransportJournal::new();
        let mut rig = rig(&journal);
        let routines = ScanRoutines::new(Arc::new(MockPowerMeter::constant(1e-6)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        let outcome = routines
            .take_image(&mut rig, StageRole::Input, XyGrid::new(3, 2, 1.0, 1.0), Some(&path), false)
            .unwrap();

        let xs: Vec<f64> = outcome.coordinates.iter().map(|c| c[0]).collect();
        assert_eq!(xs, vec![99.0, 100.0, 101.0, 99.0, 100.0, 101.0]);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 7);
        assert_eq!(rig.input_mut().position_um().unwrap(), [Some(100.0), Some(100.0), Some(100.0)]);
    }

    #[test]
    fn centre_moves_both_fibres() {
        let journal = TransportJournal::new();
        let mut rig = rig(&journal);
        let routines = ScanRoutines::new(Arc::new(MockPowerMeter::constant(1.0)));
        routines.centre_x_y(&mut rig, DEFAULT_CENTRE_UM).unwrap();
        assert_eq!(rig.input_mut().position_um().unwrap()[..2], [Some(250.0), Some(250.0)]);
        assert_eq!(rig.output_mut().position_um().unwrap()[..2], [Some(250.0), Some(250.0)]);
    }

    #[test]
    fn waveguide_search_nests_output_in_input() {
        let journal = TransportJournal::new();
        let mut rig = rig(&journal);
        let routines = ScanRoutines::new(Arc::new(MockPowerMeter::constant(1.0)));
        let outcomes = routines.find_waveguide_cross(&mut rig, XyGrid::new(3, 3, 1.0, 1.0)).unwrap();

        let StepOutcome::Nested(nested) = &outcomes[0] else {
            panic!("expected nested outcome");
        };
        // 6 outer points, 6 inner points each.
        assert_eq!(nested.samples.len(), 36);
        // All powers equal: the first sample wins, offset by (0, -3).
        assert_eq!(nested.best().outer, vec![99.0, 97.0]);
        assert_eq!(nested.best().inner, vec![99.0, 97.0]);
    }
}
