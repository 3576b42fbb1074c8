//! Input/output (and optionally chip) stage rigs.
//!
//! A rig owns its stages by role and keeps a LIFO stack of position snapshots.
//! Restoring a snapshot can pull the fibres back from the chip first, so x/y
//! repositioning never drags a fibre across the chip facet.
//!
//! Relative fibre retraction is always a negative z move; z must therefore
//! point *towards* the chip on both fibre stages (use axis reversal if the
//! hardware disagrees).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::axis::{Axis, Unit};
use super::position::XyzPosition;
use super::resolve::{resolve_on, resolve_on_mut, AxisId, AxisResolver};
use super::stage::{AxisRole, Stage};
use crate::error::{AlignError, AlignResult};
use crate::hardware::MoveLogger;

/// Fibre retraction used when restoring a snapshot, µm.
pub const DEFAULT_RETRACT_UM: f64 = 50.0;

/// Fibre retraction used while centring, µm.
pub const DEFAULT_CENTRING_RETRACT_UM: f64 = 20.0;

/// Role of a stage within a rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    /// Input fibre.
    Input,
    /// Output fibre.
    Output,
    /// Chip holder.
    Chip,
}

impl StageRole {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            StageRole::Input => "input",
            StageRole::Output => "output",
            StageRole::Chip => "chip",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageRole {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "in" => Ok(StageRole::Input),
            "output" | "out" => Ok(StageRole::Output),
            "chip" => Ok(StageRole::Chip),
            other => Err(AlignError::config(format!("unknown stage role `{}`", other))),
        }
    }
}

/// Fibre retraction distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetractSettings {
    /// z retraction before restoring a snapshot, µm.
    pub retract_um: f64,
    /// z retraction while centring or making long moves, µm.
    pub centring_retract_um: f64,
}

impl Default for RetractSettings {
    fn default() -> Self {
        Self {
            retract_um: DEFAULT_RETRACT_UM,
            centring_retract_um: DEFAULT_CENTRING_RETRACT_UM,
        }
    }
}

/// Positions of every stage in a rig, canonical nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigSnapshot {
    /// Input stage x/y/z.
    pub input: XyzPosition,
    /// Output stage x/y/z.
    pub output: XyzPosition,
    /// Chip stage x/y/z, three-stage rigs only.
    pub chip: Option<XyzPosition>,
}

/// Relative moves issued by a long x or c-axis move, µm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongMove {
    /// Input stage x.
    pub input_x: f64,
    /// Output stage x.
    pub output_x: f64,
    /// Chip stage z.
    pub chip_z: f64,
}

// =============================================================================
// Shared rig operations
// =============================================================================

fn snapshot(input: &mut Stage, output: &mut Stage, chip: Option<&mut Stage>) -> AlignResult<RigSnapshot> {
    Ok(RigSnapshot {
        input: input.snapshot_xyz()?,
        output: output.snapshot_xyz()?,
        chip: chip.map(Stage::snapshot_xyz).transpose()?,
    })
}

fn move_rel_z_um(stages: [&mut Stage; 2], delta: f64) -> AlignResult<()> {
    for stage in stages {
        stage.require_axis_mut(AxisRole::Z)?.move_rel_um(delta)?;
    }
    Ok(())
}

fn restore(
    input: &mut Stage,
    output: &mut Stage,
    chip: Option<&mut Stage>,
    snapshot: &RigSnapshot,
    retract_um: Option<f64>,
) -> AlignResult<()> {
    if let Some(retract) = retract_um {
        move_rel_z_um([&mut *input, &mut *output], -retract)?;
    }

    input.require_axis_mut(AxisRole::X)?.move_abs(snapshot.input.x)?;
    input.require_axis_mut(AxisRole::Y)?.move_abs(snapshot.input.y)?;
    output.require_axis_mut(AxisRole::X)?.move_abs(snapshot.output.x)?;
    output.require_axis_mut(AxisRole::Y)?.move_abs(snapshot.output.y)?;

    if let (Some(chip), Some(position)) = (chip, snapshot.chip) {
        chip.require_axis_mut(AxisRole::X)?.move_abs(position.x)?;
        chip.require_axis_mut(AxisRole::Y)?.move_abs(position.y)?;
        chip.require_axis_mut(AxisRole::Z)?.move_abs(position.z)?;
    }

    input.require_axis_mut(AxisRole::Z)?.move_abs(snapshot.input.z)?;
    output.require_axis_mut(AxisRole::Z)?.move_abs(snapshot.output.z)?;
    Ok(())
}

/// `centre - mean(input, output)` along `role`, µm.
///
/// The default centre is half the span of the input axis.
fn centring_correction(
    input: &mut Stage,
    output: &mut Stage,
    role: AxisRole,
    centre_um: Option<f64>,
) -> AlignResult<f64> {
    let centre = match centre_um {
        Some(centre) => centre,
        None => {
            let (min, max) = input.require_axis(role)?.limits_in(Unit::Micrometre)?;
            (max - min) / 2.0
        }
    };
    let position_in = input.require_axis_mut(role)?.current_position_um()?;
    let position_out = output.require_axis_mut(role)?.current_position_um()?;
    Ok(centre - 0.5 * (position_in + position_out))
}

fn apply_centring(
    input: &mut Stage,
    output: &mut Stage,
    mut chip: Option<&mut Stage>,
    dx: Option<f64>,
    dy: Option<f64>,
    retract_um: f64,
) -> AlignResult<()> {
    move_rel_z_um([&mut *input, &mut *output], -retract_um)?;

    if let Some(dx) = dx {
        input.require_axis_mut(AxisRole::X)?.move_rel_um(dx)?;
        output.require_axis_mut(AxisRole::X)?.move_rel_um(dx)?;
        if let Some(chip) = chip.as_deref_mut() {
            chip.require_axis_mut(AxisRole::Z)?.move_rel_um(dx)?;
        }
    }
    if let Some(dy) = dy {
        input.require_axis_mut(AxisRole::Y)?.move_rel_um(dy)?;
        output.require_axis_mut(AxisRole::Y)?.move_rel_um(dy)?;
        if let Some(chip) = chip.as_deref_mut() {
            chip.require_axis_mut(AxisRole::Y)?.move_rel_um(dy)?;
        }
    }

    move_rel_z_um([input, output], retract_um)
}

// =============================================================================
// Stages2
// =============================================================================

/// Input and output fibre stages.
#[derive(Debug)]
pub struct Stages2 {
    input: Stage,
    output: Stage,
    stack: Vec<RigSnapshot>,
    retract: RetractSettings,
}

impl Stages2 {
    /// Assemble a rig with default retraction distances.
    pub fn new(input: Stage, output: Stage) -> Self {
        Self {
            input,
            output,
            stack: Vec::new(),
            retract: RetractSettings::default(),
        }
    }

    /// Override retraction distances.
    pub fn with_retract(mut self, retract: RetractSettings) -> Self {
        self.retract = retract;
        self
    }

    /// Retraction distances in use.
    pub fn retract(&self) -> RetractSettings {
        self.retract
    }

    /// Input stage.
    pub fn input(&self) -> &Stage {
        &self.input
    }

    /// Output stage.
    pub fn output(&self) -> &Stage {
        &self.output
    }

    /// Mutable input stage.
    pub fn input_mut(&mut self) -> &mut Stage {
        &mut self.input
    }

    /// Mutable output stage.
    pub fn output_mut(&mut self) -> &mut Stage {
        &mut self.output
    }

    /// Stage by role; `None` for [`StageRole::Chip`].
    pub fn stage(&self, role: StageRole) -> Option<&Stage> {
        match role {
            StageRole::Input => Some(&self.input),
            StageRole::Output => Some(&self.output),
            StageRole::Chip => None,
        }
    }

    /// Mutable stage by role.
    pub fn stage_mut(&mut self, role: StageRole) -> Option<&mut Stage> {
        match role {
            StageRole::Input => Some(&mut self.input),
            StageRole::Output => Some(&mut self.output),
            StageRole::Chip => None,
        }
    }

    /// Attach (or detach) a move logger on both stages.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn MoveLogger>>) {
        self.input.set_logger(logger.clone());
        self.output.set_logger(logger);
    }

    /// Current positions of both stages.
    pub fn snapshot(&mut self) -> AlignResult<RigSnapshot> {
        snapshot(&mut self.input, &mut self.output, None)
    }

    /// Move back to `snapshot`, retracting the fibres first when asked.
    pub fn restore(&mut self, snapshot: &RigSnapshot, retract_fibres: bool) -> AlignResult<()> {
        let retract = retract_fibres.then_some(self.retract.retract_um);
        restore(&mut self.input, &mut self.output, None, snapshot, retract)
    }

    /// Push the current positions; returns the new stack depth.
    pub fn push_pos_xyz_stack(&mut self) -> AlignResult<usize> {
        let snapshot = self.snapshot()?;
        self.stack.push(snapshot);
        debug!(depth = self.stack.len(), "pushed rig position");
        Ok(self.stack.len())
    }

    /// Restore the most recent snapshot and drop it from the stack.
    ///
    /// The snapshot stays on the stack if the restore fails part way.
    pub fn pop_pos_xyz_stack(&mut self, retract_fibres: bool) -> AlignResult<usize> {
        let snapshot = *self.stack.last().ok_or(AlignError::EmptyStack)?;
        self.restore(&snapshot, retract_fibres)?;
        self.stack.pop();
        debug!(depth = self.stack.len(), "restored rig position");
        Ok(self.stack.len())
    }

    /// Number of stored snapshots.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Centre the input and output x axes around `centre_um` (default: half
    /// the input x span). Returns the correction applied, µm.
    pub fn ctr_in_out_x_axes(&mut self, centre_um: Option<f64>) -> AlignResult<f64> {
        let dx = centring_correction(&mut self.input, &mut self.output, AxisRole::X, centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            None,
            Some(dx),
            None,
            self.retract.centring_retract_um,
        )?;
        info!(correction_um = dx, "centred input/output x axes");
        Ok(dx)
    }

    /// Centre the input and output y axes. Returns the correction applied, µm.
    pub fn ctr_in_out_y_axes(&mut self, centre_um: Option<f64>) -> AlignResult<f64> {
        let dy = centring_correction(&mut self.input, &mut self.output, AxisRole::Y, centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            None,
            None,
            Some(dy),
            self.retract.centring_retract_um,
        )?;
        info!(correction_um = dy, "centred input/output y axes");
        Ok(dy)
    }

    /// Centre x and y with a single retraction. Returns `(dx, dy)`, µm.
    pub fn ctr_in_out_xy_axes(
        &mut self,
        x_centre_um: Option<f64>,
        y_centre_um: Option<f64>,
    ) -> AlignResult<(f64, f64)> {
        let dx = centring_correction(&mut self.input, &mut self.output, AxisRole::X, x_centre_um)?;
        let dy = centring_correction(&mut self.input, &mut self.output, AxisRole::Y, y_centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            None,
            Some(dx),
            Some(dy),
            self.retract.centring_retract_um,
        )?;
        info!(dx_um = dx, dy_um = dy, "centred input/output x/y axes");
        Ok((dx, dy))
    }
}

impl AxisResolver for Stages2 {
    fn resolve(&self, id: AxisId) -> AlignResult<&Axis> {
        resolve_on(id.stage.and_then(|role| self.stage(role)), id)
    }

    fn resolve_mut(&mut self, id: AxisId) -> AlignResult<&mut Axis> {
        let stage = match id.stage {
            Some(role) => self.stage_mut(role),
            None => None,
        };
        resolve_on_mut(stage, id)
    }
}

// =============================================================================
// Stages3
// =============================================================================

/// Input, output and chip stages.
#[derive(Debug)]
pub struct Stages3 {
    input: Stage,
    output: Stage,
    chip: Stage,
    stack: Vec<RigSnapshot>,
    retract: RetractSettings,
}

impl Stages3 {
    /// Assemble a rig with default retraction distances.
    pub fn new(input: Stage, output: Stage, chip: Stage) -> Self {
        Self {
            input,
            output,
            chip,
            stack: Vec::new(),
            retract: RetractSettings::default(),
        }
    }

    /// Override retraction distances.
    pub fn with_retract(mut self, retract: RetractSettings) -> Self {
        self.retract = retract;
        self
    }

    /// Retraction distances in use.
    pub fn retract(&self) -> RetractSettings {
        self.retract
    }

    /// Input stage.
    pub fn input(&self) -> &Stage {
        &self.input
    }

    /// Output stage.
    pub fn output(&self) -> &Stage {
        &self.output
    }

    /// Chip stage.
    pub fn chip(&self) -> &Stage {
        &self.chip
    }

    /// Mutable input stage.
    pub fn input_mut(&mut self) -> &mut Stage {
        &mut self.input
    }

    /// Mutable output stage.
    pub fn output_mut(&mut self) -> &mut Stage {
        &mut self.output
    }

    /// Mutable chip stage.
    pub fn chip_mut(&mut self) -> &mut Stage {
        &mut self.chip
    }

    /// Stage by role.
    pub fn stage(&self, role: StageRole) -> &Stage {
        match role {
            StageRole::Input => &self.input,
            StageRole::Output => &self.output,
            StageRole::Chip => &self.chip,
        }
    }

    /// Mutable stage by role.
    pub fn stage_mut(&mut self, role: StageRole) -> &mut Stage {
        match role {
            StageRole::Input => &mut self.input,
            StageRole::Output => &mut self.output,
            StageRole::Chip => &mut self.chip,
        }
    }

    /// Attach (or detach) a move logger on all three stages.
    pub fn set_logger(&mut self, logger: Option<Arc<dyn MoveLogger>>) {
        self.input.set_logger(logger.clone());
        self.output.set_logger(logger.clone());
        self.chip.set_logger(logger);
    }

    /// Current positions of all three stages.
    pub fn snapshot(&mut self) -> AlignResult<RigSnapshot> {
        snapshot(&mut self.input, &mut self.output, Some(&mut self.chip))
    }

    /// Move back to `snapshot`: fibres retract, fibre x/y, chip x/y/z, fibre z.
    pub fn restore(&mut self, snapshot: &RigSnapshot, retract_fibres: bool) -> AlignResult<()> {
        let retract = retract_fibres.then_some(self.retract.retract_um);
        restore(
            &mut self.input,
            &mut self.output,
            Some(&mut self.chip),
            snapshot,
            retract,
        )
    }

    /// Push the current positions; returns the new stack depth.
    pub fn push_pos_xyz_stack(&mut self) -> AlignResult<usize> {
        let snapshot = self.snapshot()?;
        self.stack.push(snapshot);
        debug!(depth = self.stack.len(), "pushed rig position");
        Ok(self.stack.len())
    }

    /// Restore the most recent snapshot and drop it from the stack.
    ///
    /// The snapshot stays on the stack if the restore fails part way.
    pub fn pop_pos_xyz_stack(&mut self, retract_fibres: bool) -> AlignResult<usize> {
        let snapshot = *self.stack.last().ok_or(AlignError::EmptyStack)?;
        self.restore(&snapshot, retract_fibres)?;
        self.stack.pop();
        debug!(depth = self.stack.len(), "restored rig position");
        Ok(self.stack.len())
    }

    /// Number of stored snapshots.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Centre the fibre x axes, following with the chip z axis.
    pub fn ctr_in_out_x_axes(&mut self, centre_um: Option<f64>) -> AlignResult<f64> {
        let dx = centring_correction(&mut self.input, &mut self.output, AxisRole::X, centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            Some(&mut self.chip),
            Some(dx),
            None,
            self.retract.centring_retract_um,
        )?;
        info!(correction_um = dx, "centred input/output x axes");
        Ok(dx)
    }

    /// Centre the fibre y axes, following with the chip y axis.
    pub fn ctr_in_out_y_axes(&mut self, centre_um: Option<f64>) -> AlignResult<f64> {
        let dy = centring_correction(&mut self.input, &mut self.output, AxisRole::Y, centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            Some(&mut self.chip),
            None,
            Some(dy),
            self.retract.centring_retract_um,
        )?;
        info!(correction_um = dy, "centred input/output y axes");
        Ok(dy)
    }

    /// Centre x and y with a single retraction. Returns `(dx, dy)`, µm.
    pub fn ctr_in_out_xy_axes(
        &mut self,
        x_centre_um: Option<f64>,
        y_centre_um: Option<f64>,
    ) -> AlignResult<(f64, f64)> {
        let dx = centring_correction(&mut self.input, &mut self.output, AxisRole::X, x_centre_um)?;
        let dy = centring_correction(&mut self.input, &mut self.output, AxisRole::Y, y_centre_um)?;
        apply_centring(
            &mut self.input,
            &mut self.output,
            Some(&mut self.chip),
            Some(dx),
            Some(dy),
            self.retract.centring_retract_um,
        )?;
        info!(dx_um = dx, dy_um = dy, "centred input/output x/y axes");
        Ok((dx, dy))
    }

    /// Move both fibres along x by more than their own travel allows.
    ///
    /// The fibre x axes are recentred and the chip stage's z axis carries the
    /// common part of the move. `output_um` defaults to `input_um`. Lateral
    /// motion happens with both fibres retracted.
    pub fn move_rel_x_long(
        &mut self,
        input_um: f64,
        output_um: Option<f64>,
        centre_um: Option<f64>,
    ) -> AlignResult<LongMove> {
        let output_um = output_um.unwrap_or(input_um);
        let (_, x_max) = self.input.require_axis(AxisRole::X)?.limits_in(Unit::Micrometre)?;
        if (input_um - output_um).abs() >= x_max {
            return Err(AlignError::config(format!(
                "input and output x moves differ by {} um, more than the x travel of {} um",
                (input_um - output_um).abs(),
                x_max
            )));
        }

        let centring = centring_correction(&mut self.input, &mut self.output, AxisRole::X, centre_um)?;
        let chip_long = 0.5 * (input_um + output_um);
        let moves = LongMove {
            input_x: centring + chip_long - input_um,
            output_x: centring + chip_long - output_um,
            chip_z: centring + chip_long,
        };

        let retract = self.retract.centring_retract_um;
        move_rel_z_um([&mut self.input, &mut self.output], -retract)?;
        self.chip.require_axis_mut(AxisRole::Z)?.move_rel_um(moves.chip_z)?;
        self.input.require_axis_mut(AxisRole::X)?.move_rel_um(moves.input_x)?;
        self.output.require_axis_mut(AxisRole::X)?.move_rel_um(moves.output_x)?;
        move_rel_z_um([&mut self.input, &mut self.output], retract)?;

        info!(?moves, "long x move");
        Ok(moves)
    }

    /// Long move along each fibre stage's chip axis.
    ///
    /// Each c displacement is split into x/y/z; the x parts go through
    /// [`move_rel_x_long`](Self::move_rel_x_long), negative z parts before it and
    /// the rest after, y last. Both fibre stages need a chip axis.
    pub fn move_rel_c_long(
        &mut self,
        input_um: f64,
        output_um: Option<f64>,
        centre_um: Option<f64>,
    ) -> AlignResult<LongMove> {
        let output_um = output_um.unwrap_or(input_um);
        let [xi, yi, zi] = self.fibre_chip_moves(StageRole::Input, input_um)?;
        let [xo, yo, zo] = self.fibre_chip_moves(StageRole::Output, output_um)?;

        if zi < 0.0 {
            self.input.require_axis_mut(AxisRole::Z)?.move_rel_um(zi)?;
        }
        if zo < 0.0 {
            self.output.require_axis_mut(AxisRole::Z)?.move_rel_um(zo)?;
        }

        let moves = self.move_rel_x_long(xi, Some(xo), centre_um)?;

        if zi >= 0.0 {
            self.input.require_axis_mut(AxisRole::Z)?.move_rel_um(zi)?;
        }
        if zo >= 0.0 {
            self.output.require_axis_mut(AxisRole::Z)?.move_rel_um(zo)?;
        }
        self.input.require_axis_mut(AxisRole::Y)?.move_rel_um(yi)?;
        self.output.require_axis_mut(AxisRole::Y)?.move_rel_um(yo)?;
        Ok(moves)
    }

    /// [`move_rel_c_long`](Self::move_rel_c_long) when both fibre stages have a
    /// chip axis, [`move_rel_x_long`](Self::move_rel_x_long) otherwise.
    pub fn move_rel_xc_long(
        &mut self,
        input_um: f64,
        output_um: Option<f64>,
        centre_um: Option<f64>,
    ) -> AlignResult<LongMove> {
        if self.input.chip().is_some() && self.output.chip().is_some() {
            self.move_rel_c_long(input_um, output_um, centre_um)
        } else {
            self.move_rel_x_long(input_um, output_um, centre_um)
        }
    }

    fn fibre_chip_moves(&self, role: StageRole, distance: f64) -> AlignResult<[f64; 3]> {
        let stage = self.stage(role);
        stage
            .chip()
            .map(|chip| chip.component_moves(distance))
            .ok_or_else(|| AlignError::config(format!("stage `{}` has no chip axis", stage.name())))
    }
}

impl AxisResolver for Stages3 {
    fn resolve(&self, id: AxisId) -> AlignResult<&Axis> {
        resolve_on(id.stage.map(|role| self.stage(role)), id)
    }

    fn resolve_mut(&mut self, id: AxisId) -> AlignResult<&mut Axis> {
        let stage = match id.stage {
            Some(role) => Some(self.stage_mut(role)),
            None => None,
        };
        resolve_on_mut(stage, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockAxisTransport, TransportJournal};
    use crate::stage::axis::{AxisConfig, AxisLimits};

    const START_NM: f64 = 5_000_000.0;

    fn stage(name: &str, journal: &TransportJournal) -> Stage {
        let limits = AxisLimits::new(0.0, 10_000_000.0).unwrap();
        let mut builder = Stage::builder(name);
        for role in AxisRole::LINEAR {
            let channel = format!("{}.{}", name, role);
            let transport =
                Arc::new(MockAxisTransport::new(channel.clone(), START_NM).with_journal(journal.clone()));
            builder = builder.axis(role, Axis::new(AxisConfig::linear(channel, limits), transport).unwrap());
        }
        builder.build().unwrap()
    }

    fn rig2() -> (Stages2, TransportJournal) {
        let journal = TransportJournal::new();
        let rig = Stages2::new(stage("input", &journal), stage("output", &journal));
        journal.clear();
        (rig, journal)
    }

    fn rig3() -> (Stages3, TransportJournal) {
        let journal = TransportJournal::new();
        let rig = Stages3::new(
            stage("input", &journal),
            stage("output", &journal),
            stage("chip", &journal),
        );
        journal.clear();
        (rig, journal)
    }

    #[test]
    fn pop_on_empty_stack_fails() {
        let (mut rig, journal) = rig2();
        let err = rig.pop_pos_xyz_stack(true).unwrap_err();
        assert!(matches!(err, AlignError::EmptyStack));
        assert!(journal.moves().is_empty());
    }

    #[test]
    fn push_pop_without_moves_is_silent_when_not_retracting() {
        let (mut rig, journal) = rig2();
        assert_eq!(rig.push_pos_xyz_stack().unwrap(), 1);
        assert_eq!(rig.pop_pos_xyz_stack(false).unwrap(), 0);
        assert!(journal.moves().is_empty());
    }

    #[test]
    fn centring_defaults_to_half_span() {
        let (mut rig, journal) = rig2();
        rig.input_mut().require_axis_mut(AxisRole::X).unwrap().move_abs_um(4_000.0).unwrap();
        rig.output_mut().require_axis_mut(AxisRole::X).unwrap().move_abs_um(3_000.0).unwrap();
        journal.clear();

        let dx = rig.ctr_in_out_x_axes(None).unwrap();
        assert_eq!(dx, 1_500.0);
        assert_eq!(
            journal.moves(),
            vec![
                ("input.z".to_string(), 4_980_000.0),
                ("output.z".to_string(), 4_980_000.0),
                ("input.x".to_string(), 5_500_000.0),
                ("output.x".to_string(), 4_500_000.0),
                ("input.z".to_string(), START_NM),
                ("output.z".to_string(), START_NM),
            ]
        );
    }

    #[test]
    fn centring_follows_with_chip_stage() {
        let (mut rig, journal) = rig3();
        let (dx, dy) = rig.ctr_in_out_xy_axes(Some(4_000.0), Some(5_500.0)).unwrap();
        assert_eq!((dx, dy), (-1_000.0, 500.0));
        assert_eq!(journal.moves_for("chip.z"), vec![4_000_000.0]);
        assert_eq!(journal.moves_for("chip.y"), vec![5_500_000.0]);
        assert!(journal.moves_for("chip.x").is_empty());
    }

    #[test]
    fn long_x_move_goes_through_chip() {
        let (mut rig, journal) = rig3();
        let moves = rig.move_rel_x_long(1_000.0, None, Some(5_000.0)).unwrap();
        assert_eq!(
            moves,
            LongMove {
                input_x: 0.0,
                output_x: 0.0,
                chip_z: 1_000.0
            }
        );
        assert_eq!(journal.moves_for("chip.z"), vec![6_000_000.0]);
        assert!(journal.moves_for("input.x").is_empty());
        assert_eq!(journal.moves_for("input.z"), vec![4_980_000.0, START_NM]);
    }

    #[test]
    fn long_x_move_rejects_diverging_targets() {
        let (mut rig, journal) = rig3();
        let err = rig.move_rel_x_long(0.0, Some(20_000.0), None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(journal.moves().is_empty());
    }

    #[test]
    fn rig_resolves_axes_by_role() {
        let (mut rig, _) = rig3();
        assert_eq!(rig.resolve(AxisId::chip(AxisRole::Y)).unwrap().name(), "chip.y");
        assert!(rig.resolve_mut(AxisId::local(AxisRole::X)).is_err());

        let (rig2, _) = rig2();
        assert!(rig2.resolve(AxisId::chip(AxisRole::X)).is_err());
    }
}
