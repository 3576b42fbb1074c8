//! Addressing axes across a rig.
//!
//! Scans never hold axes. They carry [`AxisId`]s and look them up through an
//! [`AxisResolver`] each time they run, so the same scan can be reused against
//! any stage or rig that provides the named axes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::axis::Axis;
use super::rig::StageRole;
use super::stage::{AxisRole, Stage};
use crate::error::{AlignError, AlignResult};

/// Identifies one axis: an optional stage role plus a logical axis role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AxisId {
    /// Stage within a rig; `None` when addressing a lone [`Stage`].
    pub stage: Option<StageRole>,
    /// Logical role on that stage.
    pub role: AxisRole,
}

impl AxisId {
    /// Axis of a lone stage.
    pub const fn local(role: AxisRole) -> Self {
        Self { stage: None, role }
    }

    /// Axis of a stage within a rig.
    pub const fn on(stage: StageRole, role: AxisRole) -> Self {
        Self {
            stage: Some(stage),
            role,
        }
    }

    /// Axis of the input stage.
    pub const fn input(role: AxisRole) -> Self {
        Self::on(StageRole::Input, role)
    }

    /// Axis of the output stage.
    pub const fn output(role: AxisRole) -> Self {
        Self::on(StageRole::Output, role)
    }

    /// Axis of the chip stage.
    pub const fn chip(role: AxisRole) -> Self {
        Self::on(StageRole::Chip, role)
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}.{}", stage, self.role),
            None => write!(f, "{}", self.role),
        }
    }
}

impl FromStr for AxisId {
    type Err = AlignError;

    /// Parses `x` or `input.x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((stage, role)) => Ok(Self::on(stage.parse()?, role.parse()?)),
            None => Ok(Self::local(s.parse()?)),
        }
    }
}

/// Something axes can be looked up in.
pub trait AxisResolver {
    /// Shared access to an axis.
    fn resolve(&self, id: AxisId) -> AlignResult<&Axis>;

    /// Exclusive access to an axis.
    fn resolve_mut(&mut self, id: AxisId) -> AlignResult<&mut Axis>;
}

impl AxisResolver for Stage {
    fn resolve(&self, id: AxisId) -> AlignResult<&Axis> {
        reject_stage_role(&id)?;
        self.require_axis(id.role)
    }

    fn resolve_mut(&mut self, id: AxisId) -> AlignResult<&mut Axis> {
        reject_stage_role(&id)?;
        self.require_axis_mut(id.role)
    }
}

fn reject_stage_role(id: &AxisId) -> AlignResult<()> {
    match id.stage {
        None => Ok(()),
        Some(_) => Err(AlignError::config(format!(
            "axis `{}` names a stage role, but the target is a single stage",
            id
        ))),
    }
}

/// Resolve `id` on a rig stage, after the rig has looked up `id.stage`.
pub(crate) fn resolve_on<'a>(stage: Option<&'a Stage>, id: AxisId) -> AlignResult<&'a Axis> {
    stage
        .ok_or_else(|| missing_stage(&id))?
        .require_axis(id.role)
}

pub(crate) fn resolve_on_mut<'a>(
    stage: Option<&'a mut Stage>,
    id: AxisId,
) -> AlignResult<&'a mut Axis> {
    stage
        .ok_or_else(|| missing_stage(&id))?
        .require_axis_mut(id.role)
}

fn missing_stage(id: &AxisId) -> AlignError {
    match id.stage {
        Some(stage) => AlignError::config(format!("rig has no `{}` stage (axis `{}`)", stage, id)),
        None => AlignError::config(format!("axis `{}` needs a stage role on a rig", id)),
    }
}
