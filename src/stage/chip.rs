//! Derived axis along a chip waveguide.
//!
//! A [`ChipAxis`] is a straight line through two calibration points `c1` and
//! `c2` (µm, stage coordinates). A scalar distance along the line is decomposed
//! into relative x/y/z moves of the owning [`Stage`](super::Stage), scaled so that
//! the x component of the direction vector is always `±e`, where `e` is `1` or
//! `|c2 - c1| / mask` when a distance mask is supplied.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::stage::AxisRole;
use crate::error::{AlignError, AlignResult};

/// Two measured points on a chip plus the chip stage's z position at each.
///
/// The x coordinate of each point is re-expressed relative to the chip stage
/// before the axis is built: `x' = -x + z_chip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipCalibration {
    /// First point `(x, y, z)` in µm.
    pub c1: [f64; 3],
    /// Second point `(x, y, z)` in µm.
    pub c2: [f64; 3],
    /// Chip stage z (µm) when `c1` was measured.
    pub c1_z_chip: f64,
    /// Chip stage z (µm) when `c2` was measured.
    pub c2_z_chip: f64,
    /// Physical c1→c2 distance on the mask, µm.
    #[serde(default)]
    pub distance_mask_um: Option<f64>,
    /// Negate the direction of travel.
    #[serde(default)]
    pub reversed: bool,
}

/// Line through two calibration points, driven through the owning stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipAxis {
    c1: Vector3<f64>,
    c2: Vector3<f64>,
    length: f64,
    scale: f64,
    direction: Vector3<f64>,
}

impl ChipAxis {
    /// Build from two points (µm).
    ///
    /// Fails when the points share an x coordinate, since the direction is
    /// normalised by its x component.
    pub fn new(
        c1: [f64; 3],
        c2: [f64; 3],
        distance_mask_um: Option<f64>,
        reversed: bool,
    ) -> AlignResult<Self> {
        let c1 = Vector3::from(c1);
        let c2 = Vector3::from(c2);
        let c1c2 = c2 - c1;
        if !c1c2.iter().all(|v| v.is_finite()) {
            return Err(AlignError::config("chip calibration points must be finite"));
        }
        if c1c2.x == 0.0 {
            return Err(AlignError::config(
                "chip calibration points share an x coordinate; the c-axis is undefined",
            ));
        }

        let length = c1c2.norm();
        let scale = match distance_mask_um {
            Some(mask) if mask > 0.0 => length / mask,
            Some(mask) => {
                return Err(AlignError::config(format!(
                    "chip distance mask must be positive, got {}",
                    mask
                )))
            }
            None => 1.0,
        };
        let sign = if reversed { -1.0 } else { 1.0 };
        let direction = c1c2 / c1c2.x * scale * sign;

        Ok(Self {
            c1,
            c2,
            length,
            scale,
            direction,
        })
    }

    /// Build from a calibration record, applying `x' = -x + z_chip`.
    pub fn from_calibration(calibration: &ChipCalibration) -> AlignResult<Self> {
        let mut c1 = calibration.c1;
        let mut c2 = calibration.c2;
        c1[0] = -c1[0] + calibration.c1_z_chip;
        c2[0] = -c2[0] + calibration.c2_z_chip;
        Self::new(
            c1,
            c2,
            calibration.distance_mask_um,
            calibration.reversed,
        )
    }

    /// First calibration point, µm.
    pub fn c1(&self) -> [f64; 3] {
        self.c1.into()
    }

    /// Second calibration point, µm.
    pub fn c2(&self) -> [f64; 3] {
        self.c2.into()
    }

    /// Distance from `c1` to `c2`, µm.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// `1`, or the ratio of the measured length to the mask length.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Direction vector, x component equal to `scale` (`-scale` when reversed).
    pub fn direction(&self) -> [f64; 3] {
        self.direction.into()
    }

    /// Relative x/y/z displacement (µm) for `distance` µm along the axis.
    pub fn component_moves(&self, distance: f64) -> [f64; 3] {
        (self.direction * distance).into()
    }

    /// Component moves in execution order.
    ///
    /// When the z component is negative z moves first, otherwise x does; y is
    /// always last.
    pub fn ordered_moves(&self, distance: f64) -> [(AxisRole, f64); 3] {
        let [x, y, z] = self.component_moves(distance);
        if z < 0.0 {
            [(AxisRole::Z, z), (AxisRole::X, x), (AxisRole::Y, y)]
        } else {
            [(AxisRole::X, x), (AxisRole::Z, z), (AxisRole::Y, y)]
        }
    }

    /// Euclidean distance from `c1` to `point` (µm).
    pub fn distance_from_c1(&self, point: [f64; 3]) -> f64 {
        (Vector3::from(point) - self.c1).norm()
    }

    /// Euclidean distance from `c2` to `point` (µm).
    pub fn distance_from_c2(&self, point: [f64; 3]) -> f64 {
        (Vector3::from(point) - self.c2).norm()
    }
}
