//! Relative scan patterns.
//!
//! A [`Pattern`] is a pure function of its shape parameters: a list of relative
//! coordinates (µm or degrees per axis) with `(0, …, 0)` at the position the
//! scan starts from. Patterns carry their nesting shape so rectangle rows can be
//! inspected, e.g. `(rows, points_per_row, 2)` for a rectangle.
//!
//! | Shape | Dimensions | Layout |
//! |-------|------------|--------|
//! | [`RectangleShape`] | 2 | rows along axis 2, points along axis 1, meander |
//! | [`LineShape`] | 1 | `n` points anchored at the centre, left or right end |
//! | [`CrossShape`] | 2 | a line on axis 1 then a line on axis 2 |
//! | [`DiamondShape`] | 2 | a rectangle rotated by 45° |

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use std::fmt;

use crate::error::{AlignError, AlignResult};

// =============================================================================
// Origins
// =============================================================================

/// Where a line pattern sits relative to the starting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrigin {
    /// Start position in the middle of the line.
    #[default]
    Centre,
    /// Start position at the first point; the line extends along `step`.
    Left,
    /// Start position at the last point.
    Right,
}

/// Which point of a rectangle sits at the starting position.
///
/// Left/right refer to the ends of axis 1, bottom/top to the ends of axis 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectOrigin {
    /// Centre of the grid.
    #[default]
    Centre,
    /// First axis-1 point, last axis-2 row.
    TopLeft,
    /// Last axis-1 point, last axis-2 row.
    TopRight,
    /// First axis-1 point, first axis-2 row.
    BottomLeft,
    /// Last axis-1 point, first axis-2 row.
    BottomRight,
    /// Middle of the last axis-2 row.
    TopMiddle,
    /// Middle of the first axis-2 row.
    BottomMiddle,
    /// First axis-1 point, middle row.
    LeftMiddle,
    /// Last axis-1 point, middle row.
    RightMiddle,
}

impl RectOrigin {
    /// Anchor as a fraction of the half-extent along each axis, in `{-1, 0, 1}`.
    fn anchor(self) -> (f64, f64) {
        match self {
            RectOrigin::Centre => (0.0, 0.0),
            RectOrigin::TopLeft => (-1.0, 1.0),
            RectOrigin::TopRight => (1.0, 1.0),
            RectOrigin::BottomLeft => (-1.0, -1.0),
            RectOrigin::BottomRight => (1.0, -1.0),
            RectOrigin::TopMiddle => (0.0, 1.0),
            RectOrigin::BottomMiddle => (0.0, -1.0),
            RectOrigin::LeftMiddle => (-1.0, 0.0),
            RectOrigin::RightMiddle => (1.0, 0.0),
        }
    }
}

// =============================================================================
// Shapes
// =============================================================================

/// Rectangular grid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectangleShape {
    /// Points along axis 1 (per row).
    pub axis_1_pts: usize,
    /// Rows along axis 2.
    pub axis_2_pts: usize,
    /// Spacing along axis 1.
    pub axis_1_step: f64,
    /// Spacing along axis 2.
    pub axis_2_step: f64,
    /// Reverse every other row, starting with the first.
    pub meander: bool,
    /// Point placed at the starting position.
    pub origin: RectOrigin,
}

impl RectangleShape {
    /// Centred, meandering grid.
    pub fn new(axis_1_pts: usize, axis_2_pts: usize, axis_1_step: f64, axis_2_step: f64) -> Self {
        Self {
            axis_1_pts,
            axis_2_pts,
            axis_1_step,
            axis_2_step,
            meander: true,
            origin: RectOrigin::Centre,
        }
    }

    /// Enable or disable meandering.
    pub fn meander(mut self, meander: bool) -> Self {
        self.meander = meander;
        self
    }

    /// Set the anchor point.
    pub fn origin(mut self, origin: RectOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// One-dimensional line parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    /// Number of points.
    pub pts: usize,
    /// Spacing; negative steps walk backwards.
    pub step: f64,
    /// Anchor.
    pub origin: LineOrigin,
}

impl LineShape {
    /// Centred line.
    pub fn new(pts: usize, step: f64) -> Self {
        Self {
            pts,
            step,
            origin: LineOrigin::Centre,
        }
    }

    /// Set the anchor.
    pub fn origin(mut self, origin: LineOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Cross parameters: a centred line on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossShape {
    /// Points on axis 1.
    pub axis_1_pts: usize,
    /// Points on axis 2.
    pub axis_2_pts: usize,
    /// Spacing on axis 1.
    pub axis_1_step: f64,
    /// Spacing on axis 2.
    pub axis_2_step: f64,
}

impl CrossShape {
    /// Cross with the given arm lengths.
    pub fn new(axis_1_pts: usize, axis_2_pts: usize, axis_1_step: f64, axis_2_step: f64) -> Self {
        Self {
            axis_1_pts,
            axis_2_pts,
            axis_1_step,
            axis_2_step,
        }
    }
}

/// Diamond parameters: a centred rectangle rotated by 45°.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiamondShape {
    /// Points along the first rotated axis.
    pub axis_1_pts: usize,
    /// Rows along the second rotated axis.
    pub axis_2_pts: usize,
    /// Spacing along the first rotated axis.
    pub axis_1_step: f64,
    /// Spacing along the second rotated axis.
    pub axis_2_step: f64,
    /// Reverse every other row.
    pub meander: bool,
}

impl DiamondShape {
    /// Meandering diamond.
    pub fn new(axis_1_pts: usize, axis_2_pts: usize, axis_1_step: f64, axis_2_step: f64) -> Self {
        Self {
            axis_1_pts,
            axis_2_pts,
            axis_1_step,
            axis_2_step,
            meander: true,
        }
    }
}

/// Any supported scan shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ScanShape {
    /// See [`RectangleShape`].
    Rectangle(RectangleShape),
    /// See [`LineShape`].
    Line(LineShape),
    /// See [`CrossShape`].
    Cross(CrossShape),
    /// See [`DiamondShape`].
    Diamond(DiamondShape),
}

impl ScanShape {
    /// Number of axes the shape drives.
    pub fn dimensions(&self) -> usize {
        match self {
            ScanShape::Line(_) => 1,
            ScanShape::Rectangle(_) | ScanShape::Cross(_) | ScanShape::Diamond(_) => 2,
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            ScanShape::Rectangle(_) => "Rectangle",
            ScanShape::Line(_) => "Line",
            ScanShape::Cross(_) => "Cross",
            ScanShape::Diamond(_) => "Diamond",
        }
    }

    /// Generate the relative pattern.
    pub fn pattern(&self) -> AlignResult<Pattern> {
        match self {
            ScanShape::Rectangle(shape) => Pattern::rectangle(shape),
            ScanShape::Line(shape) => Pattern::line(shape),
            ScanShape::Cross(shape) => Pattern::cross(shape),
            ScanShape::Diamond(shape) => Pattern::diamond(shape),
        }
    }
}

impl fmt::Display for ScanShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! impl_from_shape {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for ScanShape {
                fn from(shape: $ty) -> Self {
                    ScanShape::$variant(shape)
                }
            }
        )*
    };
}

impl_from_shape!(
    Rectangle(RectangleShape),
    Line(LineShape),
    Cross(CrossShape),
    Diamond(DiamondShape),
);

// =============================================================================
// Pattern
// =============================================================================

/// Relative coordinates of a scan, flattened in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    shape: Vec<usize>,
    points: Vec<Vec<f64>>,
}

fn check_axis(label: &str, pts: usize, step: f64) -> AlignResult<()> {
    if pts == 0 {
        return Err(AlignError::config(format!("{} needs at least one point", label)));
    }
    if !step.is_finite() {
        return Err(AlignError::config(format!("{} step must be finite, got {}", label, step)));
    }
    if pts > 1 && step == 0.0 {
        return Err(AlignError::config(format!("{} step must be non-zero", label)));
    }
    Ok(())
}

/// Points `-d/2 + i * step`, `d = (pts - 1) * step`.
fn centred(pts: usize, step: f64) -> Vec<f64> {
    let half = (pts - 1) as f64 * step / 2.0;
    (0..pts).map(|i| i as f64 * step - half).collect()
}

impl Pattern {
    fn rows(points: Vec<Vec<Vec<f64>>>) -> Self {
        let rows = points.len();
        let per_row = points.first().map_or(0, Vec::len);
        let dims = points
            .first()
            .and_then(|row| row.first())
            .map_or(0, Vec::len);
        Self {
            shape: vec![rows, per_row, dims],
            points: points.into_iter().flatten().collect(),
        }
    }

    /// Rectangular grid.
    ///
    /// Row `r` holds axis-2 value `-d2/2 + r*step2`; within a row axis 1 runs
    /// `-d1/2 + i*step1`. With meander the first row is reversed, then every
    /// other row after it.
    pub fn rectangle(shape: &RectangleShape) -> AlignResult<Self> {
        check_axis("rectangle axis 1", shape.axis_1_pts, shape.axis_1_step)?;
        check_axis("rectangle axis 2", shape.axis_2_pts, shape.axis_2_step)?;

        let (anchor_1, anchor_2) = shape.origin.anchor();
        let half_1 = (shape.axis_1_pts - 1) as f64 * shape.axis_1_step / 2.0;
        let half_2 = (shape.axis_2_pts - 1) as f64 * shape.axis_2_step / 2.0;
        let shift = [-anchor_1 * half_1, -anchor_2 * half_2];

        let axis_1 = centred(shape.axis_1_pts, shape.axis_1_step);
        let rows = centred(shape.axis_2_pts, shape.axis_2_step)
            .into_iter()
            .enumerate()
            .map(|(r, v2)| {
                let mut row: Vec<Vec<f64>> = axis_1
                    .iter()
                    .map(|v1| vec![v1 + shift[0], v2 + shift[1]])
                    .collect();
                if shape.meander && r % 2 == 0 {
                    row.reverse();
                }
                row
            })
            .collect();
        Ok(Self::rows(rows))
    }

    /// Line of `pts` points.
    ///
    /// Points are `i*step`, shifted by half the last point (centre), the last
    /// point (right) or nothing (left).
    pub fn line(shape: &LineShape) -> AlignResult<Self> {
        Ok(Self {
            shape: vec![shape.pts, 1],
            points: line_points(shape)?.into_iter().map(|p| vec![p]).collect(),
        })
    }

    /// Centred line on axis 1 (axis 2 held at 0) followed by a centred line on
    /// axis 2 (axis 1 held at 0).
    pub fn cross(shape: &CrossShape) -> AlignResult<Self> {
        let line_1 = line_points(&LineShape::new(shape.axis_1_pts, shape.axis_1_step))?;
        let line_2 = line_points(&LineShape::new(shape.axis_2_pts, shape.axis_2_step))?;
        let points: Vec<Vec<f64>> = line_1
            .into_iter()
            .map(|p| vec![p, 0.0])
            .chain(line_2.into_iter().map(|p| vec![0.0, p]))
            .collect();
        Ok(Self {
            shape: vec![points.len(), 2],
            points,
        })
    }

    /// Centred rectangle with every point rotated by 45°:
    /// `(p1 cos + p2 sin, -p1 sin + p2 cos)`.
    pub fn diamond(shape: &DiamondShape) -> AlignResult<Self> {
        let rectangle = RectangleShape::new(
            shape.axis_1_pts,
            shape.axis_2_pts,
            shape.axis_1_step,
            shape.axis_2_step,
        )
        .meander(shape.meander);
        let mut pattern = Self::rectangle(&rectangle)?;
        let (s, c) = FRAC_PI_4.sin_cos();
        for point in &mut pattern.points {
            let (p1, p2) = (point[0], point[1]);
            point[0] = p1 * c + p2 * s;
            point[1] = -p1 * s + p2 * c;
        }
        Ok(pattern)
    }

    /// Nesting shape, innermost dimension last (always the axis count).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Coordinates in traversal order.
    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    /// Number of coordinates.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Never true for a validly constructed pattern.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rows of a rectangular pattern (a single row otherwise).
    pub fn row_chunks(&self) -> impl Iterator<Item = &[Vec<f64>]> {
        let per_row = if self.shape.len() == 3 {
            self.shape[1]
        } else {
            self.points.len()
        };
        self.points.chunks(per_row.max(1))
    }
}

fn line_points(shape: &LineShape) -> AlignResult<Vec<f64>> {
    check_axis("line", shape.pts, shape.step)?;
    let last = (shape.pts - 1) as f64 * shape.step;
    let shift = match shape.origin {
        LineOrigin::Centre => last / 2.0,
        LineOrigin::Right => last,
        LineOrigin::Left => 0.0,
    };
    Ok((0..shape.pts).map(|i| i as f64 * shape.step - shift).collect())
}
