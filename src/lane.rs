//! Lane and road-shoulder geometry, and the scalar features they expose
//! to the trajectory optimizer.

use crate::math::{sigmoid, Point2d, Vector2d};
use crate::vehicle::VehicleState;
use cgmath::prelude::*;

/// A world axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// A straight lane: a centreline between two points, with a width.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lane {
    p0: Point2d,
    p1: Point2d,
    width: f64,
}

impl Lane {
    /// Creates a lane with the given centreline endpoints and width.
    pub fn new(p0: Point2d, p1: Point2d, width: f64) -> Self {
        Self { p0, p1, width }
    }

    /// The start of the centreline.
    pub fn p0(&self) -> Point2d {
        self.p0
    }

    /// The end of the centreline.
    pub fn p1(&self) -> Point2d {
        self.p1
    }

    /// The lane width in m.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Signed perpendicular offset of a position from the centreline.
    pub fn centre_offset(&self, pos: Point2d) -> f64 {
        let dir = (self.p1 - self.p0).normalize();
        let normal = Vector2d::new(-dir.y, dir.x);
        (pos - self.p0).dot(normal)
    }

    /// Lane-centre attraction feature over a batch of states.
    ///
    /// Each state contributes a value in (0, 1]: maximal on the centreline,
    /// decaying with the squared lateral offset at the given steepness.
    pub fn attraction(&self, steepness: f64, states: &[VehicleState]) -> f64 {
        states
            .iter()
            .map(|s| (-steepness * self.centre_offset(s.position()).powi(2)).exp())
            .sum()
    }
}

/// Which side of a shoulder boundary is off-road.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OffRoadSide {
    Above,
    Below,
    Left,
    Right,
}

/// An axis-aligned road boundary with a fixed off-road side.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shoulder {
    axis: Axis,
    coord: f64,
    /// Orientation of the repulsion sigmoid; fixed by the off-road side.
    sign: f64,
}

impl Shoulder {
    /// Creates a shoulder at the given coordinate; the boundary line runs
    /// perpendicular to the axis the off-road side refers to.
    pub fn new(coord: f64, off_road: OffRoadSide) -> Self {
        let (axis, sign) = match off_road {
            OffRoadSide::Above => (Axis::Horizontal, -1.0),
            OffRoadSide::Below => (Axis::Horizontal, 1.0),
            OffRoadSide::Left => (Axis::Vertical, 1.0),
            OffRoadSide::Right => (Axis::Vertical, -1.0),
        };
        Self { axis, coord, sign }
    }

    /// The boundary coordinate in m.
    pub fn coord(&self) -> f64 {
        self.coord
    }

    /// The axis perpendicular to the boundary line.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Shoulder repulsion feature over a batch of states.
    ///
    /// Each state contributes a value in (0, 1), approaching 1 past the
    /// boundary on the off-road side and 0 well inside the road.
    pub fn repulsion(&self, steepness: f64, states: &[VehicleState]) -> f64 {
        states
            .iter()
            .map(|s| {
                let coord = match self.axis {
                    Axis::Horizontal => s.y,
                    Axis::Vertical => s.x,
                };
                sigmoid(self.sign * steepness * (self.coord - coord))
            })
            .sum()
    }
}
