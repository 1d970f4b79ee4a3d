//! The canonical unsignalized crossroads used by the scenarios: two
//! vertical lanes of opposing traffic crossing one westbound lane, hemmed
//! in by four road shoulders.

use crate::decision::Completion;
use crate::lane::{Axis, Lane, OffRoadSide, Shoulder};
use crate::math::Point2d;

/// Extent of the vertical lanes in m.
const VERTICAL_EXTENT: f64 = 120.0;

/// Extent of the westbound lane in m.
const HORIZONTAL_EXTENT: f64 = 80.0;

/// The crossroads layout.
///
/// Northbound traffic runs on x = 40, southbound on x = 37, and the exit
/// lane westbound along y = 30. The road is bounded by shoulders at
/// x = 35.5 and 41.5 and at y = 28.5 and 31.5.
#[derive(Clone, Debug)]
pub struct Intersection {
    northbound: Lane,
    southbound: Lane,
    westbound: Lane,
    shoulders: [Shoulder; 4],
}

impl Default for Intersection {
    fn default() -> Self {
        Self::new()
    }
}

impl Intersection {
    pub const LANE_WIDTH: f64 = 3.0;

    pub fn new() -> Self {
        Self {
            northbound: Lane::new(
                Point2d::new(40.0, 0.0),
                Point2d::new(40.0, VERTICAL_EXTENT),
                Self::LANE_WIDTH,
            ),
            southbound: Lane::new(
                Point2d::new(37.0, VERTICAL_EXTENT),
                Point2d::new(37.0, 0.0),
                Self::LANE_WIDTH,
            ),
            westbound: Lane::new(
                Point2d::new(HORIZONTAL_EXTENT, 30.0),
                Point2d::new(0.0, 30.0),
                Self::LANE_WIDTH,
            ),
            shoulders: [
                Shoulder::new(35.5, OffRoadSide::Left),
                Shoulder::new(41.5, OffRoadSide::Right),
                Shoulder::new(31.5, OffRoadSide::Above),
                Shoulder::new(28.5, OffRoadSide::Below),
            ],
        }
    }

    /// The northbound approach lane.
    pub fn northbound(&self) -> &Lane {
        &self.northbound
    }

    /// The southbound lane carrying oncoming traffic.
    pub fn southbound(&self) -> &Lane {
        &self.southbound
    }

    /// The westbound exit lane.
    pub fn westbound(&self) -> &Lane {
        &self.westbound
    }

    /// All lanes of the crossroads.
    pub fn all_lanes(&self) -> Vec<Lane> {
        vec![
            self.northbound.clone(),
            self.southbound.clone(),
            self.westbound.clone(),
        ]
    }

    /// The four road shoulders.
    ///
    /// Scenarios usually hand each agent only the shoulders bounding its
    /// own manoeuvre; a turning vehicle must be free to cross a boundary
    /// that merely ends the road it is leaving.
    pub fn shoulders(&self) -> &[Shoulder] {
        &self.shoulders
    }

    /// The left boundary of the vertical road, off-road at x < 35.5.
    pub fn shoulder_left(&self) -> Shoulder {
        self.shoulders[0]
    }

    /// The right boundary of the vertical road, off-road at x > 41.5.
    pub fn shoulder_right(&self) -> Shoulder {
        self.shoulders[1]
    }

    /// The far boundary of the westbound road, off-road at y > 31.5.
    pub fn shoulder_above(&self) -> Shoulder {
        self.shoulders[2]
    }

    /// The near boundary of the westbound road, off-road at y < 28.5.
    pub fn shoulder_below(&self) -> Shoulder {
        self.shoulders[3]
    }

    /// Completion criterion for a left turn from the northbound approach
    /// onto the westbound lane: the junction box ends once the vehicle is
    /// clear of the vertical road.
    pub fn left_turn_exit(&self) -> Completion {
        Completion::ExitLine {
            axis: Axis::Vertical,
            coord: 34.0,
            decreasing: true,
        }
    }
}
