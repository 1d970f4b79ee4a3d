//! Stateless cost features over a planned state trajectory.
//!
//! Every feature is a pure, closed-form differentiable function of a batch
//! of states (and, for the effort term, controls); the optimizer forms its
//! objective as a weighted sum of these. None of them may branch on the
//! decision variables; the only branches are on fixed configuration such as
//! a shoulder's side flag.

use crate::lane::{Lane, Shoulder};
use crate::math::{self, Point2d};
use crate::vehicle::{ControlInput, VehicleState};
use itertools::izip;

/// Steepness of the lane-centre attraction feature.
pub const LANE_STEEPNESS: f64 = 0.2;

/// Steepness of the shoulder repulsion sigmoid.
pub const SHOULDER_STEEPNESS: f64 = 2.5;

/// Sum of squared deviations from the desired speed.
pub fn speed_tracking(states: &[VehicleState], desired: f64) -> f64 {
    states.iter().map(|s| (s.speed - desired).powi(2)).sum()
}

/// Sum of squared deviations from a fixed target heading. Only meaningful
/// when a fixed heading is, e.g. the direction of travel after a turn.
pub fn heading_tracking(states: &[VehicleState], desired: f64) -> f64 {
    states.iter().map(|s| (s.heading - desired).powi(2)).sum()
}

/// Summed lane-centre attraction over a list of lanes.
pub fn lane_attraction(states: &[VehicleState], lanes: &[Lane], steepness: f64) -> f64 {
    lanes.iter().map(|lane| lane.attraction(steepness, states)).sum()
}

/// Summed shoulder repulsion over a list of shoulders.
pub fn shoulder_repulsion(states: &[VehicleState], shoulders: &[Shoulder], steepness: f64) -> f64 {
    shoulders
        .iter()
        .map(|shoulder| shoulder.repulsion(steepness, states))
        .sum()
}

/// The predicted motion of one neighbouring vehicle over the horizon,
/// together with the footprint of its collision Gaussian.
#[derive(Clone, Debug)]
pub struct ObstacleTrack {
    /// Predicted centre positions, one per horizon state.
    pub positions: Vec<Point2d>,
    /// The neighbour's heading, assumed constant over the horizon.
    pub heading: f64,
    /// Standard deviation along the neighbour's body, roughly half its length.
    pub sigma_long: f64,
    /// Standard deviation across the neighbour's body, roughly half its width.
    pub sigma_lat: f64,
}

/// Pairwise collision cost against one obstacle track.
///
/// The position delta is evaluated in the obstacle's heading-aligned frame,
/// scaled by independent along-body and across-body deviations: an oncoming
/// car presents a narrow profile head-on and a wide profile broadside, so
/// the cost is deliberately oriented to the obstacle, not the ego vehicle.
pub fn collision(states: &[VehicleState], track: &ObstacleTrack) -> f64 {
    izip!(states, &track.positions)
        .map(|(s, p)| {
            let local = math::into_frame(s.position(), *p, track.heading);
            math::gaussian(local.x, track.sigma_long) * math::gaussian(local.y, track.sigma_lat)
        })
        .sum()
}

/// Quadratic control effort Σ uᵀRu with a diagonal R.
///
/// The diagonal is deliberately asymmetric: weighting braking below
/// accelerating biases the optimizer toward braking over swerving when
/// in doubt.
pub fn control_effort(controls: &[ControlInput], r: &[f64; 3]) -> f64 {
    controls
        .iter()
        .map(|u| {
            r[0] * u.accelerate * u.accelerate + r[1] * u.brake * u.brake + r[2] * u.steer * u.steer
        })
        .sum()
}
