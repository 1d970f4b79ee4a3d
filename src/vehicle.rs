//! Vehicles: physical attributes, ground-truth state, control policy and
//! the per-vehicle trajectory log.

pub use dynamics::{BicycleModel, ControlInput, VehicleState};
pub use policy::{ControlPolicy, GatedMpc};

use crate::error::ConfigurationError;
use crate::simulation::Snapshot;
use crate::util::Interval;

mod dynamics;
mod policy;

/// Static physical attributes of a vehicle.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleAttributes {
    /// Body width in m.
    pub width: f64,
    /// Body length in m.
    pub length: f64,
    /// Range of achievable speeds in m/s.
    pub speed_range: Interval,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            width: 1.8,
            length: 4.0,
            speed_range: Interval::new(0.0, 30.0),
        }
    }
}

/// One tick's entry in a vehicle's trajectory log.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectorySample {
    /// Simulation time in s.
    pub time: f64,
    /// State after the tick's control was applied.
    pub state: VehicleState,
    /// The control that was applied.
    pub control: ControlInput,
}

/// The applied state and control history of one vehicle, appended to once
/// per tick. The first sample holds the initial state under a zero control.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryLog {
    samples: Vec<TrajectorySample>,
}

impl TrajectoryLog {
    /// All samples in time order.
    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    /// The most recent sample.
    pub fn last(&self) -> Option<&TrajectorySample> {
        self.samples.last()
    }

    fn push(&mut self, sample: TrajectorySample) {
        self.samples.push(sample);
    }
}

/// A simulated vehicle.
pub struct Vehicle {
    attributes: VehicleAttributes,
    state: VehicleState,
    policy: ControlPolicy,
    log: TrajectoryLog,
}

impl Vehicle {
    /// Creates a vehicle, validating its attributes and clamping the
    /// initial speed into the achievable range.
    pub fn new(
        attributes: VehicleAttributes,
        state: VehicleState,
        policy: ControlPolicy,
    ) -> Result<Self, ConfigurationError> {
        if !(attributes.length.is_finite() && attributes.length > 0.0) {
            return Err(ConfigurationError::VehicleLength(attributes.length));
        }
        if !(attributes.width.is_finite() && attributes.width > 0.0) {
            return Err(ConfigurationError::VehicleWidth(attributes.width));
        }
        if !attributes.speed_range.is_well_formed() {
            return Err(ConfigurationError::SpeedRange {
                min: attributes.speed_range.min,
                max: attributes.speed_range.max,
            });
        }
        let state = VehicleState {
            speed: attributes.speed_range.clamp(state.speed),
            ..state
        };
        let mut log = TrajectoryLog::default();
        log.push(TrajectorySample {
            time: 0.0,
            state,
            control: ControlInput::HOLD,
        });
        Ok(Self {
            attributes,
            state,
            policy,
            log,
        })
    }

    /// The vehicle's static attributes.
    pub fn attributes(&self) -> &VehicleAttributes {
        &self.attributes
    }

    /// The current ground-truth state.
    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// The applied trajectory so far.
    pub fn log(&self) -> &TrajectoryLog {
        &self.log
    }

    /// The control policy driving this vehicle.
    pub fn policy(&self) -> &ControlPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut ControlPolicy {
        &mut self.policy
    }

    /// Updates the pending control of a user-driven vehicle, clamping it to
    /// the actuation limits. Ignored, with a warning, for other policies.
    pub fn set_user_input(&mut self, control: ControlInput) {
        self.policy.set_user_input(control);
    }

    /// Asks the policy for this tick's control. Must be called on the
    /// frozen pre-tick state, before any vehicle has moved.
    pub(crate) fn compute_control(
        &mut self,
        snapshot: &Snapshot,
        time: f64,
        dt: f64,
        frame: usize,
    ) -> ControlInput {
        let state = self.state;
        self.policy.control(&state, snapshot, time, dt, frame)
    }

    /// Integrates the control over one tick and logs the result. The speed
    /// is clamped to the achievable range after integration, never inside
    /// the ODE.
    pub(crate) fn apply_control(&mut self, control: ControlInput, dt: f64, time: f64) {
        let model = BicycleModel::new(self.attributes.length, dt);
        let mut next = model.integrate(&self.state, &control);
        next.speed = self.attributes.speed_range.clamp(next.speed);
        self.state = next;
        self.log.push(TrajectorySample {
            time,
            state: next,
            control,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn attributes_are_validated() {
        let state = VehicleState::new(0.0, 0.0, 0.0, 0.0);
        let bad_length = VehicleAttributes {
            length: 0.0,
            ..Default::default()
        };
        assert!(Vehicle::new(bad_length, state, ControlPolicy::Trace(vec![])).is_err());

        let bad_range = VehicleAttributes {
            speed_range: Interval::new(10.0, 0.0),
            ..Default::default()
        };
        assert!(Vehicle::new(bad_range, state, ControlPolicy::Trace(vec![])).is_err());
    }

    #[test]
    fn initial_speed_is_clamped_and_logged() {
        let attributes = VehicleAttributes {
            speed_range: Interval::new(0.0, 10.0),
            ..Default::default()
        };
        let state = VehicleState::new(0.0, 0.0, 0.0, 25.0);
        let vehicle = Vehicle::new(attributes, state, ControlPolicy::Trace(vec![])).unwrap();
        assert_approx_eq!(vehicle.state().speed, 10.0);
        assert_eq!(vehicle.log().samples().len(), 1);
        assert_eq!(vehicle.log().samples()[0].control, ControlInput::HOLD);
    }

    #[test]
    fn applied_speed_is_clamped_to_the_range() {
        let attributes = VehicleAttributes {
            speed_range: Interval::new(0.0, 10.0),
            ..Default::default()
        };
        let state = VehicleState::new(0.0, 0.0, 0.0, 9.9);
        let mut vehicle = Vehicle::new(attributes, state, ControlPolicy::Trace(vec![])).unwrap();
        let control = ControlInput {
            accelerate: 2.0,
            brake: 0.0,
            steer: 0.0,
        };
        vehicle.apply_control(control, 0.25, 0.25);
        assert_approx_eq!(vehicle.state().speed, 10.0);
        assert_eq!(vehicle.log().samples().len(), 2);
        assert_approx_eq!(vehicle.log().last().unwrap().time, 0.25);
    }
}
