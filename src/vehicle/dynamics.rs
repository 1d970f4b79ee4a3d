//! Kinematic bicycle model and its fixed-step integrator.

use crate::math::{wrap_angle, Point2d, Vector2d};

/// Number of Runge-Kutta sub-steps per simulation tick.
const RK_SUBSTEPS: usize = 4;

/// The pose and speed of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleState {
    /// World x coordinate in m.
    pub x: f64,
    /// World y coordinate in m.
    pub y: f64,
    /// Heading in rad, wrapped to [0, 2π).
    pub heading: f64,
    /// Longitudinal speed in m/s.
    pub speed: f64,
}

impl VehicleState {
    /// Creates a state, wrapping the heading into [0, 2π).
    pub fn new(x: f64, y: f64, heading: f64, speed: f64) -> Self {
        Self {
            x,
            y,
            heading: wrap_angle(heading),
            speed,
        }
    }

    /// The position of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        Point2d::new(self.x, self.y)
    }

    /// A unit vector aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        Vector2d::new(self.heading.cos(), self.heading.sin())
    }
}

/// A single tick's control command.
///
/// Deceleration is kept as a separate non-positive channel so braking and
/// accelerating can be penalised asymmetrically; a well-formed control never
/// drives both channels at once (their product must vanish).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlInput {
    /// Forward acceleration in m/s²; non-negative.
    pub accelerate: f64,
    /// Braking acceleration in m/s²; non-positive.
    pub brake: f64,
    /// Steering angle in rad, positive anticlockwise.
    pub steer: f64,
}

impl ControlInput {
    /// Zero net acceleration and no steering.
    pub const HOLD: ControlInput = ControlInput {
        accelerate: 0.0,
        brake: 0.0,
        steer: 0.0,
    };

    /// A straight-line braking control.
    pub fn braking(decel: f64) -> Self {
        debug_assert!(decel <= 0.0);
        ControlInput {
            accelerate: 0.0,
            brake: decel,
            steer: 0.0,
        }
    }

    /// Net longitudinal acceleration over both channels.
    pub fn net_acceleration(&self) -> f64 {
        self.accelerate + self.brake
    }
}

/// Kinematic bicycle model with equal front and rear half-lengths,
/// integrated with a fixed-step fourth-order Runge-Kutta scheme.
///
/// The same integrator advances the ground-truth vehicle state and the
/// optimizer's planning rollout; the two discretisations must never diverge.
#[derive(Clone, Copy, Debug)]
pub struct BicycleModel {
    /// Distance from the centre to either axle, in m.
    lr: f64,
    /// Tick duration in s.
    dt: f64,
}

impl BicycleModel {
    /// Creates a model for a vehicle of the given length, advancing `dt`
    /// seconds per call to [integrate](Self::integrate).
    pub fn new(length: f64, dt: f64) -> Self {
        Self {
            lr: 0.5 * length,
            dt,
        }
    }

    /// The tick duration in s.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The vehicle length the model was built for, in m.
    pub fn length(&self) -> f64 {
        2.0 * self.lr
    }

    /// Advances the state by one tick. Deterministic and pure: identical
    /// inputs give bit-identical outputs.
    pub fn integrate(&self, state: &VehicleState, control: &ControlInput) -> VehicleState {
        let h = self.dt / RK_SUBSTEPS as f64;
        let mut s = [state.x, state.y, state.heading, state.speed];
        for _ in 0..RK_SUBSTEPS {
            let k1 = self.deriv(&s, control);
            let k2 = self.deriv(&offset(&s, &k1, 0.5 * h), control);
            let k3 = self.deriv(&offset(&s, &k2, 0.5 * h), control);
            let k4 = self.deriv(&offset(&s, &k3, h), control);
            for i in 0..4 {
                s[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
            }
        }
        VehicleState {
            x: s[0],
            y: s[1],
            heading: wrap_angle(s[2]),
            speed: s[3],
        }
    }

    /// The continuous-time bicycle ODE; state layout is [x, y, φ, v].
    fn deriv(&self, s: &[f64; 4], u: &ControlInput) -> [f64; 4] {
        // slip angle, with lr = lf
        let beta = (0.5 * u.steer.tan()).atan();
        [
            s[3] * (s[2] + beta).cos(),
            s[3] * (s[2] + beta).sin(),
            s[3] / self.lr * beta.sin(),
            u.net_acceleration(),
        ]
    }
}

fn offset(s: &[f64; 4], k: &[f64; 4], h: f64) -> [f64; 4] {
    [s[0] + h * k[0], s[1] + h * k[1], s[2] + h * k[2], s[3] + h * k[3]]
}
