//! Error types.

use thiserror::Error;

/// A controller or scenario was constructed with malformed parameters.
/// These are programming or configuration mistakes and are reported
/// immediately at construction, never silently corrected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("invalid speed range [{min}, {max}]")]
    SpeedRange { min: f64, max: f64 },
    #[error("invalid {channel} bounds [{min}, {max}]")]
    ControlBounds {
        channel: &'static str,
        min: f64,
        max: f64,
    },
    #[error("maximum steering angle must be positive, got {0}")]
    SteerLimit(f64),
    #[error("planning horizon must cover at least one step")]
    EmptyHorizon,
    #[error("time step must be positive and finite, got {0}")]
    TimeStep(f64),
    #[error("weight `{name}` is not finite")]
    NonFiniteWeight { name: &'static str },
    #[error("standard deviation must be non-negative and finite, got {0}")]
    NoiseStd(f64),
    #[error("planner time step {planner} s does not match the simulation time step {simulation} s")]
    PlanningTimeStep { planner: f64, simulation: f64 },
    #[error("planner vehicle length {planner} m does not match the vehicle length {vehicle} m")]
    PlanningLength { planner: f64, vehicle: f64 },
    #[error("vehicle length must be positive, got {0}")]
    VehicleLength(f64),
    #[error("vehicle width must be positive, got {0}")]
    VehicleWidth(f64),
}

/// The solver found no feasible trajectory within its iteration budget.
/// Recovered locally by the controller's fallback policy; never fatal
/// to the simulation loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("no feasible trajectory within {iterations} solver iterations")]
pub struct InfeasibleError {
    /// Iterations spent before the solver gave up.
    pub iterations: usize,
}
