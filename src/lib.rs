pub use cgmath;
pub use decision::{
    Completion, Decision, DecisionGate, DecisionModel, DelayedThreshold, EvidenceAccumulation,
    GapObservation, GatePhase,
};
pub use error::{ConfigurationError, InfeasibleError};
pub use intersection::Intersection;
pub use lane::{Axis, Lane, OffRoadSide, Shoulder};
pub use mpc::{
    ControlBounds, Horizon, MpcObjective, ObjectiveWeights, PlannedTrajectory, TrajectoryOptimizer,
};
pub use simulation::{NeighborState, Simulation, Snapshot};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{
    BicycleModel, ControlInput, ControlPolicy, GatedMpc, TrajectoryLog, TrajectorySample, Vehicle,
    VehicleAttributes, VehicleState,
};
use slotmap::{new_key_type, SlotMap};

pub mod cost;
mod decision;
mod error;
mod intersection;
mod lane;
pub mod math;
mod mpc;
pub mod nlp;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
