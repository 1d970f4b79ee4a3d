//! Control policies: how a vehicle chooses its control each tick.

use super::{ControlInput, VehicleState};
use crate::decision::{Decision, DecisionGate, GapObservation, GatePhase};
use crate::error::ConfigurationError;
use crate::mpc::{MpcObjective, TrajectoryOptimizer};
use crate::simulation::Snapshot;
use crate::util::Interval;
use crate::VehicleId;
use cgmath::InnerSpace;
use std::f64::consts::PI;

/// Actuation limits applied to user-supplied controls.
const USER_ACCELERATE: Interval = Interval::new(0.0, 2.0);
const USER_BRAKE: Interval = Interval::new(-4.0, 0.0);
const USER_STEER_LIMIT: f64 = PI;

/// The control source of a vehicle.
pub enum ControlPolicy {
    /// Applies an externally supplied control every tick.
    UserInput(ControlInput),
    /// Replays a fixed control trace, one entry per frame, coasting once
    /// the trace runs out.
    Trace(Vec<ControlInput>),
    /// Plans with a receding-horizon optimizer every tick.
    Mpc(TrajectoryOptimizer),
    /// An optimizer behind a go/wait decision gate.
    Gated(GatedMpc),
}

impl ControlPolicy {
    /// A user-input policy, with the control clamped to actuation limits.
    pub fn user_input(raw: ControlInput) -> Self {
        ControlPolicy::UserInput(clamp_user(raw))
    }

    pub(crate) fn set_user_input(&mut self, raw: ControlInput) {
        match self {
            ControlPolicy::UserInput(current) => *current = clamp_user(raw),
            _ => log::warn!("ignoring user input for a vehicle not under user control"),
        }
    }

    /// The planning optimizer behind this policy, if it has one.
    pub fn optimizer(&self) -> Option<&TrajectoryOptimizer> {
        match self {
            ControlPolicy::Mpc(optimizer) => Some(optimizer),
            ControlPolicy::Gated(gated) => Some(&gated.optimizer),
            ControlPolicy::UserInput(_) | ControlPolicy::Trace(_) => None,
        }
    }

    pub(crate) fn control(
        &mut self,
        state: &VehicleState,
        snapshot: &Snapshot,
        time: f64,
        dt: f64,
        frame: usize,
    ) -> ControlInput {
        match self {
            ControlPolicy::UserInput(current) => *current,
            ControlPolicy::Trace(controls) => {
                controls.get(frame).copied().unwrap_or(ControlInput::HOLD)
            }
            ControlPolicy::Mpc(optimizer) => optimizer.control(state, snapshot),
            ControlPolicy::Gated(gated) => gated.control(state, snapshot, time, dt),
        }
    }
}

fn clamp_user(raw: ControlInput) -> ControlInput {
    ControlInput {
        accelerate: USER_ACCELERATE.clamp(raw.accelerate),
        brake: USER_BRAKE.clamp(raw.brake),
        steer: raw.steer.clamp(-USER_STEER_LIMIT, USER_STEER_LIMIT),
    }
}

/// A trajectory optimizer gated by a go/wait decision.
///
/// The vehicle holds still while its decision model watches the gap to one
/// designated neighbour, both the distance and the time the neighbour needs
/// to close it. On commitment the matching objective is
/// installed and the optimizer takes over; once the manoeuvre completes the
/// vehicle holds again.
pub struct GatedMpc {
    optimizer: TrajectoryOptimizer,
    gate: DecisionGate,
    /// The neighbour whose observed gap drives the decision.
    gap_to: VehicleId,
    go_objective: MpcObjective,
    wait_objective: MpcObjective,
}

impl GatedMpc {
    pub fn new(
        optimizer: TrajectoryOptimizer,
        gate: DecisionGate,
        gap_to: VehicleId,
        go_objective: MpcObjective,
        wait_objective: MpcObjective,
    ) -> Result<Self, ConfigurationError> {
        go_objective.validate()?;
        wait_objective.validate()?;
        Ok(Self {
            optimizer,
            gate,
            gap_to,
            go_objective,
            wait_objective,
        })
    }

    /// The decision gate.
    pub fn gate(&self) -> &DecisionGate {
        &self.gate
    }

    /// The wrapped optimizer.
    pub fn optimizer(&self) -> &TrajectoryOptimizer {
        &self.optimizer
    }

    pub(crate) fn control(
        &mut self,
        state: &VehicleState,
        snapshot: &Snapshot,
        time: f64,
        dt: f64,
    ) -> ControlInput {
        // a vanished neighbour can no longer conflict
        let gap = snapshot
            .get(self.gap_to)
            .map(|n| {
                let distance = (n.state.position() - state.position()).magnitude();
                GapObservation::from_speed(distance, n.state.speed)
            })
            .unwrap_or(GapObservation::OPEN);

        if let Some(decision) = self.gate.poll(gap, time, dt, state) {
            let objective = match decision {
                Decision::Go => self.go_objective.clone(),
                Decision::Wait => self.wait_objective.clone(),
            };
            self.optimizer.replace_objective(objective);
        }

        match self.gate.phase() {
            GatePhase::Idle | GatePhase::Deciding | GatePhase::Done => ControlInput::HOLD,
            GatePhase::Committed(_) | GatePhase::Turning => {
                self.optimizer.control(state, snapshot)
            }
        }
    }
}
