//! The discrete-time world: a set of vehicles advanced in lockstep.

use crate::error::ConfigurationError;
use crate::vehicle::{ControlInput, Vehicle, VehicleState};
use crate::{VehicleId, VehicleSet};
use smallvec::SmallVec;

/// What one vehicle knows about a neighbour: its frozen pre-tick state and
/// the footprint of its body.
#[derive(Clone, Copy, Debug)]
pub struct NeighborState {
    pub state: VehicleState,
    pub half_length: f64,
    pub half_width: f64,
}

/// A frozen view of every vehicle's state at the start of a tick.
///
/// All controllers plan against the same snapshot, so within a tick no
/// vehicle can react to another's same-tick move.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    entries: SmallVec<[(VehicleId, NeighborState); 4]>,
}

impl Snapshot {
    /// The recorded state of the given vehicle, if it exists.
    pub fn get(&self, id: VehicleId) -> Option<&NeighborState> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, neighbor)| neighbor)
    }

    /// Records a vehicle's state.
    pub fn insert(&mut self, id: VehicleId, neighbor: NeighborState) {
        self.entries.push((id, neighbor));
    }

    /// Number of recorded vehicles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A running simulation.
pub struct Simulation {
    vehicles: VehicleSet,
    dt: f64,
    frame: usize,
    time: f64,
}

impl Simulation {
    /// Creates an empty simulation advancing `dt` seconds per tick.
    pub fn new(dt: f64) -> Result<Self, ConfigurationError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigurationError::TimeStep(dt));
        }
        Ok(Self {
            vehicles: VehicleSet::default(),
            dt,
            frame: 0,
            time: 0.0,
        })
    }

    /// The tick duration in s.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Elapsed simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed ticks.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Adds a vehicle to the simulation.
    ///
    /// A vehicle driven by a trajectory optimizer must plan with this
    /// simulation's tick duration and with its own body length; planner and
    /// ground truth share an integrator, and a mismatched discretisation or
    /// wheelbase silently degrades every plan. Such vehicles are rejected
    /// here rather than simulated wrongly.
    pub fn add_vehicle(&mut self, vehicle: Vehicle) -> Result<VehicleId, ConfigurationError> {
        if let Some(optimizer) = vehicle.policy().optimizer() {
            let planner_dt = optimizer.horizon().dt();
            if planner_dt != self.dt {
                return Err(ConfigurationError::PlanningTimeStep {
                    planner: planner_dt,
                    simulation: self.dt,
                });
            }
            let planner_length = optimizer.vehicle_length();
            if planner_length != vehicle.attributes().length {
                return Err(ConfigurationError::PlanningLength {
                    planner: planner_length,
                    vehicle: vehicle.attributes().length,
                });
            }
        }
        Ok(self.vehicles.insert(vehicle))
    }

    /// Removes a vehicle mid-scenario. Controllers referencing it will see
    /// it vanish from subsequent snapshots.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        self.vehicles.remove(id)
    }

    /// Looks up a vehicle.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut Vehicle> {
        self.vehicles.get_mut(id)
    }

    /// Iterates over all vehicles.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = (VehicleId, &Vehicle)> {
        self.vehicles.iter()
    }

    /// Captures every vehicle's current state.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (id, vehicle) in &self.vehicles {
            let attributes = vehicle.attributes();
            snapshot.insert(
                id,
                NeighborState {
                    state: *vehicle.state(),
                    half_length: 0.5 * attributes.length,
                    half_width: 0.5 * attributes.width,
                },
            );
        }
        snapshot
    }

    /// Advances the world by one tick.
    ///
    /// Every control is computed against the same pre-tick snapshot before
    /// any vehicle moves, then all are applied at once.
    pub fn step(&mut self) {
        let snapshot = self.snapshot();
        let (time, dt, frame) = (self.time, self.dt, self.frame);
        let controls: Vec<(VehicleId, ControlInput)> = self
            .vehicles
            .iter_mut()
            .map(|(id, vehicle)| (id, vehicle.compute_control(&snapshot, time, dt, frame)))
            .collect();

        self.frame += 1;
        self.time += self.dt;
        for (id, control) in controls {
            if let Some(vehicle) = self.vehicles.get_mut(id) {
                vehicle.apply_control(control, self.dt, self.time);
            }
        }
        log::trace!("frame {} complete, t = {:.2} s", self.frame, self.time);
    }
}
