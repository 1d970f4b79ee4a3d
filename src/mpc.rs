//! Receding-horizon trajectory optimization.
//!
//! Each controller owns a problem template fixed at construction (horizon,
//! bounds, objective weights and geometry); the per-tick data, namely the
//! current state and the neighbour snapshot, arrives as solve parameters,
//! so no problem structure is rebuilt between ticks. The horizon problem is
//! transcribed by direct single shooting: the decision variables are the
//! control trajectory and the state trajectory is recovered by rolling out
//! the same integrator that advances the ground-truth simulation, which
//! makes the dynamics equality constraints hold by construction.

use crate::cost::{self, ObstacleTrack};
use crate::error::{ConfigurationError, InfeasibleError};
use crate::lane::{Lane, Shoulder};
use crate::nlp::{Constraint, NlpSolver, Problem, ProjectedGradientSolver, Relation, SolveStatus};
use crate::simulation::Snapshot;
use crate::util::Interval;
use crate::vehicle::{BicycleModel, ControlInput, VehicleState};
use crate::VehicleId;

/// Number of control channels per horizon step.
const NU: usize = 3;

/// Deceleration applied when no previous plan is available as a fallback, in m/s².
const FALLBACK_BRAKE: f64 = -2.0;

/// The planning horizon of a controller.
#[derive(Clone, Copy, Debug)]
pub struct Horizon {
    steps: usize,
    dt: f64,
}

impl Horizon {
    /// Creates a horizon covering `seconds` at a resolution of `dt`.
    ///
    /// `dt` must equal the simulation tick duration: planning with a
    /// different discretisation than the one that advances the world is a
    /// correctness bug, not a tuning knob.
    pub fn from_duration(seconds: f64, dt: f64) -> Result<Self, ConfigurationError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigurationError::TimeStep(dt));
        }
        let steps = (seconds / dt).round();
        if !(steps >= 1.0) {
            return Err(ConfigurationError::EmptyHorizon);
        }
        Ok(Self {
            steps: steps as usize,
            dt,
        })
    }

    /// The number of control steps in the horizon.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The step duration in s.
    pub fn dt(&self) -> f64 {
        self.dt
    }
}

/// Box bounds on the control channels and on speed along the plan.
#[derive(Clone, Copy, Debug)]
pub struct ControlBounds {
    /// Forward acceleration range, m/s²; the lower end may not be negative.
    pub accelerate: Interval,
    /// Braking range, m/s²; the upper end may not be positive.
    pub brake: Interval,
    /// Maximum steering magnitude, rad.
    pub steer: f64,
    /// Speed range enforced along the planned trajectory, m/s.
    pub speed: Interval,
}

impl Default for ControlBounds {
    fn default() -> Self {
        Self {
            accelerate: Interval::new(0.0, 2.0),
            brake: Interval::new(-4.0, 0.0),
            steer: 0.6,
            speed: Interval::new(0.0, 30.0),
        }
    }
}

impl ControlBounds {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.accelerate.is_well_formed() || self.accelerate.min < 0.0 {
            return Err(ConfigurationError::ControlBounds {
                channel: "accelerate",
                min: self.accelerate.min,
                max: self.accelerate.max,
            });
        }
        if !self.brake.is_well_formed() || self.brake.max > 0.0 {
            return Err(ConfigurationError::ControlBounds {
                channel: "brake",
                min: self.brake.min,
                max: self.brake.max,
            });
        }
        if !(self.steer.is_finite() && self.steer > 0.0) {
            return Err(ConfigurationError::SteerLimit(self.steer));
        }
        if !self.speed.is_well_formed() {
            return Err(ConfigurationError::SpeedRange {
                min: self.speed.min,
                max: self.speed.max,
            });
        }
        Ok(())
    }
}

/// One weight per cost term, set once per scenario.
///
/// Weights are signed: the lane terms multiply attraction features that are
/// maximal on the lane centre, so a negative weight rewards staying there.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObjectiveWeights {
    pub speed: f64,
    pub heading: f64,
    pub primary_lanes: f64,
    pub all_lanes: f64,
    pub shoulders: f64,
    pub collision: f64,
    pub effort: f64,
}

impl ObjectiveWeights {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let named = [
            ("speed", self.speed),
            ("heading", self.heading),
            ("primary_lanes", self.primary_lanes),
            ("all_lanes", self.all_lanes),
            ("shoulders", self.shoulders),
            ("collision", self.collision),
            ("effort", self.effort),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFiniteWeight { name });
            }
        }
        Ok(())
    }
}

/// What a controller is trying to achieve.
#[derive(Clone, Debug)]
pub struct MpcObjective {
    pub weights: ObjectiveWeights,
    /// Desired speed, m/s.
    pub desired_speed: f64,
    /// Fixed target heading, rad; only meaningful when one exists, such as
    /// the direction of travel after a turn.
    pub desired_heading: Option<f64>,
    /// The lanes the vehicle intends to travel on.
    pub primary_lanes: Vec<Lane>,
    /// All lanes it may legally touch; weighted separately so off-target
    /// lanes can count for less than the intended ones.
    pub all_lanes: Vec<Lane>,
    pub shoulders: Vec<Shoulder>,
    /// Vehicles whose predicted paths are penalised by the collision term.
    pub obstacles: Vec<VehicleId>,
    /// Diagonal control-effort weights (accelerate, brake, steer).
    pub effort_weights: [f64; 3],
}

impl Default for MpcObjective {
    fn default() -> Self {
        Self {
            weights: ObjectiveWeights::default(),
            desired_speed: 0.0,
            desired_heading: None,
            primary_lanes: vec![],
            all_lanes: vec![],
            shoulders: vec![],
            obstacles: vec![],
            // braking is cheaper than accelerating, steering dearest of all
            effort_weights: [1.0, 0.5, 10.0],
        }
    }
}

impl MpcObjective {
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        self.weights.validate()?;
        for (name, value) in [
            ("effort.accelerate", self.effort_weights[0]),
            ("effort.brake", self.effort_weights[1]),
            ("effort.steer", self.effort_weights[2]),
        ] {
            if !value.is_finite() {
                return Err(ConfigurationError::NonFiniteWeight { name });
            }
        }
        Ok(())
    }
}

/// The optimizer's most recent horizon solution: `Nh + 1` states and `Nh`
/// controls. Fully overwritten by each solve; read for diagnostics and
/// rendering, and consumed one step at a time by the fallback policy.
#[derive(Clone, Debug, Default)]
pub struct PlannedTrajectory {
    pub states: Vec<VehicleState>,
    pub controls: Vec<ControlInput>,
}

/// A receding-horizon trajectory controller for one vehicle.
pub struct TrajectoryOptimizer {
    model: BicycleModel,
    horizon: Horizon,
    bounds: ControlBounds,
    objective: MpcObjective,
    solver: Box<dyn NlpSolver>,
    /// Warm-start seed: the previous solution shifted one step.
    warm: Option<Vec<f64>>,
    plan: Option<PlannedTrajectory>,
    infeasible_count: usize,
}

impl TrajectoryOptimizer {
    /// Creates a controller for a vehicle of the given length.
    ///
    /// All configuration is validated here; malformed weights or bounds are
    /// rejected before the first tick rather than silently corrected.
    pub fn new(
        vehicle_length: f64,
        horizon: Horizon,
        bounds: ControlBounds,
        objective: MpcObjective,
    ) -> Result<Self, ConfigurationError> {
        if !(vehicle_length.is_finite() && vehicle_length > 0.0) {
            return Err(ConfigurationError::VehicleLength(vehicle_length));
        }
        bounds.validate()?;
        objective.validate()?;
        Ok(Self {
            model: BicycleModel::new(vehicle_length, horizon.dt),
            horizon,
            bounds,
            objective,
            solver: Box::new(ProjectedGradientSolver::default()),
            warm: None,
            plan: None,
            infeasible_count: 0,
        })
    }

    /// Replaces the NLP solving service.
    pub fn with_solver(mut self, solver: Box<dyn NlpSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Replaces the objective, e.g. after a go/wait commitment.
    pub fn set_objective(&mut self, objective: MpcObjective) -> Result<(), ConfigurationError> {
        objective.validate()?;
        self.replace_objective(objective);
        Ok(())
    }

    /// Swaps in a pre-validated objective and discards the warm start,
    /// which belongs to the old cost landscape.
    pub(crate) fn replace_objective(&mut self, objective: MpcObjective) {
        self.objective = objective;
        self.warm = None;
    }

    /// The planning horizon.
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    /// The vehicle length the planning model was built for, in m.
    pub fn vehicle_length(&self) -> f64 {
        self.model.length()
    }

    /// The most recent horizon solution, if any solve has succeeded.
    pub fn planned_trajectory(&self) -> Option<&PlannedTrajectory> {
        self.plan.as_ref()
    }

    /// How many solves have failed to find a feasible point.
    pub fn infeasible_count(&self) -> usize {
        self.infeasible_count
    }

    /// Solves the horizon problem from `current`, planning against the
    /// given snapshot of neighbour states.
    ///
    /// Returns the first control of the solved horizon and the full plan.
    /// Only that first control may be applied to the real vehicle; the
    /// remainder of the plan is re-solved next tick as neighbours move.
    pub fn plan(
        &mut self,
        current: &VehicleState,
        snapshot: &Snapshot,
    ) -> Result<(ControlInput, &PlannedTrajectory), InfeasibleError> {
        let nh = self.horizon.steps;
        let tracks = self.predict_obstacles(snapshot);
        let initial = self
            .warm
            .clone()
            .unwrap_or_else(|| vec![0.0; NU * nh]);

        let solution = {
            let problem = self.build_problem(*current, &tracks, initial);
            self.solver.solve(&problem)
        };

        if solution.status == SolveStatus::Infeasible {
            self.infeasible_count += 1;
            return Err(InfeasibleError {
                iterations: solution.iterations,
            });
        }

        // shift the solution one step for next tick's warm start,
        // repeating the final control
        let mut warm = solution.variables.clone();
        warm.copy_within(NU.., 0);
        self.warm = Some(warm);

        let controls = extract_controls(&solution.variables);
        let states = rollout(&self.model, current, &controls);
        let plan = self.plan.insert(PlannedTrajectory { states, controls });
        Ok((plan.controls[0], plan))
    }

    /// Plans, applying the fallback policy on failure: the previous plan
    /// shifted one step if one remains, else a neutral braking control.
    /// A solver failure must never stop the simulation loop.
    pub fn control(&mut self, current: &VehicleState, snapshot: &Snapshot) -> ControlInput {
        match self.plan(current, snapshot) {
            Ok((control, _)) => control,
            Err(err) => {
                log::warn!("{err}; applying fallback control");
                self.fallback()
            }
        }
    }

    fn fallback(&mut self) -> ControlInput {
        if let Some(plan) = self.plan.as_mut() {
            if plan.controls.len() > 1 {
                plan.controls.remove(0);
                if !plan.states.is_empty() {
                    plan.states.remove(0);
                }
                return plan.controls[0];
            }
        }
        ControlInput::braking(self.bounds.brake.clamp(FALLBACK_BRAKE))
    }

    /// Predicts each obstacle's track over the horizon from the snapshot,
    /// assuming constant speed and heading. An obstacle missing from the
    /// snapshot (removed mid-scenario) is treated as absent, not an error.
    fn predict_obstacles(&self, snapshot: &Snapshot) -> Vec<ObstacleTrack> {
        let nh = self.horizon.steps;
        self.objective
            .obstacles
            .iter()
            .filter_map(|id| {
                let neighbor = match snapshot.get(*id) {
                    Some(neighbor) => neighbor,
                    None => {
                        log::debug!("obstacle {id:?} missing from snapshot; omitting its collision term");
                        return None;
                    }
                };
                let state = neighbor.state;
                let step = state.direction() * (state.speed * self.horizon.dt);
                let positions = (0..=nh)
                    .map(|k| state.position() + step * k as f64)
                    .collect();
                Some(ObstacleTrack {
                    positions,
                    heading: state.heading,
                    sigma_long: neighbor.half_length,
                    sigma_lat: neighbor.half_width,
                })
            })
            .collect()
    }

    /// Builds this tick's NLP around the problem template.
    fn build_problem<'a>(
        &'a self,
        current: VehicleState,
        tracks: &'a [ObstacleTrack],
        initial: Vec<f64>,
    ) -> Problem<'a> {
        let nh = self.horizon.steps;
        let model = self.model;
        let objective_cfg = &self.objective;

        let objective = Box::new(move |z: &[f64]| {
            let controls = raw_controls(z);
            let states = rollout(&model, &current, &controls);
            evaluate(objective_cfg, &states, &controls, tracks)
        });

        let mut constraints: Vec<Constraint> = Vec::with_capacity(nh + 2);
        // the accelerate and brake channels may never be active together
        for k in 0..nh {
            let i = NU * k;
            constraints.push(Constraint {
                expr: Box::new(move |z: &[f64]| z[i] * z[i + 1]),
                relation: Relation::Equal,
            });
        }
        // speed stays within bounds along the whole rollout
        let speed = self.bounds.speed;
        constraints.push(Constraint {
            expr: Box::new(move |z: &[f64]| {
                rollout(&model, &current, &raw_controls(z))
                    .iter()
                    .map(|s| s.speed - speed.max)
                    .fold(f64::NEG_INFINITY, f64::max)
            }),
            relation: Relation::LessEqual,
        });
        constraints.push(Constraint {
            expr: Box::new(move |z: &[f64]| {
                rollout(&model, &current, &raw_controls(z))
                    .iter()
                    .map(|s| speed.min - s.speed)
                    .fold(f64::NEG_INFINITY, f64::max)
            }),
            relation: Relation::LessEqual,
        });

        let mut bounds = Vec::with_capacity(NU * nh);
        for _ in 0..nh {
            bounds.push(self.bounds.accelerate);
            bounds.push(self.bounds.brake);
            bounds.push(Interval::disc(0.0, self.bounds.steer));
        }

        Problem {
            objective,
            constraints,
            bounds,
            initial,
        }
    }
}

/// Rolls the model out from `start` under the given control trajectory.
fn rollout(model: &BicycleModel, start: &VehicleState, controls: &[ControlInput]) -> Vec<VehicleState> {
    let mut states = Vec::with_capacity(controls.len() + 1);
    let mut state = *start;
    states.push(state);
    for control in controls {
        state = model.integrate(&state, control);
        states.push(state);
    }
    states
}

/// The weighted objective over a rolled-out horizon.
fn evaluate(
    cfg: &MpcObjective,
    states: &[VehicleState],
    controls: &[ControlInput],
    tracks: &[ObstacleTrack],
) -> f64 {
    let w = &cfg.weights;
    let mut total = w.speed * cost::speed_tracking(states, cfg.desired_speed);
    if let Some(heading) = cfg.desired_heading {
        total += w.heading * cost::heading_tracking(states, heading);
    }
    total += w.primary_lanes * cost::lane_attraction(states, &cfg.primary_lanes, cost::LANE_STEEPNESS);
    total += w.all_lanes * cost::lane_attraction(states, &cfg.all_lanes, cost::LANE_STEEPNESS);
    total += w.shoulders * cost::shoulder_repulsion(states, &cfg.shoulders, cost::SHOULDER_STEEPNESS);
    total += w.collision
        * tracks
            .iter()
            .map(|track| cost::collision(states, track))
            .sum::<f64>();
    total += w.effort * cost::control_effort(controls, &cfg.effort_weights);
    total
}

/// Reads the flat variable vector as a control trajectory, unmodified.
fn raw_controls(z: &[f64]) -> Vec<ControlInput> {
    z.chunks_exact(NU)
        .map(|u| ControlInput {
            accelerate: u[0],
            brake: u[1],
            steer: u[2],
        })
        .collect()
}

/// Unpacks the solved variables into the returned control trajectory,
/// projecting each step onto the exclusivity constraint by zeroing the
/// weaker of the accelerate/brake channels.
fn extract_controls(z: &[f64]) -> Vec<ControlInput> {
    z.chunks_exact(NU)
        .map(|u| {
            let mut control = ControlInput {
                accelerate: u[0],
                brake: u[1],
                steer: u[2],
            };
            if control.accelerate >= -control.brake {
                control.brake = 0.0;
            } else {
                control.accelerate = 0.0;
            }
            control
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use crate::nlp::Solution;
    use std::cell::Cell;

    fn straight_lane() -> Lane {
        Lane::new(Point2d::new(0.0, 0.0), Point2d::new(200.0, 0.0), 3.0)
    }

    fn cruise_objective() -> MpcObjective {
        MpcObjective {
            weights: ObjectiveWeights {
                speed: 1.0,
                primary_lanes: -5.0,
                effort: 1.0,
                ..Default::default()
            },
            desired_speed: 10.0,
            primary_lanes: vec![straight_lane()],
            ..Default::default()
        }
    }

    fn optimizer() -> TrajectoryOptimizer {
        TrajectoryOptimizer::new(
            4.0,
            Horizon::from_duration(1.0, 0.25).unwrap(),
            ControlBounds::default(),
            cruise_objective(),
        )
        .unwrap()
    }

    #[test]
    fn horizon_rounds_to_steps() {
        assert_eq!(Horizon::from_duration(3.0, 0.1).unwrap().steps(), 30);
        assert_eq!(Horizon::from_duration(2.6, 0.25).unwrap().steps(), 10);
        assert!(Horizon::from_duration(0.0, 0.1).is_err());
        assert!(Horizon::from_duration(3.0, 0.0).is_err());
        assert!(Horizon::from_duration(3.0, -0.1).is_err());
    }

    #[test]
    fn malformed_configuration_is_rejected() {
        let horizon = Horizon::from_duration(1.0, 0.25).unwrap();

        let reversed_speed = ControlBounds {
            speed: Interval::new(5.0, 0.0),
            ..Default::default()
        };
        assert!(matches!(
            TrajectoryOptimizer::new(4.0, horizon, reversed_speed, MpcObjective::default()),
            Err(ConfigurationError::SpeedRange { .. })
        ));

        let nan_weight = MpcObjective {
            weights: ObjectiveWeights {
                collision: f64::NAN,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            TrajectoryOptimizer::new(4.0, horizon, ControlBounds::default(), nan_weight),
            Err(ConfigurationError::NonFiniteWeight { name: "collision" })
        ));

        assert!(TrajectoryOptimizer::new(
            -1.0,
            horizon,
            ControlBounds::default(),
            MpcObjective::default()
        )
        .is_err());
    }

    #[test]
    fn plan_respects_bounds_and_exclusivity() {
        let mut optimizer = optimizer();
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        let (first, plan) = optimizer.plan(&state, &Snapshot::default()).unwrap();
        assert_eq!(plan.controls.len(), 4);
        assert_eq!(plan.states.len(), 5);
        assert_eq!(first, plan.controls[0]);
        for control in &plan.controls {
            assert!((0.0..=2.0).contains(&control.accelerate));
            assert!((-4.0..=0.0).contains(&control.brake));
            assert!(control.steer.abs() <= 0.6);
            assert!((control.accelerate * control.brake).abs() <= 1e-4);
        }
    }

    #[test]
    fn plan_accelerates_toward_desired_speed() {
        let mut optimizer = optimizer();
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        let (first, _) = optimizer.plan(&state, &Snapshot::default()).unwrap();
        assert!(first.accelerate > 0.0);
        assert_eq!(first.brake, 0.0);
    }

    struct AlwaysInfeasible;

    impl NlpSolver for AlwaysInfeasible {
        fn solve(&self, problem: &Problem) -> Solution {
            Solution {
                status: SolveStatus::Infeasible,
                variables: problem.initial.clone(),
                objective: f64::INFINITY,
                iterations: 1,
            }
        }
    }

    #[test]
    fn fallback_brakes_without_a_previous_plan() {
        let mut optimizer = optimizer().with_solver(Box::new(AlwaysInfeasible));
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        let control = optimizer.control(&state, &Snapshot::default());
        assert_eq!(control, ControlInput::braking(-2.0));
        assert_eq!(optimizer.infeasible_count(), 1);
        assert!(optimizer.planned_trajectory().is_none());
    }

    /// Succeeds once, then reports infeasibility forever after.
    struct FailsAfterFirst {
        inner: ProjectedGradientSolver,
        used: Cell<bool>,
    }

    impl NlpSolver for FailsAfterFirst {
        fn solve(&self, problem: &Problem) -> Solution {
            if !self.used.replace(true) {
                self.inner.solve(problem)
            } else {
                AlwaysInfeasible.solve(problem)
            }
        }
    }

    #[test]
    fn fallback_shifts_the_previous_plan() {
        let mut optimizer = optimizer().with_solver(Box::new(FailsAfterFirst {
            inner: ProjectedGradientSolver::default(),
            used: Cell::new(false),
        }));
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        let (_, plan) = optimizer.plan(&state, &Snapshot::default()).unwrap();
        let second = plan.controls[1];

        let next_state = VehicleState::new(1.3, 0.0, 0.0, 5.5);
        let fallback = optimizer.control(&next_state, &Snapshot::default());
        assert_eq!(fallback, second);
        assert_eq!(optimizer.infeasible_count(), 1);
    }

    #[test]
    fn missing_obstacle_is_skipped() {
        let mut objective = cruise_objective();
        objective.obstacles = vec![VehicleId::default()];
        let mut optimizer = TrajectoryOptimizer::new(
            4.0,
            Horizon::from_duration(1.0, 0.25).unwrap(),
            ControlBounds::default(),
            objective,
        )
        .unwrap();
        // the snapshot knows nothing about the obstacle; the solve must
        // simply omit its collision term
        let state = VehicleState::new(0.0, 0.0, 0.0, 5.0);
        assert!(optimizer.plan(&state, &Snapshot::default()).is_ok());
    }
}
