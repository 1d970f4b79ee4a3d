use cgmath::MetricSpace;
use intersection_sim::nlp::{NlpSolver, Problem, Solution, SolveStatus};
use intersection_sim::{
    BicycleModel, Completion, ControlBounds, ControlPolicy, DecisionGate, DelayedThreshold,
    GatePhase, GatedMpc, Horizon, Intersection, MpcObjective, ObjectiveWeights, Simulation,
    TrajectoryOptimizer, Vehicle, VehicleAttributes, VehicleId, VehicleState,
};
use std::f64::consts::PI;

const DT: f64 = 0.25;

fn optimizer(objective: MpcObjective) -> TrajectoryOptimizer {
    TrajectoryOptimizer::new(
        4.0,
        Horizon::from_duration(2.5, DT).unwrap(),
        ControlBounds::default(),
        objective,
    )
    .unwrap()
}

fn vehicle(state: VehicleState, policy: ControlPolicy) -> Vehicle {
    Vehicle::new(VehicleAttributes::default(), state, policy).unwrap()
}

fn northbound_cruise(junction: &Intersection, collision: f64, obstacles: Vec<VehicleId>) -> MpcObjective {
    MpcObjective {
        weights: ObjectiveWeights {
            speed: 1.0,
            primary_lanes: -5.0,
            shoulders: 500.0,
            collision,
            effort: 1.0,
            ..Default::default()
        },
        desired_speed: 8.0,
        primary_lanes: vec![junction.northbound().clone()],
        shoulders: vec![junction.shoulder_left()],
        obstacles,
        ..Default::default()
    }
}

#[test]
fn mpc_holds_its_lane_and_speed() {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();
    let ego = sim.add_vehicle(vehicle(
        VehicleState::new(40.0, 5.0, PI / 2.0, 5.0),
        ControlPolicy::Mpc(optimizer(northbound_cruise(&junction, 0.0, vec![]))),
    )).unwrap();

    for _ in 0..24 {
        sim.step();
    }

    let state = sim.vehicle(ego).unwrap().state();
    assert!((state.x - 40.0).abs() < 0.3, "drifted to x = {}", state.x);
    assert!((state.heading - PI / 2.0).abs() < 0.1);
    assert!((state.speed - 8.0).abs() < 1.0, "speed {}", state.speed);
    assert!(state.y > 5.0 + 5.0 * 24.0 * DT * 0.8);
}

/// Runs the ego north through the junction while a crossing car arrives at
/// the same time, and reports the closest centre distance and the lowest
/// ego speed.
fn run_crossing(collision_weight: f64) -> (f64, f64, VehicleState) {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();
    let crossing = sim.add_vehicle(vehicle(
        VehicleState::new(65.0, 30.0, PI, 10.0),
        ControlPolicy::Trace(vec![]),
    )).unwrap();
    let ego = sim.add_vehicle(vehicle(
        VehicleState::new(40.0, 10.0, PI / 2.0, 8.0),
        ControlPolicy::Mpc(optimizer(northbound_cruise(
            &junction,
            collision_weight,
            vec![crossing],
        ))),
    )).unwrap();

    let mut min_distance = f64::INFINITY;
    let mut min_speed = f64::INFINITY;
    let mut at_two_seconds = *sim.vehicle(ego).unwrap().state();
    for _ in 0..24 {
        sim.step();
        let ego_state = sim.vehicle(ego).unwrap().state();
        let crossing_state = sim.vehicle(crossing).unwrap().state();
        min_distance = min_distance.min(ego_state.position().distance(crossing_state.position()));
        min_speed = min_speed.min(ego_state.speed);
        if sim.frame() == 8 {
            at_two_seconds = *ego_state;
        }
    }
    (min_distance, min_speed, at_two_seconds)
}

#[test]
fn collision_term_makes_the_ego_yield() {
    // without the collision term the two paths meet in the junction, and
    // the ego holds a near-perfect straight line at its desired speed
    let (blind_distance, _, at_two_seconds) = run_crossing(0.0);
    assert!(blind_distance < 3.0, "no conflict staged: {blind_distance}");
    let straight_line = VehicleState::new(40.0, 10.0 + 8.0 * 2.0, PI / 2.0, 8.0);
    assert!(
        at_two_seconds
            .position()
            .distance(straight_line.position())
            < 0.5
    );

    let (distance, speed, _) = run_crossing(2000.0);
    assert!(distance > blind_distance);
    // the yielding ego keeps at least a car length clear
    assert!(distance > 4.0, "closest approach {distance}");
    assert!(speed < 7.0, "ego never slowed: {speed}");
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
fn solver_failure_degrades_to_braking() {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();
    let broken = optimizer(northbound_cruise(&junction, 0.0, vec![]))
        .with_solver(Box::new(AlwaysInfeasible));
    let ego = sim.add_vehicle(vehicle(
        VehicleState::new(40.0, 5.0, PI / 2.0, 8.0),
        ControlPolicy::Mpc(broken),
    )).unwrap();

    for _ in 0..10 {
        sim.step();
    }

    let ego = sim.vehicle(ego).unwrap();
    // 2.5 s of the fallback deceleration
    assert!((ego.state().speed - 3.0).abs() < 1e-9);
    assert!(ego.state().y > 5.0);
    match ego.policy() {
        ControlPolicy::Mpc(optimizer) => assert_eq!(optimizer.infeasible_count(), 10),
        _ => unreachable!(),
    }
}

#[test]
fn gated_vehicle_holds_then_turns_left() {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();

    // oncoming car parked far beyond the critical gap
    let oncoming = sim.add_vehicle(vehicle(
        VehicleState::new(37.0, 500.0, 1.5 * PI, 0.0),
        ControlPolicy::Trace(vec![]),
    )).unwrap();

    let weights = ObjectiveWeights {
        speed: 1.0,
        heading: 1.0,
        primary_lanes: -5.0,
        all_lanes: -3.0,
        shoulders: 500.0,
        collision: 2000.0,
        effort: 1.0,
    };
    let go_objective = MpcObjective {
        weights,
        desired_speed: 30.0 / 3.6,
        desired_heading: Some(PI),
        primary_lanes: vec![junction.northbound().clone(), junction.westbound().clone()],
        all_lanes: junction.all_lanes(),
        shoulders: vec![junction.shoulder_above(), junction.shoulder_below()],
        obstacles: vec![oncoming],
        ..Default::default()
    };
    let wait_objective = MpcObjective {
        weights,
        desired_speed: 0.0,
        desired_heading: Some(PI / 2.0),
        primary_lanes: vec![junction.northbound().clone()],
        all_lanes: junction.all_lanes(),
        shoulders: vec![junction.shoulder_above(), junction.shoulder_below()],
        obstacles: vec![oncoming],
        ..Default::default()
    };
    let gate = DecisionGate::new(
        Box::new(DelayedThreshold::new(40.0, 0.0, 1.0, 0.0, 7).unwrap()),
        junction.left_turn_exit(),
    );
    let gated = GatedMpc::new(
        optimizer(MpcObjective::default()),
        gate,
        oncoming,
        go_objective,
        wait_objective,
    )
    .unwrap();
    let human = sim.add_vehicle(vehicle(
        VehicleState::new(40.0, 20.0, PI / 2.0, 0.0),
        ControlPolicy::Gated(gated),
    )).unwrap();

    let phase = |sim: &Simulation| match sim.vehicle(human).unwrap().policy() {
        ControlPolicy::Gated(gated) => gated.gate().phase(),
        _ => unreachable!(),
    };

    // held at rest through the reaction delay
    for _ in 0..3 {
        sim.step();
        assert_eq!(phase(&sim), GatePhase::Deciding);
        assert_eq!(sim.vehicle(human).unwrap().state().speed, 0.0);
    }

    // the 480 m gap dwarfs the critical 40 m, so the commitment is a go
    sim.step();
    assert!(matches!(
        phase(&sim),
        GatePhase::Committed(_) | GatePhase::Turning
    ));

    while sim.time() < 25.0 && phase(&sim) != GatePhase::Done {
        sim.step();
    }

    let state = sim.vehicle(human).unwrap().state();
    assert!(state.y > 24.0, "never entered the junction: y = {}", state.y);
    assert!(
        state.heading > PI / 2.0 + 0.4 && state.heading < PI + 0.6,
        "never turned left: heading = {}",
        state.heading
    );
    assert!(state.x < 39.0, "never tracked west: x = {}", state.x);
}

#[test]
fn replanning_agrees_with_the_previous_plan() {
    let junction = Intersection::new();
    let mut optimizer = optimizer(northbound_cruise(&junction, 0.0, vec![]));
    let model = BicycleModel::new(4.0, DT);

    let s0 = VehicleState::new(40.0, 5.0, PI / 2.0, 5.0);
    let (u0, plan) = optimizer.plan(&s0, &Default::default()).unwrap();
    let expected_next = plan.controls[1];
    let planned_s1 = plan.states[1];

    // the applied state must be exactly the planned one: ground truth and
    // planner share an integrator
    let s1 = model.integrate(&s0, &u0);
    assert_eq!(s1, planned_s1);

    // in a static world the re-solved first control matches the previous
    // plan's second step up to solver tolerance
    let (u1, _) = optimizer.plan(&s1, &Default::default()).unwrap();
    assert!((u1.accelerate - expected_next.accelerate).abs() < 0.3);
    assert!((u1.brake - expected_next.brake).abs() < 0.3);
    assert!((u1.steer - expected_next.steer).abs() < 0.1);
}

#[test]
fn wait_commitment_keeps_the_vehicle_stopped() {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();

    // oncoming car well inside the critical gap
    let oncoming = sim.add_vehicle(vehicle(
        VehicleState::new(37.0, 40.0, 1.5 * PI, 7.0),
        ControlPolicy::Trace(vec![]),
    )).unwrap();

    let weights = ObjectiveWeights {
        speed: 1.0,
        effort: 1.0,
        ..Default::default()
    };
    let objective = MpcObjective {
        weights,
        desired_speed: 0.0,
        obstacles: vec![oncoming],
        ..Default::default()
    };
    let gate = DecisionGate::new(
        Box::new(DelayedThreshold::new(40.0, 0.0, 0.5, 0.0, 7).unwrap()),
        Completion::TurnDuration(5.0),
    );
    let gated = GatedMpc::new(
        optimizer(MpcObjective::default()),
        gate,
        oncoming,
        objective.clone(),
        objective,
    )
    .unwrap();
    let human = sim.add_vehicle(vehicle(
        VehicleState::new(40.0, 20.0, PI / 2.0, 0.0),
        ControlPolicy::Gated(gated),
    )).unwrap();

    for _ in 0..20 {
        sim.step();
    }

    match sim.vehicle(human).unwrap().policy() {
        ControlPolicy::Gated(gated) => {
            assert_eq!(
                gated.gate().phase(),
                GatePhase::Committed(intersection_sim::Decision::Wait)
            );
        }
        _ => unreachable!(),
    }
    let state = sim.vehicle(human).unwrap().state();
    assert!(state.speed < 0.5, "crept forward at {} m/s", state.speed);
    assert!((state.y - 20.0).abs() < 2.0);
}
