use cgmath::MetricSpace;
use intersection_sim::{
    ControlBounds, ControlPolicy, DecisionGate, EvidenceAccumulation, GatePhase,
    GatedMpc, Horizon, Intersection, MpcObjective, ObjectiveWeights, Simulation, Snapshot,
    TrajectoryOptimizer, Vehicle, VehicleAttributes, VehicleId, VehicleState,
};
use std::f64::consts::PI;

const DT: f64 = 0.25;
const HORIZON_S: f64 = 3.0;

fn optimizer(objective: MpcObjective) -> TrajectoryOptimizer {
    TrajectoryOptimizer::new(
        4.0,
        Horizon::from_duration(HORIZON_S, DT).unwrap(),
        ControlBounds::default(),
        objective,
    )
    .unwrap()
}

fn main() {
    let junction = Intersection::new();
    let mut sim = Simulation::new(DT).unwrap();

    // a human turning left across oncoming traffic
    let human = sim
        .add_vehicle(
            Vehicle::new(
                VehicleAttributes::default(),
                VehicleState::new(40.0, 20.0, PI / 2.0, 0.0),
                ControlPolicy::Trace(vec![]),
            )
            .unwrap(),
        )
        .unwrap();

    // the oncoming automated vehicle, cruising south through the junction
    let av_objective = MpcObjective {
        weights: ObjectiveWeights {
            speed: 1.0,
            heading: 2.0,
            primary_lanes: -5.0,
            all_lanes: -3.0,
            shoulders: 500.0,
            collision: 2000.0,
            effort: 1.0,
        },
        desired_speed: 25.0 / 3.6,
        desired_heading: Some(1.5 * PI),
        primary_lanes: vec![junction.southbound().clone()],
        all_lanes: vec![junction.westbound().clone(), junction.southbound().clone()],
        shoulders: vec![junction.shoulder_left(), junction.shoulder_below()],
        obstacles: vec![human],
        ..Default::default()
    };
    let av = sim
        .add_vehicle(
            Vehicle::new(
                VehicleAttributes::default(),
                VehicleState::new(37.0, 65.0, 1.5 * PI, 25.0 / 3.6),
                ControlPolicy::Mpc(optimizer(av_objective)),
            )
            .unwrap(),
        )
        .unwrap();

    let human_weights = ObjectiveWeights {
        speed: 1.0,
        heading: 1.0,
        primary_lanes: -5.0,
        all_lanes: -3.0,
        shoulders: 500.0,
        collision: 2000.0,
        effort: 1.0,
    };
    // the turn path spans two legs, so both carry primary-lane attraction;
    // the left shoulder is omitted or the exit would be penalised
    let go_objective = MpcObjective {
        weights: human_weights,
        desired_speed: 30.0 / 3.6,
        desired_heading: Some(PI),
        primary_lanes: vec![junction.northbound().clone(), junction.westbound().clone()],
        all_lanes: junction.all_lanes(),
        shoulders: vec![junction.shoulder_above(), junction.shoulder_below()],
        obstacles: vec![av],
        ..Default::default()
    };
    let wait_objective = MpcObjective {
        weights: human_weights,
        desired_speed: 0.0,
        desired_heading: Some(PI / 2.0),
        primary_lanes: vec![junction.northbound().clone()],
        all_lanes: junction.all_lanes(),
        shoulders: vec![junction.shoulder_above(), junction.shoulder_below()],
        obstacles: vec![av],
        ..Default::default()
    };
    let gate = DecisionGate::new(
        Box::new(EvidenceAccumulation::new(40.0, 1.0, 0.5, 1.0, 42).unwrap()),
        junction.left_turn_exit(),
    );
    let gated = GatedMpc::new(
        optimizer(MpcObjective::default()),
        gate,
        av,
        go_objective,
        wait_objective,
    )
    .unwrap();
    *sim.vehicle_mut(human).unwrap().policy_mut() = ControlPolicy::Gated(gated);

    println!("Simulating a left turn against oncoming traffic...");
    let mut min_distance = f64::INFINITY;
    while sim.time() < 30.0 {
        sim.step();
        min_distance = min_distance.min(distance(&sim.snapshot(), human, av));
        if sim.frame() % 4 == 0 {
            report(&sim, human, av);
        }
        if phase(&sim, human) == Some(GatePhase::Done) {
            break;
        }
    }

    println!(
        "Finished at t = {:.2} s; closest approach {:.1} m",
        sim.time(),
        min_distance
    );
}

fn distance(snapshot: &Snapshot, a: VehicleId, b: VehicleId) -> f64 {
    match (snapshot.get(a), snapshot.get(b)) {
        (Some(a), Some(b)) => a.state.position().distance(b.state.position()),
        _ => f64::INFINITY,
    }
}

fn phase(sim: &Simulation, id: VehicleId) -> Option<GatePhase> {
    match sim.vehicle(id)?.policy() {
        ControlPolicy::Gated(gated) => Some(gated.gate().phase()),
        _ => None,
    }
}

fn report(sim: &Simulation, human: VehicleId, av: VehicleId) {
    let h = sim.vehicle(human).unwrap().state();
    let a = sim.vehicle(av).unwrap().state();
    println!(
        "t = {:5.2} s  human ({:5.1}, {:5.1}) {:4.1} m/s {:?}  av ({:5.1}, {:5.1}) {:4.1} m/s",
        sim.time(),
        h.x,
        h.y,
        h.speed,
        phase(sim, human).unwrap_or(GatePhase::Idle),
        a.x,
        a.y,
        a.speed,
    );
}
