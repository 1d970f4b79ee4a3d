//! Go/wait decisions at an unsignalized intersection.
//!
//! A [DecisionGate] wraps a vehicle's controller with a small state machine:
//! the vehicle holds at the intersection while a [DecisionModel] watches the
//! distance gap to oncoming traffic, commits exactly once to going or
//! waiting, and reports the manoeuvre as done once a completion criterion is
//! met. The gate only orchestrates; the manoeuvre itself is driven by
//! whatever objective the controller is given on commitment.

use crate::error::ConfigurationError;
use crate::lane::Axis;
use crate::math;
use crate::vehicle::VehicleState;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// A committed choice at the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Proceed through the intersection.
    Go,
    /// Yield to the oncoming vehicle.
    Wait,
}

/// Where the gate is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    /// Not yet polled.
    Idle,
    /// Watching the gap, undecided.
    Deciding,
    /// Committed this tick or waiting out a `Wait`.
    Committed(Decision),
    /// Executing a committed `Go`.
    Turning,
    /// The completion criterion has been met.
    Done,
}

/// When a committed manoeuvre counts as finished.
#[derive(Clone, Copy, Debug)]
pub enum Completion {
    /// A fixed number of seconds after commitment.
    TurnDuration(f64),
    /// Crossing an axis-aligned exit line. `Horizontal` compares the
    /// vehicle's y coordinate, `Vertical` its x coordinate.
    ExitLine {
        axis: Axis,
        coord: f64,
        /// Whether the manoeuvre exits toward decreasing coordinates.
        decreasing: bool,
    },
}

impl Completion {
    fn reached(&self, time: f64, committed_at: f64, state: &VehicleState) -> bool {
        match *self {
            Completion::TurnDuration(duration) => time - committed_at >= duration,
            Completion::ExitLine {
                axis,
                coord,
                decreasing,
            } => {
                let at = match axis {
                    Axis::Horizontal => state.y,
                    Axis::Vertical => state.x,
                };
                if decreasing {
                    at <= coord
                } else {
                    at >= coord
                }
            }
        }
    }
}

/// What a deciding driver sees of the oncoming vehicle on one tick.
#[derive(Clone, Copy, Debug)]
pub struct GapObservation {
    /// Distance gap to the oncoming vehicle, m.
    pub distance: f64,
    /// Time for the oncoming vehicle to close that distance, s.
    pub time_to_arrival: f64,
}

impl GapObservation {
    /// An unobstructed view with no oncoming vehicle.
    pub const OPEN: GapObservation = GapObservation {
        distance: f64::INFINITY,
        time_to_arrival: f64::INFINITY,
    };

    /// Builds an observation from the distance gap and the oncoming
    /// vehicle's speed. The time gap divisor is clamped away from zero, so
    /// stopped traffic reads as a large but finite time to arrival.
    pub fn from_speed(distance: f64, speed: f64) -> Self {
        Self {
            distance,
            time_to_arrival: math::time_to_arrival(distance, speed),
        }
    }
}

/// A model of how a driver resolves a go/wait choice from the observed gap.
///
/// `observe` is called once per tick while the gate is deciding; returning
/// a decision commits it.
pub trait DecisionModel {
    fn observe(&mut self, gap: GapObservation, dt: f64) -> Option<Decision>;
}

/// Gap acceptance after a reaction delay.
///
/// The driver does nothing for a delay sampled once at construction, then
/// compares the observed gap against a critical gap perturbed by fresh
/// Gaussian noise and commits immediately.
pub struct DelayedThreshold {
    critical_gap: Normal<f64>,
    delay: f64,
    elapsed: f64,
    rng: StdRng,
}

impl DelayedThreshold {
    pub fn new(
        critical_gap: f64,
        gap_noise_std: f64,
        delay_mean: f64,
        delay_std: f64,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        validate_std(gap_noise_std)?;
        validate_std(delay_std)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let delay = Normal::new(delay_mean, delay_std)
            .expect("standard deviation is finite and non-negative")
            .sample(&mut rng)
            .max(0.0);
        Ok(Self {
            critical_gap: Normal::new(critical_gap, gap_noise_std)
                .expect("standard deviation is finite and non-negative"),
            delay,
            elapsed: 0.0,
            rng,
        })
    }
}

impl DecisionModel for DelayedThreshold {
    fn observe(&mut self, gap: GapObservation, dt: f64) -> Option<Decision> {
        self.elapsed += dt;
        if self.elapsed < self.delay {
            return None;
        }
        let critical = self.critical_gap.sample(&mut self.rng);
        Some(if gap.distance > critical {
            Decision::Go
        } else {
            Decision::Wait
        })
    }
}

fn validate_std(std: f64) -> Result<(), ConfigurationError> {
    if !(std.is_finite() && std >= 0.0) {
        return Err(ConfigurationError::NoiseStd(std));
    }
    Ok(())
}

/// Drift-diffusion gap acceptance.
///
/// Evidence drifts toward `Go` while the observed gap exceeds the critical
/// gap and toward `Wait` while it falls short, perturbed by diffusion
/// noise; the first boundary crossing commits the decision. The drift
/// signal is `distance + tta_weight · time_to_arrival - critical_gap`, so a
/// non-zero time-gap weight lets slow oncoming traffic read as a wider gap
/// than fast traffic at the same distance.
pub struct EvidenceAccumulation {
    critical_gap: f64,
    tta_weight: f64,
    boundary: f64,
    drift: f64,
    diffusion: f64,
    noise: Normal<f64>,
    evidence: f64,
    rng: StdRng,
}

impl EvidenceAccumulation {
    /// A model driven by the distance gap alone.
    pub fn new(
        critical_gap: f64,
        boundary: f64,
        drift: f64,
        diffusion: f64,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        Self::with_time_gap(critical_gap, 0.0, boundary, drift, diffusion, seed)
    }

    /// A model whose drift also weighs the time to arrival.
    pub fn with_time_gap(
        critical_gap: f64,
        tta_weight: f64,
        boundary: f64,
        drift: f64,
        diffusion: f64,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        validate_std(diffusion)?;
        if !tta_weight.is_finite() {
            return Err(ConfigurationError::NonFiniteWeight { name: "time_gap" });
        }
        Ok(Self {
            critical_gap,
            tta_weight,
            boundary,
            drift,
            diffusion,
            noise: Normal::new(0.0, 1.0).expect("unit normal is well-formed"),
            evidence: 0.0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// The accumulated evidence; positive favours going.
    pub fn evidence(&self) -> f64 {
        self.evidence
    }
}

impl DecisionModel for EvidenceAccumulation {
    fn observe(&mut self, gap: GapObservation, dt: f64) -> Option<Decision> {
        let mut signal = gap.distance - self.critical_gap;
        // an open view is infinite on both axes and 0 * inf is NaN, so the
        // time term only enters when it carries weight
        if self.tta_weight != 0.0 {
            signal += self.tta_weight * gap.time_to_arrival;
        }
        let noise = self.noise.sample(&mut self.rng) * self.diffusion;
        self.evidence += (self.drift * signal * dt + noise) * dt.sqrt();
        if self.evidence >= self.boundary {
            Some(Decision::Go)
        } else if self.evidence <= -self.boundary {
            Some(Decision::Wait)
        } else {
            None
        }
    }
}

/// The go/wait state machine around one vehicle's manoeuvre.
pub struct DecisionGate {
    model: Box<dyn DecisionModel>,
    completion: Completion,
    phase: GatePhase,
    committed_at: Option<f64>,
}

impl DecisionGate {
    pub fn new(model: Box<dyn DecisionModel>, completion: Completion) -> Self {
        Self {
            model,
            completion,
            phase: GatePhase::Idle,
            committed_at: None,
        }
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    /// The committed decision, if any.
    pub fn decision(&self) -> Option<Decision> {
        match self.phase {
            GatePhase::Committed(decision) => Some(decision),
            GatePhase::Turning | GatePhase::Done => Some(Decision::Go),
            _ => None,
        }
    }

    /// Simulation time at which the decision was committed.
    pub fn committed_at(&self) -> Option<f64> {
        self.committed_at
    }

    /// Advances the gate by one tick.
    ///
    /// Returns the decision exactly once, on the tick it is committed.
    pub fn poll(
        &mut self,
        gap: GapObservation,
        time: f64,
        dt: f64,
        state: &VehicleState,
    ) -> Option<Decision> {
        match self.phase {
            GatePhase::Idle | GatePhase::Deciding => {
                self.phase = GatePhase::Deciding;
                if let Some(decision) = self.model.observe(gap, dt) {
                    self.phase = GatePhase::Committed(decision);
                    self.committed_at = Some(time);
                    log::info!(
                        "committed to {decision:?} at t = {time:.2} s (gap {:.1} m, arrival {:.1} s)",
                        gap.distance,
                        gap.time_to_arrival,
                    );
                    return Some(decision);
                }
                None
            }
            GatePhase::Committed(Decision::Go) | GatePhase::Turning => {
                let committed_at = self.committed_at.unwrap_or(time);
                self.phase = if self.completion.reached(time, committed_at, state) {
                    GatePhase::Done
                } else {
                    GatePhase::Turning
                };
                None
            }
            // a committed wait holds until the scenario ends
            GatePhase::Committed(Decision::Wait) | GatePhase::Done => None,
        }
    }
}
