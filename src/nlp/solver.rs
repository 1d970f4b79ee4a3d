//! The default in-crate solver: projected gradient descent on a
//! quadratic-penalty merit function, with forward-difference gradients and
//! a backtracking line search.

use super::{NlpSolver, Problem, Relation, Solution, SolveStatus};

/// Maximum halvings of the line-search step before giving up on an iteration.
const MAX_BACKTRACKS: usize = 14;

/// Growth factor applied to the step after an accepted iteration.
const STEP_GROWTH: f64 = 1.5;

/// A projected-gradient solver with a bounded iteration budget.
///
/// Constraints are folded into a quadratic-penalty merit function and box
/// bounds are enforced by projection, so every iterate is bound-feasible by
/// construction. Exceeding the budget with a constraint-feasible iterate is
/// reported as [SolveStatus::IterationLimit]; ending on an iterate that
/// still violates a constraint is [SolveStatus::Infeasible].
#[derive(Clone, Copy, Debug)]
pub struct ProjectedGradientSolver {
    /// Maximum number of gradient iterations per solve.
    pub max_iterations: usize,
    /// Forward-difference step for gradient estimates.
    pub fd_step: f64,
    /// Weight of the quadratic constraint penalty.
    pub penalty: f64,
    /// Constraint violation below which a point counts as feasible.
    pub feasibility_tol: f64,
    /// Gradient norm below which the iterate counts as stationary.
    pub stationarity_tol: f64,
}

impl Default for ProjectedGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: 60,
            fd_step: 1e-5,
            penalty: 1e3,
            feasibility_tol: 1e-4,
            stationarity_tol: 1e-3,
        }
    }
}

impl ProjectedGradientSolver {
    /// Objective plus quadratic constraint penalties.
    fn merit(&self, problem: &Problem, z: &[f64]) -> f64 {
        let mut merit = (problem.objective)(z);
        for c in &problem.constraints {
            let v = match c.relation {
                Relation::Equal => (c.expr)(z),
                Relation::LessEqual => (c.expr)(z).max(0.0),
            };
            merit += self.penalty * v * v;
        }
        merit
    }

    /// Forward-difference gradient of the merit function.
    fn gradient(&self, problem: &Problem, z: &mut Vec<f64>, base: f64, grad: &mut [f64]) {
        for i in 0..z.len() {
            let orig = z[i];
            z[i] = orig + self.fd_step;
            grad[i] = (self.merit(problem, z) - base) / self.fd_step;
            z[i] = orig;
        }
    }
}

impl NlpSolver for ProjectedGradientSolver {
    fn solve(&self, problem: &Problem) -> Solution {
        let mut z = problem.initial.clone();
        problem.project(&mut z);

        let mut grad = vec![0.0; z.len()];
        let mut merit = self.merit(problem, &z);
        let mut step = 1.0;
        let mut iterations = 0;
        let mut stationary = false;

        while iterations < self.max_iterations {
            iterations += 1;
            self.gradient(problem, &mut z, merit, &mut grad);
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm <= self.stationarity_tol {
                stationary = true;
                break;
            }

            let mut accepted = false;
            for _ in 0..MAX_BACKTRACKS {
                let mut candidate: Vec<f64> = z
                    .iter()
                    .zip(&grad)
                    .map(|(zi, gi)| zi - step * gi)
                    .collect();
                problem.project(&mut candidate);
                let candidate_merit = self.merit(problem, &candidate);
                if candidate_merit < merit {
                    z = candidate;
                    merit = candidate_merit;
                    step *= STEP_GROWTH;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                // no descent at this resolution; the iterate is as good as
                // the finite differences can tell
                stationary = true;
                break;
            }
        }

        let status = if problem.violation(&z) > self.feasibility_tol {
            SolveStatus::Infeasible
        } else if stationary {
            SolveStatus::Optimal
        } else {
            SolveStatus::IterationLimit
        };
        Solution {
            status,
            objective: (problem.objective)(&z),
            variables: z,
            iterations,
        }
    }
}
