//! Generic nonlinear-program interface.
//!
//! The trajectory optimizer only relies on the [NlpSolver] contract: an
//! objective over a flat variable vector, a list of scalar constraints, box
//! bounds, and an initial guess, answered with a status and a variable
//! assignment. Any interior-point or SQP implementation satisfying this
//! contract can be swapped in; [ProjectedGradientSolver] is the in-crate
//! default.

pub use solver::ProjectedGradientSolver;

use crate::util::Interval;

mod solver;

/// Relation of a constraint expression to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    /// `expr(z) = 0`
    Equal,
    /// `expr(z) ≤ 0`
    LessEqual,
}

/// A scalar constraint on the decision variables.
pub struct Constraint<'a> {
    pub expr: Box<dyn Fn(&[f64]) -> f64 + 'a>,
    pub relation: Relation,
}

/// A finite-dimensional nonlinear program.
pub struct Problem<'a> {
    /// The objective to minimise.
    pub objective: Box<dyn Fn(&[f64]) -> f64 + 'a>,
    /// Scalar constraints relative to zero.
    pub constraints: Vec<Constraint<'a>>,
    /// Per-variable box bounds.
    pub bounds: Vec<Interval>,
    /// Initial guess; its length fixes the variable count.
    pub initial: Vec<f64>,
}

impl Problem<'_> {
    /// The largest constraint violation at `z`.
    pub fn violation(&self, z: &[f64]) -> f64 {
        self.constraints
            .iter()
            .map(|c| match c.relation {
                Relation::Equal => (c.expr)(z).abs(),
                Relation::LessEqual => (c.expr)(z).max(0.0),
            })
            .fold(0.0, f64::max)
    }

    /// Projects `z` onto the box bounds in place.
    pub fn project(&self, z: &mut [f64]) {
        for (v, b) in z.iter_mut().zip(&self.bounds) {
            *v = b.clamp(*v);
        }
    }
}

/// Outcome of a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// A feasible stationary point was found.
    Optimal,
    /// The iteration budget ran out; the solution is the best feasible iterate.
    IterationLimit,
    /// No feasible point was found within the budget.
    Infeasible,
}

/// A variable assignment returned by a solver.
#[derive(Clone, Debug)]
pub struct Solution {
    pub status: SolveStatus,
    pub variables: Vec<f64>,
    /// Objective value at `variables`.
    pub objective: f64,
    /// Iterations spent.
    pub iterations: usize,
}

/// An NLP solving service.
///
/// Implementations must respect a bounded iteration budget so that a single
/// solve can never stall the simulation loop; there is no mid-solve
/// cancellation concept.
pub trait NlpSolver {
    fn solve(&self, problem: &Problem) -> Solution;
}
