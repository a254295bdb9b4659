//! # Box-constrained Levenberg–Marquardt
//!
//! Minimizes `‖r(x)‖²` for a residual function `r : ℝⁿ → ℝᵐ` under simple bounds
//! `lower ≤ x ≤ upper` (infinite bounds are allowed).
//!
//! Each iteration
//! -----------------
//! 1. Builds a central-difference Jacobian `J` at the current point. The probing points are
//!    projected into the box and the actual spacing is used as denominator.
//! 2. Stops if `‖Jᵀr‖∞ ≤ gtol`.
//! 3. Solves `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr` by Cholesky, projects `x + δ` into the box and
//!    evaluates the trial cost.
//! 4. On a decrease the step is accepted and `λ` shrinks by `lambda_down`; the fit stops when
//!    the relative cost decrease is `≤ ftol` or the relative step is `≤ xtol`. Otherwise `λ`
//!    grows by `lambda_up` and the step is retried; once `λ > max_lambda` no descent direction
//!    is left and the current point is returned.
//! 5. Across accepted steps, the fit also stops once the cost has not decreased by more than
//!    `stall_tol` (relative) over the last `stall_window` of them. Piecewise-linear models
//!    otherwise crawl along a kink with decreases just above `ftol`.
//!
//! Running out of `max_iterations`, or starting from a non-finite cost, is reported as
//! [`TrackFitError::FitNonConvergence`].
use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::SolverParams;
use crate::trackfit_errors::TrackFitError;

/// Smallest diagonal weight of the damping term, keeps flat directions regularized.
const DIAG_FLOOR: f64 = 1e-12;

/// Reason the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    CostTolerance,
    StepTolerance,
    GradientTolerance,
    DampingSaturated,
    Stalled,
}

/// State at the optimum.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub x: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Jacobian evaluated at `x`.
    pub jacobian: DMatrix<f64>,
    /// `‖r(x)‖²`
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

/// Project `x` into the box `[lower, upper]`.
#[inline]
pub fn project(x: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    x.zip_zip_map(lower, upper, |v, lo, hi| v.max(lo).min(hi))
}

/// Central-difference Jacobian of `f` at `x`, with evaluation points kept inside the box.
///
/// A column is zero when the box leaves no room to vary the parameter.
pub fn jacobian<F>(
    f: &F,
    x: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    m: usize,
    step: f64,
) -> Result<DMatrix<f64>, TrackFitError>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, TrackFitError>,
{
    let mut jac = DMatrix::zeros(m, x.len());
    for i in 0..x.len() {
        let h = step * x[i].abs().max(1.0);
        let mut plus = x.clone();
        let mut minus = x.clone();
        plus[i] = (x[i] + h).min(upper[i]);
        minus[i] = (x[i] - h).max(lower[i]);
        let spacing = plus[i] - minus[i];
        if spacing <= 0.0 {
            continue;
        }
        let column = (f(&plus)? - f(&minus)?) / spacing;
        jac.set_column(i, &column);
    }
    Ok(jac)
}

/// Minimize the squared norm of `f` inside `[lower, upper]` starting from `x0`.
///
/// Arguments
/// -----------------
/// * `f`: Residual function. Errors it returns abort the minimization.
/// * `x0`: Starting point, projected into the box before use.
/// * `lower`, `upper`: Bounds, same length as `x0`.
/// * `params`: Tolerances, damping schedule and iteration budget.
///
/// Return
/// ----------
/// * [`LmOutcome`] at the accepted optimum, or [`TrackFitError::FitNonConvergence`].
pub fn minimize<F>(
    f: F,
    x0: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    params: &SolverParams,
) -> Result<LmOutcome, TrackFitError>
where
    F: Fn(&DVector<f64>) -> Result<DVector<f64>, TrackFitError>,
{
    let mut x = project(x0, lower, upper);
    let mut r = f(&x)?;
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(TrackFitError::FitNonConvergence { iterations: 0 });
    }

    let n = x.len();
    let m = r.len();
    let mut lambda = params.initial_lambda;
    // Cost after each of the last `stall_window` accepted steps, oldest first.
    let mut recent_costs: VecDeque<f64> = VecDeque::with_capacity(params.stall_window + 1);
    recent_costs.push_back(cost);

    for iteration in 1..=params.max_iterations {
        let jac = jacobian(&f, &x, lower, upper, m, params.jacobian_step)?;
        let gradient = jac.tr_mul(&r);

        if gradient.amax() <= params.gtol {
            return Ok(outcome(x, r, jac, cost, iteration, Termination::GradientTolerance));
        }

        let normal = jac.tr_mul(&jac);
        let rhs = -&gradient;

        loop {
            let mut damped = normal.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * normal[(i, i)].max(DIAG_FLOOR);
            }

            let trial = damped
                .cholesky()
                .map(|chol| project(&(&x + chol.solve(&rhs)), lower, upper));

            if let Some(x_new) = trial {
                let r_new = f(&x_new)?;
                let cost_new = r_new.norm_squared();

                if cost_new.is_finite() && cost_new < cost {
                    let rel_cost = (cost - cost_new) / cost.max(f64::MIN_POSITIVE);
                    let rel_step = (&x_new - &x).norm() / (x.norm() + params.xtol);

                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda *= params.lambda_down;

                    recent_costs.push_back(cost);
                    if recent_costs.len() > params.stall_window + 1 {
                        recent_costs.pop_front();
                    }
                    let stalled = recent_costs.len() == params.stall_window + 1
                        && recent_costs.front().is_some_and(|&old| {
                            (old - cost) <= params.stall_tol * old.max(f64::MIN_POSITIVE)
                        });

                    let stop = if rel_cost <= params.ftol {
                        Some(Termination::CostTolerance)
                    } else if rel_step <= params.xtol {
                        Some(Termination::StepTolerance)
                    } else if stalled {
                        Some(Termination::Stalled)
                    } else {
                        None
                    };
                    if let Some(reason) = stop {
                        let jac = jacobian(&f, &x, lower, upper, m, params.jacobian_step)?;
                        return Ok(outcome(x, r, jac, cost, iteration, reason));
                    }
                    break;
                }
            }

            lambda *= params.lambda_up;
            if lambda > params.max_lambda {
                debug!(iteration, cost, "damping saturated");
                return Ok(outcome(x, r, jac, cost, iteration, Termination::DampingSaturated));
            }
        }
    }

    Err(TrackFitError::FitNonConvergence {
        iterations: params.max_iterations,
    })
}

fn outcome(
    x: DVector<f64>,
    residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
    cost: f64,
    iterations: usize,
    termination: Termination,
) -> LmOutcome {
    LmOutcome {
        x,
        residuals,
        jacobian,
        cost,
        iterations,
        termination,
    }
}
