//! # Interpolation-based trajectory solver
//!
//! Fits a cluster of detector points with the trajectory family described by a
//! [`TrajectoryTable`](crate::interpolate::TrajectoryTable).
//!
//! ## Model
//!
//! The six free parameters are, in this order:
//!
//! | index | parameter   | unit | bounds                               |
//! |-------|-------------|------|--------------------------------------|
//! | 0     | `scale`     | T·m  | table scale axis                     |
//! | 1     | `polar`     | rad  | table polar axis                     |
//! | 2     | `azimuthal` | rad  | free, wrapped to `[0, 2π)` at the end |
//! | 3     | `vertex_x`  | mm   | `±vertex_xy_limit`                   |
//! | 4     | `vertex_y`  | mm   | `±vertex_xy_limit`                   |
//! | 5     | `vertex_z`  | mm   | `[0, detector_length]`               |
//!
//! For a parameter vector, the [`TrackInterpolator`](crate::interpolate::TrackInterpolator)
//! yields a particle-frame trajectory, which is rotated about the beam axis by the azimuthal
//! angle and translated to the vertex ([`forward_model`]). Each cluster point contributes one
//! residual: its distance to the model polyline divided by `√2·point_sigma`.
//!
//! ## Optimizer
//!
//! [`levenberg_marquardt::minimize`] runs a box-constrained Levenberg–Marquardt with a
//! central-difference Jacobian. Uncertainties come from the covariance
//! `pinv(JᵀJ)·χ²ᵣ` evaluated at the optimum.
//!
//! ## See also
//! ------------
//! * [`solve`] – fit one cluster.
//! * [`crate::pipeline::phase_solve`] – fit every gated cluster of a run.
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{Millimeter, Radian, TeslaMeter, RADEG};
use crate::trackfit_errors::TrackFitError;

pub mod forward_model;
pub mod levenberg_marquardt;
pub mod solve;

pub use solve::{solve, FitResult};

/// Initial values of the fit parameters, as produced by the estimation stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    pub polar: Radian,
    pub azimuthal: Radian,
    pub scale: TeslaMeter,
    pub vertex_x: Millimeter,
    pub vertex_y: Millimeter,
    pub vertex_z: Millimeter,
}

/// Detector geometry and resolution used by the solver.
///
/// Defaults
/// -----------------
/// * `detector_length`: 1000 mm
/// * `vertex_xy_limit`: 60 mm
/// * `point_sigma`: 1.0 mm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Drift length of the active volume; bounds the vertex `z` (mm).
    pub detector_length: Millimeter,
    /// Half width of the beam region; bounds the vertex `x` and `y` (mm).
    pub vertex_xy_limit: Millimeter,
    /// Isotropic position resolution of a point (mm).
    pub point_sigma: Millimeter,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            detector_length: 1000.0,
            vertex_xy_limit: 60.0,
            point_sigma: 1.0,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), TrackFitError> {
        if !SolverParamsBuilder::gt0(self.detector_length) {
            return Err(TrackFitError::InvalidSolverParameter(
                "detector_length must be > 0".into(),
            ));
        }
        if !SolverParamsBuilder::ge0(self.vertex_xy_limit) {
            return Err(TrackFitError::InvalidSolverParameter(
                "vertex_xy_limit must be >= 0".into(),
            ));
        }
        if !SolverParamsBuilder::gt0(self.point_sigma) {
            return Err(TrackFitError::InvalidSolverParameter(
                "point_sigma must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the Levenberg–Marquardt optimizer.
///
/// Fields
/// -----------------
/// * `max_iterations` – Jacobian evaluations allowed before giving up.
/// * `ftol` – relative cost decrease under which an accepted step ends the fit.
/// * `xtol` – relative step length under which an accepted step ends the fit.
/// * `gtol` – gradient infinity norm under which the current point is accepted.
/// * `initial_lambda` – starting damping factor.
/// * `lambda_up`, `lambda_down` – damping multipliers after a rejected/accepted step.
/// * `max_lambda` – damping at which the fit is considered stalled at a minimum.
/// * `jacobian_step` – relative finite-difference step, scaled by `max(|xᵢ|, 1)`.
/// * `stall_window`, `stall_tol` – the fit ends when the cost has decreased by no more than
///   `stall_tol` (relative) over the last `stall_window` accepted steps.
///
/// Defaults
/// -----------------
/// * `max_iterations`: 500
/// * `ftol`: 1e-8
/// * `xtol`: 1e-8
/// * `gtol`: 1e-10
/// * `initial_lambda`: 1e-3
/// * `lambda_up`: 10
/// * `lambda_down`: 0.1
/// * `max_lambda`: 1e10
/// * `jacobian_step`: 1e-6
/// * `stall_window`: 10
/// * `stall_tol`: 1e-6
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub max_lambda: f64,
    pub jacobian_step: f64,
    pub stall_window: usize,
    pub stall_tol: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            max_iterations: 500,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
            jacobian_step: 1e-6,
            stall_window: 10,
            stall_tol: 1e-6,
        }
    }
}

impl SolverParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`SolverParamsBuilder`] initialized with the default values.
    pub fn builder() -> SolverParamsBuilder {
        SolverParamsBuilder::new()
    }
}

/// Builder for [`SolverParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct SolverParamsBuilder {
    params: SolverParams,
}

impl SolverParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: SolverParams::default(),
        }
    }

    pub fn max_iterations(mut self, v: usize) -> Self {
        self.params.max_iterations = v;
        self
    }

    // --- Stopping criteria ---
    pub fn ftol(mut self, v: f64) -> Self {
        self.params.ftol = v;
        self
    }
    pub fn xtol(mut self, v: f64) -> Self {
        self.params.xtol = v;
        self
    }
    pub fn gtol(mut self, v: f64) -> Self {
        self.params.gtol = v;
        self
    }

    // --- Damping ---
    pub fn initial_lambda(mut self, v: f64) -> Self {
        self.params.initial_lambda = v;
        self
    }
    pub fn lambda_up(mut self, v: f64) -> Self {
        self.params.lambda_up = v;
        self
    }
    pub fn lambda_down(mut self, v: f64) -> Self {
        self.params.lambda_down = v;
        self
    }
    pub fn max_lambda(mut self, v: f64) -> Self {
        self.params.max_lambda = v;
        self
    }

    pub fn jacobian_step(mut self, v: f64) -> Self {
        self.params.jacobian_step = v;
        self
    }

    pub fn stall_window(mut self, v: usize) -> Self {
        self.params.stall_window = v;
        self
    }
    pub fn stall_tol(mut self, v: f64) -> Self {
        self.params.stall_tol = v;
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `max_iterations ≥ 1`.
    /// * `ftol, xtol, gtol ≥ 0`.
    /// * `initial_lambda > 0`, `lambda_up > 1`, `0 < lambda_down < 1`,
    ///   `max_lambda > initial_lambda`.
    /// * `jacobian_step > 0`.
    /// * `stall_window ≥ 1`, `stall_tol ≥ 0`.
    ///
    /// Returns
    /// -----------------
    /// * `Err(TrackFitError::InvalidSolverParameter)` describing the first failing rule.
    pub fn build(self) -> Result<SolverParams, TrackFitError> {
        let p = &self.params;

        if p.max_iterations == 0 {
            return Err(TrackFitError::InvalidSolverParameter(
                "max_iterations must be >= 1".into(),
            ));
        }
        if !(Self::ge0(p.ftol) && Self::ge0(p.xtol) && Self::ge0(p.gtol)) {
            return Err(TrackFitError::InvalidSolverParameter(
                "ftol, xtol and gtol must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.initial_lambda) {
            return Err(TrackFitError::InvalidSolverParameter(
                "initial_lambda must be > 0".into(),
            ));
        }
        if p.lambda_up.partial_cmp(&1.0) != Some(Greater) {
            return Err(TrackFitError::InvalidSolverParameter(
                "lambda_up must be > 1".into(),
            ));
        }
        if !Self::gt0(p.lambda_down) || p.lambda_down.partial_cmp(&1.0) != Some(Less) {
            return Err(TrackFitError::InvalidSolverParameter(
                "lambda_down must be in (0, 1)".into(),
            ));
        }
        if p.max_lambda.partial_cmp(&p.initial_lambda) != Some(Greater) {
            return Err(TrackFitError::InvalidSolverParameter(
                "max_lambda must be > initial_lambda".into(),
            ));
        }
        if !Self::gt0(p.jacobian_step) {
            return Err(TrackFitError::InvalidSolverParameter(
                "jacobian_step must be > 0".into(),
            ));
        }
        if p.stall_window == 0 || !Self::ge0(p.stall_tol) {
            return Err(TrackFitError::InvalidSolverParameter(
                "stall_window must be >= 1 and stall_tol >= 0".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for SolverParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Solver Parameters")?;
            writeln!(f, "-----------------")?;
            writeln!(f, "  max_iterations = {}", self.max_iterations)?;
            writeln!(f, "  ftol           = {:.3e}", self.ftol)?;
            writeln!(f, "  xtol           = {:.3e}", self.xtol)?;
            writeln!(f, "  gtol           = {:.3e}", self.gtol)?;
            writeln!(f, "  initial_lambda = {:.3e}", self.initial_lambda)?;
            writeln!(f, "  lambda_up      = {:.3}", self.lambda_up)?;
            writeln!(f, "  lambda_down    = {:.3}", self.lambda_down)?;
            writeln!(f, "  max_lambda     = {:.3e}", self.max_lambda)?;
            writeln!(f, "  jacobian_step  = {:.3e}", self.jacobian_step)?;
            writeln!(f, "  stall_window   = {}", self.stall_window)?;
            write!(f, "  stall_tol      = {:.3e}", self.stall_tol)
        } else {
            write!(
                f,
                "SolverParams(max_iter={}, ftol={:.1e}, xtol={:.1e}, gtol={:.1e}, lambda0={:.1e})",
                self.max_iterations, self.ftol, self.xtol, self.gtol, self.initial_lambda,
            )
        }
    }
}

impl fmt::Display for Guess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Guess(brho={:.4} Tm, polar={:.2} deg, azimuthal={:.2} deg, vertex=({:.1}, {:.1}, {:.1}) mm)",
            self.scale,
            self.polar / RADEG,
            self.azimuthal / RADEG,
            self.vertex_x,
            self.vertex_y,
            self.vertex_z,
        )
    }
}
