//! Fit of a single cluster.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::forward_model::{
    TrackModel, AZIMUTHAL, POLAR, SCALE, VERTEX_X, VERTEX_Y, VERTEX_Z,
};
use super::levenberg_marquardt::minimize;
use super::{DetectorParams, Guess, SolverParams};
use crate::clustering::Cluster;
use crate::constants::{EventId, DPI, N_FIT_PARAMETERS};
use crate::interpolate::TrackInterpolator;
use crate::trackfit_errors::TrackFitError;

/// Relative singular-value cutoff of the covariance pseudo-inverse.
const PINV_EPS: f64 = 1e-12;

/// Best-fit parameters of one cluster with their 1σ uncertainties.
///
/// Field names match the columns of the result table written by
/// [`write_fit_results_csv`](crate::io::write_fit_results_csv).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub event: EventId,
    pub cluster_index: usize,
    pub cluster_label: i32,
    pub vertex_x: f64,
    pub sigma_vx: f64,
    pub vertex_y: f64,
    pub sigma_vy: f64,
    pub vertex_z: f64,
    pub sigma_vz: f64,
    pub brho: f64,
    pub sigma_brho: f64,
    pub polar: f64,
    pub sigma_polar: f64,
    pub azimuthal: f64,
    pub sigma_azimuthal: f64,
    pub redchisq: f64,
}

/// Fit a cluster with the interpolated trajectory family.
///
/// Arguments
/// -----------------
/// * `cluster`: Points to fit.
/// * `cluster_index`: Position of the cluster within its event, copied to the result.
/// * `guess`: Starting parameters.
/// * `interpolator`: Trajectory family; its out-of-range policy decides what happens to a guess
///   outside the table.
/// * `detector`: Vertex bounds and point resolution.
/// * `params`: Optimizer configuration.
///
/// Return
/// ----------
/// * The fitted parameters. The azimuthal angle is wrapped to `[0, 2π)`.
///
/// Errors
/// ----------
/// * [`TrackFitError::InsufficientDegreesOfFreedom`] when the cluster has no more points than
///   fit parameters; the optimizer is not run.
/// * [`TrackFitError::OutOfRange`] when the guess lies outside the table under
///   [`OutOfRangePolicy::Reject`](crate::interpolate::OutOfRangePolicy::Reject).
/// * [`TrackFitError::FitNonConvergence`] or [`TrackFitError::SingularCovariance`] from the fit.
pub fn solve(
    cluster: &Cluster,
    cluster_index: usize,
    guess: &Guess,
    interpolator: &TrackInterpolator,
    detector: &DetectorParams,
    params: &SolverParams,
) -> Result<FitResult, TrackFitError> {
    let n_points = cluster.len();
    if n_points <= N_FIT_PARAMETERS {
        return Err(TrackFitError::InsufficientDegreesOfFreedom {
            points: n_points,
            parameters: N_FIT_PARAMETERS,
        });
    }

    let (scale, polar) = interpolator.resolve(guess.scale, guess.polar)?;
    let (lower, upper) = parameter_bounds(interpolator, detector);
    let x0 = DVector::from_vec(vec![
        scale,
        polar,
        guess.azimuthal,
        guess.vertex_x,
        guess.vertex_y,
        guess.vertex_z,
    ]);

    let model = TrackModel::new(
        interpolator,
        cluster.points.iter().map(|p| p.position()).collect(),
        detector.point_sigma,
    );
    let outcome = minimize(|x| model.residuals(x), &x0, &lower, &upper, params)?;

    let dof = (n_points - N_FIT_PARAMETERS) as f64;
    let redchisq = outcome.cost / dof;
    let sigma = parameter_sigmas(&outcome.jacobian, redchisq)?;

    debug!(
        event = cluster.event,
        label = cluster.label,
        iterations = outcome.iterations,
        termination = ?outcome.termination,
        redchisq,
        "cluster fitted"
    );

    let x = &outcome.x;
    Ok(FitResult {
        event: cluster.event,
        cluster_index,
        cluster_label: cluster.label,
        vertex_x: x[VERTEX_X],
        sigma_vx: sigma[VERTEX_X],
        vertex_y: x[VERTEX_Y],
        sigma_vy: sigma[VERTEX_Y],
        vertex_z: x[VERTEX_Z],
        sigma_vz: sigma[VERTEX_Z],
        brho: x[SCALE],
        sigma_brho: sigma[SCALE],
        polar: x[POLAR],
        sigma_polar: sigma[POLAR],
        azimuthal: x[AZIMUTHAL].rem_euclid(DPI),
        sigma_azimuthal: sigma[AZIMUTHAL],
        redchisq,
    })
}

/// Box of the fit: table axes for scale and polar, detector volume for the vertex.
fn parameter_bounds(
    interpolator: &TrackInterpolator,
    detector: &DetectorParams,
) -> (DVector<f64>, DVector<f64>) {
    let (scale_min, scale_max) = interpolator.table().scale_range();
    let (polar_min, polar_max) = interpolator.table().polar_range();
    let xy = detector.vertex_xy_limit;
    (
        DVector::from_vec(vec![scale_min, polar_min, f64::NEG_INFINITY, -xy, -xy, 0.0]),
        DVector::from_vec(vec![
            scale_max,
            polar_max,
            f64::INFINITY,
            xy,
            xy,
            detector.detector_length,
        ]),
    )
}

/// `√diag(pinv(JᵀJ)·χ²ᵣ)`
fn parameter_sigmas(jacobian: &DMatrix<f64>, redchisq: f64) -> Result<DVector<f64>, TrackFitError> {
    let normal = jacobian.tr_mul(jacobian);
    let covariance = normal
        .pseudo_inverse(PINV_EPS)
        .map_err(|_| TrackFitError::SingularCovariance)?
        * redchisq;

    let variances = covariance.diagonal();
    if variances.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(TrackFitError::SingularCovariance);
    }
    Ok(variances.map(f64::sqrt))
}
