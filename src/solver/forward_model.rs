//! Forward model of the trajectory fit.
//!
//! Maps a parameter vector `[scale, polar, azimuthal, vx, vy, vz]` to a polyline in the
//! detector frame and measures how far the cluster points lie from it.
use nalgebra::{DVector, Rotation3, Vector3};

use crate::constants::{EPS, N_FIT_PARAMETERS};
use crate::interpolate::TrackInterpolator;
use crate::trackfit_errors::TrackFitError;

/// Indices of the fit parameters in the solver vectors.
pub const SCALE: usize = 0;
pub const POLAR: usize = 1;
pub const AZIMUTHAL: usize = 2;
pub const VERTEX_X: usize = 3;
pub const VERTEX_Y: usize = 4;
pub const VERTEX_Z: usize = 5;

/// Residual model of one cluster.
pub struct TrackModel<'a> {
    interpolator: &'a TrackInterpolator,
    points: Vec<Vector3<f64>>,
    inv_norm: f64,
}

impl<'a> TrackModel<'a> {
    /// Arguments
    /// -----------------
    /// * `interpolator`: Source of particle-frame trajectories.
    /// * `points`: Cluster positions (mm).
    /// * `point_sigma`: Isotropic position resolution (mm); residuals are divided by `√2·σ`.
    pub fn new(
        interpolator: &'a TrackInterpolator,
        points: Vec<Vector3<f64>>,
        point_sigma: f64,
    ) -> Self {
        TrackModel {
            interpolator,
            points,
            inv_norm: 1.0 / (std::f64::consts::SQRT_2 * point_sigma),
        }
    }

    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Model polyline in the detector frame.
    pub fn lab_polyline(&self, x: &DVector<f64>) -> Result<Vec<Vector3<f64>>, TrackFitError> {
        debug_assert_eq!(x.len(), N_FIT_PARAMETERS);
        let trajectory = self.interpolator.interpolate(x[SCALE], x[POLAR])?;
        let vertex = Vector3::new(x[VERTEX_X], x[VERTEX_Y], x[VERTEX_Z]);
        Ok(to_lab_frame(trajectory.positions(), x[AZIMUTHAL], &vertex))
    }

    /// Normalized residual of every cluster point.
    pub fn residuals(&self, x: &DVector<f64>) -> Result<DVector<f64>, TrackFitError> {
        let polyline = self.lab_polyline(x)?;
        Ok(DVector::from_iterator(
            self.points.len(),
            self.points
                .iter()
                .map(|p| distance_to_polyline(p, &polyline) * self.inv_norm),
        ))
    }
}

/// Rotate particle-frame positions about the beam (`z`) axis and translate them to the vertex.
pub fn to_lab_frame(
    positions: impl Iterator<Item = Vector3<f64>>,
    azimuthal: f64,
    vertex: &Vector3<f64>,
) -> Vec<Vector3<f64>> {
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), azimuthal);
    positions.map(|p| rotation * p + vertex).collect()
}

/// Distance from `p` to the segment `[a, b]`.
#[inline]
pub fn distance_to_segment(p: &Vector3<f64>, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= EPS * EPS {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Distance from `p` to the closest segment of a polyline.
///
/// A single-vertex polyline degenerates to a point; an empty one is infinitely far.
pub fn distance_to_polyline(p: &Vector3<f64>, polyline: &[Vector3<f64>]) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [only] => (p - only).norm(),
        _ => polyline
            .windows(2)
            .map(|w| distance_to_segment(p, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}
