//! # Bilinear trajectory interpolation
//!
//! [`TrackInterpolator`] turns the discrete [`TrajectoryTable`] into a continuous function
//! `(scale, polar) → Trajectory`. Sample `k` of the result is the bilinear blend of sample `k`
//! of the four nodes bracketing the query, for positions and times alike.
//!
//! Properties
//! -----------------
//! * At an exact grid node the stored trajectory is reproduced.
//! * The result is continuous across cell boundaries (both neighbouring cells agree on the
//!   shared edge).
//! * Queries outside the grid follow the [`OutOfRangePolicy`] chosen at construction.
//!   Non-finite queries are always rejected.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::trajectory::{Trajectory, TrajectorySample};
use super::TrajectoryTable;
use crate::constants::{Radian, TeslaMeter};
use crate::trackfit_errors::TrackFitError;

/// Behaviour of [`TrackInterpolator`] for queries outside the table axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutOfRangePolicy {
    /// Fail with [`TrackFitError::OutOfRange`].
    #[default]
    Reject,
    /// Clamp the query to the nearest grid edge.
    Clamp,
}

/// Continuous view over a shared [`TrajectoryTable`].
#[derive(Debug, Clone)]
pub struct TrackInterpolator {
    table: Arc<TrajectoryTable>,
    policy: OutOfRangePolicy,
}

impl TrackInterpolator {
    /// Interpolator rejecting out-of-range queries.
    pub fn new(table: Arc<TrajectoryTable>) -> Self {
        Self::with_policy(table, OutOfRangePolicy::default())
    }

    pub fn with_policy(table: Arc<TrajectoryTable>, policy: OutOfRangePolicy) -> Self {
        TrackInterpolator { table, policy }
    }

    pub fn table(&self) -> &Arc<TrajectoryTable> {
        &self.table
    }

    pub fn policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    /// Apply the out-of-range policy to a query.
    ///
    /// Return
    /// ----------
    /// * The `(scale, polar)` pair actually used for interpolation (unchanged when inside the
    ///   grid, clamped under [`OutOfRangePolicy::Clamp`]), or [`TrackFitError::OutOfRange`].
    pub fn resolve(
        &self,
        scale: TeslaMeter,
        polar: Radian,
    ) -> Result<(TeslaMeter, Radian), TrackFitError> {
        let scale = self.resolve_axis("scale", scale, self.table.scale_range())?;
        let polar = self.resolve_axis("polar", polar, self.table.polar_range())?;
        Ok((scale, polar))
    }

    fn resolve_axis(
        &self,
        axis: &'static str,
        value: f64,
        (min, max): (f64, f64),
    ) -> Result<f64, TrackFitError> {
        let out_of_range = TrackFitError::OutOfRange {
            axis,
            value,
            min,
            max,
        };
        if !value.is_finite() {
            return Err(out_of_range);
        }
        if (min..=max).contains(&value) {
            return Ok(value);
        }
        match self.policy {
            OutOfRangePolicy::Reject => Err(out_of_range),
            OutOfRangePolicy::Clamp => Ok(value.clamp(min, max)),
        }
    }

    /// Trajectory for the given rigidity and polar angle.
    ///
    /// Arguments
    /// -----------------
    /// * `scale`: Magnetic rigidity (T·m).
    /// * `polar`: Polar angle (rad).
    ///
    /// Return
    /// ----------
    /// * A trajectory in the particle frame with `samples_per_trajectory` samples.
    ///
    /// Errors
    /// ----------
    /// * [`TrackFitError::OutOfRange`] for non-finite queries, or for queries outside the
    ///   grid under [`OutOfRangePolicy::Reject`].
    pub fn interpolate(
        &self,
        scale: TeslaMeter,
        polar: Radian,
    ) -> Result<Trajectory, TrackFitError> {
        let (scale, polar) = self.resolve(scale, polar)?;
        let (i, ts) = locate(self.table.scale_axis(), scale);
        let (j, tp) = locate(self.table.polar_axis(), polar);

        let n00 = self.table.node(i, j);
        let n01 = self.table.node(i, j + 1);
        let n10 = self.table.node(i + 1, j);
        let n11 = self.table.node(i + 1, j + 1);

        let w00 = (1.0 - ts) * (1.0 - tp);
        let w01 = (1.0 - ts) * tp;
        let w10 = ts * (1.0 - tp);
        let w11 = ts * tp;

        let samples = (0..self.table.samples_per_trajectory())
            .map(|k| {
                TrajectorySample::weighted_sum([
                    (w00, &n00[k]),
                    (w01, &n01[k]),
                    (w10, &n10[k]),
                    (w11, &n11[k]),
                ])
            })
            .collect();
        Ok(Trajectory::new(samples))
    }
}

/// Lower index of the bracketing cell and the fractional position inside it.
///
/// `value` must lie inside the axis range; the last node maps to the last cell with `t = 1`.
#[inline]
fn locate(axis: &[f64], value: f64) -> (usize, f64) {
    let upper = axis.partition_point(|&a| a <= value);
    let i = upper.saturating_sub(1).min(axis.len() - 2);
    let t = (value - axis[i]) / (axis[i + 1] - axis[i]);
    (i, t)
}

#[cfg(test)]
mod interpolator_test {
    use super::*;
    use crate::interpolate::{build_table, straight_line_source};

    fn interpolator(policy: OutOfRangePolicy) -> TrackInterpolator {
        let table = build_table(straight_line_source(11)).unwrap();
        TrackInterpolator::with_policy(Arc::new(table), policy)
    }

    #[test]
    fn test_locate() {
        let axis = [0.0, 1.0, 3.0];
        assert_eq!(locate(&axis, 0.0), (0, 0.0));
        assert_eq!(locate(&axis, 0.5), (0, 0.5));
        assert_eq!(locate(&axis, 1.0), (1, 0.0));
        assert_eq!(locate(&axis, 2.0), (1, 0.5));
        assert_eq!(locate(&axis, 3.0), (1, 1.0));
    }

    #[test]
    fn test_nodes_are_reproduced() {
        let interp = interpolator(OutOfRangePolicy::Reject);
        let table = interp.table().clone();
        for (i, &scale) in table.scale_axis().iter().enumerate() {
            for (j, &polar) in table.polar_axis().iter().enumerate() {
                let traj = interp.interpolate(scale, polar).unwrap();
                assert_eq!(traj, table.node_trajectory(i, j));
            }
        }
    }

    #[test]
    fn test_midpoint_is_linear_blend() {
        let interp = interpolator(OutOfRangePolicy::Reject);
        // Lengths are 100 and 200 mm at the two scale nodes; the blend ends at 150 mm.
        let traj = interp.interpolate(1.5, 0.2).unwrap();
        let last = traj.samples().last().unwrap();
        approx::assert_relative_eq!(last.position.z, 150.0 * f64::cos(0.2), epsilon = 1e-9);
        approx::assert_relative_eq!(last.position.x, 150.0 * f64::sin(0.2), epsilon = 1e-9);
        approx::assert_relative_eq!(last.time, 0.5 * (100.0 + 100.0), epsilon = 1e-9);
    }

    #[test]
    fn test_continuity_across_cells() {
        let interp = interpolator(OutOfRangePolicy::Reject);
        let below = interp.interpolate(1.3, 0.6 - 1e-10).unwrap();
        let at = interp.interpolate(1.3, 0.6).unwrap();
        let above = interp.interpolate(1.3, 0.6 + 1e-10).unwrap();
        assert!(below.max_deviation(&at).unwrap() < 1e-6);
        assert!(above.max_deviation(&at).unwrap() < 1e-6);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let interp = interpolator(OutOfRangePolicy::Reject);
        assert_eq!(
            interp.interpolate(2.5, 0.4).unwrap_err(),
            TrackFitError::OutOfRange {
                axis: "scale",
                value: 2.5,
                min: 1.0,
                max: 2.0
            }
        );
        assert!(matches!(
            interp.interpolate(1.5, 1.2),
            Err(TrackFitError::OutOfRange { axis: "polar", .. })
        ));
    }

    #[test]
    fn test_out_of_range_clamped() {
        let interp = interpolator(OutOfRangePolicy::Clamp);
        let clamped = interp.interpolate(2.5, 1.4).unwrap();
        assert_eq!(clamped, interp.table().node_trajectory(1, 2));
        assert_eq!(interp.resolve(0.1, 0.0).unwrap(), (1.0, 0.2));
    }

    #[test]
    fn test_non_finite_always_rejected() {
        let interp = interpolator(OutOfRangePolicy::Clamp);
        assert!(matches!(
            interp.interpolate(f64::NAN, 0.4),
            Err(TrackFitError::OutOfRange { axis: "scale", .. })
        ));
        assert!(matches!(
            interp.interpolate(1.5, f64::INFINITY),
            Err(TrackFitError::OutOfRange { axis: "polar", .. })
        ));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrajectoryTable>();
        assert_send_sync::<TrackInterpolator>();
    }
}
