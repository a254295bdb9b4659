//! # Trajectory table and interpolation
//!
//! The solver's forward model is a precomputed grid of simulated trajectories for one
//! (particle species, gas target) combination. The grid is indexed by magnetic rigidity
//! (the *scale* axis, T·m) and polar angle (rad). Every node stores the same number of
//! samples, resampled upstream onto a common parametrization so that sample `k` of two
//! neighbouring nodes can be blended directly.
//!
//! ## Building a table
//!
//! A [`TableSource`] is the raw, unvalidated content (for instance loaded from JSON with
//! [`TableSource::from_json_path`]). [`build_table`] validates it and produces an immutable
//! [`TrajectoryTable`], meant to be wrapped in an [`Arc`](std::sync::Arc) and shared by every
//! solver call of a run.
//!
//! ## Validation
//!
//! [`build_table`] fails with [`TrackFitError::TableFormat`] when:
//! * the `species` or `target` metadata is absent or blank,
//! * an axis is missing, has fewer than two nodes, is not strictly increasing, or holds
//!   non-finite values,
//! * the number of trajectories differs from `scale_axis.len() × polar_axis.len()`,
//! * a trajectory is empty, sample counts differ between nodes, or a sample is not finite.
//!
//! ## JSON layout
//!
//! ```text
//! {
//!   "species": "proton",
//!   "target": "H2 600 Torr",
//!   "scale_axis": [0.5, 0.6, ...],           // T·m, strictly increasing
//!   "polar_axis": [0.17, 0.26, ...],         // rad, strictly increasing
//!   "trajectories": [ [[x, y, z, t], ...],   // node (scale_0, polar_0)
//!                     [[x, y, z, t], ...],   // node (scale_0, polar_1)
//!                     ... ]                  // scale-major order
//! }
//! ```
//!
//! ## See also
//! ------------
//! * [`TrackInterpolator`] – continuous trajectories from the grid.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{Radian, TeslaMeter};
use crate::trackfit_errors::TrackFitError;

pub mod track_interpolator;
pub mod trajectory;

pub use track_interpolator::{OutOfRangePolicy, TrackInterpolator};
pub use trajectory::{Trajectory, TrajectorySample};

/// Raw content of a trajectory table, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    pub species: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub scale_axis: Vec<TeslaMeter>,
    #[serde(default)]
    pub polar_axis: Vec<Radian>,
    /// Scale-major list of node trajectories, each sample being `[x, y, z, t]`.
    #[serde(default)]
    pub trajectories: Vec<Vec<[f64; 4]>>,
}

impl TableSource {
    /// Read a table source from a JSON file.
    ///
    /// Only I/O and JSON syntax errors are reported here; structural checks are done by
    /// [`build_table`].
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, TrackFitError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Immutable grid of simulated trajectories.
///
/// Node `(i, j)` (scale index `i`, polar index `j`) is stored at flat position
/// `(i * n_polar + j) * samples_per_trajectory`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryTable {
    species: String,
    target: String,
    scale_axis: Vec<TeslaMeter>,
    polar_axis: Vec<Radian>,
    samples_per_trajectory: usize,
    samples: Vec<TrajectorySample>,
}

impl TrajectoryTable {
    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn scale_axis(&self) -> &[TeslaMeter] {
        &self.scale_axis
    }

    pub fn polar_axis(&self) -> &[Radian] {
        &self.polar_axis
    }

    pub fn samples_per_trajectory(&self) -> usize {
        self.samples_per_trajectory
    }

    /// Inclusive `(min, max)` of the scale axis.
    pub fn scale_range(&self) -> (TeslaMeter, TeslaMeter) {
        axis_range(&self.scale_axis)
    }

    /// Inclusive `(min, max)` of the polar axis.
    pub fn polar_range(&self) -> (Radian, Radian) {
        axis_range(&self.polar_axis)
    }

    /// Samples of the node `(scale_index, polar_index)`.
    ///
    /// Panics if an index is outside the grid.
    pub fn node(&self, scale_index: usize, polar_index: usize) -> &[TrajectorySample] {
        assert!(scale_index < self.scale_axis.len() && polar_index < self.polar_axis.len());
        let start = (scale_index * self.polar_axis.len() + polar_index) * self.samples_per_trajectory;
        &self.samples[start..start + self.samples_per_trajectory]
    }

    /// Owned copy of a node trajectory.
    pub fn node_trajectory(&self, scale_index: usize, polar_index: usize) -> Trajectory {
        Trajectory::new(self.node(scale_index, polar_index).to_vec())
    }
}

#[inline]
fn axis_range(axis: &[f64]) -> (f64, f64) {
    (axis[0], axis[axis.len() - 1])
}

/// Validate a [`TableSource`] and build the immutable [`TrajectoryTable`].
///
/// Arguments
/// -----------------
/// * `source`: Raw grid content and metadata.
///
/// Return
/// ----------
/// * The validated table, or [`TrackFitError::TableFormat`] describing the first defect found.
pub fn build_table(source: TableSource) -> Result<TrajectoryTable, TrackFitError> {
    let species = required_metadata(source.species, "species")?;
    let target = required_metadata(source.target, "target")?;

    check_axis(&source.scale_axis, "scale")?;
    check_axis(&source.polar_axis, "polar")?;

    let n_nodes = source.scale_axis.len() * source.polar_axis.len();
    if source.trajectories.len() != n_nodes {
        return Err(TrackFitError::TableFormat(format!(
            "expected {} trajectories ({} scale x {} polar), found {}",
            n_nodes,
            source.scale_axis.len(),
            source.polar_axis.len(),
            source.trajectories.len()
        )));
    }

    let samples_per_trajectory = source.trajectories[0].len();
    if samples_per_trajectory == 0 {
        return Err(TrackFitError::TableFormat(
            "trajectory 0 has no samples".into(),
        ));
    }

    let mut samples = Vec::with_capacity(n_nodes * samples_per_trajectory);
    for (node, trajectory) in source.trajectories.iter().enumerate() {
        if trajectory.len() != samples_per_trajectory {
            return Err(TrackFitError::TableFormat(format!(
                "inconsistent sample count: trajectory {} has {} samples, expected {}",
                node,
                trajectory.len(),
                samples_per_trajectory
            )));
        }
        for (k, s) in trajectory.iter().enumerate() {
            if s.iter().any(|v| !v.is_finite()) {
                return Err(TrackFitError::TableFormat(format!(
                    "non-finite value in trajectory {node}, sample {k}"
                )));
            }
            samples.push(TrajectorySample::new(s[0], s[1], s[2], s[3]));
        }
    }

    info!(
        species = %species,
        target = %target,
        scale_nodes = source.scale_axis.len(),
        polar_nodes = source.polar_axis.len(),
        samples_per_trajectory,
        "trajectory table loaded"
    );

    Ok(TrajectoryTable {
        species,
        target,
        scale_axis: source.scale_axis,
        polar_axis: source.polar_axis,
        samples_per_trajectory,
        samples,
    })
}

fn required_metadata(value: Option<String>, name: &str) -> Result<String, TrackFitError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(TrackFitError::TableFormat(format!(
            "missing {name} metadata"
        ))),
    }
}

fn check_axis(axis: &[f64], name: &str) -> Result<(), TrackFitError> {
    if axis.is_empty() {
        return Err(TrackFitError::TableFormat(format!("missing {name} axis")));
    }
    if axis.len() < 2 {
        return Err(TrackFitError::TableFormat(format!(
            "{name} axis needs at least 2 nodes"
        )));
    }
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(TrackFitError::TableFormat(format!(
            "{name} axis holds non-finite values"
        )));
    }
    if axis.windows(2).any(|w| w[1] <= w[0]) {
        return Err(TrackFitError::TableFormat(format!(
            "{name} axis is not strictly increasing"
        )));
    }
    Ok(())
}


#[cfg(test)]
pub(crate) use table_test::straight_line_source;
