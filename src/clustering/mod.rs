//! # Clustering engine
//!
//! Groups the samples of one [`PointCloud`](crate::point_cloud::PointCloud) into clusters that
//! each represent a single particle track.
//!
//! ## Pipeline
//!
//! 1. **Density grouping** – [`clusterize`] labels points with a DBSCAN-style
//!    neighbourhood criterion (optionally charge weighted).
//! 2. **Joining** – [`join_clusters`] merges fragments of the same track whose facing
//!    endpoints are close and whose local directions agree. Merging is transitive and
//!    iterated to a fixed point, so the operation is idempotent.
//! 3. **Cleanup** – [`cleanup_clusters`] drops clusters that are too small or have no
//!    spatial extent.
//!
//! All three stages are pure: the input is never mutated and no state crosses events.
//!
//! ## Example
//!
//! ```rust
//! use trackfit::clustering::{clusterize, join_clusters, cleanup_clusters, ClusterParams};
//! use trackfit::point_cloud::{Point, PointCloud};
//!
//! let points = (0..30).map(|i| Point::new(i as f64, 0.0, 0.0, 1.0, i)).collect();
//! let cloud = PointCloud::new(1, points);
//!
//! let params = ClusterParams::builder()
//!     .neighbor_radius(2.0)
//!     .min_cluster_size(10)
//!     .build()
//!     .unwrap();
//!
//! let clusters = clusterize(&cloud, &params);
//! let joined = join_clusters(&clusters, &params);
//! let cleaned = cleanup_clusters(&joined, &params);
//! assert_eq!(cleaned.len(), 1);
//! ```
use std::cmp::Ordering::{Equal, Greater};
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{EventId, Millimeter, Radian, RADEG};
use crate::point_cloud::Point;
use crate::trackfit_errors::TrackFitError;

pub mod cleaner;
pub mod clusterize;
pub mod joiner;
pub(crate) mod spatial_grid;

pub use cleaner::cleanup_clusters;
pub use clusterize::clusterize;
pub use joiner::join_clusters;

/// A group of points believed to originate from one particle track.
///
/// The `label` is assigned by [`clusterize`] in discovery order and is unique within an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub event: EventId,
    pub label: i32,
    pub points: Vec<Point>,
}

impl Cluster {
    pub fn new(event: EventId, label: i32, points: Vec<Point>) -> Self {
        Cluster {
            event,
            label,
            points,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mean position of the cluster, `None` when empty.
    pub fn centroid(&self) -> Option<Vector3<f64>> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.position());
        Some(sum / self.points.len() as f64)
    }

    /// Diagonal of the axis-aligned bounding box (mm). Zero for empty or single-point clusters.
    pub fn extent(&self) -> Millimeter {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        let (lo, hi) = self.points.iter().fold(
            (first.position(), first.position()),
            |(lo, hi), p| {
                let v = p.position();
                (lo.inf(&v), hi.sup(&v))
            },
        );
        (hi - lo).norm()
    }
}

/// Configuration of the clustering phase.
///
/// Fields
/// -----------------
/// **Phase gate**
/// * `min_write_size` – clouds with fewer points are not clustered at all.
///
/// **Density grouping**
/// * `neighbor_radius` – neighbourhood radius (mm).
/// * `min_neighbors` – points required in a neighbourhood (self included) for a core point.
/// * `min_core_charge` – optional charge the neighbourhood must sum to for a core point.
/// * `keep_noise` – keep isolated points as singleton clusters instead of dropping them.
///
/// **Joining**
/// * `max_join_gap` – largest endpoint-to-endpoint gap bridged when joining (mm).
/// * `max_join_angle` – angular tolerance of the continuity test (rad).
/// * `direction_window` – radius around an endpoint used for its local direction (mm).
///
/// **Cleanup**
/// * `min_cluster_size` – clusters with fewer points are discarded.
/// * `min_extent` – clusters whose bounding-box diagonal is smaller are discarded (mm).
///
/// Defaults
/// -----------------
/// * `min_write_size`: 50
/// * `neighbor_radius`: 5.0 mm
/// * `min_neighbors`: 3
/// * `min_core_charge`: none
/// * `keep_noise`: false
/// * `max_join_gap`: 15.0 mm
/// * `max_join_angle`: 20°
/// * `direction_window`: 10.0 mm
/// * `min_cluster_size`: 50
/// * `min_extent`: 1.0 mm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    pub min_write_size: usize,

    pub neighbor_radius: Millimeter,
    pub min_neighbors: usize,
    pub min_core_charge: Option<f64>,
    pub keep_noise: bool,

    pub max_join_gap: Millimeter,
    pub max_join_angle: Radian,
    pub direction_window: Millimeter,

    pub min_cluster_size: usize,
    pub min_extent: Millimeter,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            min_write_size: 50,

            neighbor_radius: 5.0,
            min_neighbors: 3,
            min_core_charge: None,
            keep_noise: false,

            max_join_gap: 15.0,
            max_join_angle: 20.0 * RADEG,
            direction_window: 10.0,

            min_cluster_size: 50,
            min_extent: 1.0,
        }
    }
}

impl ClusterParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`ClusterParamsBuilder`] initialized with the default values.
    pub fn builder() -> ClusterParamsBuilder {
        ClusterParamsBuilder::new()
    }
}

/// Builder for [`ClusterParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ClusterParamsBuilder {
    params: ClusterParams,
}

impl ClusterParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: ClusterParams::default(),
        }
    }

    pub fn min_write_size(mut self, v: usize) -> Self {
        self.params.min_write_size = v;
        self
    }

    // --- Density grouping ---
    pub fn neighbor_radius(mut self, v: Millimeter) -> Self {
        self.params.neighbor_radius = v;
        self
    }
    pub fn min_neighbors(mut self, v: usize) -> Self {
        self.params.min_neighbors = v;
        self
    }
    pub fn min_core_charge(mut self, v: Option<f64>) -> Self {
        self.params.min_core_charge = v;
        self
    }
    pub fn keep_noise(mut self, v: bool) -> Self {
        self.params.keep_noise = v;
        self
    }

    // --- Joining ---
    pub fn max_join_gap(mut self, v: Millimeter) -> Self {
        self.params.max_join_gap = v;
        self
    }
    pub fn max_join_angle(mut self, v: Radian) -> Self {
        self.params.max_join_angle = v;
        self
    }
    pub fn direction_window(mut self, v: Millimeter) -> Self {
        self.params.direction_window = v;
        self
    }

    // --- Cleanup ---
    pub fn min_cluster_size(mut self, v: usize) -> Self {
        self.params.min_cluster_size = v;
        self
    }
    pub fn min_extent(mut self, v: Millimeter) -> Self {
        self.params.min_extent = v;
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
    /// * `neighbor_radius > 0`, `min_neighbors ≥ 1`.
    /// * `min_core_charge`, when set, must be `≥ 0`.
    /// * `max_join_gap ≥ 0`, `direction_window > 0`.
    /// * `0 ≤ max_join_angle ≤ π/2` (directions are compared undirected).
    /// * `min_extent ≥ 0`.
    ///
    /// Returns
    /// -----------------
    /// * `Err(TrackFitError::InvalidClusterParameter)` describing the first failing rule.
    pub fn build(self) -> Result<ClusterParams, TrackFitError> {
        let p = &self.params;

        if !Self::gt0(p.neighbor_radius) {
            return Err(TrackFitError::InvalidClusterParameter(
                "neighbor_radius must be > 0".into(),
            ));
        }
        if p.min_neighbors == 0 {
            return Err(TrackFitError::InvalidClusterParameter(
                "min_neighbors must be >= 1".into(),
            ));
        }
        if let Some(q) = p.min_core_charge {
            if !Self::ge0(q) {
                return Err(TrackFitError::InvalidClusterParameter(
                    "min_core_charge must be >= 0".into(),
                ));
            }
        }
        if !Self::ge0(p.max_join_gap) {
            return Err(TrackFitError::InvalidClusterParameter(
                "max_join_gap must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.direction_window) {
            return Err(TrackFitError::InvalidClusterParameter(
                "direction_window must be > 0".into(),
            ));
        }
        if !Self::ge0(p.max_join_angle) || p.max_join_angle > std::f64::consts::FRAC_PI_2 {
            return Err(TrackFitError::InvalidClusterParameter(
                "max_join_angle must be in [0, pi/2]".into(),
            ));
        }
        if !Self::ge0(p.min_extent) {
            return Err(TrackFitError::InvalidClusterParameter(
                "min_extent must be >= 0".into(),
            ));
        }

        Ok(self.params)
    }
}

impl fmt::Display for ClusterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Clustering Parameters")?;
            writeln!(f, "---------------------")?;
            writeln!(f, "  min_write_size   = {}", self.min_write_size)?;
            writeln!(f, "  neighbor_radius  = {:.3} mm", self.neighbor_radius)?;
            writeln!(f, "  min_neighbors    = {}", self.min_neighbors)?;
            match self.min_core_charge {
                Some(q) => writeln!(f, "  min_core_charge  = {q:.3}")?,
                None => writeln!(f, "  min_core_charge  = none")?,
            }
            writeln!(f, "  keep_noise       = {}", self.keep_noise)?;
            writeln!(f, "  max_join_gap     = {:.3} mm", self.max_join_gap)?;
            writeln!(
                f,
                "  max_join_angle   = {:.3} deg",
                self.max_join_angle / RADEG
            )?;
            writeln!(f, "  direction_window = {:.3} mm", self.direction_window)?;
            writeln!(f, "  min_cluster_size = {}", self.min_cluster_size)?;
            write!(f, "  min_extent       = {:.3} mm", self.min_extent)
        } else {
            write!(
                f,
                "ClusterParams(radius={:.2}mm, min_neighbors={}, join_gap={:.2}mm, join_angle={:.1}deg, min_size={})",
                self.neighbor_radius,
                self.min_neighbors,
                self.max_join_gap,
                self.max_join_angle / RADEG,
                self.min_cluster_size,
            )
        }
    }
}

#[cfg(test)]
mod cluster_params_test {
    use super::*;

    #[test]
    fn test_builder_validation() {
        assert!(ClusterParams::builder().build().is_ok());

        let err = ClusterParams::builder()
            .neighbor_radius(0.0)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            TrackFitError::InvalidClusterParameter("neighbor_radius must be > 0".into())
        );

        assert!(ClusterParams::builder()
            .neighbor_radius(f64::NAN)
            .build()
            .is_err());
        assert!(ClusterParams::builder().min_neighbors(0).build().is_err());
        assert!(ClusterParams::builder()
            .max_join_angle(2.0)
            .build()
            .is_err());
        assert!(ClusterParams::builder()
            .min_core_charge(Some(-1.0))
            .build()
            .is_err());
    }

    #[test]
    fn test_cluster_geometry() {
        let cluster = Cluster::new(
            0,
            0,
            vec![
                Point::new(0.0, 0.0, 0.0, 1.0, 0),
                Point::new(3.0, 4.0, 0.0, 1.0, 1),
            ],
        );
        assert_eq!(cluster.extent(), 5.0);
        assert_eq!(cluster.centroid(), Some(Vector3::new(1.5, 2.0, 0.0)));

        let empty = Cluster::new(0, 1, vec![]);
        assert_eq!(empty.extent(), 0.0);
        assert_eq!(empty.centroid(), None);
    }

    #[test]
    fn test_display() {
        let params = ClusterParams::default();
        let compact = format!("{params}");
        assert!(compact.starts_with("ClusterParams("));
        let table = format!("{params:#}");
        assert!(table.contains("max_join_gap"));
    }
}
