//! Joining of track fragments.
//!
//! Density grouping frequently splits one track in several pieces (dead pads, charge
//! threshold gaps). Two clusters are considered fragments of the same track when
//!
//! * the gap between their facing endpoints is at most `max_join_gap`,
//! * the local directions at those endpoints agree within `max_join_angle`,
//! * the segment bridging the gap is itself aligned with both local directions.
//!
//! Candidate pairs are sorted by increasing gap and merged through a union–find, so the
//! result is transitive and does not depend on the input order. Passes are repeated until
//! no pair qualifies, which makes the operation idempotent.
use itertools::Itertools;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use tracing::debug;

use super::{Cluster, ClusterParams};
use crate::constants::EPS;

/// Merge clusters that are continuous fragments of one physical track.
///
/// Arguments
/// -----------------
/// * `clusters`: The clusters of a single event.
/// * `params`: Joining parameters (`max_join_gap`, `max_join_angle`, `direction_window`).
///
/// Return
/// ----------
/// * The merged clusters sorted by label. A merged cluster keeps the smallest label of its
///   members and owns their points, concatenated in label order.
pub fn join_clusters(clusters: &[Cluster], params: &ClusterParams) -> Vec<Cluster> {
    let mut current: Vec<Cluster> = clusters.to_vec();
    current.sort_by_key(|c| c.label);

    let mut pass = 0;
    loop {
        let ends: Vec<Option<TrackEnds>> = current
            .iter()
            .map(|c| TrackEnds::from_cluster(c, params.direction_window))
            .collect();

        let mut candidates: Vec<(f64, usize, usize)> = (0..current.len())
            .tuple_combinations()
            .filter_map(|(i, j)| {
                let (a, b) = (ends[i].as_ref()?, ends[j].as_ref()?);
                a.join_gap(b, params).map(|gap| (gap, i, j))
            })
            .collect();

        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|x, y| {
            x.0.total_cmp(&y.0)
                .then(current[x.1].label.cmp(&current[y.1].label))
                .then(current[x.2].label.cmp(&current[y.2].label))
        });

        let mut forest = UnionFind::new(current.len());
        for &(_, i, j) in &candidates {
            forest.union(i, j);
        }

        pass += 1;
        debug!(
            pass,
            merges = candidates.len(),
            clusters = current.len(),
            "joining cluster fragments"
        );

        current = merge_groups(current, &mut forest);
    }

    current
}

/// Collapse every union–find component into a single cluster.
fn merge_groups(clusters: Vec<Cluster>, forest: &mut UnionFind) -> Vec<Cluster> {
    let roots: Vec<usize> = (0..clusters.len()).map(|i| forest.find(i)).collect();

    let mut merged: Vec<Cluster> = Vec::new();
    let mut slot_of_root = vec![usize::MAX; clusters.len()];

    // `clusters` is sorted by label, so the first member seen in a group has its smallest label.
    for (idx, cluster) in clusters.into_iter().enumerate() {
        let root = roots[idx];
        if slot_of_root[root] == usize::MAX {
            slot_of_root[root] = merged.len();
            merged.push(cluster);
        } else {
            merged[slot_of_root[root]].points.extend(cluster.points);
        }
    }

    merged.sort_by_key(|c| c.label);
    merged
}

/// Endpoints and local directions of a cluster along its principal axis.
#[derive(Debug, Clone)]
struct TrackEnds {
    ends: [Vector3<f64>; 2],
    directions: [Vector3<f64>; 2],
}

impl TrackEnds {
    /// `None` for clusters with fewer than two distinct positions.
    fn from_cluster(cluster: &Cluster, window: f64) -> Option<Self> {
        let positions: Vec<Vector3<f64>> = cluster.points.iter().map(|p| p.position()).collect();
        let axis = principal_axis(&positions)?;

        let (lo, hi) = positions
            .iter()
            .map(|p| p.dot(&axis))
            .enumerate()
            .minmax_by(|a, b| a.1.total_cmp(&b.1))
            .into_option()?;
        let ends = [positions[lo.0], positions[hi.0]];

        let directions = ends.map(|end| {
            let local: Vec<Vector3<f64>> = positions
                .iter()
                .filter(|p| (*p - end).norm() <= window)
                .copied()
                .collect();
            principal_axis(&local).unwrap_or(axis)
        });

        Some(TrackEnds { ends, directions })
    }

    /// Gap between the facing endpoints when the pair passes the continuity test.
    fn join_gap(&self, other: &TrackEnds, params: &ClusterParams) -> Option<f64> {
        let (ia, ib) = (0..2)
            .cartesian_product(0..2)
            .min_by(|&(a1, b1), &(a2, b2)| {
                let d1 = (self.ends[a1] - other.ends[b1]).norm();
                let d2 = (self.ends[a2] - other.ends[b2]).norm();
                d1.total_cmp(&d2)
            })?;

        let bridge = other.ends[ib] - self.ends[ia];
        let gap = bridge.norm();
        if gap > params.max_join_gap {
            return None;
        }

        let da = &self.directions[ia];
        let db = &other.directions[ib];
        let max_angle = params.max_join_angle;
        if undirected_angle(da, db) > max_angle {
            return None;
        }
        if gap > EPS {
            let c = bridge / gap;
            if undirected_angle(&c, da) > max_angle || undirected_angle(&c, db) > max_angle {
                return None;
            }
        }
        Some(gap)
    }
}

/// Unit eigenvector of the largest eigenvalue of the position covariance.
fn principal_axis(positions: &[Vector3<f64>]) -> Option<Vector3<f64>> {
    if positions.len() < 2 {
        return None;
    }
    let n = positions.len() as f64;
    let centroid = positions.iter().fold(Vector3::<f64>::zeros(), |acc, p| acc + p) / n;
    let covariance = positions.iter().fold(Matrix3::<f64>::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = SymmetricEigen::new(covariance);
    let imax = eigen.eigenvalues.imax();
    if eigen.eigenvalues[imax] <= EPS * EPS {
        return None;
    }
    Some(eigen.eigenvectors.column(imax).normalize())
}

/// Angle between two unit vectors, ignoring orientation, in `[0, π/2]`.
#[inline]
fn undirected_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).abs().min(1.0).acos()
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the smaller index as root so the lowest label stays representative.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
mod joiner_test {
    use super::*;
    use crate::constants::RADEG;
    use crate::point_cloud::Point;

    fn segment(label: i32, from: Vector3<f64>, dir: Vector3<f64>, n: u32, first_pad: u32) -> Cluster {
        let dir = dir.normalize();
        let points = (0..n)
            .map(|i| {
                let p = from + dir * i as f64;
                Point::new(p.x, p.y, p.z, 1.0, first_pad + i)
            })
            .collect();
        Cluster::new(0, label, points)
    }

    fn params() -> ClusterParams {
        ClusterParams::builder()
            .max_join_gap(10.0)
            .max_join_angle(10.0 * RADEG)
            .direction_window(5.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_collinear_fragments_join() {
        let a = segment(0, Vector3::new(0.0, 0.0, 0.0), Vector3::x(), 21, 0);
        let b = segment(1, Vector3::new(25.0, 0.0, 0.0), Vector3::x(), 21, 100);

        let joined = join_clusters(&[a, b], &params());
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].label, 0);
        assert_eq!(joined[0].len(), 42);
    }

    #[test]
    fn test_gap_too_large() {
        let a = segment(0, Vector3::new(0.0, 0.0, 0.0), Vector3::x(), 21, 0);
        let b = segment(1, Vector3::new(40.0, 0.0, 0.0), Vector3::x(), 21, 100);
        assert_eq!(join_clusters(&[a, b], &params()).len(), 2);
    }

    #[test]
    fn test_perpendicular_fragments_stay_apart() {
        let a = segment(0, Vector3::new(0.0, 0.0, 0.0), Vector3::x(), 21, 0);
        let b = segment(1, Vector3::new(23.0, 2.0, 0.0), Vector3::y(), 21, 100);
        assert_eq!(join_clusters(&[a, b], &params()).len(), 2);
    }

    #[test]
    fn test_parallel_offset_fragments_stay_apart() {
        // Side by side: close endpoints but the bridge is perpendicular to both tracks.
        let a = segment(0, Vector3::new(0.0, 0.0, 0.0), Vector3::x(), 21, 0);
        let b = segment(1, Vector3::new(0.0, 6.0, 0.0), Vector3::x(), 21, 100);
        assert_eq!(join_clusters(&[a, b], &params()).len(), 2);
    }

    #[test]
    fn test_transitive_join_and_idempotence() {
        let a = segment(3, Vector3::new(0.0, 0.0, 0.0), Vector3::x(), 11, 0);
        let b = segment(1, Vector3::new(15.0, 0.0, 0.0), Vector3::x(), 11, 100);
        let c = segment(7, Vector3::new(30.0, 0.0, 0.0), Vector3::x(), 11, 200);
        let far = segment(2, Vector3::new(0.0, 80.0, 0.0), Vector3::z(), 11, 300);

        let once = join_clusters(&[a, c, far, b], &params());
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].label, 1);
        assert_eq!(once[0].len(), 33);
        assert_eq!(once[1].label, 2);

        let twice = join_clusters(&once, &params());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_singletons_are_not_joined() {
        let a = Cluster::new(0, 0, vec![Point::new(0.0, 0.0, 0.0, 1.0, 0)]);
        let b = Cluster::new(0, 1, vec![Point::new(1.0, 0.0, 0.0, 1.0, 1)]);
        assert_eq!(join_clusters(&[a, b], &params()).len(), 2);
    }

    #[test]
    fn test_principal_axis() {
        let pts: Vec<Vector3<f64>> = (0..10)
            .map(|i| Vector3::new(i as f64, 2.0 * i as f64, 0.0))
            .collect();
        let axis = principal_axis(&pts).unwrap();
        let expected = Vector3::new(1.0, 2.0, 0.0).normalize();
        assert!(undirected_angle(&axis, &expected) < 1e-9);
        assert!(principal_axis(&pts[..1]).is_none());
    }
}
