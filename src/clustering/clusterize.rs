//! Density grouping of a point cloud.
//!
//! The scan follows DBSCAN: a point is *core* when its neighbourhood holds at least
//! `min_neighbors` points (and, when configured, at least `min_core_charge` charge). Core
//! points seed clusters that grow breadth-first through other core points; non-core points
//! reached from a core point become border members of the first cluster that reaches them.
use std::collections::VecDeque;

use tracing::debug;

use super::spatial_grid::SpatialGrid;
use super::{Cluster, ClusterParams};
use crate::point_cloud::PointCloud;

const UNASSIGNED: i32 = -1;

/// Partition a point cloud into density-connected clusters.
///
/// Arguments
/// -----------------
/// * `cloud`: The event's point cloud (not mutated).
/// * `params`: Density parameters (`neighbor_radius`, `min_neighbors`, `min_core_charge`,
///   `keep_noise`).
///
/// Return
/// ----------
/// * Clusters ordered by label. Labels are `0, 1, 2…` in the order the scan discovers them.
///   Isolated points are emitted as singleton clusters after the density clusters when
///   `keep_noise` is set, otherwise they are dropped.
///
/// Notes
/// ----------
/// * An empty cloud yields an empty list.
/// * Every input point appears in at most one output cluster.
pub fn clusterize(cloud: &PointCloud, params: &ClusterParams) -> Vec<Cluster> {
    let points = &cloud.points;
    if points.is_empty() {
        return Vec::new();
    }

    let grid = SpatialGrid::new(points, params.neighbor_radius);
    let neighborhoods: Vec<Vec<usize>> = (0..points.len()).map(|i| grid.neighbors(i)).collect();

    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|nbrs| {
            let dense = nbrs.len() >= params.min_neighbors;
            let charged = params
                .min_core_charge
                .map_or(true, |q| nbrs.iter().map(|&j| points[j].charge).sum::<f64>() >= q);
            dense && charged
        })
        .collect();

    let mut labels = vec![UNASSIGNED; points.len()];
    let mut next_label: i32 = 0;
    let mut queue = VecDeque::new();

    for seed in 0..points.len() {
        if labels[seed] != UNASSIGNED || !is_core[seed] {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[seed] = label;
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            if !is_core[current] {
                continue;
            }
            for &nbr in &neighborhoods[current] {
                if labels[nbr] == UNASSIGNED {
                    labels[nbr] = label;
                    queue.push_back(nbr);
                }
            }
        }
    }

    let n_dense = next_label as usize;
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_dense];
    let mut noise = Vec::new();
    for (idx, &label) in labels.iter().enumerate() {
        if label == UNASSIGNED {
            noise.push(idx);
        } else {
            groups[label as usize].push(idx);
        }
    }

    let mut clusters: Vec<Cluster> = groups
        .into_iter()
        .enumerate()
        .map(|(label, members)| {
            Cluster::new(
                cloud.event,
                label as i32,
                members.into_iter().map(|i| points[i]).collect(),
            )
        })
        .collect();

    if params.keep_noise {
        clusters.extend(noise.iter().enumerate().map(|(k, &i)| {
            Cluster::new(cloud.event, (n_dense + k) as i32, vec![points[i]])
        }));
    }

    debug!(
        event = cloud.event,
        points = points.len(),
        clusters = n_dense,
        noise = noise.len(),
        "clusterized point cloud"
    );

    clusters
}
