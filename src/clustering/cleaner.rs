//! Removal of non-physical clusters.
use tracing::debug;

use super::{Cluster, ClusterParams};

/// Discard clusters that cannot be a particle track.
///
/// A cluster is dropped when it holds fewer than `min_cluster_size` points or when its
/// bounding-box diagonal is below `min_extent` (a degenerate, zero-extent point set).
/// Survivors are returned unchanged and in their input order; the result may be empty.
pub fn cleanup_clusters(clusters: &[Cluster], params: &ClusterParams) -> Vec<Cluster> {
    let survivors: Vec<Cluster> = clusters
        .iter()
        .filter(|c| c.len() >= params.min_cluster_size && c.extent() >= params.min_extent)
        .cloned()
        .collect();

    if survivors.len() != clusters.len() {
        debug!(
            removed = clusters.len() - survivors.len(),
            kept = survivors.len(),
            "cleaned up clusters"
        );
    }
    survivors
}
