//! Point-cloud and cluster files.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{read_rows, write_rows};
use crate::clustering::Cluster;
use crate::constants::{ClusterStore, EventId};
use crate::point_cloud::{Point, PointCloud};
use crate::trackfit_errors::TrackFitError;

#[derive(Debug, Serialize, Deserialize)]
struct PointRow {
    event: EventId,
    x: f64,
    y: f64,
    z: f64,
    charge: f64,
    pad: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClusterRow {
    event: EventId,
    cluster_index: usize,
    label: i32,
    x: f64,
    y: f64,
    z: f64,
    charge: f64,
    pad: u32,
}

impl PointRow {
    fn point(&self) -> Point {
        Point::new(self.x, self.y, self.z, self.charge, self.pad)
    }
}

impl ClusterRow {
    fn point(&self) -> Point {
        Point::new(self.x, self.y, self.z, self.charge, self.pad)
    }
}

/// Read a point-cloud file.
///
/// Return
/// ----------
/// * One cloud per event, ordered by event. Points keep their file order. Ion-chamber data is
///   not part of this format and is left unavailable.
pub fn read_point_clouds_csv(path: impl AsRef<Path>) -> Result<Vec<PointCloud>, TrackFitError> {
    let rows: Vec<PointRow> = read_rows(path.as_ref())?;
    let mut by_event: BTreeMap<EventId, Vec<Point>> = BTreeMap::new();
    for row in &rows {
        by_event.entry(row.event).or_default().push(row.point());
    }
    Ok(by_event
        .into_iter()
        .map(|(event, points)| PointCloud::new(event, points))
        .collect())
}

pub fn write_point_clouds_csv(
    path: impl AsRef<Path>,
    clouds: &[PointCloud],
) -> Result<(), TrackFitError> {
    write_rows(
        path.as_ref(),
        clouds.iter().flat_map(|cloud| {
            cloud.points.iter().map(move |p| PointRow {
                event: cloud.event,
                x: p.x,
                y: p.y,
                z: p.z,
                charge: p.charge,
                pad: p.pad,
            })
        }),
    )
}

/// Write the surviving clusters of a run, one row per point.
///
/// Events without clusters produce no rows.
pub fn write_clusters_csv(path: impl AsRef<Path>, store: &ClusterStore) -> Result<(), TrackFitError> {
    write_rows(
        path.as_ref(),
        store.iter().flat_map(|(&event, clusters)| {
            clusters.iter().enumerate().flat_map(move |(cluster_index, cluster)| {
                cluster.points.iter().map(move |p| ClusterRow {
                    event,
                    cluster_index,
                    label: cluster.label,
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    charge: p.charge,
                    pad: p.pad,
                })
            })
        }),
    )
}

/// Read a cluster file back into a [`ClusterStore`].
///
/// Cluster indices must be contiguous from 0 within each event, otherwise
/// [`TrackFitError::InvalidClusterFile`] names the first missing one.
pub fn read_clusters_csv(path: impl AsRef<Path>) -> Result<ClusterStore, TrackFitError> {
    let rows: Vec<ClusterRow> = read_rows(path.as_ref())?;

    let mut grouped: BTreeMap<EventId, BTreeMap<usize, Cluster>> = BTreeMap::new();
    for row in &rows {
        grouped
            .entry(row.event)
            .or_default()
            .entry(row.cluster_index)
            .or_insert_with(|| Cluster::new(row.event, row.label, Vec::new()))
            .points
            .push(row.point());
    }

    let mut store = ClusterStore::new();
    for (event, clusters) in grouped {
        if let Some((position, index)) = clusters
            .keys()
            .enumerate()
            .find(|(position, index)| *position != **index)
        {
            return Err(TrackFitError::InvalidClusterFile(format!(
                "event {event}: cluster {position} missing (next index found is {index})"
            )));
        }
        store.insert(event, clusters.into_values().collect());
    }
    Ok(store)
}

#[cfg(test)]
mod clouds_test {
    use super::*;

    fn cloud(event: EventId, n: u32) -> PointCloud {
        PointCloud::new(
            event,
            (0..n)
                .map(|i| Point::new(i as f64, 0.5 * i as f64, 2.0, 10.0 + i as f64, i))
                .collect(),
        )
    }

    #[test]
    fn test_point_cloud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clouds.csv");
        let clouds = vec![cloud(3, 4), cloud(8, 2)];
        write_point_clouds_csv(&path, &clouds).unwrap();

        let back = read_point_clouds_csv(&path).unwrap();
        assert_eq!(back, clouds);
    }

    #[test]
    fn test_interleaved_rows_are_grouped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clouds.csv");
        std::fs::write(
            &path,
            "event,x,y,z,charge,pad\n5,1,0,0,1,1\n2,0,0,0,1,7\n5,2,0,0,1,2\n",
        )
        .unwrap();

        let back = read_point_clouds_csv(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].event, 2);
        assert_eq!(back[1].points.iter().map(|p| p.pad).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_cluster_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.csv");

        let mut store = ClusterStore::new();
        store.insert(
            1,
            vec![
                Cluster::new(1, 4, cloud(1, 3).points),
                Cluster::new(1, 0, cloud(1, 2).points),
            ],
        );
        store.insert(6, vec![Cluster::new(6, 2, cloud(6, 5).points)]);
        write_clusters_csv(&path, &store).unwrap();

        assert_eq!(read_clusters_csv(&path).unwrap(), store);
    }

    #[test]
    fn test_cluster_index_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.csv");
        std::fs::write(
            &path,
            "event,cluster_index,label,x,y,z,charge,pad\n1,0,0,0,0,0,1,0\n1,2,5,0,0,0,1,1\n",
        )
        .unwrap();
        assert_eq!(
            read_clusters_csv(&path).unwrap_err(),
            TrackFitError::InvalidClusterFile(
                "event 1: cluster 1 missing (next index found is 2)".into()
            )
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_point_clouds_csv(dir.path().join("nope.csv")),
            Err(TrackFitError::CsvError(_))
        ));
    }
}
