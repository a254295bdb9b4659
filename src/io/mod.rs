//! # Tabular file I/O
//!
//! CSV readers and writers for the data exchanged between the processing phases. Every file
//! has a header row; columns are matched by name, and unknown columns are ignored on read.
//!
//! | file           | columns                                                         |
//! |----------------|-----------------------------------------------------------------|
//! | point clouds   | `event,x,y,z,charge,pad`                                        |
//! | clusters       | `event,cluster_index,label,x,y,z,charge,pad`                    |
//! | estimates      | see [`EstimateRecord`](crate::gate::EstimateRecord)             |
//! | fit results    | see [`FitResult`](crate::solver::FitResult)                     |
//!
//! Point and cluster files store one row per point; rows of a cloud or a cluster need not be
//! contiguous.
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::trackfit_errors::TrackFitError;

pub mod clouds;
pub mod results;

pub use clouds::{read_clusters_csv, read_point_clouds_csv, write_clusters_csv, write_point_clouds_csv};
pub use results::{read_estimates_csv, write_fit_results_csv};

/// Deserialize every row of a CSV file.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TrackFitError> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<T>()
        .map(|row| row.map_err(TrackFitError::from))
        .collect()
}

/// Serialize rows to a CSV file, header included.
pub(crate) fn write_rows<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), TrackFitError> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
