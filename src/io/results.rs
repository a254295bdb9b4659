//! Estimate and fit-result tables.
use std::path::Path;

use super::{read_rows, write_rows};
use crate::gate::EstimateRecord;
use crate::solver::FitResult;
use crate::trackfit_errors::TrackFitError;

/// Read the rows of the estimation stage.
pub fn read_estimates_csv(path: impl AsRef<Path>) -> Result<Vec<EstimateRecord>, TrackFitError> {
    read_rows(path.as_ref())
}

/// Write the fit results of a run, one row per fitted cluster.
pub fn write_fit_results_csv(
    path: impl AsRef<Path>,
    results: &[FitResult],
) -> Result<(), TrackFitError> {
    write_rows(path.as_ref(), results)
}
