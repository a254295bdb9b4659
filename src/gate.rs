//! # Particle-identification gate
//!
//! Selects, among the rows of the estimation stage, the clusters worth a full fit and turns
//! them into solver [`Candidate`]s.
//!
//! A row passes the gate when
//! * its `(dEdx, brho)` lies inside the [`ParticleCut`] polygon of the selected species,
//! * its ion-chamber amplitude lies strictly inside `(ic_min_val, ic_max_val)`.
//!
//! Among the survivors of one event only the row with the **largest polar angle** is kept,
//! which discards beam-like tracks. The output is ordered by event.
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants::{EventId, Radian, TeslaMeter};
use crate::solver::Guess;
use crate::trackfit_errors::TrackFitError;

/// One row of the estimation stage.
///
/// Unknown columns are ignored when reading, so full estimate tables can be used directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub event: EventId,
    pub cluster_index: usize,
    pub cluster_label: i32,
    pub ic_amplitude: f64,
    pub ic_integral: f64,
    pub ic_centroid: f64,
    pub ic_multiplicity: f64,
    pub vertex_x: f64,
    pub vertex_y: f64,
    pub vertex_z: f64,
    pub polar: Radian,
    pub azimuthal: Radian,
    pub brho: TeslaMeter,
    #[serde(rename = "dEdx")]
    pub dedx: f64,
}

impl EstimateRecord {
    pub fn guess(&self) -> Guess {
        Guess {
            polar: self.polar,
            azimuthal: self.azimuthal,
            scale: self.brho,
            vertex_x: self.vertex_x,
            vertex_y: self.vertex_y,
            vertex_z: self.vertex_z,
        }
    }
}

/// A cluster selected for fitting, with its starting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub event: EventId,
    pub cluster_index: usize,
    pub guess: Guess,
}

/// Closed polygon in the `(dEdx, brho)` plane identifying one particle species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleCut {
    /// Species the cut selects; must match the trajectory table.
    pub species: String,
    /// Polygon vertices as `(dEdx, brho)`; the closing edge is implicit.
    pub vertices: Vec<(f64, f64)>,
}

impl ParticleCut {
    pub fn new(species: impl Into<String>, vertices: Vec<(f64, f64)>) -> Self {
        ParticleCut {
            species: species.into(),
            vertices,
        }
    }

    /// Load a cut from JSON (`{"species": ..., "vertices": [[x, y], ...]}`).
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, TrackFitError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let cut: ParticleCut = serde_json::from_reader(reader)?;
        if cut.vertices.len() < 3 {
            return Err(TrackFitError::ConfigurationMissing(format!(
                "particle cut '{}' needs at least 3 vertices",
                cut.species
            )));
        }
        Ok(cut)
    }

    /// Even–odd ray casting. Points on an edge may fall on either side.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        self.vertices
            .iter()
            .circular_tuple_windows()
            .filter(|&(&(x1, y1), &(x2, y2))| {
                (y1 > y) != (y2 > y) && x < (x2 - x1) * (y - y1) / (y2 - y1) + x1
            })
            .count()
            % 2
            == 1
    }
}

/// Ion-chamber window of the gate.
///
/// Defaults
/// -----------------
/// * `ic_min_val`: 0.0
/// * `ic_max_val`: 4095.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateParams {
    pub ic_min_val: f64,
    pub ic_max_val: f64,
}

impl Default for GateParams {
    fn default() -> Self {
        GateParams {
            ic_min_val: 0.0,
            ic_max_val: 4095.0,
        }
    }
}

/// Apply the particle gate to the estimation rows of a run.
///
/// Arguments
/// -----------------
/// * `records`: Estimation rows, in any order.
/// * `cut`: Particle-identification polygon.
/// * `params`: Ion-chamber window (bounds excluded).
///
/// Return
/// ----------
/// * At most one [`Candidate`] per event, the one with the largest polar angle, ordered by event.
pub fn gate_estimates(
    records: &[EstimateRecord],
    cut: &ParticleCut,
    params: &GateParams,
) -> Vec<Candidate> {
    records
        .iter()
        .filter(|r| {
            cut.contains(r.dedx, r.brho)
                && r.ic_amplitude > params.ic_min_val
                && r.ic_amplitude < params.ic_max_val
        })
        .sorted_by(|a, b| {
            a.event
                .cmp(&b.event)
                .then(b.polar.partial_cmp(&a.polar).unwrap_or(Ordering::Equal))
        })
        .dedup_by(|a, b| a.event == b.event)
        .map(|r| Candidate {
            event: r.event,
            cluster_index: r.cluster_index,
            guess: r.guess(),
        })
        .collect()
}


#[cfg(test)]
pub(crate) use gate_test::record as test_record;
