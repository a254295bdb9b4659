//! # Run configuration
//!
//! [`Config`] gathers every tunable of a processing run and is loaded from JSON. Every
//! section, and every field inside a section, falls back to its default when absent, so a
//! configuration file only needs to list what it overrides:
//!
//! ```json
//! {
//!   "run": { "min_event": 0, "max_event": 5000, "do_solve": false },
//!   "cluster": { "neighbor_radius": 8.0, "min_cluster_size": 30 },
//!   "detector": { "point_sigma": 0.8 },
//!   "gate": { "ic_min_val": 300.0, "ic_max_val": 850.0 }
//! }
//! ```
//!
//! ## See also
//! ------------
//! * [`ClusterParams`], [`SolverParams`], [`DetectorParams`], [`GateParams`] – the sections.
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clustering::ClusterParams;
use crate::constants::EventId;
use crate::gate::GateParams;
use crate::interpolate::OutOfRangePolicy;
use crate::solver::{DetectorParams, SolverParams};
use crate::trackfit_errors::TrackFitError;

/// Event window and phase switches of a run.
///
/// Defaults
/// -----------------
/// * `min_event`: 0
/// * `max_event`: `u64::MAX`
/// * `do_cluster`, `do_solve`: true
/// * `parallel`: false
/// * `out_of_range`: reject
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParams {
    pub min_event: EventId,
    pub max_event: EventId,
    pub do_cluster: bool,
    pub do_solve: bool,
    /// Fit the candidates of a run on the rayon thread pool.
    pub parallel: bool,
    /// Handling of estimates that fall outside the trajectory table.
    pub out_of_range: OutOfRangePolicy,
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            min_event: 0,
            max_event: EventId::MAX,
            do_cluster: true,
            do_solve: true,
            parallel: false,
            out_of_range: OutOfRangePolicy::Reject,
        }
    }
}

impl RunParams {
    #[inline]
    pub fn contains(&self, event: EventId) -> bool {
        (self.min_event..=self.max_event).contains(&event)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunParams,
    pub cluster: ClusterParams,
    pub solver: SolverParams,
    pub detector: DetectorParams,
    pub gate: GateParams,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, TrackFitError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the builder validation rules of every section.
    pub fn validate(&self) -> Result<(), TrackFitError> {
        let c = &self.cluster;
        ClusterParams::builder()
            .min_write_size(c.min_write_size)
            .neighbor_radius(c.neighbor_radius)
            .min_neighbors(c.min_neighbors)
            .min_core_charge(c.min_core_charge)
            .keep_noise(c.keep_noise)
            .max_join_gap(c.max_join_gap)
            .max_join_angle(c.max_join_angle)
            .direction_window(c.direction_window)
            .min_cluster_size(c.min_cluster_size)
            .min_extent(c.min_extent)
            .build()?;

        let s = &self.solver;
        SolverParams::builder()
            .max_iterations(s.max_iterations)
            .ftol(s.ftol)
            .xtol(s.xtol)
            .gtol(s.gtol)
            .initial_lambda(s.initial_lambda)
            .lambda_up(s.lambda_up)
            .lambda_down(s.lambda_down)
            .max_lambda(s.max_lambda)
            .jacobian_step(s.jacobian_step)
            .stall_window(s.stall_window)
            .stall_tol(s.stall_tol)
            .build()?;

        self.detector.validate()?;

        if self.run.min_event > self.run.max_event {
            return Err(TrackFitError::ConfigurationMissing(format!(
                "empty event window [{}, {}]",
                self.run.min_event, self.run.max_event
            )));
        }
        if !(self.gate.ic_min_val < self.gate.ic_max_val) {
            return Err(TrackFitError::ConfigurationMissing(format!(
                "empty ion-chamber window ({}, {})",
                self.gate.ic_min_val, self.gate.ic_max_val
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "events [{}, {}], cluster={}, solve={}, parallel={}",
            self.run.min_event,
            self.run.max_event,
            self.run.do_cluster,
            self.run.do_solve,
            self.run.parallel
        )?;
        writeln!(f, "{:#}", self.cluster)?;
        writeln!(f, "{:#}", self.solver)?;
        write!(
            f,
            "detector: length={:.1} mm, xy_limit={:.1} mm, sigma={:.3} mm; ic window ({}, {})",
            self.detector.detector_length,
            self.detector.vertex_xy_limit,
            self.detector.point_sigma,
            self.gate.ic_min_val,
            self.gate.ic_max_val
        )
    }
}
