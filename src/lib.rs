pub mod clustering;
pub mod config;
pub mod constants;
pub mod gate;
pub mod interpolate;
pub mod io;
pub mod pipeline;
pub mod point_cloud;
pub mod progress;
pub mod solver;
pub mod trackfit_errors;

pub use clustering::{Cluster, ClusterParams};
pub use config::Config;
pub use interpolate::{build_table, OutOfRangePolicy, TableSource, TrackInterpolator, TrajectoryTable};
pub use point_cloud::{Point, PointCloud};
pub use solver::{solve, DetectorParams, FitResult, Guess, SolverParams};
pub use trackfit_errors::TrackFitError;
