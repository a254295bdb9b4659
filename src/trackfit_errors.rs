use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackFitError {
    #[error("Required configuration is missing: {0}")]
    ConfigurationMissing(String),

    #[error("Malformed trajectory table: {0}")]
    TableFormat(String),

    #[error("Interpolation query out of range on {axis} axis: {value} not in [{min}, {max}]")]
    OutOfRange {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Fit did not converge after {iterations} iterations")]
    FitNonConvergence { iterations: usize },

    #[error("Too few points to constrain the fit: {points} points for {parameters} parameters")]
    InsufficientDegreesOfFreedom { points: usize, parameters: usize },

    #[error("No input to process: {0}")]
    EmptyInput(String),

    #[error("Normal matrix is singular; parameter covariance cannot be estimated")]
    SingularCovariance,

    #[error("Malformed cluster file: {0}")]
    InvalidClusterFile(String),

    #[error("Invalid clustering parameter: {0}")]
    InvalidClusterParameter(String),

    #[error("Invalid solver parameter: {0}")]
    InvalidSolverParameter(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TrackFitError {
    /// True for failures that only concern a single cluster and must not abort a run.
    pub fn is_cluster_local(&self) -> bool {
        matches!(
            self,
            TrackFitError::OutOfRange { .. }
                | TrackFitError::FitNonConvergence { .. }
                | TrackFitError::InsufficientDegreesOfFreedom { .. }
                | TrackFitError::SingularCovariance
        )
    }
}

impl PartialEq for TrackFitError {
    fn eq(&self, other: &Self) -> bool {
        use TrackFitError::*;
        match (self, other) {
            (ConfigurationMissing(a), ConfigurationMissing(b)) => a == b,
            (TableFormat(a), TableFormat(b)) => a == b,
            (
                OutOfRange {
                    axis: a1,
                    value: v1,
                    min: lo1,
                    max: hi1,
                },
                OutOfRange {
                    axis: a2,
                    value: v2,
                    min: lo2,
                    max: hi2,
                },
            ) => a1 == a2 && v1 == v2 && lo1 == lo2 && hi1 == hi2,
            (FitNonConvergence { iterations: a }, FitNonConvergence { iterations: b }) => a == b,
            (
                InsufficientDegreesOfFreedom {
                    points: p1,
                    parameters: n1,
                },
                InsufficientDegreesOfFreedom {
                    points: p2,
                    parameters: n2,
                },
            ) => p1 == p2 && n1 == n2,
            (EmptyInput(a), EmptyInput(b)) => a == b,
            (InvalidClusterFile(a), InvalidClusterFile(b)) => a == b,
            (InvalidClusterParameter(a), InvalidClusterParameter(b)) => a == b,
            (InvalidSolverParameter(a), InvalidSolverParameter(b)) => a == b,

            // Wrapped errors are not comparable: equal if same variant
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            (SingularCovariance, SingularCovariance) => true,

            _ => false,
        }
    }
}
