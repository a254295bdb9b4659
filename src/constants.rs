//! # Constants and type definitions for trackfit
//!
//! This module centralizes the **unit conversions**, **sentinel values**, and **common type
//! aliases** shared by the clustering engine, the trajectory table, and the solver.
//!
//! ## Overview
//!
//! - Angle conversions (degrees ↔ radians)
//! - The `-1.0` sentinel used for optional detector quantities
//! - Type aliases documenting units in signatures
//! - The cluster container keyed by event

use std::collections::BTreeMap;

use crate::clustering::Cluster;

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for angle wrapping
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Numerical epsilon used for geometric comparisons (mm)
pub const EPS: f64 = 1e-9;

/// Sentinel stored in optional detector quantities when the value is not available.
pub const NOT_AVAILABLE: f64 = -1.0;

/// Number of free parameters of the trajectory fit
/// (scale, polar, azimuthal, vertex x, vertex y, vertex z).
pub const N_FIT_PARAMETERS: usize = 6;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;
/// Distance in millimeters
pub type Millimeter = f64;
/// Magnetic rigidity in tesla-meters, the momentum-like scale of the trajectory table
pub type TeslaMeter = f64;
/// Identifier of a detector event within a run
pub type EventId = u64;
/// Identifier of a data-taking run
pub type RunId = u32;

// -------------------------------------------------------------------------------------------------
// Data containers
// -------------------------------------------------------------------------------------------------

/// Surviving clusters of a run, keyed by event.
///
/// The cluster index used by the solver phase is the position of a cluster inside the
/// per-event vector. Events that were processed but produced no surviving cluster are kept
/// with an empty vector.
pub type ClusterStore = BTreeMap<EventId, Vec<Cluster>>;
