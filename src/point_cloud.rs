//! # Point clouds
//!
//! A [`PointCloud`] is the ordered set of 3D charge samples reconstructed for one detector
//! event. It is produced upstream (trace decoding, pad calibration) and only read by the
//! clustering engine.
//!
//! Optional ion-chamber quantities travel with the cloud in [`IcInfo`]. Missing values are
//! stored as the [`NOT_AVAILABLE`](crate::constants::NOT_AVAILABLE) sentinel and must be
//! checked with [`IcInfo::is_available`] before use.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{EventId, Millimeter, NOT_AVAILABLE};

/// A single charge sample.
///
/// Fields
/// -----------------
/// * `x`, `y`, `z` – position in the detector frame (mm), beam along `z`.
/// * `charge` – accumulated charge/amplitude of the sample.
/// * `pad` – originating detector channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: Millimeter,
    pub y: Millimeter,
    pub z: Millimeter,
    pub charge: f64,
    pub pad: u32,
}

impl Point {
    pub fn new(x: Millimeter, y: Millimeter, z: Millimeter, charge: f64, pad: u32) -> Self {
        Point {
            x,
            y,
            z,
            charge,
            pad,
        }
    }

    #[inline]
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Ion-chamber information attached to an event.
///
/// Every field defaults to [`NOT_AVAILABLE`] (`-1.0`) when the ion chamber did not fire or
/// its data group was absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IcInfo {
    pub amplitude: f64,
    pub integral: f64,
    pub centroid: f64,
    pub multiplicity: f64,
}

impl Default for IcInfo {
    fn default() -> Self {
        IcInfo {
            amplitude: NOT_AVAILABLE,
            integral: NOT_AVAILABLE,
            centroid: NOT_AVAILABLE,
            multiplicity: NOT_AVAILABLE,
        }
    }
}

impl IcInfo {
    /// Whether a usable ion-chamber peak was recorded for this event.
    pub fn is_available(&self) -> bool {
        self.amplitude != NOT_AVAILABLE
    }
}

/// All charge samples of one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    pub event: EventId,
    pub points: Vec<Point>,
    pub ic: IcInfo,
}

impl PointCloud {
    pub fn new(event: EventId, points: Vec<Point>) -> Self {
        PointCloud {
            event,
            points,
            ic: IcInfo::default(),
        }
    }

    pub fn with_ic(mut self, ic: IcInfo) -> Self {
        self.ic = ic;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total charge deposited in the event.
    pub fn total_charge(&self) -> f64 {
        self.points.iter().map(|p| p.charge).sum()
    }
}
