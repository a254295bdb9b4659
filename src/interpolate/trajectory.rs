//! Ordered trajectory samples.
use nalgebra::Vector3;

/// One sample of a simulated trajectory: position (mm) and time of flight (s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    pub position: Vector3<f64>,
    pub time: f64,
}

impl TrajectorySample {
    pub fn new(x: f64, y: f64, z: f64, time: f64) -> Self {
        TrajectorySample {
            position: Vector3::new(x, y, z),
            time,
        }
    }

    /// Linear combination `Σ wᵢ·sᵢ` used by the bilinear interpolation.
    #[inline]
    pub(crate) fn weighted_sum(weighted: [(f64, &TrajectorySample); 4]) -> Self {
        weighted.iter().fold(
            TrajectorySample {
                position: Vector3::zeros(),
                time: 0.0,
            },
            |acc, (w, s)| TrajectorySample {
                position: acc.position + s.position * *w,
                time: acc.time + s.time * *w,
            },
        )
    }
}

/// A finite, re-iterable sequence of trajectory samples in the particle frame.
///
/// The particle starts at the origin; its initial direction lies in the `x–z` plane at the
/// polar angle of the table node. Placement in the detector frame (azimuthal rotation,
/// vertex translation) is done by the solver's forward model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    pub fn new(samples: Vec<TrajectorySample>) -> Self {
        Trajectory { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrajectorySample> {
        self.samples.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.samples.iter().map(|s| s.position)
    }

    /// Total path length of the polyline through the samples (mm).
    pub fn path_length(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|w| (w[1].position - w[0].position).norm())
            .sum()
    }

    /// Largest sample-wise position distance to another trajectory of the same length.
    ///
    /// Returns `None` if the lengths differ.
    pub fn max_deviation(&self, other: &Trajectory) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        Some(
            self.samples
                .iter()
                .zip(other.samples.iter())
                .map(|(a, b)| (a.position - b.position).norm())
                .fold(0.0, f64::max),
        )
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a TrajectorySample;
    type IntoIter = std::slice::Iter<'a, TrajectorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
