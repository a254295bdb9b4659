#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::{DVector, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use trackfit::clustering::Cluster;
use trackfit::constants::{EventId, RADEG};
use trackfit::interpolate::{build_table, TableSource, TrackInterpolator, TrajectoryTable};
use trackfit::point_cloud::Point;
use trackfit::solver::forward_model::TrackModel;
use trackfit::solver::{FitResult, Guess};

pub const SAMPLES_PER_TRAJECTORY: usize = 150;

/// Cell-centred axes: 1.2 T·m and 30° fall in the middle of a cell.
pub fn scale_axis() -> Vec<f64> {
    (0..16).map(|k| 0.45 + 0.1 * k as f64).collect()
}

pub fn polar_axis() -> Vec<f64> {
    (0..16).map(|k| (7.5 + 5.0 * k as f64) * RADEG).collect()
}

/// Particle-frame spiral of a particle slowing down in gas.
///
/// The transverse radius of curvature shrinks linearly with the path length `s`, from
/// `100·scale` mm to zero at the range `L = 300·scale` mm; the track stops at `0.8·L`.
/// Positions follow from the closed form of `∫ exp(iφ(u)) du` with `φ(u) = −(L/ρ₀)·ln(1 − u/L)`.
pub fn spiral(scale: f64, polar: f64, n_samples: usize) -> Vec<[f64; 4]> {
    let rho0 = 100.0 * scale;
    let range = 300.0 * scale;
    let a = range / rho0;
    let path = 0.8 * range;

    (0..n_samples)
        .map(|k| {
            let s = path * k as f64 / (n_samples - 1) as f64;
            let w = 1.0 - s / range;
            let c = a * w.ln();
            let p = 1.0 - w * c.cos();
            let q = w * c.sin();
            let re = (p - a * q) / (1.0 + a * a);
            let im = (q + a * p) / (1.0 + a * a);
            [
                range * polar.sin() * re,
                range * polar.sin() * im,
                s * polar.cos(),
                s / (10.0 * scale),
            ]
        })
        .collect()
}

pub fn spiral_source() -> TableSource {
    let scale_axis = scale_axis();
    let polar_axis = polar_axis();
    let trajectories = scale_axis
        .iter()
        .flat_map(|&b| {
            polar_axis
                .iter()
                .map(move |&theta| spiral(b, theta, SAMPLES_PER_TRAJECTORY))
        })
        .collect();
    TableSource {
        species: Some("proton".into()),
        target: Some("H2 600 Torr".into()),
        scale_axis,
        polar_axis,
        trajectories,
    }
}

pub fn spiral_table() -> Arc<TrajectoryTable> {
    Arc::new(build_table(spiral_source()).unwrap())
}

pub fn truth() -> Guess {
    Guess {
        polar: 30.0 * RADEG,
        azimuthal: 45.0 * RADEG,
        scale: 1.2,
        vertex_x: 0.0,
        vertex_y: 0.0,
        vertex_z: 10.0,
    }
}

/// Guess within 10 % of [`truth`].
pub fn perturbed_guess() -> Guess {
    Guess {
        polar: 32.0 * RADEG,
        azimuthal: 48.0 * RADEG,
        scale: 1.3,
        vertex_x: 0.5,
        vertex_y: -0.5,
        vertex_z: 10.8,
    }
}

pub fn parameters(g: &Guess) -> DVector<f64> {
    DVector::from_vec(vec![
        g.scale,
        g.polar,
        g.azimuthal,
        g.vertex_x,
        g.vertex_y,
        g.vertex_z,
    ])
}

/// Cluster of `n_points` evenly spread along the truth track with isotropic Gaussian noise.
pub fn noisy_cluster(
    interpolator: &TrackInterpolator,
    truth: &Guess,
    event: EventId,
    n_points: usize,
    sigma: f64,
    seed: u64,
) -> Cluster {
    let model = TrackModel::new(interpolator, Vec::new(), sigma);
    let polyline = model.lab_polyline(&parameters(truth)).unwrap();

    let cumulative: Vec<f64> = std::iter::once(0.0)
        .chain(polyline.windows(2).scan(0.0, |acc, w| {
            *acc += (w[1] - w[0]).norm();
            Some(*acc)
        }))
        .collect();
    let total = cumulative[cumulative.len() - 1];

    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();

    let points = (0..n_points)
        .map(|k| {
            let target = total * (k as f64 + 0.5) / n_points as f64;
            let seg = cumulative.partition_point(|&c| c <= target).clamp(1, polyline.len() - 1) - 1;
            let t = (target - cumulative[seg]) / (cumulative[seg + 1] - cumulative[seg]);
            let on_track: Vector3<f64> = polyline[seg] + (polyline[seg + 1] - polyline[seg]) * t;
            Point::new(
                on_track.x + noise.sample(&mut rng),
                on_track.y + noise.sample(&mut rng),
                on_track.z + noise.sample(&mut rng),
                100.0,
                k as u32,
            )
        })
        .collect();
    Cluster::new(event, 0, points)
}

/// Check every fitted parameter against the truth within `n_sigma` standard deviations.
pub fn assert_within_sigma(fit: &FitResult, truth: &Guess, n_sigma: f64) {
    let checks = [
        ("brho", fit.brho, fit.sigma_brho, truth.scale),
        ("polar", fit.polar, fit.sigma_polar, truth.polar),
        ("azimuthal", fit.azimuthal, fit.sigma_azimuthal, truth.azimuthal),
        ("vertex_x", fit.vertex_x, fit.sigma_vx, truth.vertex_x),
        ("vertex_y", fit.vertex_y, fit.sigma_vy, truth.vertex_y),
        ("vertex_z", fit.vertex_z, fit.sigma_vz, truth.vertex_z),
    ];
    for (name, value, sigma, expected) in checks {
        assert!(sigma.is_finite() && sigma > 0.0, "{name}: sigma = {sigma}");
        assert!(
            (value - expected).abs() <= n_sigma * sigma + 1e-9,
            "{name}: fitted {value}, expected {expected}, sigma {sigma}"
        );
    }
}
