use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use trackfit::clustering::Cluster;
use trackfit::constants::RADEG;
use trackfit::interpolate::{build_table, TableSource, TrackInterpolator};
use trackfit::point_cloud::Point;
use trackfit::solver::forward_model::TrackModel;
use trackfit::solver::{solve, DetectorParams, Guess, SolverParams};

const SAMPLES: usize = 200;

/// Helix of transverse radius `100·scale` mm over a 200 mm path.
fn helix(scale: f64, polar: f64) -> Vec<[f64; 4]> {
    let radius = 100.0 * scale;
    (0..SAMPLES)
        .map(|k| {
            let s = 200.0 * k as f64 / (SAMPLES - 1) as f64;
            let phi = s * polar.sin() / radius;
            [
                radius * phi.sin(),
                radius * (1.0 - phi.cos()),
                s * polar.cos(),
                s / (10.0 * scale),
            ]
        })
        .collect()
}

fn helix_table() -> TrackInterpolator {
    let scale_axis: Vec<f64> = (0..12).map(|k| 0.5 + 0.1 * k as f64).collect();
    let polar_axis: Vec<f64> = (0..16).map(|k| (10.0 + 5.0 * k as f64) * RADEG).collect();
    let trajectories = scale_axis
        .iter()
        .flat_map(|&b| polar_axis.iter().map(move |&theta| helix(b, theta)))
        .collect();
    let table = build_table(TableSource {
        species: Some("proton".into()),
        target: Some("H2 600 Torr".into()),
        scale_axis,
        polar_axis,
        trajectories,
    })
    .unwrap();
    TrackInterpolator::new(Arc::new(table))
}

fn noisy_track(interpolator: &TrackInterpolator, truth: &Guess, rng: &mut StdRng) -> Cluster {
    let x = DVector::from_vec(vec![
        truth.scale,
        truth.polar,
        truth.azimuthal,
        truth.vertex_x,
        truth.vertex_y,
        truth.vertex_z,
    ]);
    let polyline = TrackModel::new(interpolator, Vec::new(), 1.0)
        .lab_polyline(&x)
        .unwrap();
    let noise = Normal::new(0.0, 0.5).unwrap();
    let points = polyline
        .iter()
        .enumerate()
        .map(|(k, p)| {
            Point::new(
                p.x + noise.sample(rng),
                p.y + noise.sample(rng),
                p.z + noise.sample(rng),
                100.0,
                k as u32,
            )
        })
        .collect();
    Cluster::new(0, 0, points)
}

fn bench_solve(c: &mut Criterion) {
    let interpolator = helix_table();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let truth = Guess {
        polar: 42.5 * RADEG,
        azimuthal: 75.0 * RADEG,
        scale: 1.05,
        vertex_x: 2.0,
        vertex_y: -1.0,
        vertex_z: 250.0,
    };
    let guess = Guess {
        polar: 45.0 * RADEG,
        azimuthal: 70.0 * RADEG,
        scale: 1.15,
        vertex_x: 0.0,
        vertex_y: 0.0,
        vertex_z: 245.0,
    };
    let cluster = noisy_track(&interpolator, &truth, &mut rng);
    let detector = DetectorParams {
        point_sigma: 0.5,
        ..DetectorParams::default()
    };
    let params = SolverParams::default();

    c.bench_function("solve/helix_200_points", |b| {
        b.iter(|| {
            let fit = solve(
                black_box(&cluster),
                0,
                black_box(&guess),
                &interpolator,
                &detector,
                &params,
            );
            black_box(fit.ok());
        })
    });

    c.bench_function("interpolate/helix_table", |b| {
        b.iter(|| black_box(interpolator.interpolate(black_box(1.07), black_box(0.71)).ok()))
    });
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
