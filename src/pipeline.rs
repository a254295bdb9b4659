//! # Run orchestration
//!
//! Drives the two processing phases over the events of a run and over a list of runs.
//!
//! Phases
//! -----------------
//! * [`phase_cluster`] – clusterize, join and clean every point cloud of a run into a
//!   [`ClusterStore`].
//! * [`phase_solve`] – gate the estimation rows, then fit each selected cluster against the
//!   trajectory table. [`phase_solve_with_cancel`] adds cooperative cancellation and
//!   [`solve_candidates_par`] fits the candidates on the rayon thread pool.
//! * [`run_batch`] – sequential loop over runs, skipping runs that cannot be processed.
//!
//! Error policy
//! -----------------
//! * Failures that concern a single cluster (see [`TrackFitError::is_cluster_local`]) are
//!   logged and the cluster is omitted from the results.
//! * Missing gate or table, or a species mismatch between them, is a
//!   [`TrackFitError::ConfigurationMissing`]: the phase emits [`Phase::Wait`] and returns the
//!   error, and [`run_batch`] moves on to the next run.
//! * A gate that selects nothing is not an error: the phase returns no results.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::clustering::{cleanup_clusters, clusterize, join_clusters, Cluster, ClusterParams};
use crate::config::Config;
use crate::constants::{ClusterStore, RunId};
use crate::gate::{gate_estimates, Candidate, EstimateRecord, ParticleCut};
use crate::interpolate::{TrackInterpolator, TrajectoryTable};
use crate::point_cloud::PointCloud;
use crate::progress::{Phase, ProgressSink, ProgressTicker, StatusMessage};
use crate::solver::{solve, FitResult};
use crate::trackfit_errors::TrackFitError;

/// Interval between two polls of the cancellation callback.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Full clustering chain of one cloud: density grouping, joining, cleanup.
pub fn cluster_cloud(cloud: &PointCloud, params: &ClusterParams) -> Vec<Cluster> {
    let clusters = clusterize(cloud, params);
    let joined = join_clusters(&clusters, params);
    cleanup_clusters(&joined, params)
}

/// Cluster every point cloud of a run.
///
/// Arguments
/// -----------------
/// * `run`: Run number, used for progress and logs.
/// * `clouds`: Point clouds of the run, one per event.
/// * `params`: Clustering configuration.
/// * `sink`: Progress receiver.
///
/// Return
/// ----------
/// * The surviving clusters keyed by event. Clouds with fewer than `min_write_size` points are
///   skipped and have no entry; every processed event has one, possibly empty.
pub fn phase_cluster(
    run: RunId,
    clouds: &[PointCloud],
    params: &ClusterParams,
    sink: &dyn ProgressSink,
) -> ClusterStore {
    let mut store = ClusterStore::new();
    if clouds.is_empty() {
        warn!(run, "no point clouds to cluster");
        sink.notify(StatusMessage::wait(run));
        return store;
    }

    let mut ticker = ProgressTicker::new(run, Phase::Cluster, clouds.len());
    let mut skipped = 0usize;
    for cloud in clouds {
        ticker.tick(sink);
        if cloud.len() < params.min_write_size {
            skipped += 1;
            continue;
        }
        let clusters = cluster_cloud(cloud, params);
        debug!(run, event = cloud.event, clusters = clusters.len(), "event clustered");
        store.insert(cloud.event, clusters);
    }

    info!(
        run,
        events = store.len(),
        skipped,
        clusters = store.values().map(Vec::len).sum::<usize>(),
        "clustering phase complete"
    );
    store
}

/// Check the solve-phase prerequisites and select the candidates.
///
/// The interpolator over `table` applies the out-of-range policy of `config.run`.
fn prepare_solve(
    run: RunId,
    estimates: &[EstimateRecord],
    cut: Option<&ParticleCut>,
    table: Option<&Arc<TrajectoryTable>>,
    config: &Config,
    sink: &dyn ProgressSink,
) -> Result<(Vec<Candidate>, TrackInterpolator), TrackFitError> {
    let missing = |what: String| {
        warn!(run, "{what}, solver will not run");
        sink.notify(StatusMessage::wait(run));
        TrackFitError::ConfigurationMissing(what)
    };

    let Some(cut) = cut else {
        return Err(missing("particle cut is missing".into()));
    };
    let Some(table) = table else {
        return Err(missing("trajectory table is missing".into()));
    };
    let species = table.species();
    if cut.species != species {
        return Err(missing(format!(
            "particle cut selects '{}' but the trajectory table is for '{}'",
            cut.species, species
        )));
    }

    let candidates = gate_estimates(estimates, cut, &config.gate);
    if candidates.is_empty() {
        warn!(run, "no events within the particle gate");
        sink.notify(StatusMessage::wait(run));
    } else {
        info!(run, candidates = candidates.len(), "particle gate applied");
    }
    let interpolator = TrackInterpolator::with_policy(Arc::clone(table), config.run.out_of_range);
    Ok((candidates, interpolator))
}

/// Fit the cluster designated by one candidate.
///
/// `Ok(None)` when the cluster is absent from the store or its fit failed for a reason
/// local to that cluster.
pub fn solve_candidate(
    store: &ClusterStore,
    candidate: &Candidate,
    interpolator: &TrackInterpolator,
    config: &Config,
) -> Result<Option<FitResult>, TrackFitError> {
    let Some(cluster) = store
        .get(&candidate.event)
        .and_then(|clusters| clusters.get(candidate.cluster_index))
    else {
        warn!(
            event = candidate.event,
            cluster_index = candidate.cluster_index,
            "cluster not found, skipping"
        );
        return Ok(None);
    };

    match solve(
        cluster,
        candidate.cluster_index,
        &candidate.guess,
        interpolator,
        &config.detector,
        &config.solver,
    ) {
        Ok(result) => Ok(Some(result)),
        Err(err) if err.is_cluster_local() => {
            debug!(
                event = candidate.event,
                cluster_index = candidate.cluster_index,
                reason = %err,
                "cluster skipped"
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Fit candidates on the rayon thread pool.
///
/// Results keep the order of `candidates`; failed clusters are omitted.
pub fn solve_candidates_par(
    run: RunId,
    store: &ClusterStore,
    candidates: &[Candidate],
    interpolator: &TrackInterpolator,
    config: &Config,
    sink: &dyn ProgressSink,
) -> Result<Vec<FitResult>, TrackFitError> {
    let ticker = Mutex::new(ProgressTicker::new(run, Phase::Solve, candidates.len()));
    let fitted: Vec<Option<FitResult>> = candidates
        .par_iter()
        .map(|candidate| {
            let result = solve_candidate(store, candidate, interpolator, config);
            if let Ok(mut ticker) = ticker.lock() {
                ticker.tick(sink);
            }
            result
        })
        .collect::<Result<_, _>>()?;
    Ok(fitted.into_iter().flatten().collect())
}

/// Solve phase of a run.
///
/// Arguments
/// -----------------
/// * `run`: Run number.
/// * `store`: Clusters of the run.
/// * `estimates`: Rows of the estimation stage.
/// * `cut`: Particle-identification gate; `None` when no gate is configured.
/// * `table`: Trajectory table for the gated species; `None` when no table is available.
/// * `config`: Gate, solver and detector parameters. `config.run.parallel` selects
///   [`solve_candidates_par`] and `config.run.out_of_range` decides what happens to guesses
///   outside the table.
/// * `sink`: Progress receiver.
///
/// Return
/// ----------
/// * One [`FitResult`] per successfully fitted candidate, in event order.
pub fn phase_solve(
    run: RunId,
    store: &ClusterStore,
    estimates: &[EstimateRecord],
    cut: Option<&ParticleCut>,
    table: Option<&Arc<TrajectoryTable>>,
    config: &Config,
    sink: &dyn ProgressSink,
) -> Result<Vec<FitResult>, TrackFitError> {
    if config.run.parallel {
        let (candidates, interpolator) = prepare_solve(run, estimates, cut, table, config, sink)?;
        let results = solve_candidates_par(run, store, &candidates, &interpolator, config, sink)?;
        log_solve_summary(run, candidates.len(), results.len());
        return Ok(results);
    }
    phase_solve_with_cancel(run, store, estimates, cut, table, config, sink, || false)
}

/// Sequential solve phase with cooperative cancellation.
///
/// `should_cancel` is polled before the first cluster, then between clusters at most every
/// 20 ms of wall-clock time. On cancellation the results obtained so far are returned.
#[allow(clippy::too_many_arguments)]
pub fn phase_solve_with_cancel<F>(
    run: RunId,
    store: &ClusterStore,
    estimates: &[EstimateRecord],
    cut: Option<&ParticleCut>,
    table: Option<&Arc<TrajectoryTable>>,
    config: &Config,
    sink: &dyn ProgressSink,
    mut should_cancel: F,
) -> Result<Vec<FitResult>, TrackFitError>
where
    F: FnMut() -> bool,
{
    let (candidates, interpolator) = prepare_solve(run, estimates, cut, table, config, sink)?;

    let mut ticker = ProgressTicker::new(run, Phase::Solve, candidates.len());
    let mut results = Vec::with_capacity(candidates.len());
    let mut last_poll: Option<Instant> = None;

    for candidate in &candidates {
        if last_poll.map_or(true, |t| t.elapsed() >= POLL_INTERVAL) {
            if should_cancel() {
                warn!(run, fitted = results.len(), "solve phase interrupted");
                break;
            }
            last_poll = Some(Instant::now());
        }

        ticker.tick(sink);
        if let Some(result) = solve_candidate(store, candidate, &interpolator, config)? {
            results.push(result);
        }
    }

    log_solve_summary(run, candidates.len(), results.len());
    Ok(results)
}

fn log_solve_summary(run: RunId, candidates: usize, fitted: usize) {
    info!(run, candidates, fitted, "solve phase complete");
}

/// Per-run data handed to [`run_batch`].
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    /// Point clouds, clustered when `config.run.do_cluster` is set.
    pub clouds: Vec<PointCloud>,
    /// Clusters of a previous clustering pass, used when `do_cluster` is off.
    pub clusters: Option<ClusterStore>,
    pub estimates: Vec<EstimateRecord>,
}

/// Outcome of one processed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub run: RunId,
    pub clusters: ClusterStore,
    pub results: Vec<FitResult>,
}

/// Process runs one after the other.
///
/// Arguments
/// -----------------
/// * `runs`: Run numbers, processed in order.
/// * `config`: Full configuration; `config.run` selects the event window and the phases.
/// * `cut`, `table`: Solve-phase collaborators shared by every run.
/// * `load`: Provides the inputs of a run.
/// * `sink`: Progress receiver.
///
/// Return
/// ----------
/// * One [`RunOutput`] per run processed. Runs whose inputs cannot be loaded, or whose solve
///   phase fails at run level, are logged and left out.
pub fn run_batch<L>(
    runs: &[RunId],
    config: &Config,
    cut: Option<&ParticleCut>,
    table: Option<&Arc<TrajectoryTable>>,
    mut load: L,
    sink: &dyn ProgressSink,
) -> Vec<RunOutput>
where
    L: FnMut(RunId) -> Result<RunInputs, TrackFitError>,
{
    let mut outputs = Vec::with_capacity(runs.len());
    for &run in runs {
        info!(run, "processing run");
        match process_run(run, config, cut, table, &mut load, sink) {
            Ok(output) => outputs.push(output),
            Err(err) => {
                warn!(run, reason = %err, "run skipped");
                sink.notify(StatusMessage::wait(run));
            }
        }
    }
    outputs
}

fn process_run<L>(
    run: RunId,
    config: &Config,
    cut: Option<&ParticleCut>,
    table: Option<&Arc<TrajectoryTable>>,
    load: &mut L,
    sink: &dyn ProgressSink,
) -> Result<RunOutput, TrackFitError>
where
    L: FnMut(RunId) -> Result<RunInputs, TrackFitError>,
{
    let inputs = load(run)?;

    let clusters = if config.run.do_cluster {
        let clouds: Vec<PointCloud> = inputs
            .clouds
            .into_iter()
            .filter(|cloud| config.run.contains(cloud.event))
            .collect();
        phase_cluster(run, &clouds, &config.cluster, sink)
    } else {
        inputs.clusters.ok_or_else(|| {
            TrackFitError::ConfigurationMissing(format!(
                "clustering is disabled and no clusters were provided for run {run}"
            ))
        })?
    };

    let results = if config.run.do_solve {
        let estimates: Vec<EstimateRecord> = inputs
            .estimates
            .into_iter()
            .filter(|record| config.run.contains(record.event))
            .collect();
        phase_solve(run, &clusters, &estimates, cut, table, config, sink)?
    } else {
        Vec::new()
    };

    Ok(RunOutput {
        run,
        clusters,
        results,
    })
}

#[cfg(test)]
mod pipeline_test {
    use std::sync::mpsc::channel;

    use super::*;
    use crate::gate::test_record;
    use crate::interpolate::{build_table, straight_line_source};
    use crate::point_cloud::Point;
    use crate::progress::NullSink;

    fn line_cloud(event: u64, n: u32) -> PointCloud {
        PointCloud::new(
            event,
            (0..n).map(|i| Point::new(0.0, 0.0, i as f64, 1.0, i)).collect(),
        )
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.cluster = ClusterParams::builder()
            .min_write_size(10)
            .neighbor_radius(2.0)
            .min_cluster_size(10)
            .build()
            .unwrap();
        config
    }

    fn table() -> Arc<TrajectoryTable> {
        Arc::new(build_table(straight_line_source(11)).unwrap())
    }

    fn proton_cut() -> ParticleCut {
        ParticleCut::new(
            "proton",
            vec![(0.0, 0.0), (100.0, 0.0), (100.0, 2.0), (0.0, 2.0)],
        )
    }

    #[test]
    fn test_phase_cluster_skips_small_clouds() {
        let clouds = vec![line_cloud(1, 30), line_cloud(2, 5), line_cloud(3, 12)];
        let store = phase_cluster(0, &clouds, &small_config().cluster, &NullSink);

        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(store[&1].len(), 1);
        assert_eq!(store[&1][0].len(), 30);
    }

    #[test]
    fn test_missing_configuration_waits() {
        let (tx, rx) = channel();
        let store = ClusterStore::new();
        let config = small_config();

        let err = phase_solve(1, &store, &[], None, Some(&table()), &config, &tx).unwrap_err();
        assert!(matches!(err, TrackFitError::ConfigurationMissing(_)));
        assert_eq!(rx.try_recv().unwrap(), StatusMessage::wait(1));

        let err = phase_solve(1, &store, &[], Some(&proton_cut()), None, &config, &tx).unwrap_err();
        assert!(matches!(err, TrackFitError::ConfigurationMissing(_)));

        let alpha = ParticleCut::new("alpha", proton_cut().vertices);
        let err = phase_solve(1, &store, &[], Some(&alpha), Some(&table()), &config, &tx)
            .unwrap_err();
        assert!(matches!(err, TrackFitError::ConfigurationMissing(msg) if msg.contains("alpha")));
    }

    #[test]
    fn test_empty_gate_yields_no_results() {
        let store = ClusterStore::new();
        let mut outside = test_record(1, 0, 0.5);
        outside.dedx = 1000.0;
        let results = phase_solve(
            1,
            &store,
            &[outside],
            Some(&proton_cut()),
            Some(&table()),
            &small_config(),
            &NullSink,
        )
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_missing_and_degenerate_clusters_are_skipped() {
        let mut store = ClusterStore::new();
        store.insert(
            4,
            vec![Cluster::new(4, 0, line_cloud(4, 3).points)],
        );
        let records = vec![test_record(4, 0, 0.5), test_record(7, 2, 0.5)];

        let mut config = small_config();
        for parallel in [false, true] {
            config.run.parallel = parallel;
            let results = phase_solve(
                1,
                &store,
                &records,
                Some(&proton_cut()),
                Some(&table()),
                &config,
                &NullSink,
            )
            .unwrap();
            assert!(results.is_empty());
        }
    }

    #[test]
    fn test_cancellation_stops_early() {
        let mut store = ClusterStore::new();
        let records: Vec<EstimateRecord> = (0..5).map(|e| test_record(e, 0, 0.5)).collect();
        for e in 0..5 {
            store.insert(e, vec![Cluster::new(e, 0, line_cloud(e, 3).points)]);
        }

        let mut polls = 0;
        let results = phase_solve_with_cancel(
            1,
            &store,
            &records,
            Some(&proton_cut()),
            Some(&table()),
            &small_config(),
            &NullSink,
            || {
                polls += 1;
                true
            },
        )
        .unwrap();
        assert!(results.is_empty());
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_run_batch_skips_failing_runs() {
        let config = small_config();
        let outputs = run_batch(
            &[1, 2, 3],
            &config,
            Some(&proton_cut()),
            Some(&table()),
            |run| {
                if run == 2 {
                    Err(TrackFitError::EmptyInput("no data for run 2".into()))
                } else {
                    Ok(RunInputs {
                        clouds: vec![line_cloud(10, 20)],
                        ..RunInputs::default()
                    })
                }
            },
            &NullSink,
        );
        assert_eq!(outputs.iter().map(|o| o.run).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(outputs[0].clusters[&10].len(), 1);
        assert!(outputs[0].results.is_empty());
    }
}
