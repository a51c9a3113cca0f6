use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracker_core::clustering::{ClusterEngine, ClusterMethod};
use tracker_core::correlation::{nearest_neighbor::confidence_sigma, ClusterConfig};
use tracker_core::geometry::Covariance;
use tracker_core::{CorrelationMethod, RawTrack, SensorId, TrackId, TrackManager, TrackManagerConfig, Vec3};

/// `n` targets on a ring, each reported by `sensors` sensors with a small offset.
fn make_reports(n: u32, sensors: u32, t: f64) -> Vec<RawTrack> {
    let mut reports = Vec::with_capacity((n * sensors) as usize);
    for sensor in 1..=sensors {
        for i in 0..n {
            let angle = f64::from(i) * std::f64::consts::TAU / f64::from(n);
            let r = 20_000.0 + 10.0 * f64::from(sensor);
            let position = Vec3::new(r * angle.cos(), r * angle.sin(), 3_000.0);
            reports.push(
                RawTrack::cartesian(TrackId::new(sensor, i + 1), SensorId(sensor), t, position)
                    .with_state_covariance(Covariance::isotropic(50.0)),
            );
        }
    }
    reports
}

fn run_frames(method: CorrelationMethod, n: u32) -> usize {
    let config = TrackManagerConfig {
        correlation: method,
        ..Default::default()
    };
    let Ok(mut manager) = TrackManager::new(config) else {
        return 0;
    };
    for frame in 0..3 {
        let t = f64::from(frame);
        manager.process_scheduled_events(t);
        for report in make_reports(n, 3, t) {
            manager.add_track_report(t, report);
        }
    }
    manager.local_tracks().len()
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation");

    for n in [20, 100, 200] {
        group.bench_function(format!("nearest_neighbor_{n}_targets"), |b| {
            b.iter(|| black_box(run_frames(CorrelationMethod::default(), n)));
        });
        group.bench_function(format!("cluster_{n}_targets"), |b| {
            b.iter(|| black_box(run_frames(CorrelationMethod::Cluster(ClusterConfig { update_interval: 1.0 }), n)));
        });
    }

    group.finish();
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    let points: Vec<Vec3> = make_reports(200, 3, 0.0)
        .iter()
        .filter_map(RawTrack::reported_position)
        .collect();

    for method in [ClusterMethod::HierarchicalComplete, ClusterMethod::HierarchicalAverage, ClusterMethod::KMeans] {
        let engine = ClusterEngine::with_limit(method, 450.0);
        group.bench_function(format!("{method:?}_600_points"), |b| {
            b.iter(|| black_box(engine.cluster(&points)));
        });
    }

    group.finish();
}

fn bench_confidence_sigma(c: &mut Criterion) {
    let cov = Covariance::from_diagonal(400.0, 2500.0, 900.0);
    let separation = Vec3::new(120.0, -35.0, 10.0);
    c.bench_function("confidence_sigma", |b| {
        b.iter(|| black_box(confidence_sigma(black_box(&separation), Some(&cov), Some(&cov), 0.0, 0.0)));
    });
}

criterion_group!(benches, bench_correlation, bench_clustering, bench_confidence_sigma);
criterion_main!(benches);
