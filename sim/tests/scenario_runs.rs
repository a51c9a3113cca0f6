//! Recorded scenarios driven through the track manager.

use sim::{ReplayLog, Scenario, ScenarioKind};
use tracker_core::{
    metrics::CorrelationMetrics, CorrelationMethod, EventCounts, RecordingObserver, TrackEvent, TrackManager, TrackManagerConfig,
};

fn run(kind: ScenarioKind, method: &str, seed: u64) -> (TrackManager, CorrelationMetrics, Vec<TrackEvent>) {
    let log = ReplayLog::record(&Scenario::build(kind, seed));
    let config = TrackManagerConfig {
        correlation: CorrelationMethod::from_name(method).expect("known strategy"),
        ..Default::default()
    };
    let mut manager = TrackManager::new(config).expect("valid config");
    let recorder = RecordingObserver::new();
    manager.add_observer(recorder.clone());
    let mut metrics = CorrelationMetrics::default();

    for frame in &log.frames {
        manager.set_truth_source(frame.truth.clone());
        manager.process_scheduled_events(frame.time);
        for report in &frame.reports {
            manager.add_track_report(frame.time, report.clone());
        }
        manager.purge_inactive_tracks(frame.time, 20.0);
        manager.purge_inactive_raw_tracks(frame.time, 20.0);
        assert!(manager.is_consistent(), "{method} inconsistent at t = {}", frame.time);
        metrics.accumulate(frame.time, manager.raw_tracks(), manager.local_tracks(), &frame.truth);
    }
    let events = recorder.events();
    metrics.count_reassignments(&events);
    (manager, metrics, events)
}

#[test]
fn perfect_correlation_is_pure_and_unfragmented() {
    let (manager, metrics, _) = run(ScenarioKind::Crossing, "perfect", 42);
    assert_eq!(manager.local_tracks().len(), 2);
    assert_eq!(metrics.purity(), 1.0);
    assert_eq!(metrics.fragmentation(), 1.0);
    assert_eq!(metrics.reassignments, 0);
}

#[test]
fn every_strategy_keeps_the_lists_consistent() {
    for method in ["truth", "nearest_neighbor", "cluster"] {
        let (manager, metrics, events) = run(ScenarioKind::Crossing, method, 7);
        assert!(!manager.local_tracks().is_empty(), "{method}");
        assert!(metrics.fragmentation() >= 1.0, "{method}");
        assert!(events.iter().any(|e| matches!(e, TrackEvent::Updated { .. })), "{method} never fused");
    }
}

#[test]
fn same_seed_same_outcome() {
    let (a, ma, ea) = run(ScenarioKind::Simple, "nearest_neighbor", 5);
    let (b, mb, eb) = run(ScenarioKind::Simple, "nearest_neighbor", 5);
    assert_eq!(a.local_tracks().len(), b.local_tracks().len());
    assert_eq!(EventCounts::from_events(&ea), EventCounts::from_events(&eb));
    assert_eq!(ma.reassignments, mb.reassignments);
}
