//! Replay: record scenario runs as report logs and read them back.

use crate::{
    scenarios::Scenario,
    sensor::SensorSimulator,
    target::truth_snapshot,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;
use tracker_core::{RawTrack, TruthPlatform};

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub sim_dt: f64,
    pub duration: f64,
    /// One frame per simulation step, in chronological order
    pub frames: Vec<ReplayFrame>,
}

/// Reports collected during one step, plus the truth at its end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub time: f64,
    pub reports: Vec<RawTrack>,
    pub truth: Vec<TruthPlatform>,
}

impl ReplayLog {
    /// Run `scenario` to completion and keep everything the sensors reported.
    pub fn record(scenario: &Scenario) -> Self {
        let mut targets = scenario.targets.clone();
        let mut sensors = SensorSimulator::new(scenario.sensors.clone(), scenario.seed);
        let dt = scenario.sim_dt;
        let steps = (scenario.duration / dt).round() as u64;
        let mut frames = Vec::with_capacity(steps as usize);

        for step in 0..steps {
            let t = step as f64 * dt;
            let reports = sensors.generate_reports(&targets, t);
            frames.push(ReplayFrame {
                time: t,
                reports,
                truth: truth_snapshot(&targets, t),
            });
            for target in &mut targets {
                target.step(t, dt);
            }
        }

        let n_reports: usize = frames.iter().map(|f| f.reports.len()).sum();
        info!(scenario = %scenario.name, frames = frames.len(), reports = n_reports, "recorded scenario");

        Self {
            scenario_name: scenario.name.clone(),
            seed: scenario.seed,
            sim_dt: dt,
            duration: scenario.duration,
            frames,
        }
    }

    pub fn report_count(&self) -> usize {
        self.frames.iter().map(|f| f.reports.len()).sum()
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log).with_context(|| format!("writing replay to {}", path.display()))?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let log: ReplayLog =
        serde_json::from_reader(reader).with_context(|| format!("parsing replay {}", path.display()))?;
    Ok(log)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::ScenarioKind;

    #[test]
    fn recording_is_deterministic_for_a_seed() {
        let scenario = Scenario::build(ScenarioKind::Crossing, 42);
        let a = ReplayLog::record(&scenario);
        let b = ReplayLog::record(&scenario);
        assert_eq!(a.frames.len(), 240);
        assert_eq!(a.report_count(), b.report_count());
        let ids = |log: &ReplayLog| {
            log.frames
                .iter()
                .flat_map(|f| f.reports.iter().map(|r| (r.id, r.update_time)))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn saved_log_loads_back() {
        let mut scenario = Scenario::build(ScenarioKind::Simple, 3);
        scenario.duration = 5.0;
        let log = ReplayLog::record(&scenario);
        let path = std::env::temp_dir().join(format!("sim-replay-{}.json", std::process::id()));

        save_replay(&log, &path).expect("save");
        let loaded = load_replay(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.scenario_name, "simple");
        assert_eq!(loaded.frames.len(), log.frames.len());
        assert_eq!(loaded.report_count(), log.report_count());
        let truth_ids = |log: &ReplayLog| log.frames[3].truth.iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(truth_ids(&loaded), truth_ids(&log));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_replay(Path::new("/nonexistent/replay.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/replay.json"));
    }
}
