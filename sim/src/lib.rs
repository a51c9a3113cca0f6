//! `sim`: scenario driver with truth targets, sensors emitting raw track reports, and replay.

pub mod replay;
pub mod scenarios;
pub mod sensor;
pub mod target;

pub use replay::{load_replay, save_replay, ReplayFrame, ReplayLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use sensor::{ReportMode, SensorSimulator, SimSensor};
pub use target::{MotionSpec, Target};
