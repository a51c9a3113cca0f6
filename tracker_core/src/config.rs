//! Track manager configuration and its text reader.
//!
//! # Format
//! Whitespace-separated commands, `#` or `//` comments to end of line:
//!
//! ```text
//! track_manager
//!    owner 7
//!    side blue
//!    uncorrelated_track_drops true
//!    retain_raw_tracks
//!    correlation_method nearest_neighbor
//!       tracking_sigma 1.0
//!       coast_time 2 s
//!    end_correlation_method
//!    fusion_method weighted
//! end_track_manager
//! ```
//!
//! The `track_manager` wrapper is optional. Times and lengths accept a unit
//! token after the number; bare numbers are seconds and meters.

use crate::{
    correlation::{ClusterConfig, CorrelationMethod, NearestNeighborConfig, TruthConfig},
    fusion::FusionMethod,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("line {line}: unknown command `{command}`")]
    UnknownCommand { command: String, line: usize },
    #[error("line {line}: `{command}` needs a value")]
    MissingValue { command: String, line: usize },
    #[error("line {line}: bad value `{value}` for `{command}`")]
    BadValue { command: String, value: String, line: usize },
    #[error("`{command}` = {value}: {reason}")]
    OutOfRange {
        command: String,
        value: f64,
        reason: &'static str,
    },
    #[error("block not terminated, expected `{expected}`")]
    UnterminatedBlock { expected: String },
    #[error("line {line}: unknown correlation method `{name}`")]
    UnknownStrategy { name: String, line: usize },
}

pub(crate) fn non_negative(command: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            command: command.into(),
            value,
            reason: "must not be negative",
        })
    }
}

pub(crate) fn positive(command: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            command: command.into(),
            value,
            reason: "must be positive",
        })
    }
}

// ---------------------------------------------------------------------------
// TrackManagerConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManagerConfig {
    /// Entity id used as the owner part of local track ids
    pub owner: u32,
    /// Side of the owning entity
    pub side: Option<String>,
    /// Drop a fusible local track when its last contributor leaves
    pub drop_uncorrelated_tracks: bool,
    /// Keep raw tracks after their local track is dropped
    pub retain_raw_tracks: bool,
    /// Record the fused position of local tracks on every update
    pub maintain_track_history: bool,
    /// Create local tracks for uncorrelated reports
    pub initiate_local_tracks: bool,
    pub correlation: CorrelationMethod,
    pub fusion: FusionMethod,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            owner: 1,
            side: None,
            drop_uncorrelated_tracks: true,
            retain_raw_tracks: false,
            maintain_track_history: false,
            initiate_local_tracks: true,
            correlation: CorrelationMethod::default(),
            fusion: FusionMethod::default(),
        }
    }
}

impl TrackManagerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.correlation.validate()
    }

    /// Read a configuration from command text. The result is validated.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut tokens = Tokens::new(text);
        let mut config = Self::default();

        let wrapped = tokens.peek() == Some("track_manager");
        if wrapped {
            tokens.next();
        }
        loop {
            let Some((line, command)) = tokens.next() else {
                if wrapped {
                    return Err(ConfigError::UnterminatedBlock {
                        expected: "end_track_manager".into(),
                    });
                }
                break;
            };
            if wrapped && command == "end_track_manager" {
                break;
            }
            config.apply(command, line, &mut tokens)?;
        }
        if let Some((line, command)) = tokens.next() {
            return Err(ConfigError::UnknownCommand {
                command: command.into(),
                line,
            });
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, command: &str, line: usize, tokens: &mut Tokens<'_>) -> Result<(), ConfigError> {
        match command {
            "owner" => self.owner = tokens.parsed(command, line)?,
            "side" => self.side = Some(tokens.value(command, line)?.to_string()),
            "uncorrelated_track_drops" | "drop_uncorrelated_tracks" => {
                self.drop_uncorrelated_tracks = tokens.flag(command, line)?
            }
            "retain_raw_tracks" => self.retain_raw_tracks = tokens.flag(command, line)?,
            "retain_track_history" => self.maintain_track_history = tokens.flag(command, line)?,
            "initiate_local_tracks" => self.initiate_local_tracks = tokens.flag(command, line)?,
            "fusion_method" => {
                let name = tokens.value(command, line)?;
                self.fusion = FusionMethod::from_name(name).ok_or_else(|| ConfigError::BadValue {
                    command: command.into(),
                    value: name.into(),
                    line,
                })?;
            }
            "correlation_method" => {
                let name = tokens.value(command, line)?;
                let mut method = CorrelationMethod::from_name(name).ok_or_else(|| ConfigError::UnknownStrategy {
                    name: name.into(),
                    line,
                })?;
                while let Some(option) = tokens.peek() {
                    if option == "end_correlation_method" {
                        tokens.next();
                        break;
                    }
                    if !method_accepts(&method, option) {
                        break;
                    }
                    let Some((line, option)) = tokens.next() else {
                        break;
                    };
                    apply_method_option(&mut method, option, line, tokens)?;
                }
                self.correlation = method;
            }
            _ => {
                return Err(ConfigError::UnknownCommand {
                    command: command.into(),
                    line,
                })
            }
        }
        Ok(())
    }
}

impl FromStr for TrackManagerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

const NEAREST_NEIGHBOR_OPTIONS: &[&str] = &["tracking_sigma", "turning_sigma", "coast_time", "precise_mode"];
const TRUTH_OPTIONS: &[&str] = &[
    "max_distance_for_correlation",
    "ignore_track_target",
    "ignore_same_side",
    "coast_time",
];
const CLUSTER_OPTIONS: &[&str] = &["update_interval"];

fn method_accepts(method: &CorrelationMethod, option: &str) -> bool {
    match method {
        CorrelationMethod::Perfect => false,
        CorrelationMethod::Truth(_) => TRUTH_OPTIONS.contains(&option),
        CorrelationMethod::NearestNeighbor(_) => NEAREST_NEIGHBOR_OPTIONS.contains(&option),
        CorrelationMethod::Cluster(_) => CLUSTER_OPTIONS.contains(&option),
    }
}

fn apply_method_option(
    method: &mut CorrelationMethod,
    option: &str,
    line: usize,
    tokens: &mut Tokens<'_>,
) -> Result<(), ConfigError> {
    match method {
        CorrelationMethod::NearestNeighbor(NearestNeighborConfig {
            tracking_sigma,
            turning_sigma,
            coast_time,
            precise_mode,
        }) => match option {
            "tracking_sigma" => *tracking_sigma = tokens.number(option, line)?,
            "turning_sigma" => *turning_sigma = tokens.number(option, line)?,
            "coast_time" => *coast_time = tokens.quantity(option, line, TIME_UNITS)?,
            "precise_mode" => *precise_mode = tokens.flag(option, line)?,
            _ => unknown(option, line)?,
        },
        CorrelationMethod::Truth(TruthConfig {
            max_distance_for_correlation,
            ignore_track_target,
            ignore_same_side,
            coast_time,
        }) => match option {
            "max_distance_for_correlation" => {
                *max_distance_for_correlation = Some(tokens.quantity(option, line, LENGTH_UNITS)?)
            }
            "ignore_track_target" => *ignore_track_target = tokens.flag(option, line)?,
            "ignore_same_side" => *ignore_same_side = tokens.flag(option, line)?,
            "coast_time" => *coast_time = tokens.quantity(option, line, TIME_UNITS)?,
            _ => unknown(option, line)?,
        },
        CorrelationMethod::Cluster(ClusterConfig { update_interval }) => match option {
            "update_interval" => *update_interval = tokens.quantity(option, line, TIME_UNITS)?,
            _ => unknown(option, line)?,
        },
        CorrelationMethod::Perfect => unknown(option, line)?,
    }
    Ok(())
}

fn unknown(command: &str, line: usize) -> Result<(), ConfigError> {
    Err(ConfigError::UnknownCommand {
        command: command.into(),
        line,
    })
}

// ---------------------------------------------------------------------------
// Tokens and units
// ---------------------------------------------------------------------------

const TIME_UNITS: &[(&str, f64)] = &[
    ("s", 1.0),
    ("sec", 1.0),
    ("secs", 1.0),
    ("seconds", 1.0),
    ("ms", 1e-3),
    ("min", 60.0),
    ("minutes", 60.0),
    ("hr", 3600.0),
    ("hours", 3600.0),
];

const LENGTH_UNITS: &[(&str, f64)] = &[
    ("m", 1.0),
    ("meters", 1.0),
    ("km", 1000.0),
    ("kilometers", 1000.0),
    ("ft", 0.3048),
    ("feet", 0.3048),
    ("nm", 1852.0),
    ("nmi", 1852.0),
];

fn strip_comment(line: &str) -> &str {
    let cut = [line.find('#'), line.find("//")].into_iter().flatten().min();
    match cut {
        Some(i) => &line[..i],
        None => line,
    }
}

fn parse_bool(token: &str) -> Option<bool> {
    match token {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

struct Tokens<'a> {
    items: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let items = text
            .lines()
            .enumerate()
            .flat_map(|(n, line)| strip_comment(line).split_whitespace().map(move |t| (n + 1, t)))
            .collect();
        Self { items, pos: 0 }
    }

    fn next(&mut self) -> Option<(usize, &'a str)> {
        let item = self.items.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn peek(&self) -> Option<&'a str> {
        self.items.get(self.pos).map(|(_, t)| *t)
    }

    fn value(&mut self, command: &str, line: usize) -> Result<&'a str, ConfigError> {
        self.next().map(|(_, t)| t).ok_or_else(|| ConfigError::MissingValue {
            command: command.into(),
            line,
        })
    }

    fn parsed<T: FromStr>(&mut self, command: &str, line: usize) -> Result<T, ConfigError> {
        let value = self.value(command, line)?;
        value.parse().map_err(|_| ConfigError::BadValue {
            command: command.into(),
            value: value.into(),
            line,
        })
    }

    fn number(&mut self, command: &str, line: usize) -> Result<f64, ConfigError> {
        self.parsed(command, line)
    }

    /// Number with an optional trailing unit from `units`.
    fn quantity(&mut self, command: &str, line: usize, units: &[(&str, f64)]) -> Result<f64, ConfigError> {
        let value = self.number(command, line)?;
        let scale = self
            .peek()
            .and_then(|t| units.iter().find(|(name, _)| *name == t))
            .map(|(_, scale)| *scale);
        match scale {
            Some(scale) => {
                self.next();
                Ok(value * scale)
            }
            None => Ok(value),
        }
    }

    /// Boolean whose value is optional; a bare command means `true`.
    fn flag(&mut self, command: &str, line: usize) -> Result<bool, ConfigError> {
        let Some(token) = self.peek() else {
            return Ok(true);
        };
        if let Some(value) = parse_bool(token) {
            self.next();
            return Ok(value);
        }
        // A numeric token right after a flag is a malformed value, not the next command.
        if token.parse::<f64>().is_ok() {
            return Err(ConfigError::BadValue {
                command: command.into(),
                value: token.into(),
                line,
            });
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_block_is_read() {
        let text = "
            # manager for the blue flight lead
            track_manager
               owner 7
               side blue
               uncorrelated_track_drops false
               retain_raw_tracks
               initiate_local_tracks true   // explicit
               correlation_method nearest_neighbor
                  tracking_sigma 1.5
                  turning_sigma 0.4
                  coast_time 2 min
                  precise_mode off
               end_correlation_method
               fusion_method weighted
            end_track_manager
        ";
        let config: TrackManagerConfig = text.parse().expect("valid config");
        assert_eq!(config.owner, 7);
        assert_eq!(config.side.as_deref(), Some("blue"));
        assert!(!config.drop_uncorrelated_tracks);
        assert!(config.retain_raw_tracks);
        assert!(!config.maintain_track_history);
        assert_eq!(config.fusion, FusionMethod::Weighted);
        let CorrelationMethod::NearestNeighbor(nn) = config.correlation else {
            panic!("expected nearest_neighbor");
        };
        assert_relative_eq!(nn.tracking_sigma, 1.5);
        assert_relative_eq!(nn.turning_sigma, 0.4);
        assert_relative_eq!(nn.coast_time, 120.0);
        assert!(!nn.precise_mode);
    }

    #[test]
    fn unwrapped_commands_and_length_units() {
        let config = TrackManagerConfig::parse(
            "correlation_method truth max_distance_for_correlation 2 nm ignore_same_side end_correlation_method",
        )
        .expect("valid config");
        let CorrelationMethod::Truth(truth) = config.correlation else {
            panic!("expected truth");
        };
        assert_relative_eq!(truth.max_distance_for_correlation.unwrap_or_default(), 3704.0);
        assert!(truth.ignore_same_side);
        assert!(!truth.ignore_track_target);
    }

    #[test]
    fn method_block_may_omit_its_end() {
        let config = TrackManagerConfig::parse("correlation_method cluster update_interval 500 ms retain_track_history")
            .expect("valid config");
        assert_eq!(config.correlation, CorrelationMethod::Cluster(ClusterConfig { update_interval: 0.5 }));
        assert!(config.maintain_track_history);
    }

    #[test]
    fn errors_carry_command_and_line() {
        assert_eq!(
            TrackManagerConfig::parse("owner 1\nbogus 3"),
            Err(ConfigError::UnknownCommand {
                command: "bogus".into(),
                line: 2
            })
        );
        assert_eq!(
            TrackManagerConfig::parse("owner"),
            Err(ConfigError::MissingValue {
                command: "owner".into(),
                line: 1
            })
        );
        assert_eq!(
            TrackManagerConfig::parse("owner seven"),
            Err(ConfigError::BadValue {
                command: "owner".into(),
                value: "seven".into(),
                line: 1
            })
        );
        assert_eq!(
            TrackManagerConfig::parse("track_manager owner 2"),
            Err(ConfigError::UnterminatedBlock {
                expected: "end_track_manager".into()
            })
        );
        assert_eq!(
            TrackManagerConfig::parse("\n\ncorrelation_method hungarian"),
            Err(ConfigError::UnknownStrategy {
                name: "hungarian".into(),
                line: 3
            })
        );
    }

    #[test]
    fn option_of_another_method_is_rejected() {
        let err = TrackManagerConfig::parse("correlation_method cluster tracking_sigma 1.0").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCommand { ref command, .. } if command == "tracking_sigma"));
    }

    #[test]
    fn invalid_values_are_rejected_at_load() {
        let err = TrackManagerConfig::parse("correlation_method cluster update_interval 0").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { ref command, .. } if command == "update_interval"));
        let err = TrackManagerConfig::parse("correlation_method nearest_neighbor coast_time -1").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
        let err = TrackManagerConfig::parse("correlation_method truth max_distance_for_correlation 0 km").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: TrackManagerConfig =
            serde_json::from_str(r#"{ "owner": 3, "correlation": { "kind": "perfect" } }"#).expect("json config");
        assert_eq!(config.owner, 3);
        assert_eq!(config.correlation, CorrelationMethod::Perfect);
        assert!(config.drop_uncorrelated_tracks);
        assert_eq!(config.fusion, FusionMethod::Replacement);
    }
}
