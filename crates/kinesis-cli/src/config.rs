//! Configuration Vault – reads/writes `~/.kinesis/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kinesis_motion::MovementPattern;
use kinesis_runtime::OrchestratorConfig;
use kinesis_types::MotorCommand;
use serde::{Deserialize, Serialize};

/// A movement pattern as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub duration_ms: u64,
    pub commands: Vec<MotorCommand>,
}

impl PatternConfig {
    pub fn to_pattern(&self) -> MovementPattern {
        MovementPattern::new(
            self.name.clone(),
            self.commands.clone(),
            Duration::from_millis(self.duration_ms),
        )
    }
}

/// Persisted user configuration stored in `~/.kinesis/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Feed the sensor hub with generated waveforms.
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// Period of the simulated feed, in milliseconds.
    #[serde(default = "default_sim_period_ms")]
    pub sim_period_ms: u64,

    /// Seconds between status log lines.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Subsystem tuning.
    #[serde(default)]
    pub system: OrchestratorConfig,

    /// Patterns registered at startup.
    #[serde(default = "default_patterns")]
    pub patterns: Vec<PatternConfig>,
}

fn default_simulate() -> bool {
    true
}
fn default_sim_period_ms() -> u64 {
    100
}
fn default_status_interval_secs() -> u64 {
    5
}
fn default_patterns() -> Vec<PatternConfig> {
    vec![PatternConfig {
        name: "sweep".to_string(),
        duration_ms: 2000,
        commands: vec![
            MotorCommand::new("servo_1", 0.0, 90.0),
            MotorCommand::new("servo_1", 90.0, 90.0),
            MotorCommand::new("servo_1", 180.0, -90.0),
            MotorCommand::new("servo_1", 90.0, 0.0),
        ],
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulate: default_simulate(),
            sim_period_ms: default_sim_period_ms(),
            status_interval_secs: default_status_interval_secs(),
            system: OrchestratorConfig::default(),
            patterns: default_patterns(),
        }
    }
}

/// Return the path to `~/.kinesis/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kinesis").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `KINESIS_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `KINESIS_ANALYSIS_TICK_MS` | `system.analysis_tick_ms` |
/// | `KINESIS_MOTION_TICK_MS` | `system.motion.tick_ms` |
/// | `KINESIS_BEHAVIOR_THRESHOLD` | `system.classifier.threshold` |
/// | `KINESIS_SIMULATE` | `simulate` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KINESIS_ANALYSIS_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.system.analysis_tick_ms = ms;
    }
    if let Ok(v) = std::env::var("KINESIS_MOTION_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.system.motion.tick_ms = ms;
    }
    if let Ok(v) = std::env::var("KINESIS_BEHAVIOR_THRESHOLD")
        && let Ok(t) = v.parse::<f64>()
        && (0.0..=1.0).contains(&t)
    {
        cfg.system.classifier.threshold = t;
    }
    if let Ok(v) = std::env::var("KINESIS_SIMULATE")
        && let Ok(on) = v.parse::<bool>()
    {
        cfg.simulate = on;
    }
}

/// Save the config to disk, creating `~/.kinesis/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.system.motion.motors.len(), 2);
        assert_eq!(loaded.patterns[0].name, "sweep");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "simulate = false\n\n[system]\nanalysis_tick_ms = 500\n\n[system.classifier]\nthreshold = 0.9\n",
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(!cfg.simulate);
        assert_eq!(cfg.system.analysis_tick_ms, 500);
        assert_eq!(cfg.system.classifier.threshold, 0.9);
        assert_eq!(cfg.system.classifier.window, 60);
        assert_eq!(cfg.system.hub.buffer_capacity, 1000);
        assert_eq!(cfg.system.motion.tick_ms, 10);
    }

    #[test]
    fn custom_motor_roster_is_read() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[system.motion.motors]]
id = "wrist"
type = "stepper"
max_speed = 45.0
min_position = -90.0
max_position = 90.0
"#,
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        let motors = &cfg.system.motion.motors;
        assert_eq!(motors.len(), 1);
        assert_eq!(motors[0].id, "wrist");
        assert_eq!(motors[0].motor_type, kinesis_motion::MotorType::Stepper);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "simulate = \"maybe\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_kinesis_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".kinesis"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn pattern_config_converts() {
        let pattern = default_patterns()[0].to_pattern();
        assert_eq!(pattern.commands.len(), 4);
        assert_eq!(pattern.spacing(), Duration::from_millis(500));
    }

    // Env-var tests share one test so they cannot race each other.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: the only test in this binary touching KINESIS_* variables.
        unsafe {
            std::env::set_var("KINESIS_ANALYSIS_TICK_MS", "250");
            std::env::set_var("KINESIS_MOTION_TICK_MS", "not-a-number");
            std::env::set_var("KINESIS_BEHAVIOR_THRESHOLD", "0.6");
            std::env::set_var("KINESIS_SIMULATE", "false");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.system.analysis_tick_ms, 250);
        assert_eq!(cfg.system.motion.tick_ms, 10);
        assert_eq!(cfg.system.classifier.threshold, 0.6);
        assert!(!cfg.simulate);

        unsafe { std::env::set_var("KINESIS_BEHAVIOR_THRESHOLD", "7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.system.classifier.threshold, 0.75);

        unsafe {
            std::env::remove_var("KINESIS_ANALYSIS_TICK_MS");
            std::env::remove_var("KINESIS_MOTION_TICK_MS");
            std::env::remove_var("KINESIS_BEHAVIOR_THRESHOLD");
            std::env::remove_var("KINESIS_SIMULATE");
        }
    }
}
