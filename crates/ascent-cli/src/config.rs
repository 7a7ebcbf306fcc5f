//! Flight configuration – reads/writes `~/.ascent/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ascent_runtime::FlightComputerConfig;
use ascent_types::AscentError;
use serde::{Deserialize, Serialize};

/// Which hold loop the flight computer runs alongside the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    #[default]
    None,
    Altitude,
    Velocity,
}

impl std::str::FromStr for HoldMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(HoldMode::None),
            "altitude" => Ok(HoldMode::Altitude),
            "velocity" => Ok(HoldMode::Velocity),
            other => Err(format!("unknown hold mode '{other}'")),
        }
    }
}

impl std::fmt::Display for HoldMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldMode::None => write!(f, "none"),
            HoldMode::Altitude => write!(f, "altitude"),
            HoldMode::Velocity => write!(f, "velocity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Control cycle period.
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,

    /// Minimum spacing of component registry refreshes.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Telemetry poll period.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Mark telemetry stale after this long without a good value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after_ms: Option<u64>,

    /// TOML tuning file for the hold loops; in-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning_file: Option<PathBuf>,

    /// Ascent profile; the built-in two-stage profile when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_file: Option<PathBuf>,

    #[serde(default)]
    pub hold: HoldMode,
}

fn default_cycle_ms() -> u64 {
    50
}
fn default_refresh_ms() -> u64 {
    100
}
fn default_poll_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_ms: default_cycle_ms(),
            refresh_ms: default_refresh_ms(),
            poll_ms: default_poll_ms(),
            stale_after_ms: None,
            tuning_file: None,
            profile_file: None,
            hold: HoldMode::default(),
        }
    }
}

impl Config {
    pub fn flight_computer(&self) -> FlightComputerConfig {
        FlightComputerConfig {
            cycle_period: Duration::from_millis(self.cycle_ms.max(1)),
            refresh_interval: Duration::from_millis(self.refresh_ms),
            poll_period: Duration::from_millis(self.poll_ms.max(1)),
            stale_after: self.stale_after_ms.map(Duration::from_millis),
            stop_when_finished: false,
        }
    }
}

/// Return the path to `~/.ascent/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".ascent").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, AscentError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, AscentError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        AscentError::Configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| AscentError::Configuration(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ASCENT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ASCENT_CYCLE_MS` | `cycle_ms` |
/// | `ASCENT_REFRESH_MS` | `refresh_ms` |
/// | `ASCENT_POLL_MS` | `poll_ms` |
/// | `ASCENT_TUNING_FILE` | `tuning_file` |
/// | `ASCENT_PROFILE` | `profile_file` |
/// | `ASCENT_HOLD` | `hold` |
///
/// Unparseable numbers and modes are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    let millis = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());
    if let Some(ms) = millis("ASCENT_CYCLE_MS") {
        cfg.cycle_ms = ms;
    }
    if let Some(ms) = millis("ASCENT_REFRESH_MS") {
        cfg.refresh_ms = ms;
    }
    if let Some(ms) = millis("ASCENT_POLL_MS") {
        cfg.poll_ms = ms;
    }
    if let Ok(v) = std::env::var("ASCENT_TUNING_FILE") {
        cfg.tuning_file = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("ASCENT_PROFILE") {
        cfg.profile_file = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("ASCENT_HOLD")
        && let Ok(mode) = v.parse::<HoldMode>()
    {
        cfg.hold = mode;
    }
}

/// Save the config, creating `~/.ascent/` if necessary.
pub fn save(cfg: &Config) -> Result<(), AscentError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), AscentError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AscentError::Configuration(format!("failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| AscentError::Configuration(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        AscentError::Configuration(format!("failed to write {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.cycle_ms, 50);
        assert_eq!(loaded.refresh_ms, 100);
        assert_eq!(loaded.hold, HoldMode::None);
        assert!(loaded.profile_file.is_none());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hold = \"velocity\"\ntuning_file = \"/tmp/tuning.toml\"\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.hold, HoldMode::Velocity);
        assert_eq!(cfg.tuning_file, Some(PathBuf::from("/tmp/tuning.toml")));
        assert_eq!(cfg.poll_ms, 50);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cycle_ms = \"fast\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(AscentError::Configuration(_))));
    }

    #[test]
    fn config_path_points_to_ascent_dir() {
        let p = config_path_for_home("/home/pilot");
        assert!(p.to_string_lossy().contains(".ascent"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn flight_computer_config_maps_periods() {
        let cfg = Config {
            cycle_ms: 20,
            stale_after_ms: Some(500),
            ..Config::default()
        };
        let fc = cfg.flight_computer();
        assert_eq!(fc.cycle_period, Duration::from_millis(20));
        assert_eq!(fc.refresh_interval, Duration::from_millis(100));
        assert_eq!(fc.stale_after, Some(Duration::from_millis(500)));
    }

    #[test]
    fn apply_env_overrides_changes_cycle_period() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("ASCENT_CYCLE_MS", "25") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.cycle_ms, 25);
        unsafe { std::env::remove_var("ASCENT_CYCLE_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_numbers() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("ASCENT_POLL_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.poll_ms, 50);
        unsafe { std::env::remove_var("ASCENT_POLL_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_hold_mode() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("ASCENT_HOLD", "Altitude") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.hold, HoldMode::Altitude);
        unsafe { std::env::remove_var("ASCENT_HOLD") };
    }

    #[test]
    fn apply_env_overrides_sets_profile_path() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("ASCENT_PROFILE", "/srv/profiles/hop.toml") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.profile_file, Some(PathBuf::from("/srv/profiles/hop.toml")));
        unsafe { std::env::remove_var("ASCENT_PROFILE") };
    }
}
