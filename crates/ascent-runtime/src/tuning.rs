//! Live tuning of the hold loops.
//!
//! A [`TuningStore`] is a flat map of `"<loop>/<key>"` numbers shared with
//! whatever dashboard the operator uses.  The flight computer reads gains and
//! set-points from it at the start of every cycle and writes back the
//! loop's error and output:
//!
//! | Key | Direction |
//! |---|---|
//! | `<loop>/kP`, `<loop>/kI`, `<loop>/kD` | read |
//! | `<loop>/Setpoint` | read |
//! | `<loop>/Position Tolerance`, `<loop>/Velocity Tolerance` | read |
//! | `<loop>/Integrator Bound` | read |
//! | `<loop>/Current Error`, `<loop>/PID Output` | written |
//!
//! [`TomlTuningStore`] backs the map with a file such as:
//!
//! ```toml
//! ["Velocity Control"]
//! kP = 0.05
//! kI = 0.001
//! kD = 0.01
//! Setpoint = 120
//! "Position Tolerance" = 1.0
//! ```
//!
//! The file is re-read whenever its modification time changes.  A file that
//! fails to parse is reported once and the last good values stay in force.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::SystemTime;

use ascent_hal::PidConfig;
use ascent_types::AscentError;
use tracing::{debug, info, warn};

pub const KP: &str = "kP";
pub const KI: &str = "kI";
pub const KD: &str = "kD";
pub const SETPOINT: &str = "Setpoint";
pub const POSITION_TOLERANCE: &str = "Position Tolerance";
pub const VELOCITY_TOLERANCE: &str = "Velocity Tolerance";
/// Largest `|error|` the integral still accumulates at.
pub const INTEGRATOR_BOUND: &str = "Integrator Bound";
pub const CURRENT_ERROR: &str = "Current Error";
pub const PID_OUTPUT: &str = "PID Output";

pub fn key(loop_name: &str, field: &str) -> String {
    format!("{loop_name}/{field}")
}

pub trait TuningStore: Send + Sync {
    /// Pull external changes into the store.  An `Err` leaves the previously
    /// loaded values readable.
    fn reload(&self) -> Result<(), AscentError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Option<f64>;

    fn put(&self, key: &str, value: f64);
}

/// Overlay whatever the store holds for `loop_name` onto `current`.
pub fn loop_config(store: &dyn TuningStore, loop_name: &str, current: &PidConfig) -> PidConfig {
    let read = |field: &str, fallback: f64| {
        store
            .get(&key(loop_name, field))
            .filter(|v| v.is_finite())
            .unwrap_or(fallback)
    };
    let mut config = *current;
    config.gains.kp = read(KP, current.gains.kp);
    config.gains.ki = read(KI, current.gains.ki);
    config.gains.kd = read(KD, current.gains.kd);
    config.setpoint = read(SETPOINT, current.setpoint);
    config.position_tolerance = read(POSITION_TOLERANCE, current.position_tolerance);
    config.velocity_tolerance = read(VELOCITY_TOLERANCE, current.velocity_tolerance);
    config.integrator_saturation_bound =
        read(INTEGRATOR_BOUND, current.integrator_saturation_bound);
    config
}

/// Publish `defaults` for every tunable key the store does not hold yet.
pub fn seed_defaults(store: &dyn TuningStore, loop_name: &str, defaults: &PidConfig) {
    let fields = [
        (KP, defaults.gains.kp),
        (KI, defaults.gains.ki),
        (KD, defaults.gains.kd),
        (SETPOINT, defaults.setpoint),
        (POSITION_TOLERANCE, defaults.position_tolerance),
        (VELOCITY_TOLERANCE, defaults.velocity_tolerance),
        (INTEGRATOR_BOUND, defaults.integrator_saturation_bound),
    ];
    for (field, value) in fields {
        let k = key(loop_name, field);
        if store.get(&k).is_none() {
            store.put(&k, value);
        }
    }
}

/// Write the loop's latest error and output back for display.
pub fn publish_output(store: &dyn TuningStore, loop_name: &str, error: f64, output: f64) {
    store.put(&key(loop_name, CURRENT_ERROR), error);
    store.put(&key(loop_name, PID_OUTPUT), output);
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Shared map; clones see the same values.
#[derive(Debug, Clone, Default)]
pub struct MemoryTuningStore {
    values: Arc<RwLock<HashMap<String, f64>>>,
}

impl MemoryTuningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TuningStore for MemoryTuningStore {
    fn get(&self, key: &str) -> Option<f64> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
    }

    fn put(&self, key: &str, value: f64) {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TOML file store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FileState {
    /// Values from the last file that parsed.
    loaded: HashMap<String, f64>,
    /// Local writes (defaults and loop outputs); file values take precedence.
    local: HashMap<String, f64>,
    /// Modification time of the last file read, good or bad.
    seen: Option<SystemTime>,
}

/// Tuning store backed by a TOML file of per-loop tables.
pub struct TomlTuningStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl TomlTuningStore {
    /// Open `path`.  A missing file is not an error; it is picked up as soon
    /// as it appears.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: path.into(),
            state: Mutex::new(FileState::default()),
        };
        if let Err(error) = store.reload() {
            warn!(%error, path = %store.path.display(), "initial tuning load failed");
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Flatten `[loop] field = n` tables into `"loop/field"` keys.
pub fn parse_tuning_toml(text: &str) -> Result<HashMap<String, f64>, AscentError> {
    let table: toml::Table = text
        .parse()
        .map_err(|e| AscentError::Configuration(format!("tuning file: {e}")))?;

    let mut values = HashMap::new();
    for (loop_name, fields) in table {
        let toml::Value::Table(fields) = fields else {
            return Err(AscentError::Configuration(format!(
                "tuning file: '{loop_name}' must be a table"
            )));
        };
        for (field, value) in fields {
            let number = match value {
                toml::Value::Float(f) => f,
                toml::Value::Integer(i) => i as f64,
                other => {
                    return Err(AscentError::Configuration(format!(
                        "tuning file: '{loop_name}/{field}' must be a number, got {}",
                        other.type_str()
                    )));
                }
            };
            values.insert(key(&loop_name, &field), number);
        }
    }
    Ok(values)
}

impl TuningStore for TomlTuningStore {
    fn reload(&self) -> Result<(), AscentError> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return Ok(()),
        };

        let mut state = self.lock();
        if state.seen == Some(modified) {
            return Ok(());
        }
        state.seen = Some(modified);

        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            AscentError::Configuration(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let values = parse_tuning_toml(&text)?;
        if state.loaded.is_empty() {
            debug!(path = %self.path.display(), keys = values.len(), "tuning loaded");
        } else {
            info!(path = %self.path.display(), keys = values.len(), "tuning reloaded");
        }
        state.loaded = values;
        Ok(())
    }

    fn get(&self, key: &str) -> Option<f64> {
        let state = self.lock();
        state
            .loaded
            .get(key)
            .or_else(|| state.local.get(key))
            .copied()
    }

    fn put(&self, key: &str, value: f64) {
        self.lock().local.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const LOOP: &str = "Velocity Control";

    #[test]
    fn loop_config_overlays_only_present_keys() {
        let store = MemoryTuningStore::new();
        store.put("Velocity Control/kP", 0.2);
        store.put("Velocity Control/Setpoint", 120.0);
        store.put("Velocity Control/kI", f64::NAN);

        let base = PidConfig::default();
        let config = loop_config(&store, LOOP, &base);
        assert_eq!(config.gains.kp, 0.2);
        assert_eq!(config.gains.ki, base.gains.ki);
        assert_eq!(config.setpoint, 120.0);
        assert_eq!(config.position_tolerance, base.position_tolerance);
    }

    #[test]
    fn seed_defaults_keeps_existing_values() {
        let store = MemoryTuningStore::new();
        store.put("Velocity Control/kP", 0.3);
        seed_defaults(&store, LOOP, &PidConfig::default());
        assert_eq!(store.get("Velocity Control/kP"), Some(0.3));
        assert_eq!(store.get("Velocity Control/kI"), Some(0.001));
        assert_eq!(store.get("Velocity Control/Velocity Tolerance"), Some(0.1));
        assert_eq!(store.get("Velocity Control/Integrator Bound"), Some(1.0));
    }

    #[test]
    fn integrator_bound_is_tunable() {
        let store = MemoryTuningStore::new();
        store.put("Altitude Control/Integrator Bound", 25.0);
        let config = loop_config(&store, "Altitude Control", &PidConfig::default());
        assert_eq!(config.integrator_saturation_bound, 25.0);
    }

    #[test]
    fn publish_output_writes_display_keys() {
        let store = MemoryTuningStore::new();
        publish_output(&store, LOOP, -3.5, 0.25);
        assert_eq!(store.get("Velocity Control/Current Error"), Some(-3.5));
        assert_eq!(store.get("Velocity Control/PID Output"), Some(0.25));
    }

    #[test]
    fn parse_accepts_integers_and_quoted_keys() {
        let values = parse_tuning_toml(
            "[\"Velocity Control\"]\nkP = 1\n\"Position Tolerance\" = 2.5\n",
        )
        .unwrap();
        assert_eq!(values.get("Velocity Control/kP"), Some(&1.0));
        assert_eq!(values.get("Velocity Control/Position Tolerance"), Some(&2.5));
    }

    #[test]
    fn parse_rejects_non_numbers() {
        let err = parse_tuning_toml("[\"Velocity Control\"]\nkP = \"fast\"\n").unwrap_err();
        assert!(matches!(err, AscentError::Configuration(_)));
        assert!(parse_tuning_toml("kP = 1.0\n").is_err());
    }

    #[test]
    fn toml_store_reloads_on_change_and_keeps_last_good_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.toml");
        std::fs::write(&path, "[\"Velocity Control\"]\nkP = 0.05\n").unwrap();

        let store = TomlTuningStore::open(&path);
        assert_eq!(store.get("Velocity Control/kP"), Some(0.05));

        // Coarse filesystem timestamps need a visible gap between writes.
        std::thread::sleep(Duration::from_millis(1100));
        std::fs::write(&path, "[\"Velocity Control\"]\nkP = 0.08\n").unwrap();
        store.reload().unwrap();
        assert_eq!(store.get("Velocity Control/kP"), Some(0.08));

        std::thread::sleep(Duration::from_millis(1100));
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(store.reload().is_err());
        // Reported once; the broken file is not re-parsed every cycle.
        assert!(store.reload().is_ok());
        assert_eq!(store.get("Velocity Control/kP"), Some(0.08));
    }

    #[test]
    fn toml_store_without_file_serves_local_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlTuningStore::open(dir.path().join("absent.toml"));
        assert!(store.reload().is_ok());
        assert_eq!(store.get("Velocity Control/kP"), None);
        store.put("Velocity Control/PID Output", 0.7);
        assert_eq!(store.get("Velocity Control/PID Output"), Some(0.7));
    }
}
