//! Persists [`StrategyHealth`] state to `data/monitor/health-state.json`
//! (§6): a flat map of `{strategyId: StateName, strategyId.lastUpdated:
//! ISO-instant}`, written atomically on every transition and reloaded at
//! startup so a disabled strategy stays disabled across a restart (§4.7:
//! "States persist to disk on every transition; at startup, the evaluator
//! honors them").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use talus_analytics::health::HealthState;

use crate::error::CoreError;

fn state_name(state: HealthState) -> &'static str {
    match state {
        HealthState::Enabled => "ENABLED",
        HealthState::Degraded => "DEGRADED",
        HealthState::Disabled => "DISABLED",
    }
}

fn parse_state(name: &str) -> Option<HealthState> {
    match name {
        "ENABLED" => Some(HealthState::Enabled),
        "DEGRADED" => Some(HealthState::Degraded),
        "DISABLED" => Some(HealthState::Disabled),
        _ => None,
    }
}

/// The on-disk flat-map store at `<root>/monitor/health-state.json`.
#[derive(Debug)]
pub struct HealthStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, (HealthState, DateTime<Utc>)>>,
}

impl HealthStore {
    /// Loads any existing file under `root/monitor/health-state.json`; an
    /// absent file is treated as an empty store (first run).
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = root.into().join("monitor").join("health-state.json");
        let cache = read_flat_map(&path)?;
        Ok(HealthStore { path, cache: RwLock::new(cache) })
    }

    /// The persisted state for `strategy_id`, if any was recorded.
    pub fn get(&self, strategy_id: &str) -> Option<HealthState> {
        self.cache.read().get(strategy_id).map(|(state, _)| *state)
    }

    /// Records `state` for `strategy_id` and atomically rewrites the whole
    /// file. Called on every health-state transition, never on an unchanged
    /// evaluation (§4.7).
    pub fn put(&self, strategy_id: &str, state: HealthState, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.cache.write().insert(strategy_id.to_string(), (state, now));
        self.flush()
    }

    fn flush(&self) -> Result<(), CoreError> {
        let mut map = serde_json::Map::new();
        for (strategy_id, (state, updated_at)) in self.cache.read().iter() {
            map.insert(strategy_id.clone(), Value::String(state_name(*state).to_string()));
            map.insert(format!("{strategy_id}.lastUpdated"), Value::String(updated_at.to_rfc3339()));
        }
        write_atomic(&self.path, &Value::Object(map))
    }
}

fn read_flat_map(path: &Path) -> Result<HashMap<String, (HealthState, DateTime<Utc>)>, CoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => return Err(CoreError::HealthPersistence { path: path.display().to_string(), source }),
    };
    let raw: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Object(serde_json::Map::new()));
    let Value::Object(map) = raw else { return Ok(HashMap::new()) };

    let mut result = HashMap::new();
    for (key, value) in map.iter() {
        if key.ends_with(".lastUpdated") {
            continue;
        }
        let Some(state) = value.as_str().and_then(parse_state) else { continue };
        let updated_at = map
            .get(&format!("{key}.lastUpdated"))
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        result.insert(key.clone(), (state, updated_at));
    }
    Ok(result)
}

fn write_atomic(path: &Path, value: &Value) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| CoreError::HealthPersistence { path: path.display().to_string(), source })?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    let payload = serde_json::to_vec_pretty(value).expect("health state map always serializes");
    std::fs::write(&tmp_path, &payload)
        .map_err(|source| CoreError::HealthPersistence { path: tmp_path.display().to_string(), source })?;
    std::fs::rename(&tmp_path, path).map_err(|source| CoreError::HealthPersistence { path: path.display().to_string(), source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::load(dir.path()).unwrap();
        assert_eq!(store.get("donchian-48"), None);

        store.put("donchian-48", HealthState::Degraded, Utc::now()).unwrap();
        assert_eq!(store.get("donchian-48"), Some(HealthState::Degraded));

        let reloaded = HealthStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("donchian-48"), Some(HealthState::Degraded));
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::load(dir.path().join("does-not-exist")).unwrap();
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn overwriting_a_strategy_updates_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = HealthStore::load(dir.path()).unwrap();
        let t0 = Utc::now();
        store.put("s1", HealthState::Enabled, t0).unwrap();
        store.put("s1", HealthState::Disabled, t0 + chrono::Duration::seconds(1)).unwrap();
        assert_eq!(store.get("s1"), Some(HealthState::Disabled));
    }
}
