//! Persisted user preferences.
//!
//! Exactly two identifiers survive restarts: the last-selected zone and the
//! last-selected receiver. A missing file is not an error; load and save
//! failures are logged and never propagated to callers.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The persisted selection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_zone_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_receiver_id: Option<String>,
}

/// Load/save of [`Preferences`] with an in-memory working copy.
pub struct PreferencesStore {
    path: PathBuf,
    current: Mutex<Preferences>,
}

impl PreferencesStore {
    /// Opens the store, loading the file if present. Defaults on any failure.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = Mutex::new(load(&path));
        Self { path, current }
    }

    /// Snapshot of the current preferences.
    #[must_use]
    pub fn get(&self) -> Preferences {
        self.current.lock().clone()
    }

    /// Applies a mutation and saves. Save failures are logged, not returned.
    pub fn update(&self, apply: impl FnOnce(&mut Preferences)) {
        let snapshot = {
            let mut current = self.current.lock();
            apply(&mut current);
            current.clone()
        };
        save(&self.path, &snapshot);
    }
}

fn load(path: &Path) -> Preferences {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(err) => {
                log::warn!("[Prefs] failed to parse {}: {}", path.display(), err);
                Preferences::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
        Err(err) => {
            log::warn!("[Prefs] failed to read {}: {}", path.display(), err);
            Preferences::default()
        }
    }
}

fn save(path: &Path, prefs: &Preferences) {
    let contents = match serde_json::to_string_pretty(prefs) {
        Ok(contents) => contents,
        Err(err) => {
            log::error!("[Prefs] failed to encode preferences: {}", err);
            return;
        }
    };
    if let Err(err) = std::fs::write(path, contents) {
        log::error!("[Prefs] failed to write {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::open(dir.path().join("prefs.json"));
        assert_eq!(store.get(), Preferences::default());
    }

    #[test]
    fn selections_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let store = PreferencesStore::open(&path);
        store.update(|prefs| prefs.selected_receiver_id = Some("r1".into()));
        store.update(|prefs| prefs.selected_zone_id = Some("z1".into()));

        let reopened = PreferencesStore::open(&path);
        let prefs = reopened.get();
        assert_eq!(prefs.selected_receiver_id.as_deref(), Some("r1"));
        assert_eq!(prefs.selected_zone_id.as_deref(), Some("z1"));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = PreferencesStore::open(&path);
        assert_eq!(store.get(), Preferences::default());
    }
}
