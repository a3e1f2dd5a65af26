use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_NAME: &str = "medical_quiz_settings";
pub const KEY_LOG_ANSWERS: &str = "log_answers_enabled";
pub const DEFAULT_LOG_ANSWERS: bool = true;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot write settings to {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named key-value store persisted as a JSON object on disk.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Preferences {
    /// Opens `<dir>/<name>.json`. A missing file starts empty; a malformed one
    /// is logged and starts empty as well.
    pub fn open(dir: &Path, name: &str) -> Self {
        let path = dir.join(format!("{name}.json"));
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(values) => {
                    debug!("[Settings] Loaded {} keys from {:?}", values.len(), path);
                    values
                }
                Err(err) => {
                    warn!("[Settings] Malformed settings file {:?}, using defaults: {}", path, err);
                    Map::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("[Settings] No settings at {:?} yet", path);
                Map::new()
            }
            Err(err) => {
                warn!("[Settings] Cannot read {:?}, using defaults: {}", path, err);
                Map::new()
            }
        };

        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Stores the value in memory, then writes the whole store through to disk.
    pub fn put_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), Value::Bool(value));
        self.flush()
    }

    fn flush(&self) -> Result<(), SettingsError> {
        let content = serde_json::to_string_pretty(&self.values)?;
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!("[Settings] Saved {:?}", self.path);
        Ok(())
    }
}

/// Typed access to the application settings.
#[derive(Debug)]
pub struct Settings {
    prefs: Preferences,
}

impl Settings {
    pub fn open(dir: &Path) -> Self {
        Self {
            prefs: Preferences::open(dir, SETTINGS_NAME),
        }
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.prefs.get_bool(KEY_LOG_ANSWERS, DEFAULT_LOG_ANSWERS)
    }

    pub fn set_logging_enabled(&mut self, enabled: bool) -> Result<(), SettingsError> {
        info!("[Settings] Answer logging {}", if enabled { "enabled" } else { "disabled" });
        self.prefs.put_bool(KEY_LOG_ANSWERS, enabled)
    }

    pub fn path(&self) -> &Path {
        self.prefs.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logging_defaults_to_enabled() {
        let dir = tempdir().unwrap();
        let settings = Settings::open(dir.path());
        assert!(settings.is_logging_enabled());
    }

    #[test]
    fn test_write_is_visible_and_durable() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::open(dir.path());
        settings.set_logging_enabled(false).unwrap();
        assert!(!settings.is_logging_enabled());

        let reopened = Settings::open(dir.path());
        assert!(!reopened.is_logging_enabled());
        assert_eq!(
            reopened.path(),
            dir.path().join("medical_quiz_settings.json").as_path()
        );
    }

    #[test]
    fn test_malformed_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("medical_quiz_settings.json"), "{ not json").unwrap();

        let mut settings = Settings::open(dir.path());
        assert!(settings.is_logging_enabled());

        settings.set_logging_enabled(false).unwrap();
        assert!(!Settings::open(dir.path()).is_logging_enabled());
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medical_quiz_settings.json");
        fs::write(&path, r#"{"font_scale": 1.25}"#).unwrap();

        let mut settings = Settings::open(dir.path());
        settings.set_logging_enabled(true).unwrap();

        let saved: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.get("font_scale"), Some(&Value::from(1.25)));
        assert_eq!(saved.get(KEY_LOG_ANSWERS), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_failed_write_still_updates_memory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        // The settings directory is a regular file, so the write cannot succeed.
        let mut settings = Settings::open(&blocker.join("nested"));
        assert!(settings.set_logging_enabled(false).is_err());
        assert!(!settings.is_logging_enabled());
    }
}
