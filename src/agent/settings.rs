//! Per-player agent settings and their persistence.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{SettingsError, SettingsResult};

/// Persisted record for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub player_name: String,
    pub irc_nick: String,
}

impl AgentSettings {
    pub fn new(player_name: impl Into<String>, irc_nick: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            irc_nick: irc_nick.into(),
        }
    }
}

/// Key-value lookup of settings by player name.
pub trait SettingsStore: Send + Sync {
    fn find(&self, player_name: &str) -> SettingsResult<Option<AgentSettings>>;

    fn save(&self, settings: &AgentSettings) -> SettingsResult<()>;
}

/// Settings kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, AgentSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with existing records.
    pub fn with_records(records: impl IntoIterator<Item = AgentSettings>) -> Self {
        let store = Self::new();
        store.records.lock().extend(
            records
                .into_iter()
                .map(|settings| (settings.player_name.clone(), settings)),
        );
        store
    }
}

impl SettingsStore for MemoryStore {
    fn find(&self, player_name: &str) -> SettingsResult<Option<AgentSettings>> {
        Ok(self.records.lock().get(player_name).cloned())
    }

    fn save(&self, settings: &AgentSettings) -> SettingsResult<()> {
        self.records
            .lock()
            .insert(settings.player_name.clone(), settings.clone());
        Ok(())
    }
}

/// Settings persisted as one JSON object keyed by player name.
///
/// The whole file is rewritten on every save through a temporary sibling
/// file and a rename, so a crash mid-write leaves the previous contents.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<HashMap<String, AgentSettings>>,
}

impl JsonFileStore {
    /// Open the store, reading existing records if the file exists.
    pub fn open(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Settings file {} not found, starting empty", path.display());
                HashMap::new()
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, records: &HashMap<String, AgentSettings>) -> SettingsResult<()> {
        let io_err = |source| SettingsError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn find(&self, player_name: &str) -> SettingsResult<Option<AgentSettings>> {
        Ok(self.records.lock().get(player_name).cloned())
    }

    fn save(&self, settings: &AgentSettings) -> SettingsResult<()> {
        let mut records = self.records.lock();
        let previous = records.insert(settings.player_name.clone(), settings.clone());

        if let Err(e) = self.write_all(&records) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(previous) => records.insert(previous.player_name.clone(), previous),
                None => records.remove(&settings.player_name),
            };
            return Err(e);
        }
        debug!(
            "Saved settings for '{}' to {}",
            settings.player_name,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.find("Steve").unwrap(), None);

        store.save(&AgentSettings::new("Steve", "mc_Steve")).unwrap();
        assert_eq!(store.find("Steve").unwrap().unwrap().irc_nick, "mc_Steve");

        store.save(&AgentSettings::new("Steve", "steve_")).unwrap();
        assert_eq!(store.find("Steve").unwrap().unwrap().irc_nick, "steve_");
    }

    #[test]
    fn test_memory_store_with_records() {
        let store = MemoryStore::with_records([AgentSettings::new("Alex", "alex_irc")]);
        assert_eq!(store.find("Alex").unwrap().unwrap().irc_nick, "alex_irc");
    }

    #[test]
    fn test_json_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agents.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.find("Steve").unwrap(), None);
        store.save(&AgentSettings::new("Steve", "mc_Steve")).unwrap();
        store.save(&AgentSettings::new("Alex", "mc_Alex")).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.find("Steve").unwrap(),
            Some(AgentSettings::new("Steve", "mc_Steve"))
        );
        assert_eq!(reopened.find("Alex").unwrap().unwrap().irc_nick, "mc_Alex");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_store_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        fs::write(&path, "{ not json").unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(SettingsError::Serialization(_))));
    }

    #[test]
    fn test_json_store_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        fs::write(&path, "").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.find("Steve").unwrap(), None);
    }

    #[test]
    fn test_json_store_failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("data");
        let store = JsonFileStore::open(parent.join("agents.json")).unwrap();
        store.save(&AgentSettings::new("Steve", "mc_Steve")).unwrap();

        // Replace the directory with a file so the next write cannot land
        fs::remove_dir_all(&parent).unwrap();
        fs::write(&parent, "").unwrap();

        let result = store.save(&AgentSettings::new("Steve", "builder"));
        assert!(matches!(result, Err(SettingsError::Io { .. })));
        assert_eq!(store.find("Steve").unwrap().unwrap().irc_nick, "mc_Steve");

        let result = store.save(&AgentSettings::new("Alex", "mc_Alex"));
        assert!(result.is_err());
        assert_eq!(store.find("Alex").unwrap(), None);
    }
}
