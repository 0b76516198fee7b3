use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::i18n::Language;
use crate::models::Status;

pub const STATUS_KEY: &str = "portal_status";
pub const LANGUAGE_KEY: &str = "preferredLanguage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt store contents: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// String key/value persistence that outlives a single poller run.
pub trait LocalStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty if the file is missing or unreadable as JSON.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring corrupt state file {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedStatus {
    pub status: Status,
    pub timestamp: i64,
}

pub fn load_language(store: &dyn LocalStore) -> Language {
    match store.get(LANGUAGE_KEY) {
        Ok(Some(code)) => code.parse().unwrap_or_else(|e| {
            warn!("Ignoring saved language: {}", e);
            Language::default()
        }),
        Ok(None) => Language::default(),
        Err(e) => {
            warn!("Error reading saved language: {}", e);
            Language::default()
        }
    }
}

pub fn save_language(store: &mut dyn LocalStore, language: Language) {
    if let Err(e) = store.set(LANGUAGE_KEY, language.code()) {
        warn!("Error saving language preference: {}", e);
    }
}

/// The locally cached status, if it is younger than `ttl`.
pub fn load_cached_status(store: &dyn LocalStore, now_millis: i64, ttl: Duration) -> Option<Status> {
    let raw = match store.get(STATUS_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!("Error reading cached status: {}", e);
            return None;
        }
    };

    let cached: CachedStatus = match serde_json::from_str(&raw) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("Error reading cached status: {}", e);
            return None;
        }
    };

    let age = now_millis - cached.timestamp;
    if age < 0 || age as u128 >= ttl.as_millis() {
        debug!("Cached status is {}ms old, ignoring", age);
        return None;
    }
    Some(cached.status)
}

pub fn save_cached_status(store: &mut dyn LocalStore, status: Status, now_millis: i64) {
    let cached = CachedStatus {
        status,
        timestamp: now_millis,
    };
    let result = serde_json::to_string(&cached)
        .map_err(StoreError::from)
        .and_then(|raw| store.set(STATUS_KEY, &raw));
    if let Err(e) = result {
        warn!("Error caching status: {}", e);
    }
}
