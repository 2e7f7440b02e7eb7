//! Durable client-side preferences.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key holding the last committed non-default theme id.
pub const SELECTED_THEME_KEY: &str = "selected-theme-id";

pub trait PreferenceStore: Send + Sync {
    /// Stored value; empty values read as absent.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Preferences kept in a JSON object file, rewritten on every change.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    pub const FILE_NAME: &'static str = "preferences.json";

    /// Open `<dir>/preferences.json`. A missing file starts empty; an
    /// unreadable one is logged and ignored.
    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(Self::FILE_NAME))
    }

    pub fn open(path: PathBuf) -> Self {
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable preferences file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read preferences file");
                BTreeMap::new()
            }
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    // Memory only changes once the file write succeeded.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}
