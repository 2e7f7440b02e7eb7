use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the notes section inside the merged configuration environment.
pub const CONFIG_KEY: &str = "notes";

/// Configuration for the notes module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotesConfig {
    /// Notes added on startup.
    #[serde(default)]
    pub seed: Vec<String>,
    /// Oldest notes are dropped past this count.
    #[serde(default = "default_max_notes")]
    pub max_notes: usize,
    /// When set, notes are loaded from this path through the module's
    /// `"Main"` service provider on startup.
    #[serde(default)]
    pub remote_path: Option<String>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            seed: Vec::new(),
            max_notes: default_max_notes(),
            remote_path: None,
        }
    }
}

fn default_max_notes() -> usize {
    100
}

impl NotesConfig {
    /// Read the `notes` section; absent means defaults.
    pub fn from_environment(config: &Map<String, Value>) -> anyhow::Result<Self> {
        match config.get(CONFIG_KEY) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(section) => serde_json::from_value(section.clone())
                .map_err(|e| anyhow::anyhow!("invalid '{CONFIG_KEY}' config: {e}")),
        }
    }
}
