//! Theming: catalog, stylesheet loading, persisted preference and the
//! switching state machine.

pub mod document;
pub mod loader;
pub mod preference;
pub mod switcher;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ArkError, ArkResult};
pub use crate::store::core::DEFAULT_THEME_ID;
pub use crate::store::ThemeType;

pub use document::{Document, HeadlessDocument, LoadBehavior, StylesheetLink, THEME_ID_ATTR};
pub use loader::{load_theme, LoadOutcome};
pub use preference::{FilePreferences, MemoryPreferences, PreferenceStore, SELECTED_THEME_KEY};
pub use switcher::{SwitchOutcome, ThemePhase, ThemeSwitch, ThemeSwitcher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    /// Stylesheet location; opaque to the runtime.
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: ThemeType,
}

impl Theme {
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: ThemeType) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_THEME_ID
    }
}

/// Ordered theme catalog. Always contains the synthetic `default` theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeCatalog {
    themes: Vec<Theme>,
}

impl Default for ThemeCatalog {
    fn default() -> Self {
        Self {
            themes: vec![Theme::new(DEFAULT_THEME_ID, "", ThemeType::Light)],
        }
    }
}

impl ThemeCatalog {
    /// Append themes. All-or-nothing: on a duplicate id nothing is added.
    pub fn register<I: IntoIterator<Item = Theme>>(&mut self, themes: I) -> ArkResult<usize> {
        let themes: Vec<Theme> = themes.into_iter().collect();
        for (i, theme) in themes.iter().enumerate() {
            let dup_in_batch = themes[..i].iter().any(|t| t.id == theme.id);
            if dup_in_batch || self.get(&theme.id).is_some() {
                return Err(ArkError::DuplicateTheme {
                    id: theme.id.clone(),
                });
            }
        }
        let added = themes.len();
        self.themes.extend(themes);
        Ok(added)
    }

    pub fn get(&self, id: &str) -> Option<&Theme> {
        self.themes.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Theme> {
        self.themes.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.themes.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

/// Durations driving a theme switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeTimings {
    /// How often the loader probes the stylesheet.
    pub poll_interval: Duration,
    /// Give up on the stylesheet after this long.
    pub timeout: Duration,
    /// Wait after load before committing.
    pub settle_delay: Duration,
}

impl Default for ThemeTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(7000),
            settle_delay: Duration::from_millis(1000),
        }
    }
}
