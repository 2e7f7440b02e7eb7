//! Configuration environments.
//!
//! A `"default"` environment always exists; other environments are partial
//! overlays. The active one is shallow-merged over `"default"`: a top-level key
//! in the overlay replaces the whole default value for that key.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::client_hub::ProviderConfig;
use crate::error::{ArkError, ArkResult};

pub const DEFAULT_ENVIRONMENT: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEnvironments {
    environments: HashMap<String, Map<String, Value>>,
    mode: String,
}

impl Default for ConfigEnvironments {
    fn default() -> Self {
        let mut environments = HashMap::new();
        environments.insert(DEFAULT_ENVIRONMENT.to_string(), Map::new());
        Self {
            environments,
            mode: DEFAULT_ENVIRONMENT.to_string(),
        }
    }
}

impl ConfigEnvironments {
    /// Build from raw JSON values; every environment must be an object.
    pub fn from_values(values: HashMap<String, Value>) -> ArkResult<Self> {
        let mut envs = Self::default();
        for (name, value) in values {
            match value {
                Value::Object(map) => envs.set(name, map),
                Value::Null => envs.set(name, Map::new()),
                _ => return Err(ArkError::InvalidEnvironment { name }),
            }
        }
        Ok(envs)
    }

    pub fn set(&mut self, name: impl Into<String>, values: Map<String, Value>) {
        self.environments.insert(name.into(), values);
    }

    pub fn with(mut self, name: impl Into<String>, values: Map<String, Value>) -> Self {
        self.set(name, values);
        self
    }

    /// Select the active environment. An unknown name is allowed and behaves
    /// as an empty overlay.
    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
        if !self.environments.contains_key(&self.mode) {
            tracing::warn!(mode = %self.mode, "active config environment is not declared; using defaults only");
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.environments.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `default` overlaid by the active environment.
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self
            .environments
            .get(DEFAULT_ENVIRONMENT)
            .cloned()
            .unwrap_or_default();
        if self.mode != DEFAULT_ENVIRONMENT {
            if let Some(overlay) = self.environments.get(&self.mode) {
                for (k, v) in overlay {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }

    /// Deserialize the merged configuration into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> ArkResult<T> {
        serde_json::from_value(Value::Object(self.merged())).map_err(ArkError::InvalidConfig)
    }

    /// Configuration of provider `name`: the top-level key of the same name,
    /// or the empty configuration when none is declared.
    pub fn provider_config(&self, name: &str) -> ArkResult<ProviderConfig> {
        match self.merged().remove(name) {
            None | Some(Value::Null) => Ok(ProviderConfig::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| ArkError::ProviderConfig {
                provider: name.to_string(),
                source: e.into(),
            }),
        }
    }
}
