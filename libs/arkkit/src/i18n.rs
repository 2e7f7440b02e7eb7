//! Internationalization bootstrap.
//!
//! The translation engine itself is a collaborator behind [`I18nEngine`]; the
//! runtime only attaches it, starts it during `initialize` and forwards
//! lookups. [`StaticI18n`] is an in-memory engine over the option resources.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{ArkError, ArkResult};

/// language → namespace → key → text
pub type Resources = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

pub const DEFAULT_NAMESPACE: &str = "translation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpolation {
    pub escape_value: bool,
}

/// Engine options. Unknown keys are kept and handed to the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct I18nOptions {
    pub resources: Resources,
    pub lng: String,
    pub fallback_lng: String,
    /// `false` disables nested keys.
    pub key_separator: Value,
    pub interpolation: Interpolation,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for I18nOptions {
    fn default() -> Self {
        let mut translation = BTreeMap::new();
        translation.insert(
            "Translation Test".to_string(),
            "Translation Test [DONE]".to_string(),
        );
        let mut en = BTreeMap::new();
        en.insert(DEFAULT_NAMESPACE.to_string(), translation);
        let mut resources = BTreeMap::new();
        resources.insert("en".to_string(), en);

        Self {
            resources,
            lng: "en".to_string(),
            fallback_lng: "en".to_string(),
            key_separator: Value::Bool(false),
            interpolation: Interpolation {
                escape_value: false,
            },
            extra: Map::new(),
        }
    }
}

impl I18nOptions {
    /// Defaults with `overrides` applied key by key at the top level; an
    /// overriding key replaces the default value for that key entirely.
    pub fn with_overrides(overrides: Option<&Value>) -> ArkResult<Self> {
        let Some(overrides) = overrides else {
            return Ok(Self::default());
        };
        let Value::Object(overrides) = overrides else {
            return Err(ArkError::InvalidEnvironment {
                name: "i18n".to_string(),
            });
        };
        let mut base = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (k, v) in overrides {
            base.insert(k.clone(), v.clone());
        }
        serde_json::from_value(Value::Object(base)).map_err(ArkError::InvalidConfig)
    }
}

/// A translation engine.
#[async_trait]
pub trait I18nEngine: Send + Sync {
    /// Start the engine. Called once by `initialize`; an error aborts it.
    async fn init(&self, options: &I18nOptions) -> anyhow::Result<()>;

    /// Translate `key`; unknown keys come back unchanged.
    fn translate(&self, key: &str) -> String;

    fn language(&self) -> Option<String>;
}

/// In-memory engine over `I18nOptions::resources`: flat keys in the default
/// namespace only.
#[derive(Debug, Default)]
pub struct StaticI18n {
    options: RwLock<Option<I18nOptions>>,
}

impl StaticI18n {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(options: &I18nOptions, lng: &str, key: &str) -> Option<String> {
        options
            .resources
            .get(lng)?
            .get(DEFAULT_NAMESPACE)?
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl I18nEngine for StaticI18n {
    async fn init(&self, options: &I18nOptions) -> anyhow::Result<()> {
        if !options.resources.contains_key(&options.lng)
            && !options.resources.contains_key(&options.fallback_lng)
        {
            anyhow::bail!(
                "no resources for language '{}' or fallback '{}'",
                options.lng,
                options.fallback_lng
            );
        }
        tracing::debug!(lng = %options.lng, languages = options.resources.len(), "i18n engine ready");
        *self.options.write() = Some(options.clone());
        Ok(())
    }

    fn translate(&self, key: &str) -> String {
        let guard = self.options.read();
        let Some(options) = guard.as_ref() else {
            return key.to_string();
        };
        Self::lookup(options, &options.lng, key)
            .or_else(|| Self::lookup(options, &options.fallback_lng, key))
            .unwrap_or_else(|| key.to_string())
    }

    fn language(&self) -> Option<String> {
        self.options.read().as_ref().map(|o| o.lng.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_bootstrap_options() {
        let opts = I18nOptions::default();
        assert_eq!(opts.lng, "en");
        assert_eq!(opts.fallback_lng, "en");
        assert_eq!(opts.key_separator, json!(false));
        assert!(!opts.interpolation.escape_value);
        assert_eq!(
            opts.resources["en"]["translation"]["Translation Test"],
            "Translation Test [DONE]"
        );
    }

    #[test]
    fn overrides_replace_top_level_keys_only() {
        let opts = I18nOptions::with_overrides(Some(&json!({
            "lng": "de",
            "resources": { "de": { "translation": { "hello": "hallo" } } },
            "debug": true
        })))
        .unwrap();
        assert_eq!(opts.lng, "de");
        assert_eq!(opts.fallback_lng, "en");
        // resources replaced wholesale
        assert!(!opts.resources.contains_key("en"));
        assert_eq!(opts.extra["debug"], json!(true));
    }

    #[test]
    fn non_object_overrides_rejected() {
        assert!(I18nOptions::with_overrides(Some(&json!("en"))).is_err());
        assert_eq!(I18nOptions::with_overrides(None).unwrap(), I18nOptions::default());
    }

    #[tokio::test]
    async fn static_engine_translates_with_fallback() {
        let mut opts = I18nOptions::default();
        opts.lng = "de".into();
        opts.resources.insert(
            "de".into(),
            [(
                DEFAULT_NAMESPACE.to_string(),
                [("hello".to_string(), "hallo".to_string())].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        );

        let engine = StaticI18n::new();
        assert_eq!(engine.translate("hello"), "hello");

        engine.init(&opts).await.unwrap();
        assert_eq!(engine.language().as_deref(), Some("de"));
        assert_eq!(engine.translate("hello"), "hallo");
        assert_eq!(engine.translate("Translation Test"), "Translation Test [DONE]");
        assert_eq!(engine.translate("missing"), "missing");
    }

    #[tokio::test]
    async fn init_fails_without_usable_resources() {
        let mut opts = I18nOptions::default();
        opts.resources.clear();
        assert!(StaticI18n::new().init(&opts).await.is_err());
    }
}
