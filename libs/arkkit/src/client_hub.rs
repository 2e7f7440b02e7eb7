//! Service providers: named, lazily created backend-call clients.
//!
//! The [`ClientHub`] memoizes one client per provider name for the lifetime of
//! the runtime. Module-level resolution consults an override table first and
//! falls back to the runtime's `"Main"` provider.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ConfigEnvironments;
use crate::error::{ArkError, ArkResult};

/// Name of the provider modules fall back to.
pub const MAIN_PROVIDER: &str = "Main";

/// A backend-call client.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn name(&self) -> &str;

    async fn get_json(&self, path: &str) -> anyhow::Result<Value>;

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value>;
}

/// Builds a client from the configuration resolved for its provider name.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, name: &str, config: &ProviderConfig) -> anyhow::Result<Arc<dyn ServiceClient>>;
}

/// Per-provider configuration, read from the top-level key named after the
/// provider in the active configuration environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default, alias = "baseUrl", alias = "baseURL")]
    pub base_url: Option<String>,
    /// Request timeout in milliseconds; none when absent.
    #[serde(default, alias = "timeout")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// What a `(module, provider)` override points at.
#[derive(Clone)]
pub enum ProviderOverride {
    /// Use this client as-is.
    Instance(Arc<dyn ServiceClient>),
    /// Resolve this runtime provider name instead.
    Named(String),
}

impl std::fmt::Debug for ProviderOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderOverride::Instance(c) => f.debug_tuple("Instance").field(&c.name()).finish(),
            ProviderOverride::Named(n) => f.debug_tuple("Named").field(n).finish(),
        }
    }
}

/// Runtime-wide provider cache and module override table.
pub struct ClientHub {
    factory: RwLock<Arc<dyn ProviderFactory>>,
    providers: DashMap<String, Arc<dyn ServiceClient>>,
    overrides: DashMap<(String, String), ProviderOverride>,
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new(Arc::new(HttpProviderFactory))
    }
}

impl std::fmt::Debug for ClientHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ClientHub")
            .field("providers", &names)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl ClientHub {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            factory: RwLock::new(factory),
            providers: DashMap::new(),
            overrides: DashMap::new(),
        }
    }

    /// Replace the factory. Already created providers are kept.
    pub fn set_factory(&self, factory: Arc<dyn ProviderFactory>) {
        *self.factory.write() = factory;
    }

    /// Cached provider `name`, created on first use.
    pub fn get_or_create(
        &self,
        name: &str,
        config: &ConfigEnvironments,
    ) -> ArkResult<Arc<dyn ServiceClient>> {
        if let Some(existing) = self.providers.get(name) {
            return Ok(existing.value().clone());
        }

        let provider_config = config.provider_config(name)?;
        let factory = self.factory.read().clone();

        // The entry lock makes concurrent first calls agree on one instance.
        let entry = self.providers.entry(name.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(o) => Ok(o.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let client = factory.create(name, &provider_config).map_err(|source| {
                    ArkError::ProviderConfig {
                        provider: name.to_string(),
                        source,
                    }
                })?;
                tracing::debug!(provider = %name, "service provider created");
                v.insert(client.clone());
                Ok(client)
            }
        }
    }

    pub fn set_override(&self, module: &str, provider: &str, target: ProviderOverride) {
        self.overrides
            .insert((module.to_string(), provider.to_string()), target);
    }

    /// Resolution for a module: its override if declared, else `"Main"`.
    pub fn resolve_for_module(
        &self,
        module: &str,
        provider: &str,
        config: &ConfigEnvironments,
    ) -> ArkResult<Arc<dyn ServiceClient>> {
        let target = self
            .overrides
            .get(&(module.to_string(), provider.to_string()))
            .map(|o| o.value().clone());
        match target {
            Some(ProviderOverride::Instance(client)) => Ok(client),
            Some(ProviderOverride::Named(name)) => self.get_or_create(&name, config),
            None => self.get_or_create(MAIN_PROVIDER, config),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Default factory: JSON over HTTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, name: &str, config: &ProviderConfig) -> anyhow::Result<Arc<dyn ServiceClient>> {
        Ok(Arc::new(HttpServiceClient::new(name, config)?))
    }
}

/// reqwest-backed [`ServiceClient`].
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    name: String,
    base_url: Option<String>,
    client: reqwest::Client,
}

impl HttpServiceClient {
    pub fn new(name: &str, config: &ProviderConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (k, v) in &config.headers {
            let key = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid header name '{k}': {e}"))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| anyhow::anyhow!("invalid value for header '{k}': {e}"))?;
            headers.insert(key, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;

        if let Some(base) = &config.base_url {
            Url::parse(base).map_err(|e| anyhow::anyhow!("invalid baseUrl '{base}': {e}"))?;
        }

        Ok(Self {
            name: name.to_string(),
            base_url: config.base_url.clone(),
            client,
        })
    }

    /// Absolute paths pass through; relative ones are appended to the base URL.
    fn url(&self, path: &str) -> anyhow::Result<Url> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("provider '{}' has no baseUrl for relative path '{path}'", self.name)
        })?;
        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error: {status}");
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = self.url(path)?;
        tracing::trace!(provider = %self.name, %url, "GET");
        let response = self.client.get(url).send().await?;
        Self::read_json(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = self.url(path)?;
        tracing::trace!(provider = %self.name, %url, "POST");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;
        Self::read_json(response).await
    }
}
