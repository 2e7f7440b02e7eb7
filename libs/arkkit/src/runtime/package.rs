//! The package runtime: composition root of an application.

use arkkit_bootstrap::AppConfig;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{PackageOptions, RuntimeMode};
use crate::client_hub::{ClientHub, HttpProviderFactory, ProviderFactory, ProviderOverride, ServiceClient};
use crate::config::ConfigEnvironments;
use crate::context::RuntimeShared;
use crate::contracts::{AppModule, Component, Connector, Markup};
use crate::error::{ArkError, ArkResult};
use crate::i18n::{I18nEngine, I18nOptions};
use crate::registry::{ModuleEntry, ModuleRegistry};
use crate::store::core::{AlertKind, CoreAction};
use crate::store::{AlertRecord, CoreReducer, CurrentUser, Reducer, Store, CORE_PACKAGE_ID};
use crate::theme::{
    Document, HeadlessDocument, MemoryPreferences, PreferenceStore, Theme, ThemeCatalog,
    ThemePhase, ThemeSwitch, ThemeSwitcher, ThemeType, DEFAULT_THEME_ID,
};
use crate::view::{Props, StateBinding};

/// Builder for [`Package`]. Collaborators left unset get in-memory defaults.
pub struct PackageBuilder {
    options: PackageOptions,
    document: Option<Arc<dyn Document>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    provider_factory: Option<Arc<dyn ProviderFactory>>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self {
            options: PackageOptions::default(),
            document: None,
            preferences: None,
            provider_factory: None,
        }
    }
}

impl PackageBuilder {
    pub fn options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn document(mut self, document: Arc<dyn Document>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn provider_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.provider_factory = Some(factory);
        self
    }

    pub fn build(self) -> Arc<Package> {
        let document = self
            .document
            .unwrap_or_else(|| Arc::new(HeadlessDocument::default()));
        let preferences = self
            .preferences
            .unwrap_or_else(|| Arc::new(MemoryPreferences::new()));
        let factory = self
            .provider_factory
            .unwrap_or_else(|| Arc::new(HttpProviderFactory));

        let shared = Arc::new(RuntimeShared::new(ClientHub::new(factory)));
        let switcher = Arc::new(ThemeSwitcher::new(
            document,
            preferences,
            self.options.theme_timings,
        ));

        Arc::new(Package {
            registry: RwLock::new(ModuleRegistry::default()),
            shared,
            themes: RwLock::new(ThemeCatalog::default()),
            switcher,
            connector: RwLock::new(None),
            content: Arc::new(RwLock::new(None)),
            frame: OnceLock::new(),
            i18n: RwLock::new(None),
            mode: OnceLock::new(),
            initializing: AtomicBool::new(false),
            options: self.options,
            shutdown: CancellationToken::new(),
            context_task: Mutex::new(None),
            restored_theme: Mutex::new(None),
        })
    }
}

/// Composition root: owns modules, the shared store, the theme catalog and
/// state machine, configuration environments and service providers.
///
/// Constructed once by the host and passed around as `Arc<Package>`.
pub struct Package {
    registry: RwLock<ModuleRegistry>,
    pub(super) shared: Arc<RuntimeShared>,
    themes: RwLock<ThemeCatalog>,
    switcher: Arc<ThemeSwitcher>,
    pub(super) connector: RwLock<Option<Arc<dyn Connector>>>,
    content: Arc<RwLock<Option<Arc<dyn Component>>>>,
    pub(super) frame: OnceLock<Arc<dyn Component>>,
    pub(super) i18n: RwLock<Option<(Arc<dyn I18nEngine>, I18nOptions)>>,
    pub(super) mode: OnceLock<RuntimeMode>,
    pub(super) initializing: AtomicBool,
    pub(super) options: PackageOptions,
    pub(super) shutdown: CancellationToken,
    pub(super) context_task: Mutex<Option<JoinHandle<()>>>,
    pub(super) restored_theme: Mutex<Option<ThemeSwitch>>,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("modules", &self.registry.read().ids())
            .field("themes", &self.themes.read().ids())
            .field("mode", &self.mode.get())
            .field("store_ready", &self.shared.store().is_some())
            .finish()
    }
}

impl Package {
    pub fn builder() -> PackageBuilder {
        PackageBuilder::default()
    }

    /// Package with in-memory collaborators and default options.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub(super) fn is_started(&self) -> bool {
        self.mode.get().is_some() || self.initializing.load(std::sync::atomic::Ordering::SeqCst)
    }

    // ---- wiring ---------------------------------------------------------

    /// Attach the i18n engine; `options` default to [`I18nOptions::default`].
    pub fn use_i18n(&self, engine: Arc<dyn I18nEngine>, options: Option<I18nOptions>) -> &Self {
        *self.i18n.write() = Some((engine, options.unwrap_or_default()));
        self
    }

    /// Connector used to wrap module views at registration time.
    pub fn use_connector(&self, connector: Arc<dyn Connector>) -> &Self {
        *self.connector.write() = Some(connector);
        self
    }

    /// Top-level content rendered inside the frame.
    pub fn set_content(&self, content: Arc<dyn Component>) -> &Self {
        *self.content.write() = Some(content);
        self
    }

    /// The application frame, available after `initialize`.
    pub fn frame(&self) -> Option<Arc<dyn Component>> {
        self.frame.get().cloned()
    }

    pub(super) fn build_frame(&self) -> Arc<dyn Component> {
        let frame: Arc<dyn Component> = Arc::new(Frame {
            content: self.content.clone(),
        });
        match self.connector.read().as_ref() {
            Some(connector) => connector.connect(StateBinding::global(self.shared.clone()), frame),
            None => frame,
        }
    }

    /// Replace the configuration environments.
    pub fn configure_environments(&self, environments: ConfigEnvironments) {
        self.shared.config.store(Arc::new(environments));
    }

    /// Select the active configuration environment.
    pub fn set_config_mode(&self, mode: &str) {
        self.shared.config.rcu(|current| {
            let mut next = ConfigEnvironments::clone(current);
            next.set_mode(mode);
            next
        });
    }

    /// Apply environments, provider overrides and the theme catalog from the
    /// host configuration.
    pub fn configure_from(&self, cfg: &AppConfig) -> ArkResult<()> {
        let mut environments = ConfigEnvironments::from_values(cfg.package.environments.clone())?;
        environments.set_mode(cfg.package.environment.clone());
        self.configure_environments(environments);

        for (module, overrides) in &cfg.package.provider_overrides {
            for (provider, target) in overrides {
                self.override_module_provider(module, provider, ProviderOverride::Named(target.clone()));
            }
        }

        let themes = cfg
            .themes
            .catalog
            .iter()
            .map(|t| {
                Ok(Theme::new(
                    t.id.clone(),
                    t.url.clone(),
                    t.kind.parse::<ThemeType>()?,
                ))
            })
            .collect::<ArkResult<Vec<_>>>()?;
        if !themes.is_empty() {
            self.register_themes(themes)?;
        }
        Ok(())
    }

    // ---- modules --------------------------------------------------------

    /// Register `module` under `id`. Fails on an empty or duplicate id, on
    /// views without a connector, and once initialization has started.
    pub fn register_module(&self, id: &str, module: Arc<dyn AppModule>) -> ArkResult<Arc<ModuleEntry>> {
        if self.is_started() {
            return Err(ArkError::AlreadyInitialized);
        }
        let connector = self.connector.read().clone();
        self.registry
            .write()
            .register(id, module, connector.as_ref(), &self.shared)
    }

    pub fn module(&self, id: &str) -> Option<Arc<ModuleEntry>> {
        self.registry.read().get(id)
    }

    pub fn module_by_type(&self, module_type: &str) -> Option<Arc<ModuleEntry>> {
        self.registry.read().by_type(module_type)
    }

    pub fn modules(&self) -> Vec<Arc<ModuleEntry>> {
        self.registry.read().entries().to_vec()
    }

    // ---- store ----------------------------------------------------------

    /// Create the shared store on first call; later calls return it unchanged.
    pub fn setup_store(&self, dev_tools: bool) -> Arc<Store> {
        self.shared
            .store
            .get_or_init(|| {
                let registry = self.registry.read();
                let mut reducers: Vec<(String, Arc<dyn Reducer>)> =
                    vec![(CORE_PACKAGE_ID.to_string(), Arc::new(CoreReducer))];
                for entry in registry.entries() {
                    if let Some(reducer) = entry.module().reducer(entry.action_types()) {
                        reducers.push((entry.id().to_string(), reducer));
                    }
                }
                if reducers.len() == 1 {
                    tracing::warn!(
                        "none of the registered modules provides a reducer; the store only holds the core slice"
                    );
                }
                tracing::debug!(slices = reducers.len(), dev_tools, "store created");
                Arc::new(Store::new(reducers, dev_tools))
            })
            .clone()
    }

    pub fn store(&self) -> Option<Arc<Store>> {
        self.shared.store().cloned()
    }

    fn require_store(&self, operation: &'static str) -> ArkResult<&Arc<Store>> {
        self.shared
            .store()
            .ok_or(ArkError::NotInitialized { operation })
    }

    pub fn mode(&self) -> Option<RuntimeMode> {
        self.mode.get().copied()
    }

    // ---- auth -----------------------------------------------------------

    pub fn is_authenticated(&self) -> bool {
        self.shared
            .store()
            .map(|s| s.get_state().core().is_authenticated)
            .unwrap_or(false)
    }

    pub fn set_current_user(&self, user: CurrentUser) -> ArkResult<()> {
        self.require_store("set_current_user")?
            .dispatch(CoreAction::set_current_user(user));
        Ok(())
    }

    // ---- alerts ---------------------------------------------------------

    fn show_alert(
        &self,
        operation: &'static str,
        kind: AlertKind,
        message: &str,
        title: Option<&str>,
        can_close_manually: bool,
    ) -> ArkResult<()> {
        let store = self.require_store(operation)?;
        store.dispatch(CoreAction::set_alert(
            kind,
            AlertRecord {
                is_open: true,
                title: title.map(str::to_string),
                message: Some(message.to_string()),
                can_close_manually,
            },
        ));
        Ok(())
    }

    /// Open the message alert. Closable by the user unless told otherwise.
    pub fn show_message(&self, message: &str, title: Option<&str>, can_close_manually: Option<bool>) -> ArkResult<()> {
        self.show_alert(
            "show_message",
            AlertKind::Message,
            message,
            title,
            can_close_manually.unwrap_or(true),
        )
    }

    /// Open the wait alert. Not closable by the user unless told otherwise.
    pub fn show_wait(&self, message: &str, title: Option<&str>, can_close_manually: Option<bool>) -> ArkResult<()> {
        self.show_alert(
            "show_wait",
            AlertKind::Wait,
            message,
            title,
            can_close_manually.unwrap_or(false),
        )
    }

    /// Open the error alert. Closable by the user unless told otherwise.
    pub fn show_error(&self, message: &str, title: Option<&str>, can_close_manually: Option<bool>) -> ArkResult<()> {
        self.show_alert(
            "show_error",
            AlertKind::Error,
            message,
            title,
            can_close_manually.unwrap_or(true),
        )
    }

    /// Close all three alerts, keeping their content.
    pub fn clear_alert(&self) -> ArkResult<()> {
        self.require_store("clear_alert")?
            .dispatch(CoreAction::clear_alert());
        Ok(())
    }

    // ---- config and providers ------------------------------------------

    /// `default` environment overlaid by the active one.
    pub fn get_config(&self) -> Map<String, Value> {
        self.shared.config.load().merged()
    }

    pub fn config_as<T: DeserializeOwned>(&self) -> ArkResult<T> {
        self.shared.config.load().config_as()
    }

    /// Runtime provider `name`, created on first use and cached for good.
    pub fn get_service_provider(&self, name: &str) -> ArkResult<Arc<dyn ServiceClient>> {
        self.shared.provider(name)
    }

    /// Route `provider` requests of `module` elsewhere.
    pub fn override_module_provider(&self, module: &str, provider: &str, target: ProviderOverride) {
        tracing::debug!(module, provider, ?target, "provider override");
        self.shared.hub.set_override(module, provider, target);
    }

    // ---- themes ---------------------------------------------------------

    /// Append themes to the catalog; only allowed before `initialize`.
    pub fn register_themes<I: IntoIterator<Item = Theme>>(&self, themes: I) -> ArkResult<()> {
        if self.is_started() {
            return Err(ArkError::AlreadyInitialized);
        }
        let added = self.themes.write().register(themes)?;
        tracing::debug!(added, "themes registered");
        Ok(())
    }

    pub fn themes(&self) -> Vec<Theme> {
        self.themes.read().iter().cloned().collect()
    }

    /// Switch theme.
    ///
    /// `"default"` switches synchronously. Any other id must be in the
    /// catalog; the returned handle resolves once the switch commits, rolls
    /// back or is superseded.
    pub fn set_theme(&self, id: &str) -> ArkResult<ThemeSwitch> {
        if self.mode.get().is_none() {
            return Err(ArkError::NotInitialized { operation: "set_theme" });
        }
        let store = self.require_store("set_theme")?.clone();

        if id == DEFAULT_THEME_ID {
            return Ok(self.switcher.switch_to_default(&store));
        }
        let theme = self
            .themes
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ArkError::ThemeNotRegistered { id: id.to_string() })?;
        self.switcher.switch_to(store, theme)
    }

    pub fn theme_phase(&self) -> ThemePhase {
        self.switcher.phase()
    }

    pub(super) fn switcher(&self) -> &Arc<ThemeSwitcher> {
        &self.switcher
    }

    /// The switch started by `initialize` to restore the saved theme, if any.
    pub fn take_restored_theme(&self) -> Option<ThemeSwitch> {
        self.restored_theme.lock().take()
    }

    // ---- i18n -----------------------------------------------------------

    pub fn translate(&self, key: &str) -> String {
        match self.i18n.read().as_ref() {
            Some((engine, _)) => engine.translate(key),
            None => key.to_string(),
        }
    }
}

/// Renders the top-level content, or nothing when none is set.
struct Frame {
    content: Arc<RwLock<Option<Arc<dyn Component>>>>,
}

impl Component for Frame {
    fn render(&self, props: &Props) -> anyhow::Result<Markup> {
        let content = self.content.read().clone();
        match content {
            Some(content) => content.render(props),
            None => Ok(Markup::new()),
        }
    }
}
