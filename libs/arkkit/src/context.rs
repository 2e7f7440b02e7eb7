use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

use crate::client_hub::{ClientHub, ServiceClient};
use crate::config::ConfigEnvironments;
use crate::error::{ArkError, ArkResult};
use crate::registry::ActionTypes;
use crate::store::core::CoreAction;
use crate::store::{Action, CoreState, CurrentUser, Store};

/// State shared between the package runtime, module contexts and view
/// bindings. Modules never see it directly.
#[derive(Debug)]
pub(crate) struct RuntimeShared {
    pub(crate) store: OnceLock<Arc<Store>>,
    pub(crate) hub: ClientHub,
    pub(crate) config: ArcSwap<ConfigEnvironments>,
}

impl Default for RuntimeShared {
    fn default() -> Self {
        Self::new(ClientHub::default())
    }
}

impl RuntimeShared {
    pub(crate) fn new(hub: ClientHub) -> Self {
        Self {
            store: OnceLock::new(),
            hub,
            config: ArcSwap::from_pointee(ConfigEnvironments::default()),
        }
    }

    pub(crate) fn store(&self) -> Option<&Arc<Store>> {
        self.store.get()
    }

    pub(crate) fn provider(&self, name: &str) -> ArkResult<Arc<dyn ServiceClient>> {
        self.hub.get_or_create(name, &self.config.load())
    }
}

/// A module's handle on the runtime, handed to its startup hook and
/// available from its [`ModuleEntry`](crate::registry::ModuleEntry).
///
/// Cheap to clone.
#[derive(Clone)]
pub struct ModuleCtx {
    module_id: Arc<str>,
    action_types: Arc<ActionTypes>,
    runtime: Arc<RuntimeShared>,
    providers: Arc<DashMap<String, Arc<dyn ServiceClient>>>,
}

impl std::fmt::Debug for ModuleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCtx")
            .field("module_id", &self.module_id)
            .field("store_ready", &self.runtime.store().is_some())
            .field("cached_providers", &self.providers.len())
            .finish()
    }
}

impl ModuleCtx {
    pub(crate) fn new(
        module_id: &str,
        action_types: Arc<ActionTypes>,
        runtime: Arc<RuntimeShared>,
    ) -> Self {
        Self {
            module_id: Arc::from(module_id),
            action_types,
            runtime,
            providers: Arc::new(DashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.module_id
    }

    pub fn action_types(&self) -> &ActionTypes {
        &self.action_types
    }

    /// Namespaced action type for a symbolic name.
    pub fn action_type(&self, name: &str) -> Option<&str> {
        self.action_types.get(name)
    }

    /// Build an action of this module by symbolic name.
    pub fn action(&self, name: &str, payload: Value) -> ArkResult<Action> {
        let kind = self
            .action_type(name)
            .ok_or_else(|| ArkError::UnknownAction {
                module: self.module_id.to_string(),
                name: name.to_string(),
            })?;
        Ok(Action::new(kind, payload))
    }

    fn store(&self) -> ArkResult<&Arc<Store>> {
        self.runtime.store().ok_or_else(|| ArkError::StoreNotReady {
            module: self.module_id.to_string(),
        })
    }

    /// This module's slice.
    pub fn get_state<S: Send + Sync + 'static>(&self) -> ArkResult<Arc<S>> {
        self.store()?
            .get_state()
            .slice::<S>(&self.module_id)
            .ok_or_else(|| ArkError::NoStateSlice {
                module: self.module_id.to_string(),
            })
    }

    /// The core slice.
    pub fn global_state(&self) -> ArkResult<Arc<CoreState>> {
        Ok(self.store()?.get_state().core())
    }

    pub fn dispatch(&self, action: Action) -> ArkResult<Action> {
        Ok(self.store()?.dispatch(action))
    }

    /// Resolve a provider for this module. Memoized per module for the
    /// lifetime of the runtime.
    pub fn get_service_provider(&self, name: &str) -> ArkResult<Arc<dyn ServiceClient>> {
        if let Some(cached) = self.providers.get(name) {
            return Ok(cached.value().clone());
        }
        let client =
            self.runtime
                .hub
                .resolve_for_module(&self.module_id, name, &self.runtime.config.load())?;
        let client = self
            .providers
            .entry(name.to_string())
            .or_insert(client)
            .value()
            .clone();
        Ok(client)
    }

    pub fn set_current_user(&self, user: CurrentUser) -> ArkResult<()> {
        self.dispatch(CoreAction::set_current_user(user))?;
        Ok(())
    }

    /// The stored user info, whether or not the user is authenticated.
    /// `None` only before the store exists.
    pub fn current_user(&self) -> Option<Value> {
        self.global_state().ok().map(|core| core.user_info.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.global_state()
            .map(|core| core.is_authenticated)
            .unwrap_or(false)
    }

    /// Merged configuration of the active environment.
    pub fn config(&self) -> serde_json::Map<String, Value> {
        self.runtime.config.load().merged()
    }
}
