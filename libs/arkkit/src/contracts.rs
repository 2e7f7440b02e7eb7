use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::ModuleCtx;
use crate::registry::ActionTypes;
use crate::store::Reducer;
use crate::view::{Props, StateBinding};

/// Rendered output of a component. Opaque to the runtime.
pub type Markup = String;

/// A UI component, rendered by the host's component library.
pub trait Component: Send + Sync {
    fn render(&self, props: &Props) -> anyhow::Result<Markup>;
}

/// name → component
pub type ComponentMap = BTreeMap<String, Arc<dyn Component>>;

/// View-binding adapter: wraps a component so that it receives the current
/// global (core) state and, when bound to a module, that module's slice.
pub trait Connector: Send + Sync {
    fn connect(&self, binding: StateBinding, component: Arc<dyn Component>) -> Arc<dyn Component>;
}

/// A pluggable application module.
///
/// The runtime only talks to modules through this trait. Everything a module
/// hands out here is read once, at registration time.
#[async_trait]
pub trait AppModule: Send + Sync + 'static {
    /// Type tag; not required to be unique.
    fn module_type(&self) -> &str;

    /// symbolic name → raw action name, before namespacing.
    fn action_types(&self) -> ActionTypes {
        ActionTypes::default()
    }

    fn views(&self) -> ComponentMap {
        ComponentMap::new()
    }

    fn components(&self) -> ComponentMap {
        ComponentMap::new()
    }

    /// Reducer of this module's slice; modules without state return `None`.
    ///
    /// `action_types` are this module's action types as registered, already
    /// namespaced, so the reducer can match on the values dispatched at runtime.
    fn reducer(&self, _action_types: &ActionTypes) -> Option<Arc<dyn Reducer>> {
        None
    }

    /// Whether the runtime should fetch server context during initialization.
    fn initialize_server_context(&self) -> bool {
        false
    }

    /// Startup hook, run once after the store exists, in registration order.
    async fn main(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}
