//! View binding: injecting store state into components at render time.

use serde_json::Value;
use std::sync::Arc;

use crate::context::RuntimeShared;
use crate::contracts::{Component, Connector, Markup};
use crate::error::{ArkError, ArkResult};
use crate::store::{CoreState, SliceState, CORE_PACKAGE_ID};

/// Props a component receives.
#[derive(Clone)]
pub struct Props {
    /// The core slice.
    pub global: Arc<CoreState>,
    /// The owning module's slice, when bound to a module that has one.
    pub context: Option<SliceState>,
    pub module_id: Option<String>,
    /// Props passed by the caller.
    pub own: Value,
}

impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("module_id", &self.module_id)
            .field("has_context", &self.context.is_some())
            .field("own", &self.own)
            .finish()
    }
}

impl Props {
    /// Props with no store state attached.
    pub fn unbound(own: Value) -> Self {
        Self {
            global: Arc::new(CoreState::default()),
            context: None,
            module_id: None,
            own,
        }
    }

    /// Typed module slice.
    pub fn context_as<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.context
            .as_ref()
            .and_then(|c| Arc::clone(c).downcast::<S>().ok())
    }
}

/// Which state a connected component reads: the core slice, plus one
/// module's slice when bound to a module.
#[derive(Clone)]
pub struct StateBinding {
    module_id: Option<String>,
    runtime: Arc<RuntimeShared>,
}

impl std::fmt::Debug for StateBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBinding")
            .field("module_id", &self.module_id)
            .finish()
    }
}

impl StateBinding {
    pub(crate) fn for_module(module_id: &str, runtime: Arc<RuntimeShared>) -> Self {
        Self {
            module_id: Some(module_id.to_string()),
            runtime,
        }
    }

    pub(crate) fn global(runtime: Arc<RuntimeShared>) -> Self {
        Self {
            module_id: None,
            runtime,
        }
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    /// Current `(global, context)` pair.
    pub fn select(&self) -> ArkResult<(Arc<CoreState>, Option<SliceState>)> {
        let store = self.runtime.store().ok_or_else(|| ArkError::StoreNotReady {
            module: self
                .module_id
                .clone()
                .unwrap_or_else(|| CORE_PACKAGE_ID.to_string()),
        })?;
        let state = store.get_state();
        let context = self.module_id.as_deref().and_then(|id| state.raw_slice(id));
        Ok((state.core(), context))
    }

    /// Props for one render, merging the selected state with `own`.
    pub fn props(&self, own: Value) -> ArkResult<Props> {
        let (global, context) = self.select()?;
        Ok(Props {
            global,
            context,
            module_id: self.module_id.clone(),
            own,
        })
    }
}

/// Bundled connector: reads the store on every render.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreConnector;

impl Connector for StoreConnector {
    fn connect(&self, binding: StateBinding, component: Arc<dyn Component>) -> Arc<dyn Component> {
        Arc::new(Connected {
            binding,
            inner: component,
        })
    }
}

struct Connected {
    binding: StateBinding,
    inner: Arc<dyn Component>,
}

impl Component for Connected {
    fn render(&self, props: &Props) -> anyhow::Result<Markup> {
        let props = self.binding.props(props.own.clone())?;
        self.inner.render(&props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{reducer_fn, Action, CoreReducer, Reducer, Store};

    struct Echo;
    impl Component for Echo {
        fn render(&self, props: &Props) -> anyhow::Result<Markup> {
            let count = props.context_as::<u32>().map(|c| *c).unwrap_or_default();
            Ok(format!(
                "{}|{}|{}",
                props.global.current_theme_id, count, props.own
            ))
        }
    }

    fn runtime_with_store() -> Arc<RuntimeShared> {
        let runtime = Arc::new(RuntimeShared::default());
        let reducers: Vec<(String, Arc<dyn Reducer>)> = vec![
            (CORE_PACKAGE_ID.to_string(), Arc::new(CoreReducer)),
            (
                "clicks".to_string(),
                reducer_fn(0u32, |n: &u32, a| (a.kind == "clicks-HIT").then_some(n + 1)),
            ),
        ];
        let _ = runtime.store.set(Arc::new(Store::new(reducers, false)));
        runtime
    }

    #[test]
    fn connected_component_sees_current_state() {
        let runtime = runtime_with_store();
        let view = StoreConnector.connect(
            StateBinding::for_module("clicks", runtime.clone()),
            Arc::new(Echo),
        );

        let own = serde_json::json!("x");
        assert_eq!(view.render(&Props::unbound(own.clone())).unwrap(), "default|0|\"x\"");

        if let Some(store) = runtime.store() {
            store.dispatch(Action::bare("clicks-HIT"));
        }
        assert_eq!(view.render(&Props::unbound(own)).unwrap(), "default|1|\"x\"");
    }

    #[test]
    fn global_binding_has_no_context() {
        let runtime = runtime_with_store();
        let props = StateBinding::global(runtime)
            .props(Value::Null)
            .unwrap();
        assert!(props.context.is_none());
        assert!(props.module_id.is_none());
    }

    #[test]
    fn binding_without_store_fails() {
        let binding = StateBinding::global(Arc::new(RuntimeShared::default()));
        assert!(matches!(
            binding.select().unwrap_err(),
            ArkError::StoreNotReady { module } if module == CORE_PACKAGE_ID
        ));
    }
}
