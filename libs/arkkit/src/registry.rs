// arkkit/src/registry.rs
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::{ModuleCtx, RuntimeShared};
use crate::contracts::{AppModule, Component, ComponentMap, Connector, Markup};
use crate::error::{ArkError, ArkResult};
use crate::view::{Props, StateBinding};

/// symbolic name → action type string.
///
/// Modules hand out raw values (`"ADD"`); the registry namespaces them once,
/// producing `"<module-id>-ADD"`. The namespaced table is only reachable through
/// a [`ModuleEntry`], so it can never be namespaced twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionTypes(BTreeMap<String, String>);

impl ActionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn namespaced(&self, module_id: &str) -> Self {
        Self(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), format!("{module_id}-{value}")))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ActionTypes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A registered module: the module itself plus everything computed for it at
/// registration time. Immutable once built.
pub struct ModuleEntry {
    id: String,
    module: Arc<dyn AppModule>,
    action_types: Arc<ActionTypes>,
    views: ComponentMap,
    components: ComponentMap,
    ctx: ModuleCtx,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("id", &self.id)
            .field("type", &self.module.module_type())
            .field("action_types", &self.action_types)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleEntry {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module(&self) -> &Arc<dyn AppModule> {
        &self.module
    }

    pub fn module_type(&self) -> &str {
        self.module.module_type()
    }

    pub fn action_types(&self) -> &ActionTypes {
        &self.action_types
    }

    /// Views wrapped with state injection.
    pub fn views(&self) -> &ComponentMap {
        &self.views
    }

    /// Components wrapped with state injection.
    pub fn components(&self) -> &ComponentMap {
        &self.components
    }

    pub fn ctx(&self) -> &ModuleCtx {
        &self.ctx
    }

    /// Render a view by name with the given own props.
    pub fn render_view(&self, name: &str, own: serde_json::Value) -> anyhow::Result<Markup> {
        let view = self
            .views
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("module '{}' has no view '{name}'", self.id))?;
        view.render(&Props::unbound(own))
    }
}

/// Registered modules, in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<ModuleEntry>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.ids())
            .finish()
    }
}

impl ModuleRegistry {
    /// Register `module` under `id`.
    ///
    /// Nothing is stored unless every step succeeds: a rejected module leaves
    /// the registry as it was.
    pub(crate) fn register(
        &mut self,
        id: &str,
        module: Arc<dyn AppModule>,
        connector: Option<&Arc<dyn Connector>>,
        runtime: &Arc<RuntimeShared>,
    ) -> ArkResult<Arc<ModuleEntry>> {
        if id.trim().is_empty() {
            return Err(ArkError::EmptyModuleId);
        }
        if self.index.contains_key(id) {
            return Err(ArkError::DuplicateModule { id: id.to_string() });
        }

        let action_types = Arc::new(module.action_types().namespaced(id));
        let views = module.views();
        let components = module.components();

        let (views, components) = if views.is_empty() && components.is_empty() {
            (views, components)
        } else {
            let connector = connector.ok_or_else(|| ArkError::MissingConnector {
                module: id.to_string(),
            })?;
            let binding = StateBinding::for_module(id, runtime.clone());
            (
                connect_all(connector, &binding, views),
                connect_all(connector, &binding, components),
            )
        };

        let ctx = ModuleCtx::new(id, action_types.clone(), runtime.clone());
        let entry = Arc::new(ModuleEntry {
            id: id.to_string(),
            module,
            action_types,
            views,
            components,
            ctx,
        });

        self.index.insert(id.to_string(), self.modules.len());
        self.modules.push(entry.clone());
        tracing::debug!(module = %id, r#type = %entry.module_type(), "module registered");
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModuleEntry>> {
        self.index.get(id).map(|&i| self.modules[i].clone())
    }

    /// First module (in registration order) carrying the type tag.
    pub fn by_type(&self, module_type: &str) -> Option<Arc<ModuleEntry>> {
        self.modules
            .iter()
            .find(|e| e.module_type() == module_type)
            .cloned()
    }

    pub fn entries(&self) -> &[Arc<ModuleEntry>] {
        &self.modules
    }

    pub fn ids(&self) -> Vec<&str> {
        self.modules.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn connect_all(
    connector: &Arc<dyn Connector>,
    binding: &StateBinding,
    components: ComponentMap,
) -> ComponentMap {
    components
        .into_iter()
        .map(|(name, c): (String, Arc<dyn Component>)| (name, connector.connect(binding.clone(), c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::StoreConnector;

    struct Plain;
    impl AppModule for Plain {
        fn module_type(&self) -> &str {
            "plain"
        }
        fn action_types(&self) -> ActionTypes {
            ActionTypes::new().with("ADD", "ADD").with("REMOVE", "REMOVE")
        }
    }

    struct Label;
    impl Component for Label {
        fn render(&self, props: &Props) -> anyhow::Result<Markup> {
            Ok(format!("label:{}", props.own))
        }
    }

    struct WithViews;
    impl AppModule for WithViews {
        fn module_type(&self) -> &str {
            "viewer"
        }
        fn views(&self) -> ComponentMap {
            let mut m = ComponentMap::new();
            m.insert("main".into(), Arc::new(Label) as Arc<dyn Component>);
            m
        }
    }

    fn runtime() -> Arc<RuntimeShared> {
        Arc::new(RuntimeShared::default())
    }

    #[test]
    fn action_types_are_namespaced_once() {
        let rt = runtime();
        let mut reg = ModuleRegistry::default();
        let module: Arc<dyn AppModule> = Arc::new(Plain);

        let a = reg.register("A", module.clone(), None, &rt).unwrap();
        assert_eq!(a.action_types().get("ADD"), Some("A-ADD"));
        assert_eq!(a.action_types().get("REMOVE"), Some("A-REMOVE"));

        // Same module instance under a second id: namespaced from the raw table.
        let b = reg.register("B", module, None, &rt).unwrap();
        assert_eq!(b.action_types().get("ADD"), Some("B-ADD"));
        assert!(a
            .action_types()
            .iter()
            .all(|(_, v)| v.starts_with("A-") && !v.starts_with("A-A-")));
    }

    #[test]
    fn duplicate_id_is_rejected_and_keeps_first() {
        let rt = runtime();
        let mut reg = ModuleRegistry::default();
        reg.register("A", Arc::new(Plain), None, &rt).unwrap();

        let err = reg.register("A", Arc::new(Plain), None, &rt).unwrap_err();
        assert!(matches!(err, ArkError::DuplicateModule { id } if id == "A"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("A").unwrap().action_types().get("ADD"), Some("A-ADD"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut reg = ModuleRegistry::default();
        let err = reg.register("  ", Arc::new(Plain), None, &runtime()).unwrap_err();
        assert!(matches!(err, ArkError::EmptyModuleId));
        assert!(reg.is_empty());
    }

    #[test]
    fn views_without_connector_fail_with_module_id() {
        let mut reg = ModuleRegistry::default();
        let err = reg
            .register("viewer", Arc::new(WithViews), None, &runtime())
            .unwrap_err();
        assert!(matches!(err, ArkError::MissingConnector { module } if module == "viewer"));
        assert!(reg.get("viewer").is_none());
    }

    #[test]
    fn views_are_wrapped_when_connector_present() {
        let connector: Arc<dyn Connector> = Arc::new(StoreConnector);
        let mut reg = ModuleRegistry::default();
        let entry = reg
            .register("viewer", Arc::new(WithViews), Some(&connector), &runtime())
            .unwrap();
        assert_eq!(entry.views().len(), 1);

        // No store yet: the wrapped view refuses to render instead of rendering unbound.
        let err = entry.render_view("main", serde_json::json!(1)).unwrap_err();
        assert!(err.to_string().contains("viewer"));
    }

    #[test]
    fn lookup_by_type_returns_first_in_order() {
        let rt = runtime();
        let mut reg = ModuleRegistry::default();
        reg.register("one", Arc::new(Plain), None, &rt).unwrap();
        reg.register("two", Arc::new(Plain), None, &rt).unwrap();
        assert_eq!(reg.by_type("plain").unwrap().id(), "one");
        assert!(reg.by_type("missing").is_none());
        assert_eq!(reg.ids(), vec!["one", "two"]);
    }
}
