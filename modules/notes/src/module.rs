use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use arkkit::{async_trait, ActionTypes, AppModule, ComponentMap, ModuleCtx, Reducer, MAIN_PROVIDER};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::NotesConfig;
use crate::state::{self, NotesState};
use crate::views::{NoteCount, NoteList};

pub const MODULE_TYPE: &str = "notes";

/// A small note-taking module: one slice, a list view and a count badge.
pub struct NotesModule {
    // Filled by `main`; read-mostly afterwards.
    config: ArcSwapOption<NotesConfig>,
    max_notes: Arc<AtomicUsize>,
    server_context: bool,
}

impl Default for NotesModule {
    fn default() -> Self {
        Self {
            config: ArcSwapOption::from(None),
            max_notes: Arc::new(AtomicUsize::new(NotesConfig::default().max_notes)),
            server_context: false,
        }
    }
}

impl NotesModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the runtime to fetch server context during initialization.
    pub fn with_server_context(mut self, enabled: bool) -> Self {
        self.server_context = enabled;
        self
    }

    /// Configuration applied by the startup hook, if it has run.
    pub fn config(&self) -> Option<Arc<NotesConfig>> {
        self.config.load_full()
    }

    async fn load_remote(&self, ctx: &ModuleCtx, path: &str) -> anyhow::Result<usize> {
        let client = ctx.get_service_provider(MAIN_PROVIDER)?;
        let body = client.get_json(path).await?;
        let count = match &body {
            Value::Array(items) => items.len(),
            other => anyhow::bail!("expected a JSON array of notes, got {other}"),
        };
        ctx.dispatch(ctx.action(state::LOADED, body)?)?;
        Ok(count)
    }
}

#[async_trait]
impl AppModule for NotesModule {
    fn module_type(&self) -> &str {
        MODULE_TYPE
    }

    fn action_types(&self) -> ActionTypes {
        state::action_types()
    }

    fn views(&self) -> ComponentMap {
        let mut views = ComponentMap::new();
        views.insert("list".to_string(), Arc::new(NoteList));
        views
    }

    fn components(&self) -> ComponentMap {
        let mut components = ComponentMap::new();
        components.insert("count".to_string(), Arc::new(NoteCount));
        components
    }

    fn reducer(&self, action_types: &ActionTypes) -> Option<Arc<dyn Reducer>> {
        state::reducer(action_types, self.max_notes.clone())
    }

    fn initialize_server_context(&self) -> bool {
        self.server_context
    }

    async fn main(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!(module = %ctx.id(), "Initializing notes module");

        let cfg = NotesConfig::from_environment(&ctx.config())?;
        debug!(
            seed = cfg.seed.len(),
            max_notes = cfg.max_notes,
            remote = ?cfg.remote_path,
            "Loaded notes config"
        );
        self.max_notes.store(cfg.max_notes, Ordering::Relaxed);

        for text in &cfg.seed {
            ctx.dispatch(ctx.action(state::ADD, Value::String(text.clone()))?)?;
        }

        // remote load failures are not fatal
        if let Some(path) = &cfg.remote_path {
            match self.load_remote(ctx, path).await {
                Ok(count) => info!(count, %path, "Loaded remote notes"),
                Err(e) => warn!(%path, error = %e, "Remote notes unavailable"),
            }
        }

        let notes = ctx.get_state::<NotesState>()?;
        self.config.store(Some(Arc::new(cfg)));
        info!(notes = notes.items.len(), "Notes module ready");
        Ok(())
    }
}
