//! Shared state store.
//!
//! One store per package runtime. State is partitioned into named slices, each
//! owned by one reducer; the whole state is replaced atomically on every dispatch
//! and never mutated in place.

pub mod core;

use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use self::core::{
    AlertRecord, CoreReducer, CoreState, CurrentUser, ThemeType, CORE_PACKAGE_ID,
};

/// A dispatched action. `kind` is the runtime-qualified type string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Action {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Action without payload.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::Null)
    }
}

/// Type-erased state of a single slice.
pub type SliceState = Arc<dyn Any + Send + Sync>;

/// Reduces one slice of the store.
pub trait Reducer: Send + Sync {
    fn initial_state(&self) -> SliceState;

    /// Return the next state. Returning a clone of `state` means "unchanged".
    fn reduce(&self, state: &SliceState, action: &Action) -> SliceState;
}

struct FnReducer<S, F> {
    initial: S,
    reduce: F,
}

impl<S, F> Reducer for FnReducer<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(&S, &Action) -> Option<S> + Send + Sync,
{
    fn initial_state(&self) -> SliceState {
        Arc::new(self.initial.clone())
    }

    fn reduce(&self, state: &SliceState, action: &Action) -> SliceState {
        match state.downcast_ref::<S>() {
            Some(typed) => match (self.reduce)(typed, action) {
                Some(next) => Arc::new(next),
                None => state.clone(),
            },
            None => {
                tracing::warn!(
                    action = %action.kind,
                    "slice state has an unexpected type; leaving it untouched"
                );
                state.clone()
            }
        }
    }
}

/// Adapt a typed closure into a [`Reducer`]. The closure returns `None` for
/// actions it does not handle, which keeps the previous state object.
pub fn reducer_fn<S, F>(initial: S, reduce: F) -> Arc<dyn Reducer>
where
    S: Clone + Send + Sync + 'static,
    F: Fn(&S, &Action) -> Option<S> + Send + Sync + 'static,
{
    Arc::new(FnReducer { initial, reduce })
}

/// Immutable view of the whole store at one point in time.
#[derive(Clone, Default)]
pub struct StateSnapshot {
    slices: HashMap<String, SliceState>,
}

impl std::fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.slices.keys().collect();
        keys.sort();
        f.debug_struct("StateSnapshot").field("slices", &keys).finish()
    }
}

impl StateSnapshot {
    /// Typed access to a slice; `None` if absent or of another type.
    pub fn slice<S: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<S>> {
        self.slices
            .get(key)
            .and_then(|s| Arc::clone(s).downcast::<S>().ok())
    }

    pub fn raw_slice(&self, key: &str) -> Option<SliceState> {
        self.slices.get(key).cloned()
    }

    /// The core slice. Always present in a store built by the package runtime.
    pub fn core(&self) -> Arc<CoreState> {
        self.slice::<CoreState>(CORE_PACKAGE_ID)
            .unwrap_or_else(|| Arc::new(CoreState::default()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slices.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.slices.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

pub type Listener = Arc<dyn Fn(&StateSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Combined-reducer store with dispatch, get_state and subscribe.
///
/// Dispatches are serialized. Listeners run synchronously after the new state
/// is published, before `dispatch` returns, and may dispatch themselves.
pub struct Store {
    reducers: Vec<(String, Arc<dyn Reducer>)>,
    state: RwLock<Arc<StateSnapshot>>,
    dispatch_guard: ReentrantMutex<()>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_listener: AtomicU64,
    dev_tools: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.reducers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Store")
            .field("slices", &keys)
            .field("listeners", &self.listeners.read().len())
            .field("dev_tools", &self.dev_tools)
            .finish()
    }
}

impl Store {
    pub fn new(reducers: Vec<(String, Arc<dyn Reducer>)>, dev_tools: bool) -> Self {
        let slices = reducers
            .iter()
            .map(|(key, r)| (key.clone(), r.initial_state()))
            .collect();
        Self {
            reducers,
            state: RwLock::new(Arc::new(StateSnapshot { slices })),
            dispatch_guard: ReentrantMutex::new(()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            dev_tools,
        }
    }

    pub fn get_state(&self) -> Arc<StateSnapshot> {
        self.state.read().clone()
    }

    pub fn dispatch(&self, action: Action) -> Action {
        let _serialized = self.dispatch_guard.lock();

        if self.dev_tools {
            tracing::debug!(action = %action.kind, payload = %action.payload, "dispatch");
        }

        let current = self.get_state();
        let slices = self
            .reducers
            .iter()
            .map(|(key, reducer)| {
                let next = match current.slices.get(key) {
                    Some(prev) => reducer.reduce(prev, &action),
                    None => reducer.reduce(&reducer.initial_state(), &action),
                };
                (key.clone(), next)
            })
            .collect();
        let next = Arc::new(StateSnapshot { slices });
        *self.state.write() = next.clone();

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&next);
        }

        action
    }

    pub fn subscribe(&self, listener: impl Fn(&StateSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn slice_keys(&self) -> Vec<&str> {
        self.reducers.iter().map(|(k, _)| k.as_str()).collect()
    }
}
