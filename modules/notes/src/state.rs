//! The notes slice and its reducer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arkkit::{reducer_fn, Action, ActionTypes, Reducer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ADD: &str = "ADD";
pub const REMOVE: &str = "REMOVE";
pub const CLEAR: &str = "CLEAR";
pub const LOADED: &str = "LOADED";

/// Symbolic names of the module's actions, before namespacing.
pub fn action_types() -> ActionTypes {
    [ADD, REMOVE, CLEAR, LOADED]
        .into_iter()
        .map(|name| (name, name))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotesState {
    pub items: Vec<Note>,
    pub next_id: u64,
}

impl NotesState {
    fn push(&mut self, text: String, max: usize) {
        self.next_id += 1;
        self.items.push(Note {
            id: self.next_id,
            text,
        });
        if self.items.len() > max {
            let excess = self.items.len() - max;
            self.items.drain(..excess);
        }
    }
}

/// Resolved action type strings the reducer matches on.
#[derive(Debug, Clone)]
struct Kinds {
    add: String,
    remove: String,
    clear: String,
    loaded: String,
}

impl Kinds {
    fn resolve(types: &ActionTypes) -> Option<Self> {
        Some(Self {
            add: types.get(ADD)?.to_string(),
            remove: types.get(REMOVE)?.to_string(),
            clear: types.get(CLEAR)?.to_string(),
            loaded: types.get(LOADED)?.to_string(),
        })
    }
}

fn reduce(kinds: &Kinds, max: usize, state: &NotesState, action: &Action) -> Option<NotesState> {
    let kind = action.kind.as_str();
    if kind == kinds.add {
        let text = action.payload.as_str()?.trim();
        if text.is_empty() {
            return None;
        }
        let mut next = state.clone();
        next.push(text.to_string(), max);
        Some(next)
    } else if kind == kinds.remove {
        let id = action.payload.as_u64()?;
        if !state.items.iter().any(|n| n.id == id) {
            return None;
        }
        let mut next = state.clone();
        next.items.retain(|n| n.id != id);
        Some(next)
    } else if kind == kinds.clear {
        (!state.items.is_empty()).then(|| NotesState {
            items: Vec::new(),
            next_id: state.next_id,
        })
    } else if kind == kinds.loaded {
        let Value::Array(texts) = &action.payload else {
            tracing::warn!("notes payload is not an array; ignored");
            return None;
        };
        let mut next = state.clone();
        for text in texts.iter().filter_map(Value::as_str) {
            next.push(text.to_string(), max);
        }
        Some(next)
    } else {
        None
    }
}

/// Reducer over the namespaced `types`; `None` if any action is missing.
/// `max_notes` is read on every action, so it can be tuned after the store
/// exists.
pub fn reducer(types: &ActionTypes, max_notes: Arc<AtomicUsize>) -> Option<Arc<dyn Reducer>> {
    let kinds = Kinds::resolve(types)?;
    Some(reducer_fn(NotesState::default(), move |state, action| {
        reduce(&kinds, max_notes.load(Ordering::Relaxed), state, action)
    }))
}
