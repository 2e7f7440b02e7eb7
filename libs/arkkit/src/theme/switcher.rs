//! Theme switching state machine.
//!
//! `Idle → Loading(target, previous) → Committed(target) | RolledBack(previous)`.
//!
//! Overlapping switches are cancel-and-supersede: starting a switch cancels the
//! one in flight, whose task then detaches its own stylesheet and dispatches
//! nothing. The superseding switch inherits the superseded one's rollback
//! target, so a rollback always restores the last committed theme.
//!
//! Every transition that dispatches `SET_THEME` (start, commit, rollback,
//! default) runs under the in-flight slot lock, so transitions never
//! interleave. Store listeners must not start a theme switch synchronously.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::document::Document;
use super::loader::{load_theme, LoadOutcome};
use super::preference::{PreferenceStore, SELECTED_THEME_KEY};
use super::{Theme, ThemeTimings, DEFAULT_THEME_ID};
use crate::error::{ArkError, ArkResult};
use crate::store::core::CoreAction;
use crate::store::{Store, ThemeType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemePhase {
    Idle(String),
    Loading { target: String, previous: String },
    Committed(String),
    RolledBack(String),
}

/// How a switch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Switched to the synthetic default theme; nothing was loaded.
    Default,
    Committed(String),
    RolledBack { failed: String, restored: String },
    /// A later switch took over before this one finished.
    Superseded(String),
    /// The switch task died without reporting.
    Aborted(String),
}

/// Handle on a started switch. Dropping it does not stop the switch.
#[derive(Debug)]
pub struct ThemeSwitch {
    theme_id: String,
    state: SwitchState,
}

#[derive(Debug)]
enum SwitchState {
    Done(SwitchOutcome),
    Running(JoinHandle<SwitchOutcome>),
}

impl ThemeSwitch {
    fn done(theme_id: &str, outcome: SwitchOutcome) -> Self {
        Self {
            theme_id: theme_id.to_string(),
            state: SwitchState::Done(outcome),
        }
    }

    pub fn theme_id(&self) -> &str {
        &self.theme_id
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            SwitchState::Done(_) => true,
            SwitchState::Running(handle) => handle.is_finished(),
        }
    }

    pub async fn wait(self) -> SwitchOutcome {
        match self.state {
            SwitchState::Done(outcome) => outcome,
            SwitchState::Running(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(theme = %self.theme_id, error = %e, "theme switch task failed");
                    SwitchOutcome::Aborted(self.theme_id)
                }
            },
        }
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    previous: (String, ThemeType),
}

pub struct ThemeSwitcher {
    document: Arc<dyn Document>,
    preferences: Arc<dyn PreferenceStore>,
    timings: ThemeTimings,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    phase: RwLock<ThemePhase>,
}

impl std::fmt::Debug for ThemeSwitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeSwitcher")
            .field("timings", &self.timings)
            .field("phase", &*self.phase.read())
            .finish()
    }
}

impl ThemeSwitcher {
    pub fn new(
        document: Arc<dyn Document>,
        preferences: Arc<dyn PreferenceStore>,
        timings: ThemeTimings,
    ) -> Self {
        Self {
            document,
            preferences,
            timings,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            phase: RwLock::new(ThemePhase::Idle(DEFAULT_THEME_ID.to_string())),
        }
    }

    pub fn phase(&self) -> ThemePhase {
        self.phase.read().clone()
    }

    pub fn timings(&self) -> &ThemeTimings {
        &self.timings
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.preferences
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    fn set_phase(&self, phase: ThemePhase) {
        tracing::trace!(?phase, "theme phase");
        *self.phase.write() = phase;
    }

    /// Synchronous switch to the synthetic default theme.
    pub fn switch_to_default(&self, store: &Store) -> ThemeSwitch {
        let mut slot = self.in_flight.lock();
        if let Some(running) = slot.take() {
            running.cancel.cancel();
        }

        store.dispatch(CoreAction::set_theme(
            DEFAULT_THEME_ID,
            Some(ThemeType::Light),
            Some(false),
        ));
        if let Err(e) = self.preferences.remove(SELECTED_THEME_KEY) {
            tracing::warn!(error = %e, "failed to clear theme preference");
        }
        self.document.remove_theme_links(None);
        self.set_phase(ThemePhase::Committed(DEFAULT_THEME_ID.to_string()));
        tracing::info!(theme = DEFAULT_THEME_ID, "theme switched");
        drop(slot);

        ThemeSwitch::done(DEFAULT_THEME_ID, SwitchOutcome::Default)
    }

    /// Start switching to a catalog theme. The "changing" state is dispatched
    /// before this returns; loading continues on a spawned task.
    pub fn switch_to(self: &Arc<Self>, store: Arc<Store>, theme: Theme) -> ArkResult<ThemeSwitch> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ArkError::NotInitialized { operation: "set_theme" })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        let mut slot = self.in_flight.lock();
        let previous = match slot.take() {
            Some(superseded) => {
                superseded.cancel.cancel();
                tracing::debug!(theme = %theme.id, superseded = superseded.generation, "superseding theme switch");
                superseded.previous
            }
            None => {
                let core = store.get_state().core();
                (core.current_theme_id.clone(), core.current_theme_type)
            }
        };
        *slot = Some(InFlight {
            generation,
            cancel: cancel.clone(),
            previous: previous.clone(),
        });
        self.set_phase(ThemePhase::Loading {
            target: theme.id.clone(),
            previous: previous.0.clone(),
        });
        store.dispatch(CoreAction::set_theme(&theme.id, Some(theme.kind), Some(true)));
        drop(slot);
        tracing::debug!(theme = %theme.id, previous = %previous.0, "theme switch started");

        let theme_id = theme.id.clone();
        let this = Arc::clone(self);
        let handle =
            runtime.spawn(async move { this.run(store, theme, previous, generation, cancel).await });

        Ok(ThemeSwitch {
            theme_id,
            state: SwitchState::Running(handle),
        })
    }

    /// Clear the in-flight slot if it still belongs to `generation`. The
    /// returned guard keeps other switches out until the caller's final
    /// dispatch is done.
    fn finish(&self, generation: u64) -> Option<MutexGuard<'_, Option<InFlight>>> {
        let mut slot = self.in_flight.lock();
        match slot.as_ref() {
            Some(current) if current.generation == generation => {
                *slot = None;
                Some(slot)
            }
            _ => None,
        }
    }

    async fn run(
        self: Arc<Self>,
        store: Arc<Store>,
        theme: Theme,
        previous: (String, ThemeType),
        generation: u64,
        cancel: CancellationToken,
    ) -> SwitchOutcome {
        let link = match load_theme(self.document.as_ref(), &theme, &self.timings, &cancel).await {
            LoadOutcome::Loaded(link) => link,
            LoadOutcome::Cancelled => return SwitchOutcome::Superseded(theme.id),
            LoadOutcome::TimedOut => {
                let Some(_slot) = self.finish(generation) else {
                    return SwitchOutcome::Superseded(theme.id);
                };
                let err = ArkError::ThemeLoadTimeout {
                    id: theme.id.clone(),
                    after_ms: self.timings.timeout.as_millis(),
                };
                tracing::warn!(theme = %theme.id, restored = %previous.0, error = %err, "theme load failed; rolling back");
                store.dispatch(CoreAction::set_theme(&previous.0, Some(previous.1), Some(false)));
                self.set_phase(ThemePhase::RolledBack(previous.0.clone()));
                return SwitchOutcome::RolledBack {
                    failed: theme.id,
                    restored: previous.0,
                };
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.document.remove_link(&link);
                return SwitchOutcome::Superseded(theme.id);
            }
            _ = tokio::time::sleep(self.timings.settle_delay) => {}
        }

        let Some(_slot) = self.finish(generation) else {
            self.document.remove_link(&link);
            return SwitchOutcome::Superseded(theme.id);
        };

        for stale in self.document.theme_links() {
            if stale.node_id != link.node_id {
                self.document.remove_link(&stale);
            }
        }
        store.dispatch(CoreAction::set_theme(&theme.id, Some(theme.kind), Some(false)));
        if let Err(e) = self.preferences.set(SELECTED_THEME_KEY, &theme.id) {
            tracing::warn!(theme = %theme.id, error = %e, "failed to persist theme preference");
        }
        self.set_phase(ThemePhase::Committed(theme.id.clone()));
        tracing::info!(theme = %theme.id, "theme switched");
        SwitchOutcome::Committed(theme.id)
    }
}
