//! Initialization sequence and the background server-context fetch.
//!
//! Phase order: i18n → mode → store → connector/frame → module startup →
//! theme restore → context fetch. Single pass; a package is initialized once.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::package::Package;
use super::{ContextFetchOptions, RuntimeMode};
use crate::context::RuntimeShared;
use crate::contracts::Connector;
use crate::error::{ArkError, ArkResult, ErrorKind};
use crate::store::core::CoreAction;
use crate::store::Store;
use crate::theme::{DEFAULT_THEME_ID, SELECTED_THEME_KEY};

impl Package {
    /// Run the initialization sequence.
    ///
    /// Fails without side effects when no i18n engine is attached. An i18n
    /// bootstrap error or a failing module startup hook aborts the sequence.
    pub async fn initialize(
        &self,
        mode: RuntimeMode,
        connector: Option<Arc<dyn Connector>>,
    ) -> ArkResult<()> {
        let (engine, options) = self.i18n.read().clone().ok_or(ArkError::MissingI18n)?;
        if self.initializing.swap(true, Ordering::SeqCst) || self.mode.get().is_some() {
            return Err(ArkError::AlreadyInitialized);
        }

        tracing::info!("Phase: i18n");
        engine.init(&options).await.map_err(ArkError::Bootstrap)?;

        tracing::info!(%mode, "Phase: store");
        // set only here, guarded by `initializing`
        let _ = self.mode.set(mode);
        let store = self.setup_store(self.options.dev_tools);

        if let Some(connector) = connector {
            *self.connector.write() = Some(connector);
        }
        let _ = self.frame.set(self.build_frame());

        tracing::info!("Phase: modules");
        for entry in self.modules() {
            tracing::debug!(module = %entry.id(), "running startup hook");
            entry
                .module()
                .main(entry.ctx())
                .await
                .map_err(|source| ArkError::ModuleStart {
                    module: entry.id().to_string(),
                    source,
                })?;
        }

        tracing::info!("Phase: theme");
        match mode {
            RuntimeMode::Browser => self.restore_theme(),
            RuntimeMode::Server => {
                tracing::warn!("server mode: persisted theme preference is not restored")
            }
        }

        if self
            .modules()
            .iter()
            .any(|e| e.module().initialize_server_context())
        {
            tracing::info!("Phase: context");
            let handle = spawn_context_fetch(
                self.shared.clone(),
                store,
                self.options.context.clone(),
                self.shutdown.child_token(),
            );
            *self.context_task.lock() = Some(handle);
        }

        tracing::info!(modules = self.modules().len(), "package initialized");
        Ok(())
    }

    /// Re-apply the persisted theme, if any.
    fn restore_theme(&self) {
        let Some(saved) = self.switcher().preferences().get(SELECTED_THEME_KEY) else {
            return;
        };
        if saved == DEFAULT_THEME_ID {
            return;
        }
        match self.set_theme(&saved) {
            Ok(switch) => {
                tracing::info!(theme = %saved, "restoring saved theme");
                *self.restored_theme.lock() = Some(switch);
            }
            Err(e) => {
                tracing::warn!(theme = %saved, error = %e, "saved theme cannot be restored; forgetting it");
                if let Err(e) = self.switcher().preferences().remove(SELECTED_THEME_KEY) {
                    tracing::warn!(error = %e, "failed to clear theme preference");
                }
            }
        }
    }

    /// Handle of the background context fetch, if one was started.
    pub fn take_context_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.context_task.lock().take()
    }

    /// Stop background work. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("package shutting down");
            self.shutdown.cancel();
        }
    }
}

/// Fetch the server context until it succeeds or `cancel` fires. No backoff,
/// no attempt cap: configuration errors are retried too, since the
/// environments table can be swapped while the loop runs.
///
/// The first failure of each [`ErrorKind`] is a warning; repeats log at debug.
pub(super) fn spawn_context_fetch(
    shared: Arc<RuntimeShared>,
    store: Arc<Store>,
    opts: ContextFetchOptions,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempt: u64 = 0;
        let mut last_kind: Option<ErrorKind> = None;
        loop {
            attempt += 1;
            let result = match shared.provider(&opts.provider) {
                Ok(client) => {
                    let res = tokio::select! {
                        _ = cancel.cancelled() => return,
                        res = client.get_json(&opts.path) => res,
                    };
                    res.map_err(|source| ArkError::ProviderRequest {
                        provider: opts.provider.clone(),
                        source,
                    })
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(body) => {
                    store.dispatch(CoreAction::initialize(body));
                    tracing::info!(attempt, path = %opts.path, "server context loaded");
                    return;
                }
                Err(err) => {
                    let kind = err.kind();
                    if last_kind != Some(kind) {
                        tracing::warn!(
                            attempt,
                            ?kind,
                            retry_in = ?opts.retry_delay,
                            error = ?err,
                            "context fetch failed; retrying until it succeeds"
                        );
                        last_kind = Some(kind);
                    } else {
                        tracing::debug!(attempt, ?kind, error = %err, "context fetch failed again");
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "context fetch cancelled");
                    return;
                }
                _ = tokio::time::sleep(opts.retry_delay) => {}
            }
        }
    })
}
