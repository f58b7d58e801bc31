//! Optimistic, debounced persistence of editable values.
//!
//! A `FieldAutosave<T>` owns one editable value. Every `set` updates the
//! local copy immediately and re-arms a debounce timer; when the timer fires
//! the latest value is handed to the save function. A burst of edits inside
//! the window produces exactly one write carrying the final value.
//!
//! Modules:
//! - toggle: set membership with revert-on-failure

pub mod toggle;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ApiError;

pub use toggle::OptimisticSet;

/// Boxed future returned by a save function.
pub type SaveFuture = Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send>>;

type SaveFn<T> = Box<dyn Fn(T) -> SaveFuture + Send + Sync>;

/// Lifecycle of one editable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    /// Edited locally, waiting for the debounce window to close.
    Pending,
    Saving,
    /// Transient; falls back to `Idle` after the indicator window.
    Saved,
    Failed(String),
}

impl SaveStatus {
    pub fn is_dirty(&self) -> bool {
        matches!(self, SaveStatus::Pending | SaveStatus::Failed(_))
    }
}

struct FieldState<T> {
    value: T,
    /// Bumped by every edit, cancel and external sync. A timer or save result
    /// only applies while its generation is still current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

struct Shared<T> {
    label: String,
    state: Mutex<FieldState<T>>,
    status: watch::Sender<SaveStatus>,
    debounce: Duration,
    saved_indicator: Duration,
    save: SaveFn<T>,
}

/// Debounced autosave for a single value.
///
/// Must be used inside a tokio runtime. Dropping it cancels a pending timer;
/// a write that already started is allowed to finish.
pub struct FieldAutosave<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> FieldAutosave<T> {
    pub fn new<F, Fut>(
        label: &str,
        initial: T,
        debounce: Duration,
        saved_indicator: Duration,
        save: F,
    ) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let (status, _) = watch::channel(SaveStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                label: label.to_string(),
                state: Mutex::new(FieldState {
                    value: initial,
                    generation: 0,
                    timer: None,
                    last_error: None,
                }),
                status,
                debounce,
                saved_indicator,
                save: Box::new(move |value: T| -> SaveFuture { Box::pin(save(value)) }),
            }),
        }
    }

    /// Current local value (possibly not yet saved).
    pub fn get(&self) -> T {
        self.shared.state.lock().value.clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.shared.status.borrow().clone()
    }

    /// Message of the most recent failed write, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.shared.status.subscribe()
    }

    /// Record an edit and (re)start the debounce window.
    pub fn set(&self, value: T) {
        let mut state = self.shared.state.lock();
        state.value = value;
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.debounce).await;
            Shared::fire(shared, generation).await;
        }));
        self.shared.status.send_replace(SaveStatus::Pending);
    }

    /// Drop a pending edit without writing it. The local value is kept.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        let had_timer = state.timer.take().map(|timer| timer.abort()).is_some();
        state.generation += 1;
        drop(state);

        if had_timer {
            log::debug!("Autosave[{}]: pending write cancelled", self.shared.label);
        }
        self.shared.status.send_if_modified(|status| {
            if *status == SaveStatus::Pending {
                *status = SaveStatus::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Adopt a value that changed at the source (e.g. a server reload).
    ///
    /// Any pending write is discarded and results of in-flight writes are
    /// ignored.
    pub fn sync_from_source(&self, value: T) {
        let mut state = self.shared.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.value = value;
        state.last_error = None;
        drop(state);

        self.shared.status.send_replace(SaveStatus::Idle);
    }

    /// Write a pending edit now instead of waiting for the timer.
    ///
    /// Returns `Ok(())` without a request when nothing is pending.
    pub async fn flush(&self) -> Result<(), ApiError> {
        let (generation, value) = {
            let mut state = self.shared.state.lock();
            match state.timer.take() {
                Some(timer) => timer.abort(),
                None => return Ok(()),
            }
            // A timer that already woke must not write the same edit again.
            state.generation += 1;
            self.shared.status.send_replace(SaveStatus::Saving);
            (state.generation, state.value.clone())
        };
        Shared::run_save(Arc::clone(&self.shared), generation, value).await
    }
}

impl<T: Clone + Send + 'static> Drop for FieldAutosave<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.state.lock().timer.take() {
            timer.abort();
        }
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    async fn fire(shared: Arc<Self>, generation: u64) {
        let Some(value) = shared.begin_save(generation) else {
            return;
        };
        let _ = Self::run_save(shared, generation, value).await;
    }

    /// Claim the write for `generation` and publish `Saving` under the state
    /// lock, so a concurrent `set` always publishes after it.
    fn begin_save(&self, generation: u64) -> Option<T> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        // The write must survive later edits; detach it from the timer slot.
        state.timer = None;
        self.status.send_replace(SaveStatus::Saving);
        Some(state.value.clone())
    }

    async fn run_save(shared: Arc<Self>, generation: u64, value: T) -> Result<(), ApiError> {
        log::debug!("Autosave[{}]: saving", shared.label);

        let result = (shared.save)(value).await;

        let current = {
            let mut state = shared.state.lock();
            let current = state.generation == generation;
            if current {
                state.last_error = result.as_ref().err().map(|e| e.to_string());
            }
            current
        };

        match &result {
            Ok(()) => log::debug!("Autosave[{}]: saved", shared.label),
            Err(e) => log::warn!("Autosave[{}]: save failed: {}", shared.label, e),
        }
        if !current {
            // A newer edit or sync owns the status now.
            return result;
        }

        match &result {
            Ok(()) => {
                shared.status.send_replace(SaveStatus::Saved);
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    tokio::time::sleep(shared.saved_indicator).await;
                    if shared.state.lock().generation == generation {
                        shared.status.send_if_modified(|status| {
                            if *status == SaveStatus::Saved {
                                *status = SaveStatus::Idle;
                                true
                            } else {
                                false
                            }
                        });
                    }
                });
            }
            Err(e) => {
                shared.status.send_replace(SaveStatus::Failed(e.to_string()));
            }
        }
        result
    }
}
