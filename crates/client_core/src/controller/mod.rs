//! Controllers own the state a view renders.
//!
//! State lives in a `tokio::sync::watch` channel: views read the current
//! snapshot with `state()` or follow changes with `subscribe()`. "Load"
//! operations replace the snapshot, "mutate" operations merge into it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::StreamExt;
use shared::Resource;
use storage::Disposer;
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

use crate::repository::LiveResource;

mod auth;
mod help;
mod suggestion;
mod village;

pub use auth::{AuthController, AuthState};
pub use help::{HelpController, HelpState};
pub use suggestion::{SuggestionController, SuggestionState};
pub use village::{VillageController, VillageState};

/// Shared handle on one controller's state snapshot.
pub(crate) struct StateCell<S> {
    tx: Arc<watch::Sender<S>>,
}

impl<S: Clone + Send + Sync + 'static> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn snapshot(&self) -> S {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    pub(crate) fn replace(&self, state: S) {
        self.tx.send_replace(state);
    }

    pub(crate) fn merge(&self, edit: impl FnOnce(&mut S)) {
        self.tx.send_modify(edit);
    }

    /// Applies every item of `live` to the state until the returned
    /// observation is dropped.
    pub(crate) fn observe<T, F>(&self, live: LiveResource<T>, apply: F) -> Observation<S>
    where
        T: Send + 'static,
        F: Fn(&mut S, Resource<T>) + Send + 'static,
    {
        let (mut stream, disposer) = live.into_parts();
        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn({
            let tx = Arc::clone(&self.tx);
            let active = Arc::clone(&active);
            async move {
                while let Some(item) = stream.next().await {
                    let mut stopped = false;
                    // The flag is read under the channel lock, which `Observation::drop`
                    // also takes, so no item lands after the observation ends.
                    tx.send_if_modified(|state| {
                        if !active.load(Ordering::Acquire) {
                            stopped = true;
                            return false;
                        }
                        apply(state, item);
                        true
                    });
                    if stopped {
                        break;
                    }
                }
                debug!("observation finished");
            }
        });

        Observation {
            tx: Arc::clone(&self.tx),
            active,
            disposer: Some(disposer),
            task,
        }
    }
}

/// A running live subscription feeding controller state. Dropping it stops
/// state updates and releases the backend listener.
pub(crate) struct Observation<S> {
    tx: Arc<watch::Sender<S>>,
    active: Arc<AtomicBool>,
    disposer: Option<Disposer>,
    task: JoinHandle<()>,
}

impl<S> Drop for Observation<S> {
    fn drop(&mut self) {
        self.tx.send_if_modified(|_| {
            self.active.store(false, Ordering::Release);
            false
        });
        if let Some(disposer) = self.disposer.take() {
            disposer.dispose();
        }
        self.task.abort();
    }
}

/// Maps a live item onto the common `is_loading` / `error` pair and hands
/// successful payloads to `on_success`.
pub(crate) fn apply_live<T>(
    is_loading: &mut bool,
    error: &mut Option<String>,
    item: Resource<T>,
    on_success: impl FnOnce(T),
) {
    match item {
        Resource::Loading => *is_loading = true,
        Resource::Success(value) => {
            *is_loading = false;
            *error = None;
            on_success(value);
        }
        Resource::Error(message) => {
            *is_loading = false;
            *error = Some(message);
        }
    }
}
