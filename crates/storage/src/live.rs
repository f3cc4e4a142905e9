//! Live feeds: long-lived snapshot streams paired with a disposer.
//!
//! A feed re-evaluates its target whenever the [`ChangeHub`] reports a write
//! to the watched collection. Disposing closes the feed's outlet under a lock,
//! so once `dispose` returns no further snapshot can be delivered.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use futures::stream::{BoxStream, StreamExt};
use shared::error::BackendError;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

const CHANGE_HUB_CAPACITY: usize = 256;

/// Fan-out of "collection X changed" notifications to every live feed.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<String>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_HUB_CAPACITY);
        Self { tx }
    }

    pub fn notify(&self, collection: &str) {
        // No receivers simply means nobody is watching.
        let _ = self.tx.send(collection.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the listener behind a live feed.
///
/// `dispose` consumes the disposer, so it can run at most once; dropping an
/// undisposed disposer runs it as well.
#[must_use = "dropping a disposer immediately tears the live feed down"]
pub struct Disposer {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

pub type FeedStream<T> = BoxStream<'static, Result<T, BackendError>>;

pub struct LiveFeed<T> {
    pub stream: FeedStream<T>,
    pub disposer: Disposer,
}

impl<T: Send + 'static> LiveFeed<T> {
    pub fn new(stream: FeedStream<T>, disposer: Disposer) -> Self {
        Self { stream, disposer }
    }

    pub fn into_parts(self) -> (FeedStream<T>, Disposer) {
        (self.stream, self.disposer)
    }

    /// A feed that yields one error and ends.
    pub fn failed(err: BackendError) -> Self {
        Self {
            stream: futures::stream::once(async move { Err(err) }).boxed(),
            disposer: Disposer::noop(),
        }
    }
}

type Outlet<T> = Arc<Mutex<Option<mpsc::UnboundedSender<Result<T, BackendError>>>>>;

fn emit<T>(outlet: &Outlet<T>, item: Result<T, BackendError>) -> bool {
    let guard = outlet.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_ref() {
        Some(tx) => tx.send(item).is_ok(),
        None => false,
    }
}

/// Spawns the listener task for a feed over `collection`. `evaluate` produces
/// the current snapshot; it runs once immediately and again after every
/// change notification for the collection.
pub fn spawn_feed<T, F, Fut>(hub: &ChangeHub, collection: &str, evaluate: F) -> LiveFeed<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let outlet: Outlet<T> = Arc::new(Mutex::new(Some(tx)));
    // Subscribe before the first evaluation so no write slips between them.
    let mut changes = hub.subscribe();
    let collection = collection.to_string();

    let task_outlet = outlet.clone();
    let task = tokio::spawn(async move {
        loop {
            let snapshot = evaluate().await;
            if !emit(&task_outlet, snapshot) {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if changed == collection => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(%collection, skipped, "live feed lagged; re-evaluating");
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
    });

    let disposer = Disposer::new(move || {
        outlet
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        task.abort();
    });

    LiveFeed {
        stream: UnboundedReceiverStream::new(rx).boxed(),
        disposer,
    }
}
