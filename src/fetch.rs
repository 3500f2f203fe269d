//! Async fetch hook: runs a producer and tracks `{data, loading, error}`.

use serde::{Serialize, Serializer};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Error, Result};

type Producer<T> =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T>> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub loading: bool,
    #[serde(serialize_with = "error_message")]
    pub error: Option<Arc<Error>>,
}

impl<T> FetchState<T> {
    fn idle() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

fn error_message<S: Serializer>(
    error: &Option<Arc<Error>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Handle to one fetch hook. Clones share the same state.
///
/// Every `refetch` takes a new generation number. A result is applied only if
/// its generation is still current when it completes, so an older call that
/// finishes late, or any call outstanding across `reset`, is dropped.
pub struct Fetch<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    producer: Producer<T>,
    state: watch::Sender<FetchState<T>>,
    generation: AtomicU64,
}

impl<T> Clone for Fetch<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Fetch<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// With `immediate`, the first fetch is spawned on the current tokio
    /// runtime and the hook starts out loading.
    pub fn new<F, Fut>(producer: F, immediate: bool) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let producer: Producer<T> = Arc::new(
            move || -> Pin<Box<dyn Future<Output = Result<T>> + Send>> { Box::pin(producer()) },
        );
        let mut initial = FetchState::idle();
        initial.loading = immediate;
        let (state, _) = watch::channel(initial);
        let fetch = Self {
            inner: Arc::new(Inner {
                producer,
                state,
                generation: AtomicU64::new(0),
            }),
        };
        if immediate {
            let first = fetch.clone();
            tokio::spawn(async move { first.refetch().await });
        }
        fetch
    }

    pub fn state(&self) -> FetchState<T> {
        self.inner.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn error(&self) -> Option<Arc<Error>> {
        self.inner.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.inner.state.subscribe()
    }

    /// Runs the producer. Errors are stored in the state, never returned.
    pub async fn refetch(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|s| {
            s.data = None;
            s.loading = true;
            s.error = None;
        });

        let result = (self.inner.producer)().await;

        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Discarding stale fetch result");
            return;
        }
        self.inner.state.send_modify(|s| {
            s.loading = false;
            match result {
                Ok(data) => s.data = Some(data),
                Err(e) => {
                    warn!("Fetch failed: {}", e);
                    s.error = Some(Arc::new(e));
                }
            }
        });
    }

    /// Clears data and error without running the producer. A call still in
    /// flight will not apply its result.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(FetchState::idle());
    }

    /// Waits until no fetch is in flight and returns the state at that point.
    pub async fn settled(&self) -> FetchState<T> {
        let mut rx = self.subscribe();
        if let Ok(state) = rx.wait_for(|s| !s.loading).await {
            return state.clone();
        }
        self.state()
    }
}
