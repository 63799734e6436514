//! Stateful client facade with observable state
//!
//! [`ReactiveClient`] publishes `{loading, error, data}` through a
//! [`StateCell`], which any UI layer can watch. Every verb spawns the call on
//! the current Tokio runtime and hands back a [`CancelableRequest`], so the
//! verbs panic when called outside one.
//!
//! Calls without a caller-supplied cancellation token get one from the
//! client. Those tokens live in a registry keyed by request id from start
//! until the call ends, so [`CancelableRequest::cancel`] and
//! [`ReactiveClient::cancel_all`] can reach them. Caller-owned tokens are
//! passed through and never tracked.

use crate::client::to_body;
use crate::config::ConfigHandle;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, ResponseBody, ResponseEnvelope};
use crate::pipeline::Pipeline;
use crate::request::RequestOptions;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Value holder with subscribe/notify semantics
///
/// Every write notifies subscribers. Reads never block writers for longer
/// than a clone.
#[derive(Debug)]
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    /// Cell holding `initial`
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Clone of the current value
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value wholesale
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the value in place and notify
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Modify the value in place; subscribers are notified only when `f`
    /// returns `true`
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Receiver that observes every subsequent write
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// State published by [`ReactiveClient`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiState {
    /// A call is in flight
    pub loading: bool,
    /// Failure of the last finished call
    pub error: Option<ApiError>,
    /// Body of the last successful call
    pub data: Option<ResponseBody>,
    /// Status of the last finished call, when known
    pub status: Option<u16>,
}

impl ApiState {
    fn finished(result: &ApiResult<ResponseEnvelope>) -> Self {
        match result {
            Ok(response) => Self {
                loading: false,
                error: None,
                data: Some(response.data.clone()),
                status: Some(response.status),
            },
            Err(error) => Self {
                loading: false,
                error: Some(error.clone()),
                data: None,
                status: error.status(),
            },
        }
    }
}

type Registry = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// An in-flight call started by [`ReactiveClient`]
#[derive(Debug)]
pub struct CancelableRequest {
    id: Uuid,
    registry: Registry,
    handle: JoinHandle<ApiResult<ResponseEnvelope>>,
}

impl CancelableRequest {
    /// Identifier of this call
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Signal the client-owned token if the call is still in flight
    ///
    /// Returns `false` when the call already ended or uses a caller-owned
    /// token.
    pub fn cancel(&self) -> bool {
        match lock(&self.registry).get(&self.id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the call's outcome
    pub async fn finished(self) -> ApiResult<ResponseEnvelope> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ApiError::Cancelled),
            Err(e) => Err(ApiError::unknown(format!("request task failed: {e}"))),
        }
    }
}

/// Stateful client over the pipeline
#[derive(Debug, Clone)]
pub struct ReactiveClient {
    pipeline: Pipeline,
    state: Arc<StateCell<ApiState>>,
    pending: Registry,
}

impl Default for ReactiveClient {
    fn default() -> Self {
        Self::new(ConfigHandle::default())
    }
}

impl ReactiveClient {
    /// Client bound to `config`
    #[must_use]
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            pipeline: Pipeline::new(config),
            state: Arc::new(StateCell::default()),
            pending: Arc::default(),
        }
    }

    /// Client bound to the process-wide configuration
    #[must_use]
    pub fn global() -> Self {
        Self::new(crate::config::global())
    }

    /// Clone of the current state
    #[must_use]
    pub fn snapshot(&self) -> ApiState {
        self.state.get()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ApiState> {
        self.state.subscribe()
    }

    /// Clear state; in-flight calls keep running and still publish
    pub fn reset(&self) {
        self.state.set(ApiState::default());
    }

    /// Cancel every call that uses a client-owned token
    pub fn cancel_all(&self) -> usize {
        let registry = lock(&self.pending);
        for token in registry.values() {
            token.cancel();
        }
        registry.len()
    }

    /// Calls currently holding a client-owned token
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Start `GET path`
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn get(&self, path: &str, options: RequestOptions) -> CancelableRequest {
        self.spawn(HttpMethod::Get, path, Ok(None), options)
    }

    /// Start `POST path` with a JSON body
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, options: RequestOptions) -> CancelableRequest {
        self.spawn(HttpMethod::Post, path, to_body(body).map(Some), options)
    }

    /// Start `PUT path` with a JSON body
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B, options: RequestOptions) -> CancelableRequest {
        self.spawn(HttpMethod::Put, path, to_body(body).map(Some), options)
    }

    /// Start `PATCH path` with a JSON body
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B, options: RequestOptions) -> CancelableRequest {
        self.spawn(HttpMethod::Patch, path, to_body(body).map(Some), options)
    }

    /// Start `DELETE path`
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn del(&self, path: &str, options: RequestOptions) -> CancelableRequest {
        self.spawn(HttpMethod::Delete, path, Ok(None), options)
    }

    /// Start a call on the current runtime
    fn spawn(
        &self,
        method: HttpMethod,
        path: &str,
        body: ApiResult<Option<Value>>,
        mut options: RequestOptions,
    ) -> CancelableRequest {
        // Resolved first so a missing runtime leaves no state behind
        let runtime = Handle::current();
        let id = Uuid::new_v4();
        if options.cancellation.is_none() {
            let token = CancellationToken::new();
            lock(&self.pending).insert(id, token.clone());
            options.cancellation = Some(token);
        }

        self.state.update(|state| {
            state.loading = true;
            state.error = None;
        });

        let pipeline = self.pipeline.clone();
        let state = Arc::clone(&self.state);
        let pending = Arc::clone(&self.pending);
        let path = path.to_string();

        let handle = runtime.spawn(async move {
            let result = match body {
                Ok(body) => pipeline.execute(method, &path, body, options).await,
                Err(e) => Err(e),
            };
            lock(&pending).remove(&id);
            debug!(%id, ok = result.is_ok(), "reactive request finished");
            state.set(ApiState::finished(&result));
            result
        });

        CancelableRequest {
            id,
            registry: Arc::clone(&self.pending),
            handle,
        }
    }
}
