//! Page-by-page loading with an accumulated item list
//!
//! [`Paginator`] issues `GET path?{params}&page=N&pageSize=M` through the
//! pipeline with caching and retries disabled, so token and header assembly
//! stay identical to every other call. Loading page 1 (or the initial page)
//! replaces the list; any other page appends to it.

use crate::config::ConfigHandle;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, ResponseBody};
use crate::pipeline::Pipeline;
use crate::reactive::StateCell;
use crate::request::RequestOptions;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What to page through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Path or absolute URL of the list endpoint
    pub path: String,
    /// Items per page; a shorter page means there is nothing after it
    pub page_size: u32,
    /// Page loaded first and restored by `reset`
    pub initial_page: u32,
    /// Extra query parameters sent with every page
    pub params: Vec<(String, Option<String>)>,
}

impl PaginationOptions {
    /// Ten items per page starting at page 1
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            page_size: 10,
            initial_page: 1,
            params: Vec::new(),
        }
    }

    /// Set the page size
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the first page
    #[must_use]
    pub fn initial_page(mut self, page: u32) -> Self {
        self.initial_page = page;
        self
    }

    /// Add a query parameter sent with every page
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), Some(value.to_string())));
        self
    }
}

/// Observable paging state
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    /// Last page loaded successfully, or the initial page
    pub page: u32,
    /// Items accumulated across loaded pages
    pub data: Vec<Value>,
    /// A load is in flight
    pub loading: bool,
    /// Failure of the last load, cleared when the next one starts
    pub error: Option<ApiError>,
    /// Whether the last page came back full
    pub has_more: bool,
}

impl PageState {
    fn initial(page: u32) -> Self {
        Self {
            page,
            data: Vec::new(),
            loading: false,
            error: None,
            has_more: true,
        }
    }
}

/// Items of one page: a JSON array, or an object with a `data`/`items` array
fn page_items(body: &ResponseBody) -> Option<Vec<Value>> {
    let value = match body {
        ResponseBody::Json(value) => value.clone(),
        ResponseBody::Empty => return Some(Vec::new()),
        other => other.decode::<Value>().ok()?,
    };
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => ["data", "items"].iter().find_map(|key| match map.remove(*key) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }),
        _ => None,
    }
}

/// The load in flight, if any
///
/// `reset` bumps the generation, so a load that started before it drops its
/// result instead of writing into the fresh state.
#[derive(Debug, Default)]
struct LoadSlot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Paginated facade
#[derive(Debug, Clone)]
pub struct Paginator {
    pipeline: Pipeline,
    options: Arc<PaginationOptions>,
    state: Arc<StateCell<PageState>>,
    loads: Arc<Mutex<LoadSlot>>,
}

impl Paginator {
    /// Paginator bound to `config`
    #[must_use]
    pub fn new(config: ConfigHandle, options: PaginationOptions) -> Self {
        let state = StateCell::new(PageState::initial(options.initial_page));
        Self {
            pipeline: Pipeline::new(config),
            options: Arc::new(options),
            state: Arc::new(state),
            loads: Arc::default(),
        }
    }

    /// Paginator over the process-wide configuration
    #[must_use]
    pub fn global(options: PaginationOptions) -> Self {
        Self::new(crate::config::global(), options)
    }

    /// Clone of the current state
    #[must_use]
    pub fn snapshot(&self) -> PageState {
        self.state.get()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PageState> {
        self.state.subscribe()
    }

    /// Load the current page; returns `false` if a load is already running
    pub async fn load(&self) -> ApiResult<bool> {
        let page = self.state.get().page;
        self.load_page(page).await
    }

    /// Load the following page unless loading or exhausted
    pub async fn next_page(&self) -> ApiResult<bool> {
        let state = self.state.get();
        if state.loading || !state.has_more {
            return Ok(false);
        }
        self.load_page(state.page + 1).await
    }

    /// Load the preceding page unless loading or on page 1
    pub async fn prev_page(&self) -> ApiResult<bool> {
        let state = self.state.get();
        if state.loading || state.page <= 1 {
            return Ok(false);
        }
        self.load_page(state.page - 1).await
    }

    /// Back to the initial page with no data
    ///
    /// A load still in flight is cancelled and its result discarded.
    pub fn reset(&self) {
        self.state.update(|state| {
            let mut slot = self.slot();
            slot.generation += 1;
            if let Some(token) = slot.token.take() {
                token.cancel();
            }
            *state = PageState::initial(self.options.initial_page);
        });
    }

    /// Reload from the initial page, replacing the list
    pub async fn refresh(&self) -> ApiResult<bool> {
        self.load_page(self.options.initial_page).await
    }

    fn slot(&self) -> MutexGuard<'_, LoadSlot> {
        self.loads.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `Ok(false)` when another load is running or a `reset`
    /// superseded this one
    async fn load_page(&self, page: u32) -> ApiResult<bool> {
        let token = CancellationToken::new();
        let mut generation = None;
        self.state.update_if(|state| {
            if state.loading {
                return false;
            }
            let mut slot = self.slot();
            slot.token = Some(token.clone());
            generation = Some(slot.generation);
            state.loading = true;
            state.error = None;
            true
        });
        let Some(generation) = generation else {
            return Ok(false);
        };

        let mut request = RequestOptions::new().no_cache().retry(0).cancellation(token);
        request.params.clone_from(&self.options.params);
        request = request
            .param("page", page)
            .param("pageSize", self.options.page_size);

        let result = self
            .pipeline
            .execute(HttpMethod::Get, &self.options.path, None, request)
            .await
            .and_then(|response| {
                page_items(&response.data).ok_or_else(|| ApiError::Unknown {
                    message: "page payload is not a list".to_string(),
                    status: Some(response.status),
                })
            });

        let replace = page == 1 || page == self.options.initial_page;
        let page_size = usize::try_from(self.options.page_size).unwrap_or(usize::MAX);

        let mut outcome = None;
        self.state.update_if(|state| {
            let mut slot = self.slot();
            if slot.generation != generation {
                return false;
            }
            slot.token = None;
            state.loading = false;
            outcome = Some(match result {
                Ok(items) => {
                    debug!(page, count = items.len(), "page loaded");
                    state.has_more = items.len() == page_size;
                    if replace {
                        state.data = items;
                    } else {
                        state.data.extend(items);
                    }
                    state.page = page;
                    Ok(true)
                }
                Err(error) => {
                    state.error = Some(error.clone());
                    Err(error)
                }
            });
            true
        });

        outcome.unwrap_or_else(|| {
            debug!(page, "load superseded by reset");
            Ok(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_items_shapes() {
        assert_eq!(page_items(&json!([1, 2]).into()), Some(vec![json!(1), json!(2)]));
        assert_eq!(page_items(&json!({"data": [3]}).into()), Some(vec![json!(3)]));
        assert_eq!(page_items(&json!({"items": []}).into()), Some(vec![]));
        assert_eq!(page_items(&json!({"total": 4}).into()), None);
        assert_eq!(page_items(&ResponseBody::Empty), Some(vec![]));
        assert_eq!(page_items(&ResponseBody::Text("[5]".into())), Some(vec![json!(5)]));
    }

    #[test]
    fn test_options_defaults() {
        let options = PaginationOptions::new("/posts");
        assert_eq!(options.page_size, 10);
        assert_eq!(options.initial_page, 1);
    }

    #[tokio::test]
    async fn test_prev_page_noop_on_first_page() {
        let paginator = Paginator::new(ConfigHandle::default(), PaginationOptions::new("/posts"));
        assert!(!paginator.prev_page().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_page_and_records_error() {
        let paginator = Paginator::new(ConfigHandle::default(), PaginationOptions::new("/posts"));
        assert!(paginator.load().await.is_err());

        let state = paginator.snapshot();
        assert_eq!(state.page, 1);
        assert!(!state.loading);
        assert!(state.error.is_some());

        paginator.reset();
        assert_eq!(paginator.snapshot(), PageState::initial(1));
    }
}
