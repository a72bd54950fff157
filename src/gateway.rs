use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::stream::BoxStream;
use json_patch::Patch;
use tokio_util::sync::CancellationToken;

use crate::{
    discover::ServedResource,
    dynamic::{Unstructured, UnstructuredList},
    error::{Error, Result},
};

mod client;
pub use client::KubeGateway;

/// Per-operation timeout applied when the caller supplies none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline and cancellation carried through every call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Upper bound for the call; [`DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Selection and paging options for list and watch calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub continue_token: Option<String>,
    pub limit: Option<u32>,
    /// Starting point for watches; `"0"` when unset.
    pub resource_version: Option<String>,
}

impl ListOptions {
    pub fn labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    pub fn fields(mut self, selector: &str) -> Self {
        self.field_selector = Some(selector.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// One event of a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub object: Unstructured,
}

/// Stream of watch events; ends normally when the server closes it.
pub type EventStream = BoxStream<'static, Result<WatchEvent>>;

/// Schema-agnostic access to any served resource.
///
/// Implementations are stateless across calls, never interpret `spec` or
/// `status`, and never retry.
#[async_trait]
pub trait DynamicGateway: Send + Sync {
    async fn get(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<Unstructured>;

    async fn list(
        &self,
        served: &ServedResource,
        namespace: &str,
        list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<UnstructuredList>;

    /// Create `obj`; the server echoes it back with its populated fields.
    async fn create(
        &self,
        served: &ServedResource,
        namespace: &str,
        obj: &Unstructured,
        opts: &CallOptions,
    ) -> Result<Unstructured>;

    /// Apply a JSON-Patch (`application/json-patch+json`) to `name`.
    async fn patch(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        patch: &Patch,
        opts: &CallOptions,
    ) -> Result<Unstructured>;

    async fn watch(
        &self,
        served: &ServedResource,
        namespace: &str,
        list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<EventStream>;

    async fn delete(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<()>;
}

/// Run `fut` under the deadline and cancellation signal of `opts`.
pub(crate) async fn with_deadline<T, F>(opts: &CallOptions, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    opts.check()?;
    let timeout = opts.effective_timeout();
    tokio::select! {
        _ = opts.cancel.cancelled() => Err(Error::Cancelled),
        res = tokio::time::timeout(timeout, fut) => res.unwrap_or(Err(Error::Timeout(timeout))),
    }
}
