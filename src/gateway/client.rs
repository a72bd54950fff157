use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use json_patch::Patch as JsonPatch;
use kube::{
    Api, Client,
    api::{
        DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchEvent as KubeWatchEvent,
        WatchParams,
    },
};
use tracing::debug;

use super::{
    CallOptions, DynamicGateway, EventKind, EventStream, ListOptions, WatchEvent, with_deadline,
};
use crate::{
    discover::ServedResource,
    dynamic::{Unstructured, UnstructuredList},
    error::{Error, Result},
};

/// [`DynamicGateway`] backed by the cluster REST API.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, served: &ServedResource, namespace: &str) -> Api<Unstructured> {
        if served.namespaced {
            Api::namespaced_with(self.client.clone(), namespace, served)
        } else {
            Api::all_with(self.client.clone(), served)
        }
    }
}

fn list_params(list: &ListOptions) -> ListParams {
    let mut lp = ListParams::default();
    if let Some(labels) = &list.label_selector {
        lp = lp.labels(labels);
    }
    if let Some(fields) = &list.field_selector {
        lp = lp.fields(fields);
    }
    if let Some(token) = &list.continue_token {
        lp = lp.continue_token(token);
    }
    if let Some(limit) = list.limit {
        lp = lp.limit(limit);
    }
    lp
}

/// The API server rejects watch timeouts of 295 seconds or more.
const MAX_WATCH_TIMEOUT_SECS: u64 = 290;

fn watch_params(list: &ListOptions, opts: &CallOptions) -> WatchParams {
    let mut wp = WatchParams::default();
    if let Some(labels) = &list.label_selector {
        wp = wp.labels(labels);
    }
    if let Some(fields) = &list.field_selector {
        wp = wp.fields(fields);
    }
    // Watches have no default deadline; an explicit one becomes the server-side timeout.
    if let Some(timeout) = opts.timeout {
        wp = wp.timeout(timeout.as_secs().clamp(1, MAX_WATCH_TIMEOUT_SECS) as u32);
    }
    wp
}

fn into_event(event: KubeWatchEvent<Unstructured>) -> Result<WatchEvent> {
    let (kind, object) = match event {
        KubeWatchEvent::Added(obj) => (EventKind::Added, obj),
        KubeWatchEvent::Modified(obj) => (EventKind::Modified, obj),
        KubeWatchEvent::Deleted(obj) => (EventKind::Deleted, obj),
        KubeWatchEvent::Bookmark(bookmark) => {
            let mut obj = Unstructured::default();
            obj.metadata.resource_version = Some(bookmark.metadata.resource_version);
            (EventKind::Bookmark, obj)
        }
        KubeWatchEvent::Error(status) => {
            let data = serde_json::to_value(&status).map_err(Error::shape)?;
            let obj = Unstructured {
                types: Some(kube::api::TypeMeta {
                    api_version: "v1".to_string(),
                    kind: "Status".to_string(),
                }),
                data,
                ..Default::default()
            };
            (EventKind::Error, obj)
        }
    };
    Ok(WatchEvent { kind, object })
}

#[async_trait]
impl DynamicGateway for KubeGateway {
    async fn get(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        debug!(resource = %served, namespace, name, "get");
        let api = self.api(served, namespace);
        with_deadline(opts, async { api.get(name).await.map_err(Error::from) }).await
    }

    async fn list(
        &self,
        served: &ServedResource,
        namespace: &str,
        list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<UnstructuredList> {
        debug!(resource = %served, namespace, "list");
        let api = self.api(served, namespace);
        let lp = list_params(list);
        let objects = with_deadline(opts, async { api.list(&lp).await.map_err(Error::from) }).await?;
        Ok(UnstructuredList {
            metadata: objects.metadata,
            items: objects.items,
        })
    }

    async fn create(
        &self,
        served: &ServedResource,
        namespace: &str,
        obj: &Unstructured,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        debug!(resource = %served, namespace, name = obj.name(), "create");
        let api = self.api(served, namespace);
        let pp = PostParams::default();
        with_deadline(opts, async { api.create(&pp, obj).await.map_err(Error::from) }).await
    }

    async fn patch(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        patch: &JsonPatch,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        debug!(resource = %served, namespace, name, "json patch");
        let api = self.api(served, namespace);
        let patch: Patch<()> = Patch::Json(patch.clone());
        let pp = PatchParams::default();
        with_deadline(opts, async { api.patch(name, &pp, &patch).await.map_err(Error::from) }).await
    }

    async fn watch(
        &self,
        served: &ServedResource,
        namespace: &str,
        list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<EventStream> {
        debug!(resource = %served, namespace, "watch");
        let api = self.api(served, namespace);
        let wp = watch_params(list, opts);
        let version = list.resource_version.as_deref().unwrap_or("0");
        opts.check()?;
        let stream = tokio::select! {
            _ = opts.cancel.cancelled() => return Err(Error::Cancelled),
            stream = api.watch(&wp, version) => stream?,
        };
        let cancel = opts.cancel.clone();
        Ok(stream
            .map_err(Error::from)
            .and_then(|event| futures::future::ready(into_event(event)))
            .take_until(cancel.cancelled_owned())
            .boxed())
    }

    async fn delete(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<()> {
        debug!(resource = %served, namespace, name, "delete");
        let api = self.api(served, namespace);
        let dp = DeleteParams::default();
        with_deadline(opts, async { api.delete(name, &dp).await.map_err(Error::from) }).await?;
        Ok(())
    }
}
