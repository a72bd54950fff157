//! Typed operations on `tekton.dev` pipeline runs.
//!
//! Callers always hand in and get back the `v1beta1` shape (except
//! [`cancel`], which returns `v1`), whatever version the cluster serves.

use json_patch::Patch;
use kube::api::TypeMeta;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    Clients,
    apis::{GROUP, v1, v1beta1},
    clock::{Clock, age},
    discover::{Discover, GroupResource, ServedResource},
    dynamic::{TypedShape, Unstructured, from_unstructured, to_unstructured},
    error::{Error, Result},
    gateway::{CallOptions, DynamicGateway, EventStream, ListOptions},
};

pub mod sort;
pub mod status;

pub use status::populate_child_statuses;

pub const RESOURCE: &str = "pipelineruns";

pub fn group_resource() -> GroupResource {
    GroupResource::new(GROUP, RESOURCE)
}

/// A pipeline run in whichever shape the cluster served it.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineRunVersion {
    V1(v1::PipelineRun),
    V1beta1(v1beta1::PipelineRun),
}

impl PipelineRunVersion {
    /// Decode `obj` by its `apiVersion`, falling back to the served version
    /// when the object carries none.
    pub fn from_unstructured(obj: &Unstructured, served: &ServedResource) -> Result<Self> {
        let api_version = match obj.api_version() {
            Some(api_version) if !api_version.is_empty() => api_version.to_string(),
            _ => served.api_version(),
        };
        if api_version == v1::PipelineRun::API_VERSION {
            Ok(Self::V1(from_unstructured(obj)?))
        } else if api_version == v1beta1::PipelineRun::API_VERSION {
            Ok(Self::V1beta1(from_unstructured(obj)?))
        } else {
            Err(Error::ShapeMismatch(format!(
                "unsupported PipelineRun version {api_version}"
            )))
        }
    }

    pub fn into_v1(self) -> Result<v1::PipelineRun> {
        match self {
            Self::V1(pr) => Ok(pr),
            Self::V1beta1(pr) => {
                debug!(name = %pr.metadata.name.as_deref().unwrap_or_default(), "converting v1beta1 to v1");
                pr.convert_to()
            }
        }
    }

    pub fn into_v1beta1(self) -> Result<v1beta1::PipelineRun> {
        match self {
            Self::V1(pr) => {
                debug!(name = %pr.metadata.name.as_deref().unwrap_or_default(), "converting v1 to v1beta1");
                v1beta1::PipelineRun::convert_from(&pr)
            }
            Self::V1beta1(pr) => Ok(pr),
        }
    }
}

async fn served<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    opts: &CallOptions,
) -> Result<ServedResource> {
    let served = clients.discovery.resolve(&group_resource(), opts).await?;
    if served.version != v1::VERSION && served.version != v1beta1::VERSION {
        return Err(Error::ShapeMismatch(format!(
            "unsupported PipelineRun version {}",
            served.api_version()
        )));
    }
    Ok(served)
}

/// Fetch a pipeline run with the statuses of its children filled in.
#[instrument(skip(clients, opts))]
pub async fn get<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    name: &str,
    opts: &CallOptions,
) -> Result<v1beta1::PipelineRun> {
    let served = served(clients, opts).await?;
    let obj = clients.gateway.get(&served, namespace, name, opts).await?;
    let pipelinerun = PipelineRunVersion::from_unstructured(&obj, &served)?.into_v1beta1()?;
    populate_child_statuses(clients, namespace, &pipelinerun, opts).await
}

/// List pipeline runs as `v1`, most recently started first.
///
/// A `limit` of zero or less returns every run.
#[instrument(skip(clients, list, opts))]
pub async fn list_pipelineruns<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    list: &ListOptions,
    limit: i64,
    opts: &CallOptions,
) -> Result<Vec<v1::PipelineRun>> {
    let served = served(clients, opts).await?;
    let items = clients.gateway.list(&served, namespace, list, opts).await?.items;
    let mut runs = items
        .iter()
        .map(|item| PipelineRunVersion::from_unstructured(item, &served)?.into_v1())
        .collect::<Result<Vec<_>>>()?;
    sort::sort_by_start_time(&mut runs);
    sort::truncate(&mut runs, limit);
    Ok(runs)
}

/// Render `"<name> started <age>"` for each run, in list order.
pub async fn get_all_pipelineruns<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    list: &ListOptions,
    limit: i64,
    clock: &dyn Clock,
    opts: &CallOptions,
) -> Result<Vec<String>> {
    let runs = list_pipelineruns(clients, namespace, list, limit, opts).await?;
    Ok(runs
        .iter()
        .map(|run| {
            let name = run.metadata.name.as_deref().unwrap_or_default();
            let started = run.status.as_ref().and_then(|s| s.start_time.as_ref());
            format!("{name} started {}", age(started, clock))
        })
        .collect())
}

/// Create a pipeline run at the served version and return it as `v1beta1`.
///
/// Any `status` on the given run is dropped before sending.
#[instrument(skip(clients, pipelinerun, opts), fields(name = %pipelinerun.metadata.name.as_deref().unwrap_or_default()))]
pub async fn create<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    pipelinerun: &v1beta1::PipelineRun,
    opts: &CallOptions,
) -> Result<v1beta1::PipelineRun> {
    let served = served(clients, opts).await?;
    let mut outgoing = pipelinerun.clone();
    outgoing.status = None;

    let mut obj = if served.version == v1::VERSION {
        let converted = PipelineRunVersion::V1beta1(outgoing).into_v1()?;
        to_unstructured(&converted)?
    } else {
        to_unstructured(&outgoing)?
    };
    obj.types = Some(TypeMeta {
        api_version: served.api_version(),
        kind: served.kind.clone(),
    });

    debug!(%served, "creating pipelinerun");
    let created = clients.gateway.create(&served, namespace, &obj, opts).await?;
    PipelineRunVersion::from_unstructured(&created, &served)?.into_v1beta1()
}

/// The JSON-Patch that asks the controller to stop a run.
pub fn cancel_patch(cancel_status: &str) -> Result<Patch> {
    serde_json::from_value(json!([
        { "op": "replace", "path": "/spec/status", "value": cancel_status }
    ]))
    .map_err(Error::shape)
}

/// Set `spec.status` to `cancel_status` (e.g. `Cancelled` or
/// `StoppedRunFinally`) and return the patched run as `v1`.
#[instrument(skip(clients, opts))]
pub async fn cancel<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    name: &str,
    cancel_status: &str,
    opts: &CallOptions,
) -> Result<v1::PipelineRun> {
    let served = served(clients, opts).await?;
    let patch = cancel_patch(cancel_status)?;
    let patched = clients.gateway.patch(&served, namespace, name, &patch, opts).await?;
    PipelineRunVersion::from_unstructured(&patched, &served)?.into_v1()
}

/// Watch pipeline runs; events carry objects exactly as served.
#[instrument(skip(clients, list, opts))]
pub async fn watch<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    list: &ListOptions,
    opts: &CallOptions,
) -> Result<EventStream> {
    let served = served(clients, opts).await?;
    clients.gateway.watch(&served, namespace, list, opts).await
}

#[instrument(skip(clients, opts))]
pub async fn delete<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    name: &str,
    opts: &CallOptions,
) -> Result<()> {
    let served = served(clients, opts).await?;
    clients.gateway.delete(&served, namespace, name, opts).await
}
