use futures::{StreamExt, TryStreamExt, stream};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    Clients,
    apis::{
        ChildStatusReference, GROUP, PipelineRunRunStatus, PipelineRunTaskRunStatus, RunStatus,
        TaskRunStatus, v1beta1,
    },
    discover::{Discover, GroupResource},
    dynamic::Unstructured,
    error::{Error, Result},
    gateway::{CallOptions, DynamicGateway},
};

/// Upper bound on concurrent child fetches.
const CHILD_FETCH_CONCURRENCY: usize = 8;

enum ChildStatus {
    TaskRun(String, PipelineRunTaskRunStatus),
    Run(String, PipelineRunRunStatus),
}

fn child_resource(kind: &str) -> Option<GroupResource> {
    let resource = match kind {
        "TaskRun" => "taskruns",
        "CustomRun" => "customruns",
        "Run" => "runs",
        _ => return None,
    };
    Some(GroupResource::new(GROUP, resource))
}

fn status_of<T: DeserializeOwned>(obj: &Unstructured) -> Result<Option<T>> {
    obj.data
        .get("status")
        .map(|status| serde_json::from_value(status.clone()))
        .transpose()
        .map_err(|err| Error::ShapeMismatch(format!("status of {}: {err}", obj.name())))
}

async fn fetch_child<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    child: &ChildStatusReference,
    opts: &CallOptions,
) -> Result<Option<ChildStatus>> {
    let Some(gr) = child_resource(&child.kind) else {
        debug!(kind = %child.kind, name = %child.name, "skipping child of unknown kind");
        return Ok(None);
    };
    let served = match clients.discovery.resolve(&gr, opts).await {
        Ok(served) => served,
        Err(Error::NotServed { .. }) => {
            debug!(%gr, name = %child.name, "child resource no longer served");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let obj = match clients.gateway.get(&served, namespace, &child.name, opts).await {
        Ok(obj) => obj,
        Err(err) if err.is_not_found() => {
            debug!(%served, name = %child.name, "child no longer exists");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let status = if gr.resource == "taskruns" {
        ChildStatus::TaskRun(
            child.name.clone(),
            PipelineRunTaskRunStatus {
                pipeline_task_name: child.pipeline_task_name.clone(),
                status: status_of::<TaskRunStatus>(&obj)?,
                when_expressions: child.when_expressions.clone(),
            },
        )
    } else {
        ChildStatus::Run(
            child.name.clone(),
            PipelineRunRunStatus {
                pipeline_task_name: child.pipeline_task_name.clone(),
                status: status_of::<RunStatus>(&obj)?,
                when_expressions: child.when_expressions.clone(),
            },
        )
    };
    Ok(Some(status))
}

/// Return a copy of `pipelinerun` whose `status.taskRuns` and `status.runs`
/// hold the current status of every child listed in `status.childReferences`.
///
/// Children that no longer exist are left out, as are children whose
/// resource the cluster no longer serves. Runs without child
/// references are returned unchanged, keeping any embedded child statuses.
pub async fn populate_child_statuses<G: DynamicGateway, D: Discover>(
    clients: &Clients<G, D>,
    namespace: &str,
    pipelinerun: &v1beta1::PipelineRun,
    opts: &CallOptions,
) -> Result<v1beta1::PipelineRun> {
    let mut populated = pipelinerun.clone();
    let Some(status) = populated.status.as_mut() else {
        return Ok(populated);
    };
    if status.child_references.is_empty() {
        return Ok(populated);
    }

    let children: Vec<Option<ChildStatus>> = stream::iter(&status.child_references)
        .map(|child| fetch_child(clients, namespace, child, opts))
        .buffer_unordered(CHILD_FETCH_CONCURRENCY)
        .try_collect()
        .await?;

    status.task_runs.clear();
    status.runs.clear();
    for child in children.into_iter().flatten() {
        match child {
            ChildStatus::TaskRun(name, task_run) => {
                status.task_runs.insert(name, task_run);
            }
            ChildStatus::Run(name, run) => {
                status.runs.insert(name, run);
            }
        }
    }
    Ok(populated)
}
