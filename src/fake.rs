//! In-memory cluster used by the unit tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::StreamExt;
use json_patch::Patch;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, Time};
use serde_json::{Value, json};

use crate::{
    apis::{
        ChildStatusReference, Condition, GROUP, Param, PipelineRunTaskRunStatus, TimeoutFields,
        v1beta1,
    },
    discover::{ApiGroupResources, Discover, GroupVersionResources, ServedResource},
    dynamic::{Unstructured, UnstructuredList},
    error::{Error, Result},
    gateway::{CallOptions, DynamicGateway, EventKind, EventStream, ListOptions, WatchEvent},
};

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    preferred: Option<String>,
    versions: Vec<String>,
    objects: BTreeMap<ObjectKey, Unstructured>,
    discovery_requests: usize,
    created: Vec<Unstructured>,
    patch_attempts: usize,
    patches: Vec<Value>,
    next_resource_version: u64,
}

#[derive(Clone, Default)]
pub(crate) struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    /// A cluster serving `tekton.dev` at `versions`, preferring the first one.
    pub fn serving(versions: &[&str]) -> Self {
        let cluster = Self::default();
        {
            let mut state = cluster.state.lock().unwrap();
            state.preferred = versions.first().map(|v| v.to_string());
            state.versions = versions.iter().map(|v| v.to_string()).collect();
        }
        cluster
    }

    pub fn insert(&self, resource: &str, namespace: &str, obj: Unstructured) {
        let key = (resource.to_string(), namespace.to_string(), obj.name().to_string());
        self.state.lock().unwrap().objects.insert(key, obj);
    }

    pub fn discovery_requests(&self) -> usize {
        self.state.lock().unwrap().discovery_requests
    }

    /// Objects exactly as they were sent to `create`.
    pub fn created(&self) -> Vec<Unstructured> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn patch_attempts(&self) -> usize {
        self.state.lock().unwrap().patch_attempts
    }

    pub fn patches(&self) -> Vec<Value> {
        self.state.lock().unwrap().patches.clone()
    }
}

fn key(served: &ServedResource, namespace: &str, name: &str) -> ObjectKey {
    (served.resource.clone(), namespace.to_string(), name.to_string())
}

fn not_found(served: &ServedResource, name: &str) -> Error {
    Error::NotFound(format!("{}.{} \"{name}\" not found", served.resource, served.group))
}

fn api_resource(name: &str, kind: &str) -> APIResource {
    APIResource {
        name: name.to_string(),
        kind: kind.to_string(),
        namespaced: true,
        singular_name: kind.to_lowercase(),
        verbs: vec!["get".to_string(), "list".to_string(), "create".to_string()],
        ..Default::default()
    }
}

/// The `tekton.dev` group document for `versions`.
pub(crate) fn api_group(preferred: Option<&str>, versions: &[&str]) -> ApiGroupResources {
    ApiGroupResources {
        name: GROUP.to_string(),
        preferred_version: preferred.map(str::to_string),
        versions: versions
            .iter()
            .map(|version| {
                let mut resources = vec![
                    api_resource("pipelineruns", "PipelineRun"),
                    api_resource("taskruns", "TaskRun"),
                    api_resource("customruns", "CustomRun"),
                ];
                if *version == "v1alpha1" {
                    resources.push(api_resource("pipelineresources", "PipelineResource"));
                    resources.push(api_resource("runs", "Run"));
                }
                GroupVersionResources {
                    version: version.to_string(),
                    resources,
                }
            })
            .collect(),
    }
}

#[async_trait]
impl Discover for FakeCluster {
    async fn api_group(&self, group: &str) -> Result<Option<ApiGroupResources>> {
        let mut state = self.state.lock().unwrap();
        state.discovery_requests += 1;
        if group != GROUP {
            return Ok(None);
        }
        let versions: Vec<&str> = state.versions.iter().map(String::as_str).collect();
        Ok(Some(api_group(state.preferred.as_deref(), &versions)))
    }
}

#[async_trait]
impl DynamicGateway for FakeCluster {
    async fn get(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        opts.check()?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&key(served, namespace, name))
            .cloned()
            .ok_or_else(|| not_found(served, name))
    }

    async fn list(
        &self,
        served: &ServedResource,
        namespace: &str,
        _list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<UnstructuredList> {
        opts.check()?;
        let state = self.state.lock().unwrap();
        let items = state
            .objects
            .iter()
            .filter(|((resource, ns, _), _)| *resource == served.resource && ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect();
        Ok(UnstructuredList {
            items,
            ..Default::default()
        })
    }

    async fn create(
        &self,
        served: &ServedResource,
        namespace: &str,
        obj: &Unstructured,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        opts.check()?;
        let mut state = self.state.lock().unwrap();
        state.created.push(obj.clone());
        let key = key(served, namespace, obj.name());
        if state.objects.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "{}.{} \"{}\" already exists",
                served.resource,
                served.group,
                obj.name()
            )));
        }

        state.next_resource_version += 1;
        let mut stored = obj.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.next_resource_version.to_string());
        stored.metadata.uid = Some(format!("uid-{}", state.next_resource_version));
        stored.metadata.creation_timestamp = Some(time("2024-03-01T12:00:00Z"));
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn patch(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        patch: &Patch,
        opts: &CallOptions,
    ) -> Result<Unstructured> {
        opts.check()?;
        let mut state = self.state.lock().unwrap();
        state.patch_attempts += 1;
        let key = key(served, namespace, name);
        let Some(current) = state.objects.get(&key) else {
            return Err(not_found(served, name));
        };

        let mut doc = serde_json::to_value(current).map_err(Error::shape)?;
        json_patch::patch(&mut doc, &patch.0).map_err(|err| Error::Invalid(err.to_string()))?;
        let patched: Unstructured = serde_json::from_value(doc).map_err(Error::shape)?;
        let recorded = serde_json::to_value(patch).map_err(Error::shape)?;
        state.patches.push(recorded);
        state.objects.insert(key, patched.clone());
        Ok(patched)
    }

    async fn watch(
        &self,
        served: &ServedResource,
        namespace: &str,
        list: &ListOptions,
        opts: &CallOptions,
    ) -> Result<EventStream> {
        let current = self.list(served, namespace, list, opts).await?;
        let events = current.items.into_iter().map(|object| {
            Ok(WatchEvent {
                kind: EventKind::Added,
                object,
            })
        });
        Ok(futures::stream::iter(events.collect::<Vec<_>>()).boxed())
    }

    async fn delete(
        &self,
        served: &ServedResource,
        namespace: &str,
        name: &str,
        opts: &CallOptions,
    ) -> Result<()> {
        opts.check()?;
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .remove(&key(served, namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(served, name))
    }
}

pub(crate) fn time(rfc3339: &str) -> Time {
    Time(rfc3339.parse().unwrap())
}

/// A pipeline run exercising every renamed field.
pub(crate) fn v1beta1_pipelinerun(name: &str) -> v1beta1::PipelineRun {
    let mut pr = v1beta1::PipelineRun::new(name);
    pr.metadata.namespace = Some("ci".to_string());
    pr.metadata.labels = Some(BTreeMap::from([(
        "tekton.dev/pipeline".to_string(),
        "build".to_string(),
    )]));
    pr.spec = v1beta1::PipelineRunSpec {
        pipeline_ref: Some(v1beta1::PipelineRef {
            name: Some("build".to_string()),
            ..Default::default()
        }),
        params: vec![
            Param {
                name: "revision".to_string(),
                value: json!("main"),
            },
            Param {
                name: "flags".to_string(),
                value: json!(["-v", "--race"]),
            },
        ],
        service_account_name: Some("builder".to_string()),
        timeouts: Some(TimeoutFields {
            pipeline: Some("1h0m0s".to_string()),
            ..Default::default()
        }),
        pod_template: Some(json!({"nodeSelector": {"disk": "ssd"}})),
        workspaces: vec![json!({"name": "shared", "emptyDir": {}})],
        task_run_specs: vec![v1beta1::PipelineTaskRunSpec {
            pipeline_task_name: "deploy".to_string(),
            task_service_account_name: Some("deployer".to_string()),
            step_overrides: vec![json!({
                "name": "build",
                "resources": {"limits": {"memory": "1Gi"}},
            })],
            ..Default::default()
        }],
        ..Default::default()
    };
    pr.status = Some(v1beta1::PipelineRunStatus {
        conditions: vec![Condition {
            type_: "Succeeded".to_string(),
            status: "Unknown".to_string(),
            reason: Some("Running".to_string()),
            ..Default::default()
        }],
        start_time: Some(time("2024-03-01T11:00:00Z")),
        task_runs: BTreeMap::from([(
            format!("{name}-fetch"),
            PipelineRunTaskRunStatus {
                pipeline_task_name: "fetch".to_string(),
                ..Default::default()
            },
        )]),
        child_references: vec![ChildStatusReference {
            api_version: "tekton.dev/v1".to_string(),
            kind: "TaskRun".to_string(),
            name: format!("{name}-fetch"),
            pipeline_task_name: "fetch".to_string(),
            ..Default::default()
        }],
        pipeline_results: vec![json!({"name": "digest", "value": "sha256:abc"})],
        ..Default::default()
    });
    pr
}

/// A stored pipeline run object at `api_version` with the given times.
pub(crate) fn pipelinerun_object(
    api_version: &str,
    name: &str,
    start_time: Option<&str>,
    children: &[(&str, &str)],
) -> Unstructured {
    let child_references: Vec<Value> = children
        .iter()
        .map(|(kind, child)| {
            json!({
                "apiVersion": "tekton.dev/v1",
                "kind": kind,
                "name": child,
                "pipelineTaskName": child.rsplit('-').next().unwrap_or_default(),
            })
        })
        .collect();
    let mut status = json!({ "childReferences": child_references });
    if let Some(start_time) = start_time {
        status["startTime"] = json!(start_time);
    }
    serde_json::from_value(json!({
        "apiVersion": api_version,
        "kind": "PipelineRun",
        "metadata": {
            "name": name,
            "namespace": "ci",
            "creationTimestamp": "2024-03-01T10:00:00Z",
            "resourceVersion": "1",
        },
        "spec": {"pipelineRef": {"name": "build"}},
        "status": status,
    }))
    .unwrap()
}

pub(crate) fn taskrun_object(name: &str, pod: &str) -> Unstructured {
    serde_json::from_value(json!({
        "apiVersion": "tekton.dev/v1",
        "kind": "TaskRun",
        "metadata": {"name": name, "namespace": "ci"},
        "spec": {"taskRef": {"name": "git-clone"}},
        "status": {
            "podName": pod,
            "startTime": "2024-03-01T11:00:00Z",
            "completionTime": "2024-03-01T11:02:00Z",
            "conditions": [{"type": "Succeeded", "status": "True", "reason": "Succeeded"}],
            "steps": [{"name": "clone", "container": "step-clone", "terminated": {"exitCode": 0}}],
            "taskSpec": {"steps": []},
        },
    }))
    .unwrap()
}

pub(crate) fn customrun_object(name: &str) -> Unstructured {
    serde_json::from_value(json!({
        "apiVersion": "tekton.dev/v1beta1",
        "kind": "CustomRun",
        "metadata": {"name": name, "namespace": "ci"},
        "status": {
            "startTime": "2024-03-01T11:00:00Z",
            "conditions": [{"type": "Succeeded", "status": "Unknown"}],
            "extraFields": {"attempt": 1},
        },
    }))
    .unwrap()
}
