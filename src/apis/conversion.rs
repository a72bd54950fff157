//! Conversion between the `v1beta1` and `v1` shapes of a pipeline run.
//!
//! `v1beta1` is the hub the rest of the client works with. Fields that
//! `v1` cannot represent travel in the [`RESOURCES_ANNOTATION`] annotation
//! and are restored (and the annotation stripped) on the way back.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use serde_json::Value;

use super::{v1, v1beta1};
use crate::{
    dynamic::TypedShape,
    error::{Error, Result},
};

/// Holds the JSON of `v1beta1` `spec.resources` on a `v1` object.
pub const RESOURCES_ANNOTATION: &str = "tekton.dev/v1beta1Resources";

/// Step and sidecar overrides carry their limits under `resources` in
/// `v1beta1` and under `computeResources` in `v1`.
const OVERRIDE_RESOURCES: &str = "resources";
const SPEC_COMPUTE_RESOURCES: &str = "computeResources";

fn stash(meta: &mut ObjectMeta, key: &str, value: String) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value);
}

fn unstash(meta: &mut ObjectMeta, key: &str) -> Option<String> {
    let annotations = meta.annotations.as_mut()?;
    let value = annotations.remove(key);
    if value.is_some() && annotations.is_empty() {
        meta.annotations = None;
    }
    value
}

fn rename_key(entries: &[Value], from: &str, to: &str) -> Vec<Value> {
    entries
        .iter()
        .cloned()
        .map(|mut entry| {
            if let Some(fields) = entry.as_object_mut() {
                if let Some(value) = fields.remove(from) {
                    fields.insert(to.to_string(), value);
                }
            }
            entry
        })
        .collect()
}

impl v1beta1::PipelineRun {
    /// Convert into the `v1` shape.
    pub fn convert_to(&self) -> Result<v1::PipelineRun> {
        let mut metadata = self.metadata.clone();
        if !self.spec.resources.is_empty() {
            let resources = serde_json::to_string(&self.spec.resources).map_err(Error::shape)?;
            stash(&mut metadata, RESOURCES_ANNOTATION, resources);
        }

        Ok(v1::PipelineRun {
            api_version: v1::PipelineRun::API_VERSION.to_string(),
            kind: v1::PipelineRun::KIND.to_string(),
            metadata,
            spec: self.spec.convert_to(),
            status: self.status.as_ref().map(v1beta1::PipelineRunStatus::convert_to),
        })
    }

    /// Build the `v1beta1` shape from a `v1` object.
    pub fn convert_from(source: &v1::PipelineRun) -> Result<Self> {
        let mut metadata = source.metadata.clone();
        let mut spec = v1beta1::PipelineRunSpec::convert_from(&source.spec);
        if let Some(resources) = unstash(&mut metadata, RESOURCES_ANNOTATION) {
            spec.resources = serde_json::from_str(&resources).map_err(|err| {
                Error::ShapeMismatch(format!("annotation {RESOURCES_ANNOTATION}: {err}"))
            })?;
        }

        Ok(Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata,
            spec,
            status: source
                .status
                .as_ref()
                .map(v1beta1::PipelineRunStatus::convert_from),
        })
    }
}

impl v1beta1::PipelineRunSpec {
    fn convert_to(&self) -> v1::PipelineRunSpec {
        let task_run_template = (self.service_account_name.is_some()
            || self.pod_template.is_some())
        .then(|| v1::PipelineTaskRunTemplate {
            pod_template: self.pod_template.clone(),
            service_account_name: self.service_account_name.clone(),
        });

        v1::PipelineRunSpec {
            pipeline_ref: self.pipeline_ref.as_ref().map(|r| v1::PipelineRef {
                name: r.name.clone(),
                api_version: r.api_version.clone(),
                resolver: r.resolver.clone(),
                params: r.params.clone(),
            }),
            pipeline_spec: self.pipeline_spec.clone(),
            params: self.params.clone(),
            status: self.status.clone(),
            timeouts: self.timeouts.clone(),
            task_run_template,
            workspaces: self.workspaces.clone(),
            task_run_specs: self
                .task_run_specs
                .iter()
                .map(|spec| v1::PipelineTaskRunSpec {
                    pipeline_task_name: spec.pipeline_task_name.clone(),
                    service_account_name: spec.task_service_account_name.clone(),
                    pod_template: spec.task_pod_template.clone(),
                    step_specs: rename_key(
                        &spec.step_overrides,
                        OVERRIDE_RESOURCES,
                        SPEC_COMPUTE_RESOURCES,
                    ),
                    sidecar_specs: rename_key(
                        &spec.sidecar_overrides,
                        OVERRIDE_RESOURCES,
                        SPEC_COMPUTE_RESOURCES,
                    ),
                    metadata: spec.metadata.clone(),
                    compute_resources: spec.compute_resources.clone(),
                })
                .collect(),
        }
    }

    fn convert_from(source: &v1::PipelineRunSpec) -> Self {
        let template = source.task_run_template.clone().unwrap_or_default();

        Self {
            pipeline_ref: source.pipeline_ref.as_ref().map(|r| v1beta1::PipelineRef {
                name: r.name.clone(),
                api_version: r.api_version.clone(),
                resolver: r.resolver.clone(),
                params: r.params.clone(),
            }),
            pipeline_spec: source.pipeline_spec.clone(),
            resources: Vec::new(),
            params: source.params.clone(),
            service_account_name: template.service_account_name,
            status: source.status.clone(),
            timeouts: source.timeouts.clone(),
            pod_template: template.pod_template,
            workspaces: source.workspaces.clone(),
            task_run_specs: source
                .task_run_specs
                .iter()
                .map(|spec| v1beta1::PipelineTaskRunSpec {
                    pipeline_task_name: spec.pipeline_task_name.clone(),
                    task_service_account_name: spec.service_account_name.clone(),
                    task_pod_template: spec.pod_template.clone(),
                    step_overrides: rename_key(
                        &spec.step_specs,
                        SPEC_COMPUTE_RESOURCES,
                        OVERRIDE_RESOURCES,
                    ),
                    sidecar_overrides: rename_key(
                        &spec.sidecar_specs,
                        SPEC_COMPUTE_RESOURCES,
                        OVERRIDE_RESOURCES,
                    ),
                    metadata: spec.metadata.clone(),
                    compute_resources: spec.compute_resources.clone(),
                })
                .collect(),
        }
    }
}

impl v1beta1::PipelineRunStatus {
    fn convert_to(&self) -> v1::PipelineRunStatus {
        v1::PipelineRunStatus {
            conditions: self.conditions.clone(),
            start_time: self.start_time.clone(),
            completion_time: self.completion_time.clone(),
            task_runs: self.task_runs.clone(),
            runs: self.runs.clone(),
            child_references: self.child_references.clone(),
            pipeline_spec: self.pipeline_spec.clone(),
            results: self.pipeline_results.clone(),
            skipped_tasks: self.skipped_tasks.clone(),
        }
    }

    fn convert_from(source: &v1::PipelineRunStatus) -> Self {
        Self {
            conditions: source.conditions.clone(),
            start_time: source.start_time.clone(),
            completion_time: source.completion_time.clone(),
            task_runs: source.task_runs.clone(),
            runs: source.runs.clone(),
            child_references: source.child_references.clone(),
            pipeline_spec: source.pipeline_spec.clone(),
            pipeline_results: source.results.clone(),
            skipped_tasks: source.skipped_tasks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        apis::{
            ChildStatusReference, Param, PipelineRunRunStatus, PipelineRunTaskRunStatus,
            RunStatus, TaskRunStatus,
            v1beta1::{PipelineResourceBinding, PipelineResourceRef},
        },
        dynamic::{from_unstructured, to_unstructured},
        fake,
    };

    fn binding(name: &str) -> PipelineResourceBinding {
        PipelineResourceBinding {
            name: name.to_string(),
            resource_ref: Some(PipelineResourceRef {
                name: format!("{name}-ref"),
                api_version: Some("tekton.dev/v1alpha1".to_string()),
            }),
            resource_spec: None,
        }
    }

    /// One run per modelled field group, plus annotation edge cases.
    fn runs() -> Vec<(&'static str, v1beta1::PipelineRun)> {
        let mut cases = vec![
            ("bare", v1beta1::PipelineRun::new("bare")),
            ("full", fake::v1beta1_pipelinerun("full")),
        ];

        let mut pr = v1beta1::PipelineRun::new("empty-annotations");
        pr.metadata.annotations = Some(BTreeMap::new());
        cases.push(("empty annotations", pr));

        let mut pr = v1beta1::PipelineRun::new("annotated");
        pr.metadata.annotations = Some(BTreeMap::from([("owner".to_string(), "team-a".to_string())]));
        cases.push(("annotations without resources", pr));

        let mut pr = v1beta1::PipelineRun::new("resources");
        pr.spec.resources = vec![binding("source"), binding("image")];
        cases.push(("resources only", pr));

        let mut pr = v1beta1::PipelineRun::new("resources-annotated");
        pr.metadata.annotations = Some(BTreeMap::from([("owner".to_string(), "team-b".to_string())]));
        pr.spec.resources = vec![PipelineResourceBinding {
            name: "inline".to_string(),
            resource_ref: None,
            resource_spec: Some(json!({"type": "git", "params": [{"name": "url", "value": "https://x"}]})),
        }];
        cases.push(("resources with annotations", pr));

        let mut pr = v1beta1::PipelineRun::new("resolved");
        pr.spec.pipeline_ref = Some(v1beta1::PipelineRef {
            name: None,
            api_version: None,
            resolver: Some("git".to_string()),
            params: vec![
                Param {
                    name: "url".to_string(),
                    value: json!("https://github.com/tektoncd/catalog"),
                },
                Param {
                    name: "pathInRepo".to_string(),
                    value: json!("pipeline/build/0.1/build.yaml"),
                },
            ],
        });
        cases.push(("pipelineRef resolver and params", pr));

        let mut pr = v1beta1::PipelineRun::new("overrides");
        pr.spec.task_run_specs = vec![
            v1beta1::PipelineTaskRunSpec {
                pipeline_task_name: "build".to_string(),
                task_pod_template: Some(json!({"securityContext": {"runAsNonRoot": true}})),
                step_overrides: vec![
                    json!({"name": "compile", "resources": {"limits": {"memory": "1Gi"}}}),
                    json!({"name": "lint"}),
                ],
                sidecar_overrides: vec![json!({
                    "name": "docker",
                    "resources": {"requests": {"cpu": "500m"}},
                })],
                metadata: Some(json!({"labels": {"tier": "build"}})),
                compute_resources: Some(json!({"limits": {"cpu": "2"}})),
                ..Default::default()
            },
            v1beta1::PipelineTaskRunSpec {
                pipeline_task_name: "test".to_string(),
                task_service_account_name: Some("tester".to_string()),
                ..Default::default()
            },
        ];
        cases.push(("step and sidecar overrides", pr));

        let mut pr = v1beta1::PipelineRun::new("cancelled");
        pr.spec.status = Some("CancelledRunFinally".to_string());
        pr.spec.pipeline_spec = Some(json!({"tasks": [{"name": "build", "taskRef": {"name": "kaniko"}}]}));
        pr.status = Some(v1beta1::PipelineRunStatus {
            start_time: Some(fake::time("2024-03-01T11:00:00Z")),
            completion_time: Some(fake::time("2024-03-01T11:05:00Z")),
            task_runs: BTreeMap::from([(
                "cancelled-build".to_string(),
                PipelineRunTaskRunStatus {
                    pipeline_task_name: "build".to_string(),
                    status: Some(TaskRunStatus {
                        pod_name: Some("cancelled-build-pod".to_string()),
                        ..Default::default()
                    }),
                    when_expressions: Vec::new(),
                },
            )]),
            runs: BTreeMap::from([(
                "cancelled-approve".to_string(),
                PipelineRunRunStatus {
                    pipeline_task_name: "approve".to_string(),
                    status: Some(RunStatus {
                        extra_fields: Some(json!({"attempt": 2})),
                        ..Default::default()
                    }),
                    when_expressions: vec![json!({"input": "a", "operator": "in", "values": ["a"]})],
                },
            )]),
            child_references: vec![ChildStatusReference {
                api_version: "tekton.dev/v1".to_string(),
                kind: "TaskRun".to_string(),
                name: "cancelled-build".to_string(),
                pipeline_task_name: "build".to_string(),
                ..Default::default()
            }],
            skipped_tasks: vec![json!({"name": "notify", "reason": "PipelineRun was cancelled"})],
            ..Default::default()
        });
        cases.push(("status with children", pr));

        cases
    }

    #[test]
    fn every_case_round_trips() {
        for (case, pr) in runs() {
            let converted = pr.convert_to().unwrap();
            assert_eq!(converted.api_version, "tekton.dev/v1", "{case}");
            let back = v1beta1::PipelineRun::convert_from(&converted).unwrap();
            assert_eq!(back, pr, "{case}");
        }
    }

    #[test]
    fn every_case_survives_the_cluster_in_v1_form() {
        for (case, pr) in runs() {
            let converted = pr.convert_to().unwrap();
            let obj = to_unstructured(&converted).unwrap();
            let from_cluster: v1::PipelineRun = from_unstructured(&obj).unwrap();
            assert_eq!(from_cluster, converted, "{case}");
            let back = v1beta1::PipelineRun::convert_from(&from_cluster).unwrap();
            assert_eq!(back, pr, "{case}");
        }
    }

    #[test]
    fn override_resources_become_compute_resources() {
        let (_, pr) = runs()
            .into_iter()
            .find(|(case, _)| *case == "step and sidecar overrides")
            .unwrap();
        let converted = pr.convert_to().unwrap();
        let build = &converted.spec.task_run_specs[0];

        assert_eq!(build.step_specs, vec![
            json!({"name": "compile", "computeResources": {"limits": {"memory": "1Gi"}}}),
            json!({"name": "lint"}),
        ]);
        assert_eq!(build.sidecar_specs, vec![json!({
            "name": "docker",
            "computeResources": {"requests": {"cpu": "500m"}},
        })]);

        let sent = to_unstructured(&converted).unwrap();
        let step = &sent.data["spec"]["taskRunSpecs"][0]["stepSpecs"][0];
        assert!(step.get("resources").is_none());
    }

    #[test]
    fn v1_step_specs_map_back_to_resources() {
        let mut pr = v1::PipelineRun::new("r1");
        pr.spec.task_run_specs = vec![v1::PipelineTaskRunSpec {
            pipeline_task_name: "build".to_string(),
            step_specs: vec![json!({"name": "compile", "computeResources": {"limits": {"cpu": "1"}}})],
            ..Default::default()
        }];

        let back = v1beta1::PipelineRun::convert_from(&pr).unwrap();
        assert_eq!(
            back.spec.task_run_specs[0].step_overrides,
            vec![json!({"name": "compile", "resources": {"limits": {"cpu": "1"}}})]
        );
    }

    #[test]
    fn round_trip_is_identity() {
        let mut pr = fake::v1beta1_pipelinerun("r1");
        pr.spec.resources = vec![PipelineResourceBinding {
            name: "source".to_string(),
            resource_ref: Some(PipelineResourceRef {
                name: "repo".to_string(),
                api_version: None,
            }),
            resource_spec: None,
        }];

        let converted = pr.convert_to().unwrap();
        let back = v1beta1::PipelineRun::convert_from(&converted).unwrap();
        assert_eq!(back, pr);
    }

    #[test]
    fn round_trip_without_template_fields_is_identity() {
        let pr = v1beta1::PipelineRun::new("bare");
        let back = v1beta1::PipelineRun::convert_from(&pr.convert_to().unwrap()).unwrap();
        assert_eq!(back, pr);
        assert!(pr.convert_to().unwrap().spec.task_run_template.is_none());
    }

    #[test]
    fn renames_fields_and_rewrites_type_meta() {
        let pr = fake::v1beta1_pipelinerun("r1");
        let converted = pr.convert_to().unwrap();

        assert_eq!(converted.api_version, "tekton.dev/v1");
        assert_eq!(converted.kind, "PipelineRun");
        let template = converted.spec.task_run_template.as_ref().unwrap();
        assert_eq!(template.service_account_name.as_deref(), Some("builder"));
        assert_eq!(template.pod_template, Some(json!({"nodeSelector": {"disk": "ssd"}})));

        let task_spec = &converted.spec.task_run_specs[0];
        assert_eq!(task_spec.service_account_name.as_deref(), Some("deployer"));
        assert_eq!(
            task_spec.step_specs,
            vec![json!({"name": "build", "computeResources": {"limits": {"memory": "1Gi"}}})]
        );

        let status = converted.status.as_ref().unwrap();
        assert_eq!(status.results, vec![json!({"name": "digest", "value": "sha256:abc"})]);
    }

    #[test]
    fn stashes_resources_in_annotation_and_strips_it_back() {
        let mut pr = v1beta1::PipelineRun::new("r1");
        pr.spec.resources = vec![PipelineResourceBinding {
            name: "image".to_string(),
            resource_ref: Some(PipelineResourceRef {
                name: "app-image".to_string(),
                api_version: None,
            }),
            resource_spec: None,
        }];

        let converted = pr.convert_to().unwrap();
        let annotations = converted.metadata.annotations.as_ref().unwrap();
        let stashed: serde_json::Value =
            serde_json::from_str(&annotations[RESOURCES_ANNOTATION]).unwrap();
        assert_eq!(stashed, json!([{"name": "image", "resourceRef": {"name": "app-image"}}]));

        let back = v1beta1::PipelineRun::convert_from(&converted).unwrap();
        assert!(back.metadata.annotations.is_none());
        assert_eq!(back.spec.resources, pr.spec.resources);
    }

    #[test]
    fn keeps_unrelated_annotations() {
        let mut pr = fake::v1beta1_pipelinerun("r1");
        pr.metadata.annotations = Some(BTreeMap::from([(
            "owner".to_string(),
            "team-a".to_string(),
        )]));
        pr.spec.resources = vec![PipelineResourceBinding {
            name: "src".to_string(),
            ..Default::default()
        }];

        let back = v1beta1::PipelineRun::convert_from(&pr.convert_to().unwrap()).unwrap();
        assert_eq!(back.metadata.annotations, pr.metadata.annotations);
    }

    #[test]
    fn corrupt_annotation_is_a_shape_mismatch() {
        let mut pr = v1::PipelineRun::new("r1");
        pr.metadata.annotations = Some(BTreeMap::from([(
            RESOURCES_ANNOTATION.to_string(),
            "not json".to_string(),
        )]));
        let err = v1beta1::PipelineRun::convert_from(&pr).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn v1_value_survives_unstructured_round_trip() {
        let pr = fake::v1beta1_pipelinerun("r1").convert_to().unwrap();
        let back: v1::PipelineRun = from_unstructured(&to_unstructured(&pr).unwrap()).unwrap();
        assert_eq!(back, pr);
    }
}
