use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::dynamic::TypedShape;

pub const VERSION: &str = "v1alpha1";

pub const RESOURCE_TYPE_GIT: &str = "git";
pub const RESOURCE_TYPE_IMAGE: &str = "image";
pub const RESOURCE_TYPE_PULL_REQUEST: &str = "pullRequest";
pub const RESOURCE_TYPE_STORAGE: &str = "storage";

/// Input or output of a pipeline: a git repository, an image, a storage
/// bucket or a pull request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResource {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineResourceSpec,
}

impl TypedShape for PipelineResource {
    const API_VERSION: &'static str = "tekton.dev/v1alpha1";
    const KIND: &'static str = "PipelineResource";
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResourceSpec {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<ResourceParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretParam>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ResourceParam {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretParam {
    pub field_name: String,
    pub secret_key: String,
    pub secret_name: String,
}
