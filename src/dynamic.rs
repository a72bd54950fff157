use std::borrow::Cow;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::{
    Resource,
    api::{ObjectMeta, TypeMeta},
    core::DynamicResourceScope,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    discover::ServedResource,
    error::{Error, Result},
};

/// Schema-agnostic object exchanged with the cluster.
///
/// Note about own `Unstructured` instead of `kube::api::DynamicObject`.
/// `kube::api::DynamicObject` is bound to `kube::api::ApiResource`,
/// while every call here is addressed by a [`ServedResource`] that came out of
/// discovery. Binding the dynamic type to the served coordinate lets
/// `Api::<Unstructured>::namespaced_with(client, ns, &served)` be built
/// without a second lookup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Unstructured {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys (`spec`, `status`, ...)
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl Default for Unstructured {
    fn default() -> Self {
        Self {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl Unstructured {
    pub fn api_version(&self) -> Option<&str> {
        self.types.as_ref().map(|types| types.api_version.as_str())
    }

    pub fn kind(&self) -> Option<&str> {
        self.types.as_ref().map(|types| types.kind.as_str())
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl Resource for Unstructured {
    type DynamicType = ServedResource;
    type Scope = DynamicResourceScope;

    fn group(dt: &ServedResource) -> Cow<'_, str> {
        dt.group.as_str().into()
    }

    fn version(dt: &ServedResource) -> Cow<'_, str> {
        dt.version.as_str().into()
    }

    fn kind(dt: &ServedResource) -> Cow<'_, str> {
        dt.kind.as_str().into()
    }

    fn api_version(dt: &ServedResource) -> Cow<'_, str> {
        dt.api_version().into()
    }

    fn plural(dt: &ServedResource) -> Cow<'_, str> {
        dt.resource.as_str().into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// A list of [`Unstructured`] objects as returned by a list call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct UnstructuredList {
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Unstructured>,
}

/// A typed object shape that can be moved through the unstructured pivot.
pub trait TypedShape: Serialize + DeserializeOwned {
    const API_VERSION: &'static str;
    const KIND: &'static str;
}

/// Convert a typed value into its unstructured form.
pub fn to_unstructured<T: TypedShape>(typed: &T) -> Result<Unstructured> {
    let value = serde_json::to_value(typed).map_err(Error::shape)?;
    serde_json::from_value(value).map_err(Error::shape)
}

/// Convert an unstructured object into the typed shape `T`.
///
/// Fields unknown to `T` are dropped and missing ones are left at their zero
/// value. An object that declares a different `apiVersion` or `kind` is
/// rejected with [`Error::ShapeMismatch`]; list items that carry no type
/// fields are accepted.
pub fn from_unstructured<T: TypedShape>(obj: &Unstructured) -> Result<T> {
    if let Some(types) = &obj.types {
        let api_version_ok = types.api_version.is_empty() || types.api_version == T::API_VERSION;
        let kind_ok = types.kind.is_empty() || types.kind == T::KIND;
        if !api_version_ok || !kind_ok {
            return Err(Error::ShapeMismatch(format!(
                "expected {}/{}, found {}/{}",
                T::API_VERSION,
                T::KIND,
                types.api_version,
                types.kind
            )));
        }
    }
    let value = serde_json::to_value(obj).map_err(Error::shape)?;
    serde_json::from_value(value).map_err(Error::shape)
}
