//! Interactive creation of `tekton.dev/v1alpha1` pipeline resources.

use kube::api::TypeMeta;
use tracing::{debug, instrument};

use crate::{
    Clients,
    apis::{
        GROUP,
        v1alpha1::{
            PipelineResource, RESOURCE_TYPE_GIT, RESOURCE_TYPE_IMAGE, RESOURCE_TYPE_PULL_REQUEST,
            RESOURCE_TYPE_STORAGE, ResourceParam,
        },
    },
    discover::{Discover, GroupResource},
    dynamic::{TypedShape, from_unstructured, to_unstructured},
    error::{Error, Result},
    gateway::{CallOptions, DynamicGateway},
    prompt::Prompt,
};

pub const RESOURCE: &str = "pipelineresources";

const STORAGE_TYPES: [&str; 2] = ["gcs", "build-gcs"];
const ARTIFACT_TYPES: [&str; 3] = ["ZipArchive", "TarGzArchive", "Manifest"];
const YES_NO: [&str; 2] = ["Yes", "No"];

pub fn group_resource() -> GroupResource {
    GroupResource::new(GROUP, RESOURCE)
}

/// Every resource type offered by the wizard, in the order shown.
pub fn resource_types() -> Vec<&'static str> {
    let mut types = vec![
        RESOURCE_TYPE_GIT,
        RESOURCE_TYPE_STORAGE,
        RESOURCE_TYPE_IMAGE,
        RESOURCE_TYPE_PULL_REQUEST,
    ];
    types.sort_unstable();
    types
}

impl PipelineResource {
    pub fn created_message(&self) -> String {
        format!(
            "New {} resource \"{}\" has been created",
            self.spec.type_,
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

fn ask_param(prompt: &mut dyn Prompt, name: &str, params: &mut Vec<ResourceParam>) -> Result<()> {
    let value = prompt.ask_string(&format!("Enter a value for {name} : "))?;
    if !value.is_empty() {
        params.push(ResourceParam {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

/// Asks for the fields of a new pipeline resource and creates it.
pub struct ResourceWizard<'a, G, D> {
    clients: &'a Clients<G, D>,
    namespace: String,
    opts: CallOptions,
}

impl<'a, G: DynamicGateway, D: Discover> ResourceWizard<'a, G, D> {
    pub fn new(clients: &'a Clients<G, D>, namespace: &str) -> Self {
        Self {
            clients,
            namespace: namespace.to_string(),
            opts: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: CallOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Ask every question, then create the resource.
    pub async fn run(&self, prompt: &mut dyn Prompt) -> Result<PipelineResource> {
        let resource = self.ask(prompt).await?;
        self.create(&resource).await
    }

    /// Ask every question without creating anything.
    pub async fn ask(&self, prompt: &mut dyn Prompt) -> Result<PipelineResource> {
        let name = self.ask_name(prompt).await?;
        let mut resource = PipelineResource {
            api_version: PipelineResource::API_VERSION.to_string(),
            kind: PipelineResource::KIND.to_string(),
            ..Default::default()
        };
        resource.metadata.name = Some(name);
        resource.metadata.namespace = Some(self.namespace.clone());

        let type_ = prompt.ask_select("Select a resource type to create :", &resource_types())?;
        let spec = &mut resource.spec;
        match type_.as_str() {
            RESOURCE_TYPE_GIT => {
                ask_param(prompt, "url", &mut spec.params)?;
                ask_param(prompt, "revision", &mut spec.params)?;
            }
            RESOURCE_TYPE_IMAGE => {
                ask_param(prompt, "url", &mut spec.params)?;
                ask_param(prompt, "digest", &mut spec.params)?;
            }
            RESOURCE_TYPE_PULL_REQUEST => {
                ask_param(prompt, "url", &mut spec.params)?;
                let answer = prompt.ask_select("Do you want to set secrets ?", &YES_NO)?;
                if answer == YES_NO[0] {
                    spec.secrets.push(prompt.ask_secret("githubToken")?);
                }
            }
            RESOURCE_TYPE_STORAGE => {
                let storage = prompt.ask_select("Select a storage type", &STORAGE_TYPES)?;
                spec.params.push(ResourceParam {
                    name: "type".to_string(),
                    value: storage.clone(),
                });
                ask_param(prompt, "location", &mut spec.params)?;
                if storage == "gcs" {
                    ask_param(prompt, "dir", &mut spec.params)?;
                } else {
                    let artifact = prompt.ask_select("Select an artifact type", &ARTIFACT_TYPES)?;
                    spec.params.push(ResourceParam {
                        name: "artifactType".to_string(),
                        value: artifact,
                    });
                }
                spec.secrets
                    .push(prompt.ask_secret("GOOGLE_APPLICATION_CREDENTIALS")?);
            }
            other => return Err(Error::Invalid(format!("unknown resource type {other}"))),
        }
        spec.type_ = type_;
        Ok(resource)
    }

    async fn ask_name(&self, prompt: &mut dyn Prompt) -> Result<String> {
        let name = prompt.ask_string("Enter a name for a pipeline resource :")?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Invalid("a name for the pipeline resource is required".to_string()));
        }

        let served = self.clients.discovery.resolve(&group_resource(), &self.opts).await?;
        match self
            .clients
            .gateway
            .get(&served, &self.namespace, &name, &self.opts)
            .await
        {
            Ok(_) => Err(Error::AlreadyExists(name)),
            Err(err) if err.is_not_found() => Ok(name),
            Err(err) => Err(err),
        }
    }

    /// Create `resource` at the served version.
    #[instrument(skip(self, resource), fields(namespace = %self.namespace))]
    pub async fn create(&self, resource: &PipelineResource) -> Result<PipelineResource> {
        let served = self.clients.discovery.resolve(&group_resource(), &self.opts).await?;
        let mut obj = to_unstructured(resource)?;
        obj.types = Some(TypeMeta {
            api_version: served.api_version(),
            kind: served.kind.clone(),
        });
        debug!(%served, name = %obj.name(), "creating pipeline resource");
        let created = self
            .clients
            .gateway
            .create(&served, &self.namespace, &obj, &self.opts)
            .await?;
        from_unstructured(&created)
    }
}
