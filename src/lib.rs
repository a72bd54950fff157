#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use clap_complete;
pub use k8s_openapi;
pub use kube;

pub mod apis;
pub mod claputil;
pub use claputil::{context_value_completer, pipelinerun_value_completer};
pub mod clock;
pub mod discover;
pub mod dynamic;
pub mod error;
pub use error::{Error, Result};
pub mod gateway;
pub mod pipelinerun;
pub mod prompt;
pub mod resource;

#[cfg(test)]
pub(crate) mod fake;

use kube::{
    Client, Config,
    config::{KubeConfigOptions, Kubeconfig},
};

use crate::{
    discover::{Discover, DiscoverClient, DiscoveryCache},
    gateway::{DynamicGateway, KubeGateway},
};

/// Detects the Kubernetes context based on the provided `context` argument.
///
/// Context determination follows this priority:
/// 1. Uses the context if explicitly specified.
/// 2. Retrieves the current context from the kubeconfig file.
///
/// # Errors
/// Returns an error if the kubeconfig file cannot be read or if no current context is set in the kubeconfig.
pub fn determine_context(context: &Option<String>) -> anyhow::Result<String> {
    match context {
        Some(context) => Ok(context.to_string()),
        _ => {
            let kubeconfig = Kubeconfig::read()?;
            Ok(kubeconfig
                .current_context
                .ok_or_else(|| anyhow::anyhow!("current_context is not set"))?)
        }
    }
}

/// Determines the Kubernetes namespace based on the provided `namespace` and `context`.
///
/// Namespace determination follows this priority:
/// 1. Uses the namespace if explicitly specified.
/// 2. Retrieves the default namespace associated with the context from kubeconfig.
/// 3. Uses "default".
pub fn determine_namespace(namespace: Option<String>, context: &str) -> String {
    if let Some(ns) = namespace {
        return ns;
    }
    match Kubeconfig::read() {
        Ok(kubeconfig) => namespace_of(&kubeconfig, context),
        Err(_) => String::from("default"),
    }
}

fn namespace_of(kubeconfig: &Kubeconfig, context: &str) -> String {
    kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == context)
        .and_then(|named| named.context.as_ref())
        .and_then(|ctx| ctx.namespace.clone())
        .unwrap_or_else(|| String::from("default"))
}

/// The cluster access every operation runs against: a dynamic gateway and a
/// discovery cache shared by all calls made through this bundle.
pub struct Clients<G = KubeGateway, D = DiscoverClient> {
    pub gateway: G,
    pub discovery: DiscoveryCache<D>,
}

impl<G: DynamicGateway, D: Discover> Clients<G, D> {
    pub fn new(gateway: G, discover: D) -> Self {
        Self {
            gateway,
            discovery: DiscoveryCache::new(discover),
        }
    }
}

impl Clients {
    pub fn from_client(client: Client) -> Self {
        Self::new(KubeGateway::new(client.clone()), DiscoverClient::new(client))
    }

    /// Connect using the given kubeconfig context, or the current one.
    pub async fn from_context(context: Option<String>) -> anyhow::Result<Self> {
        let options = KubeConfigOptions {
            context,
            ..Default::default()
        };
        let config = Config::from_kubeconfig(&options).await?;
        Ok(Self::from_client(Client::try_from(config)?))
    }
}
