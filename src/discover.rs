use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::{
    error::{Error, Result},
    gateway::{CallOptions, with_deadline},
};

pub mod client;
pub use client::DiscoverClient;

/// Logical coordinate of a resource kind, without a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// A `(group, version, resource)` confirmed by discovery to be served.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServedResource {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

impl ServedResource {
    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for ServedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Resources served by one version of an API group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupVersionResources {
    pub version: String,
    pub resources: Vec<APIResource>,
}

/// The advertised surface of one API group.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiGroupResources {
    pub name: String,
    pub preferred_version: Option<String>,
    pub versions: Vec<GroupVersionResources>,
}

impl ApiGroupResources {
    /// Pick the served version of `resource`.
    ///
    /// The preferred version wins when it serves the resource; otherwise the
    /// version with the highest Kubernetes priority is chosen.
    pub fn select(&self, resource: &str) -> Option<ServedResource> {
        let candidates = self.versions.iter().filter_map(|gv| {
            gv.resources
                .iter()
                .find(|api_resource| api_resource.name == resource)
                .map(|api_resource| (gv.version.as_str(), api_resource))
        });

        let preferred = self.preferred_version.as_deref();
        let (version, api_resource) = candidates.max_by(|(a, _), (b, _)| {
            (Some(*a) == preferred)
                .cmp(&(Some(*b) == preferred))
                .then_with(|| compare_versions(a, b))
        })?;

        Some(ServedResource {
            group: self.name.clone(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: api_resource.kind.clone(),
            namespaced: api_resource.namespaced,
        })
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stability {
    Nonconformant,
    Alpha,
    Beta,
    Stable,
}

fn parse_version(version: &str) -> Option<(u32, Stability, u32)> {
    let rest = version.strip_prefix('v')?;
    let digits = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
    let major = rest[..digits].parse().ok()?;
    let rest = &rest[digits..];
    if rest.is_empty() {
        return Some((major, Stability::Stable, 0));
    }
    let (stability, minor) = if let Some(minor) = rest.strip_prefix("beta") {
        (Stability::Beta, minor)
    } else if let Some(minor) = rest.strip_prefix("alpha") {
        (Stability::Alpha, minor)
    } else {
        return None;
    };
    Some((major, stability, minor.parse().ok()?))
}

/// Order API versions by Kubernetes priority; the greater version is preferred.
///
/// GA beats beta beats alpha, then the higher major and the higher minor
/// win. Versions that do not follow the `vX[(alpha|beta)Y]` form rank
/// lowest and compare in reverse lexicographic order, so that the
/// lexicographically smallest one is the greatest among them.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some((a_major, a_stab, a_minor)), Some((b_major, b_stab, b_minor))) => a_stab
            .cmp(&b_stab)
            .then(a_major.cmp(&b_major))
            .then(a_minor.cmp(&b_minor)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => b.cmp(a),
    }
}

/// Source of API group documents.
#[async_trait]
pub trait Discover: Send + Sync {
    /// Fetch the advertised surface of `group`; `None` when the group is unknown.
    async fn api_group(&self, group: &str) -> Result<Option<ApiGroupResources>>;
}

/// Process-wide cache of discovered API groups.
///
/// Lookups share a read lock; misses are resolved by a single writer so that
/// concurrent callers trigger one discovery request per group.
pub struct DiscoveryCache<D> {
    discover: D,
    groups: RwLock<HashMap<String, Arc<ApiGroupResources>>>,
    resolving: Mutex<()>,
}

impl<D: Discover> DiscoveryCache<D> {
    pub fn new(discover: D) -> Self {
        Self {
            discover,
            groups: RwLock::new(HashMap::new()),
            resolving: Mutex::new(()),
        }
    }

    pub fn discover(&self) -> &D {
        &self.discover
    }

    async fn cached(&self, gr: &GroupResource) -> Option<ServedResource> {
        let groups = self.groups.read().await;
        groups.get(&gr.group)?.select(&gr.resource)
    }

    /// Resolve the served coordinate of `gr`.
    pub async fn resolve(&self, gr: &GroupResource, opts: &CallOptions) -> Result<ServedResource> {
        opts.check()?;
        if let Some(served) = self.cached(gr).await {
            debug!(%gr, version = %served.version, "discovery cache hit");
            return Ok(served);
        }

        let _resolving = tokio::select! {
            _ = opts.cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.resolving.lock() => guard,
        };
        if let Some(served) = self.cached(gr).await {
            return Ok(served);
        }

        debug!(%gr, "discovering api group");
        let group = with_deadline(opts, self.discover.api_group(&gr.group)).await?;
        let served = group.as_ref().and_then(|group| group.select(&gr.resource));

        let mut groups = self.groups.write().await;
        match (group, &served) {
            (Some(group), Some(served)) => {
                debug!(%gr, version = %served.version, "resolved served version");
                groups.insert(gr.group.clone(), Arc::new(group));
            }
            _ => {
                groups.remove(&gr.group);
            }
        }
        served.ok_or_else(|| Error::NotServed {
            group: gr.group.clone(),
            resource: gr.resource.clone(),
        })
    }
}
