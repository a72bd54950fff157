use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::Client;

use super::{ApiGroupResources, Discover, GroupVersionResources};
use crate::error::Result;

/// Discovery against the API server's advertised surface.
#[derive(Clone)]
pub struct DiscoverClient {
    client: Client,
}

impl DiscoverClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn top_level(
    list: APIResourceList,
    group: &str,
    version: &str,
) -> impl Iterator<Item = APIResource> + use<> {
    let group = group.to_string();
    let version = version.to_string();
    list.resources
        .into_iter()
        .filter(|resource| !resource.name.contains('/'))
        .map(move |mut resource| {
            resource.group = Some(group.clone());
            resource.version = Some(version.clone());
            resource
        })
}

#[async_trait]
impl Discover for DiscoverClient {
    async fn api_group(&self, group: &str) -> Result<Option<ApiGroupResources>> {
        if group.is_empty() {
            let core = self.client.list_core_api_versions().await?;
            let mut versions = Vec::new();
            for version in &core.versions {
                let list = self.client.list_core_api_resources(version).await?;
                versions.push(GroupVersionResources {
                    version: version.clone(),
                    resources: top_level(list, "", version).collect(),
                });
            }
            return Ok(Some(ApiGroupResources {
                name: String::new(),
                preferred_version: core.versions.first().cloned(),
                versions,
            }));
        }

        let groups = self.client.list_api_groups().await?;
        let Some(api_group) = groups.groups.into_iter().find(|g| g.name == group) else {
            return Ok(None);
        };

        let mut versions = Vec::new();
        for gv in &api_group.versions {
            let list = self
                .client
                .list_api_group_resources(&gv.group_version)
                .await?;
            versions.push(GroupVersionResources {
                version: gv.version.clone(),
                resources: top_level(list, group, &gv.version).collect(),
            });
        }

        Ok(Some(ApiGroupResources {
            name: api_group.name,
            preferred_version: api_group.preferred_version.map(|gv| gv.version),
            versions,
        }))
    }
}
