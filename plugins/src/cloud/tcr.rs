use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use ags_core::api::{CloudError, ImageVersion, Page, RegistryCatalog, RegistryInfo, Repository};

use super::client::CloudApiClient;

/// Container registry (TCR enterprise edition) catalog.
pub struct TcrClient {
    api: CloudApiClient,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstancesResponse {
    #[serde(default)]
    registries: Vec<RegistrySummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegistrySummary {
    #[serde(default)]
    registry_id: String,
    #[serde(default)]
    registry_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RepositoriesResponse {
    #[serde(default)]
    repository_list: Vec<RepositorySummary>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RepositorySummary {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesResponse {
    #[serde(default)]
    image_info_list: Vec<ImageSummary>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSummary {
    #[serde(default)]
    image_version: String,
}

impl TcrClient {
    pub fn new(api: CloudApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RegistryCatalog for TcrClient {
    async fn describe_registry(&self, registry_id: &str) -> Result<RegistryInfo, CloudError> {
        let resp: InstancesResponse = self
            .api
            .call_as("DescribeInstances", &json!({ "Registryids": [registry_id] }))
            .await?;
        let registry = resp
            .registries
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::not_found(format!("registry {} not found", registry_id)))?;
        Ok(RegistryInfo {
            registry_id: if registry.registry_id.is_empty() {
                registry_id.to_string()
            } else {
                registry.registry_id
            },
            name: registry.registry_name,
        })
    }

    async fn list_repositories(
        &self,
        registry_id: &str,
        namespace: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<Repository>, CloudError> {
        let resp: RepositoriesResponse = self
            .api
            .call_as(
                "DescribeRepositories",
                &json!({
                    "RegistryId": registry_id,
                    "NamespaceName": namespace,
                    "Offset": page,
                    "Limit": page_size,
                }),
            )
            .await?;
        Ok(Page {
            items: resp
                .repository_list
                .into_iter()
                .map(|r| Repository { name: r.name })
                .collect(),
            total_count: resp.total_count,
        })
    }

    async fn list_images(
        &self,
        registry_id: &str,
        namespace: &str,
        repository: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Page<ImageVersion>, CloudError> {
        let resp: ImagesResponse = self
            .api
            .call_as(
                "DescribeImages",
                &json!({
                    "RegistryId": registry_id,
                    "NamespaceName": namespace,
                    "RepositoryName": repository,
                    "Offset": page,
                    "Limit": page_size,
                }),
            )
            .await?;
        Ok(Page {
            items: resp
                .image_info_list
                .into_iter()
                .map(|i| ImageVersion {
                    version: i.image_version,
                })
                .collect(),
            total_count: resp.total_count,
        })
    }
}
