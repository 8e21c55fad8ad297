//! HTTP client for the metadata tier's API
//!
//! The metadata tier is the source of truth for member health and for the
//! stores registered by the storage tier. Both member managers query it
//! through the [`MetadataTierClient`] trait.

use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::{DbCluster, StorageUnit, StoreState, Tier};
use crate::resources::service::client_service_name;
use crate::resources::statefulset::METADATA_CLIENT_PORT;

const HEALTH_PATH: &str = "/api/v1/health";
const STORES_PATH: &str = "/api/v1/stores";

/// Health of a single metadata member as reported by the tier itself
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MemberHealth {
    pub name: String,
    pub member_id: u64,
    #[serde(default)]
    pub client_urls: Vec<String>,
    pub health: bool,
}

#[derive(Debug, Deserialize)]
struct StoresResponse {
    #[serde(default)]
    stores: Vec<StoreEntry>,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    store: StoreInfo,
}

/// A store registered with the metadata tier
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoreInfo {
    pub id: u64,
    /// `{pod}.{peer-service}.{namespace}.svc:{port}`
    pub address: String,
    pub state_name: String,
}

impl StoreInfo {
    /// Pod serving this store: the first DNS label of its address
    pub fn pod_name(&self) -> &str {
        let host = self.address.split(':').next().unwrap_or_default();
        host.split('.').next().unwrap_or_default()
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_state_name(&self.state_name)
    }

    pub fn to_storage_unit(&self) -> StorageUnit {
        StorageUnit {
            id: self.id.to_string(),
            pod_name: self.pod_name().to_string(),
            state: self.state(),
        }
    }
}

/// Queries a cluster's metadata tier
#[async_trait]
pub trait MetadataTierClient: Send + Sync {
    /// Health of every metadata member
    async fn members_health(&self, cluster: &DbCluster) -> Result<Vec<MemberHealth>>;

    /// Every store known to the metadata tier
    async fn stores(&self, cluster: &DbCluster) -> Result<Vec<StoreInfo>>;
}

/// [`MetadataTierClient`] speaking JSON over HTTP to the metadata client service
pub struct HttpMetadataTierClient {
    client: Client,
    endpoint: Option<String>,
}

impl HttpMetadataTierClient {
    /// Create a client with a per-request `timeout`.
    ///
    /// With `endpoint` set every cluster is reached at that address, which is
    /// how the operator runs outside the cluster network.
    pub fn new(timeout: Duration, endpoint: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    /// Base URL of `cluster`'s metadata tier API
    pub fn base_url(&self, cluster: &DbCluster) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let ns = cluster
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(format!(
            "http://{}.{}.svc:{}",
            client_service_name(&cluster.name_any(), Tier::Metadata),
            ns,
            METADATA_CLIENT_PORT
        ))
    }

    async fn get<T: DeserializeOwned>(&self, cluster: &DbCluster, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url(cluster)?, path);
        debug!(url = %url, "querying metadata tier");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataTierClient for HttpMetadataTierClient {
    async fn members_health(&self, cluster: &DbCluster) -> Result<Vec<MemberHealth>> {
        self.get(cluster, HEALTH_PATH).await
    }

    async fn stores(&self, cluster: &DbCluster) -> Result<Vec<StoreInfo>> {
        let response: StoresResponse = self.get(cluster, STORES_PATH).await?;
        Ok(response.stores.into_iter().map(|s| s.store).collect())
    }
}
