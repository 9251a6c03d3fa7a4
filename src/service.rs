//! vSphere service façade.
//!
//! Wraps the discovery core for the HTTP layer and remembers which
//! connection format each server/user pair accepted, so only the first
//! contact pays for probing.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use vprov_vsphere::discovery::discover_datastore_clusters;
use vprov_vsphere::executor::CommandRunner;
use vprov_vsphere::govc::GovcClient;
use vprov_vsphere::probe::{probe_connection, ProbeOutcome};
use vprov_vsphere::rest::VsphereRestClient;
use vprov_vsphere::{
    ConnectionDetails, DatastoreClusterGroup, FormatCandidate, GovcConfig, InventoryItem,
    RestConfig, TemplateRecord, VsphereErrorKind, VsphereResult,
};

/// Inventory object kinds exposed as flat listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryKind {
    Datacenters,
    Clusters,
    Hosts,
    Networks,
    Datastores,
    Folders,
    ResourcePools,
}

impl InventoryKind {
    /// Parse the route segment (`clusters`, `resource-pools`, …).
    pub fn from_segment(segment: &str) -> Option<Self> {
        Some(match segment {
            "datacenters" => Self::Datacenters,
            "clusters" => Self::Clusters,
            "hosts" => Self::Hosts,
            "networks" => Self::Networks,
            "datastores" => Self::Datastores,
            "folders" => Self::Folders,
            "resource-pools" => Self::ResourcePools,
            _ => return None,
        })
    }
}

pub struct VsphereService {
    runner: RwLock<Arc<dyn CommandRunner>>,
    formats: Mutex<HashMap<String, FormatCandidate>>,
}

impl VsphereService {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner: RwLock::new(runner),
            formats: Mutex::new(HashMap::new()),
        }
    }

    async fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.read().await.clone()
    }

    /// Swap the command runner, e.g. after the govc binary path changed.
    /// Calls already in flight finish on the old runner.
    pub async fn replace_runner(&self, runner: Arc<dyn CommandRunner>) {
        *self.runner.write().await = runner;
    }

    /// Probe all connection formats and remember the winner.
    pub async fn test_connection(
        &self,
        connection: &ConnectionDetails,
        govc: &GovcConfig,
    ) -> VsphereResult<ProbeOutcome> {
        let runner = self.runner().await;
        let result = probe_connection(runner.as_ref(), connection, govc).await;
        let mut formats = self.formats.lock().await;
        match result {
            Ok(outcome) => {
                formats.insert(connection.cache_key(), outcome.candidate.clone());
                Ok(outcome)
            }
            Err(e) => {
                formats.remove(&connection.cache_key());
                Err(e)
            }
        }
    }

    /// Format previously accepted for this server/user, if any.
    pub async fn cached_format(&self, connection: &ConnectionDetails) -> Option<FormatCandidate> {
        self.formats.lock().await.get(&connection.cache_key()).cloned()
    }

    /// Drop the remembered format for this server/user.
    pub async fn forget(&self, connection: &ConnectionDetails) {
        self.formats.lock().await.remove(&connection.cache_key());
    }

    /// `govc` client for the remembered format, or the canonical one.
    pub async fn govc_client(&self, connection: &ConnectionDetails, govc: &GovcConfig) -> GovcClient {
        let candidate = self
            .cached_format(connection)
            .await
            .unwrap_or_else(|| FormatCandidate::canonical(connection));
        GovcClient::new(self.runner().await, connection, &candidate, govc)
    }

    /// Drop a cached format that the server no longer accepts.
    async fn evict_on_auth_failure<T>(&self, connection: &ConnectionDetails, result: VsphereResult<T>) -> VsphereResult<T> {
        if let Err(ref e) = result {
            if e.kind == VsphereErrorKind::AuthFailure {
                self.forget(connection).await;
            }
        }
        result
    }

    pub async fn list_inventory(
        &self,
        connection: &ConnectionDetails,
        govc: &GovcConfig,
        kind: InventoryKind,
        datacenter: Option<&str>,
    ) -> VsphereResult<Vec<InventoryItem>> {
        let client = self.govc_client(connection, govc).await;
        let result = match kind {
            InventoryKind::Datacenters => client.list_datacenters().await,
            InventoryKind::Clusters => client.list_clusters(datacenter).await,
            InventoryKind::Hosts => client.list_hosts(datacenter).await,
            InventoryKind::Networks => client.list_networks(datacenter).await,
            InventoryKind::Datastores => client.list_datastores(datacenter).await,
            InventoryKind::Folders => client.list_folders(datacenter).await,
            InventoryKind::ResourcePools => client.list_resource_pools(datacenter).await,
        };
        self.evict_on_auth_failure(connection, result).await
    }

    pub async fn list_templates(
        &self,
        connection: &ConnectionDetails,
        govc: &GovcConfig,
        datacenter: Option<&str>,
    ) -> VsphereResult<Vec<TemplateRecord>> {
        let client = self.govc_client(connection, govc).await;
        let result = client.list_templates(datacenter).await;
        self.evict_on_auth_failure(connection, result).await
    }

    /// Datastore clusters through the full fallback chain.
    ///
    /// When `rest` is set a REST session is opened for the detail stage;
    /// failing to open it only skips that stage.
    pub async fn datastore_clusters(
        &self,
        connection: &ConnectionDetails,
        govc: &GovcConfig,
        rest: Option<&RestConfig>,
        datacenter: Option<&str>,
    ) -> VsphereResult<Vec<DatastoreClusterGroup>> {
        let client = self.govc_client(connection, govc).await;

        let mut session = match rest {
            Some(cfg) => match VsphereRestClient::connect(connection, cfg).await {
                Ok(c) => Some(c),
                Err(e) => {
                    log::warn!("REST session unavailable, skipping datastore detail lookup: {}", e);
                    None
                }
            },
            None => None,
        };

        let result = discover_datastore_clusters(&client, session.as_ref(), datacenter).await;
        if let Some(ref mut s) = session {
            let _ = s.logout().await;
        }
        self.evict_on_auth_failure(connection, result).await
    }
}
