//! Inventory listings over one resolved `govc` environment.
//!
//! Unlike the probe, these calls do not retry other formats: the client is
//! built around a single candidate (the probe winner, or the canonical
//! format when no probe has run).

use crate::error::VsphereResult;
use crate::executor::{args, CommandRunner, GovcEnv};
use crate::parser::{last_segment, parse_lines, parse_template_batch, placeholder_records};
use crate::types::{
    ClusterSource, ConnectionDetails, DatastoreClusterGroup, FormatCandidate, GovcConfig,
    InventoryItem, TemplateRecord,
};

use log::{debug, warn};
use std::sync::Arc;

/// `govc` inventory client bound to one connection format.
pub struct GovcClient {
    runner: Arc<dyn CommandRunner>,
    env: GovcEnv,
    batch_size: usize,
}

impl GovcClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        connection: &ConnectionDetails,
        candidate: &FormatCandidate,
        config: &GovcConfig,
    ) -> Self {
        Self {
            runner,
            env: candidate.env(connection, config.insecure, config.datacenter.as_deref()),
            batch_size: config.template_batch_size.max(1),
        }
    }

    /// Client using the canonical format.
    pub fn canonical(
        runner: Arc<dyn CommandRunner>,
        connection: &ConnectionDetails,
        config: &GovcConfig,
    ) -> Self {
        Self::new(runner, connection, &FormatCandidate::canonical(connection), config)
    }

    pub fn env(&self) -> &GovcEnv {
        &self.env
    }

    async fn run(&self, parts: &[&str]) -> VsphereResult<String> {
        self.runner.run(&args(parts), &self.env).await
    }

    /// Inventory root for `find`: the datacenter path when one is given.
    fn root(datacenter: Option<&str>) -> String {
        match datacenter.map(|d| d.trim().trim_matches('/')) {
            Some(dc) if !dc.is_empty() => format!("/{dc}"),
            _ => "/".to_string(),
        }
    }

    async fn find(&self, datacenter: Option<&str>, object_type: &str, type_tag: &str) -> VsphereResult<Vec<InventoryItem>> {
        let root = Self::root(datacenter);
        let out = self.run(&["find", &root, "-type", object_type]).await?;
        Ok(parse_lines(&out, type_tag))
    }

    // ── Listings ────────────────────────────────────────────────────

    pub async fn list_datacenters(&self) -> VsphereResult<Vec<InventoryItem>> {
        let out = self.run(&["ls", "/"]).await?;
        Ok(parse_lines(&out, "datacenter"))
    }

    pub async fn list_clusters(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "c", "cluster").await
    }

    pub async fn list_hosts(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "h", "host").await
    }

    pub async fn list_networks(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "n", "network").await
    }

    pub async fn list_datastores(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "s", "datastore").await
    }

    pub async fn list_folders(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "f", "folder").await
    }

    pub async fn list_resource_pools(&self, datacenter: Option<&str>) -> VsphereResult<Vec<InventoryItem>> {
        self.find(datacenter, "p", "resourcepool").await
    }

    // ── Templates ───────────────────────────────────────────────────

    /// Inventory paths of every VM marked as a template.
    pub async fn list_template_paths(&self, datacenter: Option<&str>) -> VsphereResult<Vec<String>> {
        let root = Self::root(datacenter);
        let out = self
            .run(&["find", &root, "-type", "m", "-config.template", "true"])
            .await?;
        Ok(parse_lines(&out, "template").into_iter().map(|i| i.path).collect())
    }

    /// Templates with guest OS metadata.
    ///
    /// `vm.info` runs in batches of `template_batch_size`, one batch at a
    /// time. A batch that fails contributes placeholder records, so every
    /// listed template is returned.
    pub async fn list_templates(&self, datacenter: Option<&str>) -> VsphereResult<Vec<TemplateRecord>> {
        let paths = self.list_template_paths(datacenter).await?;
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(paths.len());
        for (n, batch) in paths.chunks(self.batch_size).enumerate() {
            let first_index = n * self.batch_size;
            let mut cmd = vec!["vm.info".to_string(), "-json".to_string()];
            cmd.extend(batch.iter().cloned());

            match self.runner.run(&cmd, &self.env).await {
                Ok(json) => records.extend(parse_template_batch(&json, batch, first_index)),
                Err(e) => {
                    warn!(
                        "vm.info failed for template batch {} ({} items), using defaults: {}",
                        n + 1,
                        batch.len(),
                        e
                    );
                    records.extend(placeholder_records(batch, first_index));
                }
            }
        }
        debug!("Resolved {} templates in batches of {}", records.len(), self.batch_size);
        Ok(records)
    }

    // ── Storage pods ────────────────────────────────────────────────

    /// Storage pods and their member datastores, straight from the
    /// inventory.
    pub async fn list_storage_pods(&self, datacenter: Option<&str>) -> VsphereResult<Vec<DatastoreClusterGroup>> {
        let pods = self.find(datacenter, "StoragePod", "storagepod").await?;
        let mut groups = Vec::with_capacity(pods.len());
        for pod in pods {
            let out = self.run(&["ls", &pod.path]).await?;
            let datastores = out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(last_segment)
                .collect();
            groups.push(DatastoreClusterGroup {
                datastore_cluster: pod.id,
                name: pod.name,
                datastores,
                derived: false,
                source: ClusterSource::Inventory,
            });
        }
        Ok(groups)
    }
}
