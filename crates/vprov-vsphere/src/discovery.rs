//! Datastore-cluster discovery chain.
//!
//! 1. Storage pods listed from the inventory via `govc` (authoritative).
//! 2. Per-datastore REST details naming a parent storage pod.
//! 3. The naming heuristic in [`crate::derive`] (flagged `derived`).
//!
//! Each stage only runs when the previous one failed or came back empty.
//! Every stage is limited to the requested datacenter. Results are
//! recomputed on every call.

use crate::derive::derive_datastore_clusters;
use crate::error::VsphereResult;
use crate::govc::GovcClient;
use crate::rest::{parent_pod_reference, VsphereRestClient};
use crate::types::{ClusterSource, DatastoreClusterGroup};

use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Group datastores by the parent pod named in their REST details.
///
/// `details` pairs each datastore name with its detail document, or
/// `None` when the lookup failed.
pub fn groups_from_details(details: &[(String, Option<serde_json::Value>)]) -> Vec<DatastoreClusterGroup> {
    let mut by_pod: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, detail) in details {
        if let Some(pod) = detail.as_ref().and_then(parent_pod_reference) {
            by_pod.entry(pod).or_default().push(name.clone());
        }
    }
    by_pod
        .into_iter()
        .map(|(pod, datastores)| DatastoreClusterGroup {
            name: pod.clone(),
            datastore_cluster: pod,
            datastores,
            derived: false,
            source: ClusterSource::DatastoreDetail,
        })
        .collect()
}

async fn from_rest_details(
    rest: &VsphereRestClient,
    datacenter: Option<&str>,
) -> VsphereResult<(Vec<String>, Vec<DatastoreClusterGroup>)> {
    let datastores = rest.list_datastores_in(datacenter).await?;
    let mut details = Vec::with_capacity(datastores.len());
    for ds in &datastores {
        let detail = match rest.get_datastore(&ds.datastore).await {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("Datastore detail for {} unavailable: {}", ds.name, e);
                None
            }
        };
        details.push((ds.name.clone(), detail));
    }
    let names = datastores.into_iter().map(|d| d.name).collect();
    Ok((names, groups_from_details(&details)))
}

/// Resolve datastore clusters, falling back stage by stage.
pub async fn discover_datastore_clusters(
    govc: &GovcClient,
    rest: Option<&VsphereRestClient>,
    datacenter: Option<&str>,
) -> VsphereResult<Vec<DatastoreClusterGroup>> {
    match govc.list_storage_pods(datacenter).await {
        Ok(pods) if !pods.is_empty() => {
            info!("Found {} storage pods in inventory", pods.len());
            return Ok(pods);
        }
        Ok(_) => debug!("Inventory lists no storage pods"),
        Err(e) => warn!("Storage pod listing failed: {}", e),
    }

    let mut names: Option<Vec<String>> = None;
    if let Some(rest) = rest {
        match from_rest_details(rest, datacenter).await {
            Ok((_, groups)) if !groups.is_empty() => {
                info!("Resolved {} datastore clusters from datastore details", groups.len());
                return Ok(groups);
            }
            Ok((listed, _)) => names = Some(listed),
            Err(e) => warn!("REST datastore lookup failed: {}", e),
        }
    }

    let names = match names {
        Some(n) => n,
        None => govc
            .list_datastores(datacenter)
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect(),
    };

    let groups = derive_datastore_clusters(&names);
    if !groups.is_empty() {
        warn!(
            "Datastore clusters derived from naming conventions ({} groups); membership is approximate",
            groups.len()
        );
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VsphereError;
    use crate::executor::{CommandRunner, GovcEnv};
    use crate::rest::stub_vcenter::{self, Login};
    use crate::types::RestConfig;
    use crate::types::{ConnectionDetails, GovcConfig};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Inventory {
        pods: Result<&'static str, ()>,
        datastores: &'static str,
    }

    #[async_trait]
    impl CommandRunner for Inventory {
        async fn run(&self, args: &[String], _env: &GovcEnv) -> VsphereResult<String> {
            match (args[0].as_str(), args.get(3).map(String::as_str)) {
                ("find", Some("StoragePod")) => self
                    .pods
                    .map(str::to_string)
                    .map_err(|_| VsphereError::from_stderr("govc: ServerFaultCode: NoPermission")),
                ("find", Some("s")) => Ok(self.datastores.to_string()),
                ("ls", _) => Ok("/DC1/datastore/pod1/a-ds01\n/DC1/datastore/pod1/a-ds02".to_string()),
                _ => Ok(String::new()),
            }
        }
    }

    fn govc(inv: Inventory) -> GovcClient {
        GovcClient::canonical(
            Arc::new(inv),
            &ConnectionDetails::new("vc.lab", "admin", "pw"),
            &GovcConfig::default(),
        )
    }

    #[tokio::test]
    async fn inventory_pods_win() {
        let g = govc(Inventory { pods: Ok("/DC1/datastore/pod1"), datastores: "" });
        let groups = discover_datastore_clusters(&g, None, None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source, ClusterSource::Inventory);
        assert!(!groups[0].derived);
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_when_pod_listing_fails() {
        let g = govc(Inventory {
            pods: Err(()),
            datastores: "/DC1/datastore/pod-datastore01\n/DC1/datastore/pod-datastore02\n/DC1/datastore/other",
        });
        let groups = discover_datastore_clusters(&g, None, None).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "pod");
        assert!(groups[0].derived);
        assert_eq!(groups[0].source, ClusterSource::NamingHeuristic);
    }

    #[tokio::test]
    async fn empty_pod_listing_with_unrelated_names_yields_nothing() {
        let g = govc(Inventory { pods: Ok(""), datastores: "/DC1/datastore/local\n/DC1/datastore/ds1" });
        assert!(discover_datastore_clusters(&g, None, None).await.unwrap().is_empty());
    }

    #[test]
    fn detail_groups_keep_explicit_membership() {
        let details = vec![
            ("gold-01".to_string(), Some(json!({"datastore_cluster": "group-p3"}))),
            ("gold-02".to_string(), Some(json!({"datastore_cluster": "group-p3"}))),
            ("solo".to_string(), Some(json!({"storage_pod": "group-p9"}))),
            ("local".to_string(), Some(json!({"name": "local"}))),
            ("broken".to_string(), None),
        ];
        let groups = groups_from_details(&details);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].datastore_cluster, "group-p3");
        assert_eq!(groups[0].datastores, vec!["gold-01", "gold-02"]);
        assert_eq!(groups[1].datastores, vec!["solo"]);
        assert!(groups.iter().all(|g| !g.derived && g.source == ClusterSource::DatastoreDetail));
    }

    async fn rest_session(server: &str) -> VsphereRestClient {
        let conn = ConnectionDetails::new(server, "alice", "pw");
        let config = RestConfig { insecure: true, timeout_secs: 5 };
        match VsphereRestClient::connect(&conn, &config).await {
            Ok(client) => client,
            Err(e) => panic!("REST login failed: {e}"),
        }
    }

    #[tokio::test]
    async fn detail_stage_groups_by_parent_pod() {
        let stub = stub_vcenter::start(Login::AliceOnly).await;
        let rest = rest_session(&stub.server).await;
        let g = govc(Inventory { pods: Ok(""), datastores: "" });

        let groups = discover_datastore_clusters(&g, Some(&rest), Some("Lab")).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].datastore_cluster, "group-p3");
        assert_eq!(groups[0].datastores, vec!["gold-01", "gold-02"]);
        assert_eq!(groups[0].source, ClusterSource::DatastoreDetail);
        assert_eq!(stub.count("GET /rest/vcenter/datastore/"), 3);
    }

    #[tokio::test]
    async fn heuristic_after_rest_stays_in_datacenter() {
        let stub = stub_vcenter::start(Login::AliceOnly).await;
        let rest = rest_session(&stub.server).await;
        let g = govc(Inventory { pods: Ok(""), datastores: "" });

        let groups = discover_datastore_clusters(&g, Some(&rest), Some("Edge")).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "silver");
        assert_eq!(groups[0].datastores, vec!["silver-ds01", "silver-ds02"]);
        assert!(groups[0].derived);
        assert_eq!(stub.count("GET /rest/vcenter/datastore?filter.datacenters=datacenter-9"), 1);
    }

    #[tokio::test]
    async fn unknown_rest_datacenter_falls_back_to_govc_names() {
        let stub = stub_vcenter::start(Login::AliceOnly).await;
        let rest = rest_session(&stub.server).await;
        let g = govc(Inventory {
            pods: Ok(""),
            datastores: "/DC1/datastore/pod-datastore01\n/DC1/datastore/pod-datastore02",
        });

        let groups = discover_datastore_clusters(&g, Some(&rest), Some("DC1")).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "pod");
        assert_eq!(stub.count("GET /rest/vcenter/datastore/"), 0);
    }
}
