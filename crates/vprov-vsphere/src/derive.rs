//! Datastore-cluster derivation from naming conventions.
//!
//! Last-resort fallback when neither the inventory nor per-datastore
//! details say which storage pod a datastore belongs to. Datastores whose
//! names share a prefix before a numbered suffix are grouped together.
//! This is lossy in both directions: inconsistent naming under-groups and
//! coincidental prefixes over-group. Every group is marked `derived`.

use crate::types::{ClusterSource, DatastoreClusterGroup};

use regex::Regex;
use std::collections::BTreeMap;

lazy_static::lazy_static! {
    /// Naming conventions, tried in order; the first match wins.
    static ref NAMING_PATTERNS: Vec<Regex> = vec![
        // pod-datastore01
        Regex::new(r"^(.+)-datastore\d+$").unwrap(),
        // pod-ds01, pod-lun01
        Regex::new(r"^(.+)-[A-Za-z]+\d+$").unwrap(),
        // pod_ds01
        Regex::new(r"^(.+)_[A-Za-z]+\d+$").unwrap(),
        // pod_StoragePool01
        Regex::new(r"^(.+)_StoragePool\d+$").unwrap(),
    ];

    /// Fallback: strip a trailing `-NN` / `_NN`.
    static ref NUMERIC_SUFFIX: Regex = Regex::new(r"^(.+)[-_]\d+$").unwrap();
}

/// Cluster prefix for one datastore name, if any convention matches.
pub fn cluster_prefix(name: &str) -> Option<String> {
    let name = name.trim();
    NAMING_PATTERNS
        .iter()
        .chain(std::iter::once(&*NUMERIC_SUFFIX))
        .find_map(|re| re.captures(name))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|p| !p.is_empty())
}

/// Group datastore names into heuristic clusters.
///
/// Groups of one are discarded. Groups come out in prefix order and are
/// numbered from 1, so the same names always produce the same ids.
pub fn derive_datastore_clusters<S: AsRef<str>>(datastore_names: &[S]) -> Vec<DatastoreClusterGroup> {
    let mut by_prefix: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in datastore_names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if let Some(prefix) = cluster_prefix(name) {
            let members = by_prefix.entry(prefix).or_default();
            if !members.iter().any(|m| m == name) {
                members.push(name.to_string());
            }
        }
    }

    by_prefix
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .enumerate()
        .map(|(i, (prefix, datastores))| DatastoreClusterGroup {
            datastore_cluster: format!("derived-datastore-cluster-{}", i + 1),
            name: prefix,
            datastores,
            derived: true,
            source: ClusterSource::NamingHeuristic,
        })
        .collect()
}
