//! Shared data structures for vSphere discovery.

use serde::{Deserialize, Serialize};

// ── Connection ──────────────────────────────────────────────────────

/// Credentials for one vCenter, supplied per call by the caller.
///
/// `user` may be `DOMAIN\user`, `user` or `user@domain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub server: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl ConnectionDetails {
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Key identifying this server/user pair (password excluded).
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.server.trim().to_ascii_lowercase(), self.user)
    }
}

/// Connection details without the password, safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDetailsSafe {
    pub server: String,
    pub user: String,
}

impl From<&ConnectionDetails> for ConnectionDetailsSafe {
    fn from(c: &ConnectionDetails) -> Self {
        Self {
            server: c.server.clone(),
            user: c.user.clone(),
        }
    }
}

/// URL scheme handling for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Server string used exactly as given.
    #[serde(rename = "")]
    AsGiven,
    /// `https://` prepended when the server has no scheme.
    #[serde(rename = "https://")]
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AsGiven => "",
            Self::Https => "https://",
        }
    }
}

/// Path suffix for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlSuffix {
    #[serde(rename = "")]
    None,
    #[serde(rename = "/sdk")]
    Sdk,
}

impl UrlSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Sdk => "/sdk",
        }
    }
}

/// One URL / username combination to try against vCenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatCandidate {
    pub protocol: Protocol,
    pub url_suffix: UrlSuffix,
    pub user: String,
}

// ── Inventory ───────────────────────────────────────────────────────

/// One inventory object from a `govc ls` / `govc find` listing.
///
/// `id` is only unique within the listing it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// A VM template with its guest OS metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    pub guest_id: String,
    pub guest_full_name: String,
}

pub const DEFAULT_GUEST_ID: &str = "otherGuest";
pub const DEFAULT_GUEST_FULL_NAME: &str = "Unknown Guest OS";

impl TemplateRecord {
    /// Record with default guest fields, used when the detail lookup for
    /// this template failed.
    pub fn placeholder(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            guest_id: DEFAULT_GUEST_ID.to_string(),
            guest_full_name: DEFAULT_GUEST_FULL_NAME.to_string(),
        }
    }

    /// Whether the guest fields are the defaults.
    pub fn has_default_guest(&self) -> bool {
        self.guest_id == DEFAULT_GUEST_ID && self.guest_full_name == DEFAULT_GUEST_FULL_NAME
    }
}

/// Where a datastore-cluster grouping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterSource {
    /// Storage pods listed from the inventory.
    Inventory,
    /// Explicit parent reference in per-datastore details.
    DatastoreDetail,
    /// Naming-convention heuristic.
    NamingHeuristic,
}

/// A datastore cluster (storage pod) and its member datastores.
///
/// `derived` groups come from the naming heuristic and are lower
/// confidence than inventory-sourced ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreClusterGroup {
    pub datastore_cluster: String,
    pub name: String,
    pub datastores: Vec<String>,
    pub derived: bool,
    pub source: ClusterSource,
}

// ── Configuration ───────────────────────────────────────────────────

/// How to invoke `govc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovcConfig {
    /// Path to the `govc` binary, or a bare name resolved on `PATH`
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    /// Optional command prefix that runs govc inside another environment
    /// (e.g. `["wsl", "--"]`)
    #[serde(default)]
    pub shell_wrapper: Option<Vec<String>>,
    /// Skip TLS certificate verification (`GOVC_INSECURE`)
    #[serde(default = "default_insecure")]
    pub insecure: bool,
    /// Default datacenter (`GOVC_DATACENTER`)
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Number of templates per `vm.info` call
    #[serde(default = "default_batch_size")]
    pub template_batch_size: usize,
    /// Per-invocation timeout; `None` waits indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GovcConfig {
    /// Whether both configs start `govc` the same way (binary, wrapper
    /// and timeout). The remaining fields only shape arguments and env.
    pub fn same_invocation(&self, other: &GovcConfig) -> bool {
        self.binary_path == other.binary_path
            && self.shell_wrapper == other.shell_wrapper
            && self.timeout_secs == other.timeout_secs
    }
}

fn default_binary_path() -> String { "/usr/local/bin/govc".to_string() }
fn default_insecure() -> bool { true }
fn default_batch_size() -> usize { 10 }

impl Default for GovcConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            shell_wrapper: None,
            insecure: true,
            datacenter: None,
            template_batch_size: 10,
            timeout_secs: None,
        }
    }
}

/// vSphere REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    /// Skip TLS certificate verification (self-signed labs)
    #[serde(default = "default_insecure")]
    pub insecure: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 { 30 }

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            insecure: true,
            timeout_secs: 30,
        }
    }
}

// ── REST payloads ───────────────────────────────────────────────────

/// `GET /rest/vcenter/datastore` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestDatastore {
    pub datastore: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub ds_type: Option<String>,
    #[serde(default)]
    pub free_space: Option<u64>,
    #[serde(default)]
    pub capacity: Option<u64>,
}

/// `GET /rest/vcenter/cluster` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestCluster {
    pub cluster: String,
    pub name: String,
    #[serde(default)]
    pub drs_enabled: Option<bool>,
    #[serde(default)]
    pub ha_enabled: Option<bool>,
}

/// `GET /rest/vcenter/network` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestNetwork {
    pub network: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub network_type: Option<String>,
}

/// `GET /rest/vcenter/datacenter` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestDatacenter {
    pub datacenter: String,
    pub name: String,
}

/// `GET /rest/vcenter/host` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestHost {
    pub host: String,
    pub name: String,
    #[serde(default)]
    pub connection_state: Option<String>,
    #[serde(default)]
    pub power_state: Option<String>,
}
