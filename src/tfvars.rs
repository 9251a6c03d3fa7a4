//! Terraform variable file rendering.
//!
//! Turns a provisioning request into a `terraform.tfvars` document for the
//! vSphere VM module. Running terraform is left to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TfvarsError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("`{0}` must be at least 1")]
    NotPositive(&'static str),
    #[error("set exactly one of `datastore` or `datastore_cluster`")]
    StorageTarget,
}

/// Parameters collected for one VM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmProvisionRequest {
    pub vm_name: String,
    pub cpu: u32,
    pub memory_mb: u64,
    #[serde(default)]
    pub disk_gb: Option<u64>,
    pub datacenter: String,
    pub cluster: String,
    #[serde(default)]
    pub datastore: Option<String>,
    #[serde(default)]
    pub datastore_cluster: Option<String>,
    pub network: String,
    pub template: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub ipv4_address: Option<String>,
    #[serde(default)]
    pub ipv4_netmask: Option<u8>,
    #[serde(default)]
    pub ipv4_gateway: Option<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VmProvisionRequest {
    pub fn validate(&self) -> Result<(), TfvarsError> {
        let required = [
            ("vm_name", &self.vm_name),
            ("datacenter", &self.datacenter),
            ("cluster", &self.cluster),
            ("network", &self.network),
            ("template", &self.template),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TfvarsError::Missing(field));
            }
        }
        if self.cpu == 0 {
            return Err(TfvarsError::NotPositive("cpu"));
        }
        if self.memory_mb == 0 {
            return Err(TfvarsError::NotPositive("memory_mb"));
        }
        if non_blank(&self.datastore).is_some() == non_blank(&self.datastore_cluster).is_some() {
            return Err(TfvarsError::StorageTarget);
        }
        Ok(())
    }
}

/// The value of an optional field, treating whitespace-only as unset.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Quote a string as an HCL literal.
pub fn hcl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    // `${` and `%{` start template interpolation in HCL strings.
    out.replace("${", "$${").replace("%{", "%%{")
}

fn line(out: &mut String, key: &str, value: String) {
    let _ = writeln!(out, "{key} = {value}");
}

/// Render the request as `terraform.tfvars` text.
pub fn render_tfvars(req: &VmProvisionRequest) -> Result<String, TfvarsError> {
    req.validate()?;

    let mut out = String::new();
    line(&mut out, "vm_name", hcl_string(req.vm_name.trim()));
    line(&mut out, "vm_cpu", req.cpu.to_string());
    line(&mut out, "vm_memory_mb", req.memory_mb.to_string());
    if let Some(disk) = req.disk_gb {
        line(&mut out, "vm_disk_gb", disk.to_string());
    }
    line(&mut out, "vsphere_datacenter", hcl_string(&req.datacenter));
    line(&mut out, "vsphere_cluster", hcl_string(&req.cluster));
    if let Some(ds) = non_blank(&req.datastore) {
        line(&mut out, "vsphere_datastore", hcl_string(ds));
    }
    if let Some(dsc) = non_blank(&req.datastore_cluster) {
        line(&mut out, "vsphere_datastore_cluster", hcl_string(dsc));
    }
    line(&mut out, "vsphere_network", hcl_string(&req.network));
    line(&mut out, "vm_template", hcl_string(&req.template));
    if let Some(folder) = non_blank(&req.folder) {
        line(&mut out, "vm_folder", hcl_string(folder));
    }
    if let Some(ip) = non_blank(&req.ipv4_address) {
        line(&mut out, "vm_ipv4_address", hcl_string(ip));
        line(&mut out, "vm_ipv4_netmask", req.ipv4_netmask.unwrap_or(24).to_string());
    }
    if let Some(gw) = non_blank(&req.ipv4_gateway) {
        line(&mut out, "vm_ipv4_gateway", hcl_string(gw));
    }
    if !req.dns_servers.is_empty() {
        let list: Vec<String> = req.dns_servers.iter().map(|s| hcl_string(s)).collect();
        line(&mut out, "vm_dns_servers", format!("[{}]", list.join(", ")));
    }
    if let Some(domain) = non_blank(&req.domain) {
        line(&mut out, "vm_domain", hcl_string(domain));
    }
    if let Some(note) = non_blank(&req.annotation) {
        line(&mut out, "vm_annotation", hcl_string(note));
    }
    if !req.tags.is_empty() {
        out.push_str("vm_tags = {\n");
        for (k, v) in &req.tags {
            let _ = writeln!(out, "  {} = {}", hcl_string(k), hcl_string(v));
        }
        out.push_str("}\n");
    }
    Ok(out)
}
