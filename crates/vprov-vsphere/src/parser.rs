//! `govc` output parsers.
//!
//! Listing commands (`ls`, `find`) print one inventory path per line.
//! `vm.info -json` prints a document with a `virtualMachines` array.

use crate::types::{InventoryItem, TemplateRecord, DEFAULT_GUEST_FULL_NAME, DEFAULT_GUEST_ID};
use log::warn;
use serde_json::Value;

/// Last `/` segment of an inventory path, or the whole trimmed path when
/// that segment is empty.
pub fn last_segment(path: &str) -> String {
    let trimmed = path.trim();
    match trimmed.rsplit('/').next() {
        Some(seg) if !seg.is_empty() => seg.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Parse one-path-per-line output into inventory items.
///
/// Blank lines are dropped and ids are numbered contiguously from 1 as
/// `{type_tag}-{n}`.
pub fn parse_lines(output: &str, type_tag: &str) -> Vec<InventoryItem> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| InventoryItem {
            id: format!("{}-{}", type_tag, i + 1),
            name: last_segment(line),
            path: line.to_string(),
        })
        .collect()
}

/// Id for the `n`th (0-based) template of a listing.
pub fn template_id(index: usize) -> String {
    format!("template-{}", index + 1)
}

/// Records with default guest fields for every path, numbered from
/// `first_index`.
pub fn placeholder_records(paths: &[String], first_index: usize) -> Vec<TemplateRecord> {
    paths
        .iter()
        .enumerate()
        .map(|(i, p)| TemplateRecord::placeholder(template_id(first_index + i), last_segment(p), p.clone()))
        .collect()
}

/// Entries of a `vm.info -json` document.
///
/// Accepts `virtualMachines` (current govc), `VirtualMachines` (older
/// releases), a bare array, or a single VM object.
fn vm_entries(doc: Value) -> Vec<Value> {
    match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["virtualMachines", "VirtualMachines"] {
                if let Some(v) = map.remove(key) {
                    return match v {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        single => vec![single],
                    };
                }
            }
            if map.is_empty() {
                Vec::new()
            } else {
                vec![Value::Object(map)]
            }
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn config_str<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry
        .get("config")
        .or_else(|| entry.get("Config"))
        .and_then(|c| c.get(key).or_else(|| c.get(capitalise(key).as_str())))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn capitalise(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse one `vm.info -json` batch into template records.
///
/// `paths` are the inventory paths the batch was queried with; entry `i`
/// pairs with `paths[i]`. Non-object entries are skipped. Paths the
/// document has no entry for get placeholder records, as does every path
/// when the document is not valid JSON.
pub fn parse_template_batch(json: &str, paths: &[String], first_index: usize) -> Vec<TemplateRecord> {
    let doc: Value = match serde_json::from_str(json.trim()) {
        Ok(v) => v,
        Err(e) => {
            warn!("vm.info batch of {} templates returned unparseable JSON: {}", paths.len(), e);
            return placeholder_records(paths, first_index);
        }
    };

    let entries = vm_entries(doc);
    let covered = entries.len().min(paths.len());
    if covered < paths.len() {
        warn!(
            "vm.info returned {} entries for {} templates; using placeholders for the rest",
            entries.len(),
            paths.len()
        );
    }

    let mut records: Vec<TemplateRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            if !entry.is_object() {
                warn!("Skipping malformed vm.info entry {} in batch", i);
                return None;
            }
            let path = paths.get(i).cloned().unwrap_or_default();
            let name = config_str(&entry, "name")
                .map(str::to_string)
                .unwrap_or_else(|| last_segment(&path));
            Some(TemplateRecord {
                id: template_id(first_index + i),
                name,
                path,
                guest_id: config_str(&entry, "guestId").unwrap_or(DEFAULT_GUEST_ID).to_string(),
                guest_full_name: config_str(&entry, "guestFullName")
                    .unwrap_or(DEFAULT_GUEST_FULL_NAME)
                    .to_string(),
            })
        })
        .collect();
    records.extend(placeholder_records(&paths[covered..], first_index + covered));
    records
}
