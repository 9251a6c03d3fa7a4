//! Sequential first-success probe over the connection-format candidates.
//!
//! Used for first contact with a vCenter: each candidate runs the
//! top-level listing until one is accepted. Candidates are tried strictly
//! one at a time, since a failure is what moves the loop forward.

use crate::candidates::build_candidates;
use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::executor::{args, CommandRunner};
use crate::parser::parse_lines;
use crate::types::{ConnectionDetails, FormatCandidate, GovcConfig, InventoryItem};

use log::{debug, info};
use serde::Serialize;

/// Listing run for every candidate.
pub const PROBE_COMMAND: &[&str] = &["ls", "/"];

/// Winning candidate and what it listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub candidate: FormatCandidate,
    /// 1-based position of the winning candidate.
    pub attempt: usize,
    pub url: String,
    pub datacenters: Vec<InventoryItem>,
}

/// Try every candidate in order and return the first that lists `/`.
///
/// A missing binary ends the probe at once. When every candidate fails,
/// the last candidate's error is returned with its kind preserved.
pub async fn probe_connection(
    runner: &dyn CommandRunner,
    connection: &ConnectionDetails,
    config: &GovcConfig,
) -> VsphereResult<ProbeOutcome> {
    let candidates = build_candidates(connection);
    let total = candidates.len();
    let command = args(PROBE_COMMAND);
    let mut last_err: Option<VsphereError> = None;

    for (i, candidate) in candidates.into_iter().enumerate() {
        let env = candidate.env(connection, config.insecure, None);
        match runner.run(&command, &env).await {
            Ok(stdout) => {
                info!(
                    "Connected to {} with format {}/{} ({})",
                    connection.server,
                    i + 1,
                    total,
                    candidate.describe()
                );
                return Ok(ProbeOutcome {
                    attempt: i + 1,
                    url: env.url,
                    datacenters: parse_lines(&stdout, "datacenter"),
                    candidate,
                });
            }
            Err(e) if e.kind == VsphereErrorKind::BinaryUnavailable => return Err(e),
            Err(e) => {
                debug!("Format {}/{} rejected ({}): {}", i + 1, total, candidate.describe(), e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| VsphereError::unknown("no connection formats to try"))
        .context(format!("all {total} connection formats failed for {}; last error", connection.server)))
}
