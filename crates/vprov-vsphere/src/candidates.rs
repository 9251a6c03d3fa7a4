//! Connection-format candidates.
//!
//! vCenter deployments disagree on whether `govc` wants a scheme, an
//! `/sdk` path, and which username spelling the SSO domain accepts. The
//! candidate list is a fixed, ordered set of combinations; the probe loop
//! consumes it front to back.

use crate::executor::GovcEnv;
use crate::types::{ConnectionDetails, FormatCandidate, Protocol, UrlSuffix};

/// Number of candidates produced for every connection.
pub const CANDIDATE_COUNT: usize = 10;

/// Username after the first backslash, or the input unchanged.
pub fn bare_user(user: &str) -> String {
    match user.split_once('\\') {
        Some((_, name)) => name.to_string(),
        None => user.to_string(),
    }
}

/// `DOMAIN\user` rewritten as `user@DOMAIN`.
///
/// Only applies with exactly one backslash; anything else is returned
/// unchanged.
pub fn upn_user(user: &str) -> String {
    let parts: Vec<&str> = user.split('\\').collect();
    if parts.len() == 2 {
        format!("{}@{}", parts[1], parts[0])
    } else {
        user.to_string()
    }
}

/// Build the ordered candidate list for one connection.
pub fn build_candidates(connection: &ConnectionDetails) -> Vec<FormatCandidate> {
    let as_given = connection.user.clone();
    let bare = bare_user(&connection.user);
    let upn = upn_user(&connection.user);

    let url_forms = [
        (Protocol::AsGiven, UrlSuffix::None),
        (Protocol::Https, UrlSuffix::None),
        (Protocol::AsGiven, UrlSuffix::Sdk),
        (Protocol::Https, UrlSuffix::Sdk),
    ];

    let mut out = Vec::with_capacity(CANDIDATE_COUNT);
    for user in [&as_given, &bare] {
        for (protocol, url_suffix) in url_forms {
            out.push(FormatCandidate {
                protocol,
                url_suffix,
                user: user.clone(),
            });
        }
    }
    for url_suffix in [UrlSuffix::None, UrlSuffix::Sdk] {
        out.push(FormatCandidate {
            protocol: Protocol::Https,
            url_suffix,
            user: upn.clone(),
        });
    }
    out
}

/// Distinct usernames in candidate order.
pub fn distinct_users(connection: &ConnectionDetails) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for c in build_candidates(connection) {
        if !users.contains(&c.user) {
            users.push(c.user);
        }
    }
    users
}

fn has_scheme(server: &str) -> bool {
    server.contains("://")
}

impl FormatCandidate {
    /// Format used when no probe result is available: `https://` + `/sdk`
    /// with the username as given.
    pub fn canonical(connection: &ConnectionDetails) -> Self {
        Self {
            protocol: Protocol::Https,
            url_suffix: UrlSuffix::Sdk,
            user: connection.user.clone(),
        }
    }

    /// Render the `GOVC_URL` value for a server string.
    pub fn url(&self, server: &str) -> String {
        let mut url = server.trim().trim_end_matches('/').to_string();
        if self.protocol == Protocol::Https && !has_scheme(&url) {
            url = format!("https://{url}");
        }
        if self.url_suffix == UrlSuffix::Sdk && !url.ends_with("/sdk") {
            url.push_str("/sdk");
        }
        url
    }

    /// Environment for running `govc` with this candidate.
    pub fn env(
        &self,
        connection: &ConnectionDetails,
        insecure: bool,
        datacenter: Option<&str>,
    ) -> GovcEnv {
        GovcEnv {
            url: self.url(&connection.server),
            username: self.user.clone(),
            password: connection.password.clone(),
            insecure,
            datacenter: datacenter.map(str::to_string),
        }
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        format!(
            "protocol={:?} suffix={:?} user={}",
            self.protocol.as_str(),
            self.url_suffix.as_str(),
            self.user
        )
    }
}
