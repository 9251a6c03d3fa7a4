//! Error types for the vSphere discovery crate.

use std::fmt;

/// Categorised error kinds.
///
/// Callers branch on the kind rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VsphereErrorKind {
    /// The `govc` binary is not installed or not reachable
    BinaryUnavailable,
    /// Credentials or username format rejected
    AuthFailure,
    /// Host unreachable, DNS, TLS or socket failure
    Network,
    /// Call exceeded its configured timeout
    Timeout,
    /// Inventory path / resource not found
    NotFound,
    /// Permission denied (403)
    AccessDenied,
    /// JSON parse / deserialization error
    Parse,
    /// HTTP / API error with status code
    Api(u16),
    /// Generic
    Unknown,
}

impl VsphereErrorKind {
    /// Stable lowercase tag for serialised error payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BinaryUnavailable => "binary_unavailable",
            Self::AuthFailure => "auth_failure",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Parse => "parse",
            Self::Api(_) => "api",
            Self::Unknown => "unknown",
        }
    }
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone)]
pub struct VsphereError {
    pub kind: VsphereErrorKind,
    pub message: String,
}

impl VsphereError {
    pub fn new(kind: VsphereErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn binary_unavailable(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::BinaryUnavailable, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::AuthFailure, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Network, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Timeout, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::NotFound, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Parse, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Api(status), msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(VsphereErrorKind::Unknown, msg)
    }

    /// Build an error from a failed `govc` invocation, classifying the
    /// stderr text. The stderr is kept verbatim in the message.
    pub fn from_stderr(stderr: &str) -> Self {
        Self::new(classify_stderr(stderr), stderr.trim().to_string())
    }

    /// Same error kind with extra context in front of the message.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

/// Classify `govc` / vSphere stderr text into an error kind.
pub fn classify_stderr(stderr: &str) -> VsphereErrorKind {
    let text = stderr.to_ascii_lowercase();

    const AUTH: &[&str] = &[
        "incorrect user name or password",
        "cannot complete login",
        "invalidlogin",
        "authentication",
        "not authenticated",
        "401 unauthorized",
    ];
    const NETWORK: &[&str] = &[
        "no such host",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "no route to host",
        "dial tcp",
        "x509:",
        "tls: ",
        "eof",
    ];
    const TIMEOUT: &[&str] = &["i/o timeout", "deadline exceeded", "timed out", "timeout"];

    if AUTH.iter().any(|p| text.contains(p)) {
        VsphereErrorKind::AuthFailure
    } else if TIMEOUT.iter().any(|p| text.contains(p)) {
        VsphereErrorKind::Timeout
    } else if NETWORK.iter().any(|p| text.contains(p)) {
        VsphereErrorKind::Network
    } else if text.contains("not found") {
        VsphereErrorKind::NotFound
    } else if text.contains("permission") {
        VsphereErrorKind::AccessDenied
    } else {
        VsphereErrorKind::Unknown
    }
}

impl fmt::Display for VsphereError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for VsphereError {}

impl From<VsphereError> for String {
    fn from(e: VsphereError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for VsphereError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else {
            Self::unknown(format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for VsphereError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

impl From<std::io::Error> for VsphereError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::binary_unavailable(format!("govc binary not found: {e}"))
        } else {
            Self::unknown(format!("I/O error: {e}"))
        }
    }
}

/// Convenience alias.
pub type VsphereResult<T> = Result<T, VsphereError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_login_rejection_as_auth() {
        let kind = classify_stderr(
            "govc: ServerFaultCode: Cannot complete login due to an incorrect user name or password.",
        );
        assert_eq!(kind, VsphereErrorKind::AuthFailure);
    }

    #[test]
    fn classifies_dns_failure_as_network() {
        let kind = classify_stderr("govc: Post \"https://vc/sdk\": dial tcp: lookup vc: no such host");
        assert_eq!(kind, VsphereErrorKind::Network);
    }

    #[test]
    fn classifies_io_timeout_before_network() {
        let kind = classify_stderr("dial tcp 10.0.0.1:443: i/o timeout");
        assert_eq!(kind, VsphereErrorKind::Timeout);
    }

    #[test]
    fn classifies_missing_path_as_not_found() {
        assert_eq!(classify_stderr("govc: folder '/dc2' not found"), VsphereErrorKind::NotFound);
    }

    #[test]
    fn unknown_text_stays_unknown() {
        assert_eq!(classify_stderr("something odd happened"), VsphereErrorKind::Unknown);
    }

    #[test]
    fn stderr_is_kept_verbatim() {
        let err = VsphereError::from_stderr("  govc: boom \n");
        assert_eq!(err.message, "govc: boom");
        assert_eq!(err.kind, VsphereErrorKind::Unknown);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = VsphereError::auth("rejected").context("probe");
        assert_eq!(err.to_string(), "[AuthFailure] probe: rejected");
    }
}
