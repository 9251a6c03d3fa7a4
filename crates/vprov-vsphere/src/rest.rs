//! vSphere REST API HTTP client with session-based authentication.
//!
//! Talks to vCenter via `https://{host}/rest/...`. Every payload comes
//! wrapped in a `{ "value": ... }` envelope. Login tries the same username
//! spellings the `govc` probe uses.

use crate::candidates::distinct_users;
use crate::error::{VsphereError, VsphereErrorKind, VsphereResult};
use crate::types::{
    ConnectionDetails, RestCluster, RestConfig, RestDatacenter, RestDatastore, RestHost, RestNetwork,
};

use log::{debug, info};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const SESSION_PATH: &str = "/rest/com/vmware/cis/session";
const SESSION_HEADER: &str = "vmware-api-session-id";

#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
}

/// Base URL (`https://host[:port]`) for a server string that may carry a
/// scheme, a port or an `/sdk` path.
pub fn base_url(server: &str) -> VsphereResult<String> {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(VsphereError::unknown("vSphere server is empty"));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| VsphereError::unknown(format!("Invalid vSphere server '{server}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| VsphereError::unknown(format!("No host in vSphere server '{server}'")))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Storage pod id (`group-p…`) a datastore detail document points at.
///
/// Different vCenter builds expose the parent under different keys; the
/// first string value that looks like a storage pod id wins.
pub fn parent_pod_reference(detail: &Value) -> Option<String> {
    const KEYS: &[&str] = &["datastore_cluster", "storage_pod", "parent", "folder"];
    let obj = detail.get("value").unwrap_or(detail);
    KEYS.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o
                .get("value")
                .or_else(|| o.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .find(|id| id.starts_with("group-p"))
}

/// vSphere REST API client.
pub struct VsphereRestClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
    username: Option<String>,
}

impl VsphereRestClient {
    /// Build a new client for a server (does NOT create a session yet).
    pub fn new(server: &str, config: &RestConfig) -> VsphereResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| VsphereError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url(server)?,
            session_id: None,
            username: None,
        })
    }

    /// Build a client and log in, trying each username spelling in turn.
    ///
    /// Only authentication failures move on to the next spelling.
    pub async fn connect(connection: &ConnectionDetails, config: &RestConfig) -> VsphereResult<Self> {
        let mut client = Self::new(&connection.server, config)?;
        let users = distinct_users(connection);
        let mut last_err = None;
        for user in &users {
            match client.login(user, &connection.password).await {
                Ok(_) => {
                    info!("vSphere REST session opened on {} as {}", client.base_url, user);
                    return Ok(client);
                }
                Err(e) if e.kind == VsphereErrorKind::AuthFailure => {
                    debug!("REST login as {} rejected: {}", user, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| VsphereError::auth("no usernames to try"))
            .context(format!("all {} username forms rejected", users.len())))
    }

    /// Base URL for API calls.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether we have an active session.
    pub fn is_connected(&self) -> bool {
        self.session_id.is_some()
    }

    /// Username the current session was opened with.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    // ── Session management ──────────────────────────────────────────

    /// Create a new API session (POST /rest/com/vmware/cis/session).
    pub async fn login(&mut self, username: &str, password: &str) -> VsphereResult<String> {
        let url = format!("{}{}", self.base_url, SESSION_PATH);

        let resp = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(VsphereError::auth(format!("Invalid credentials for {username}")));
        }

        let resp = Self::check_status(resp).await?;
        let session: Envelope<String> = Self::parse_response(resp).await?;

        self.session_id = Some(session.value.clone());
        self.username = Some(username.to_string());
        Ok(session.value)
    }

    /// Delete the current session (DELETE /rest/com/vmware/cis/session).
    pub async fn logout(&mut self) -> VsphereResult<()> {
        if let Some(ref sid) = self.session_id {
            let url = format!("{}{}", self.base_url, SESSION_PATH);
            let _ = self
                .client
                .delete(&url)
                .header(SESSION_HEADER, sid.as_str())
                .send()
                .await;
        }
        self.session_id = None;
        self.username = None;
        Ok(())
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn require_session(&self) -> VsphereResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| VsphereError::auth("Not logged in, no active session"))
    }

    /// GET and unwrap the `value` envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> VsphereResult<T> {
        let sid = self.require_session()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, sid)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let env: Envelope<T> = Self::parse_response(resp).await?;
        Ok(env.value)
    }

    // ── Inventory ───────────────────────────────────────────────────

    pub async fn list_datacenters(&self) -> VsphereResult<Vec<RestDatacenter>> {
        self.get("/rest/vcenter/datacenter").await
    }

    pub async fn list_clusters(&self) -> VsphereResult<Vec<RestCluster>> {
        self.get("/rest/vcenter/cluster").await
    }

    pub async fn list_hosts(&self) -> VsphereResult<Vec<RestHost>> {
        self.get("/rest/vcenter/host").await
    }

    pub async fn list_networks(&self) -> VsphereResult<Vec<RestNetwork>> {
        self.get("/rest/vcenter/network").await
    }

    pub async fn list_datastores(&self) -> VsphereResult<Vec<RestDatastore>> {
        self.get("/rest/vcenter/datastore").await
    }

    /// Datastores of one datacenter (by name), or of the whole vCenter.
    pub async fn list_datastores_in(&self, datacenter: Option<&str>) -> VsphereResult<Vec<RestDatastore>> {
        let Some(name) = datacenter.map(|d| d.trim().trim_matches('/')).filter(|d| !d.is_empty()) else {
            return self.list_datastores().await;
        };
        let id = self
            .list_datacenters()
            .await?
            .into_iter()
            .find(|dc| dc.name == name)
            .map(|dc| dc.datacenter)
            .ok_or_else(|| VsphereError::not_found(format!("Datacenter '{name}' not found")))?;
        self.get(&format!("/rest/vcenter/datastore?filter.datacenters={id}")).await
    }

    /// Raw datastore detail document (unwrapped from its envelope).
    pub async fn get_datastore(&self, datastore_id: &str) -> VsphereResult<Value> {
        self.get(&format!("/rest/vcenter/datastore/{datastore_id}")).await
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> VsphereResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => Err(VsphereError::auth(format!("Session expired or invalid: {body}"))),
            StatusCode::FORBIDDEN => Err(VsphereError::new(
                VsphereErrorKind::AccessDenied,
                format!("Access denied: {body}"),
            )),
            StatusCode::NOT_FOUND => Err(VsphereError::not_found(format!("Resource not found: {body}"))),
            _ => Err(VsphereError::api(code, format!("API error {code}: {body}"))),
        }
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> VsphereResult<T> {
        let text = resp
            .text()
            .await
            .map_err(|e| VsphereError::parse(format!("Failed to read response body: {e}")))?;

        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(500).collect();
            VsphereError::parse(format!("JSON parse error: {e}, body: {preview}"))
        })
    }
}

/// Minimal vCenter REST endpoint on a loopback socket.
#[cfg(test)]
pub(crate) mod stub_vcenter {
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// `Authorization` header for `alice:pw`.
    pub const ALICE_AUTH: &str = "Basic YWxpY2U6cHc=";

    #[derive(Debug, Clone, Copy)]
    pub enum Login {
        /// 200 for `alice:pw`, 401 for anything else.
        AliceOnly,
        /// 500 for every attempt.
        Broken,
    }

    pub struct StubVcenter {
        pub server: String,
        /// `METHOD PATH` of every request, in arrival order.
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubVcenter {
        pub fn count(&self, prefix: &str) -> usize {
            self.requests.lock().unwrap().iter().filter(|r| r.starts_with(prefix)).count()
        }
    }

    const SESSION: &str = "/rest/com/vmware/cis/session";

    fn detail(name: &str, pod: Option<&str>) -> String {
        match pod {
            Some(pod) => format!(r#"{{"value":{{"name":"{name}","type":"VMFS","datastore_cluster":"{pod}"}}}}"#),
            None => format!(r#"{{"value":{{"name":"{name}","type":"VMFS"}}}}"#),
        }
    }

    fn respond(login: Login, method: &str, path: &str, auth: Option<&str>) -> (&'static str, String) {
        const LAB: &str = r#"{"value":[
            {"datastore":"datastore-11","name":"gold-01","type":"VMFS"},
            {"datastore":"datastore-12","name":"gold-02","type":"VMFS"},
            {"datastore":"datastore-13","name":"local","type":"VMFS"}]}"#;
        const EDGE: &str = r#"{"value":[
            {"datastore":"datastore-21","name":"silver-ds01","type":"NFS"},
            {"datastore":"datastore-22","name":"silver-ds02","type":"NFS"}]}"#;
        const ALL: &str = r#"{"value":[
            {"datastore":"datastore-11","name":"gold-01","type":"VMFS"},
            {"datastore":"datastore-12","name":"gold-02","type":"VMFS"},
            {"datastore":"datastore-13","name":"local","type":"VMFS"},
            {"datastore":"datastore-21","name":"silver-ds01","type":"NFS"},
            {"datastore":"datastore-22","name":"silver-ds02","type":"NFS"},
            {"datastore":"datastore-31","name":"bronze-ds01","type":"NFS"},
            {"datastore":"datastore-32","name":"bronze-ds02","type":"NFS"}]}"#;

        match (method, path) {
            ("POST", SESSION) => match login {
                Login::Broken => ("500 Internal Server Error", r#"{"type":"error"}"#.into()),
                Login::AliceOnly if auth == Some(ALICE_AUTH) => ("200 OK", r#"{"value":"sess-1"}"#.into()),
                Login::AliceOnly => ("401 Unauthorized", r#"{"type":"unauthenticated"}"#.into()),
            },
            ("DELETE", SESSION) => ("200 OK", String::new()),
            ("GET", "/rest/vcenter/datacenter") => (
                "200 OK",
                r#"{"value":[{"datacenter":"datacenter-2","name":"Lab"},{"datacenter":"datacenter-9","name":"Edge"}]}"#.into(),
            ),
            ("GET", "/rest/vcenter/datastore") => ("200 OK", ALL.into()),
            ("GET", "/rest/vcenter/datastore?filter.datacenters=datacenter-2") => ("200 OK", LAB.into()),
            ("GET", "/rest/vcenter/datastore?filter.datacenters=datacenter-9") => ("200 OK", EDGE.into()),
            ("GET", "/rest/vcenter/datastore/datastore-11") => ("200 OK", detail("gold-01", Some("group-p3"))),
            ("GET", "/rest/vcenter/datastore/datastore-12") => ("200 OK", detail("gold-02", Some("group-p3"))),
            ("GET", "/rest/vcenter/datastore/datastore-13") => ("200 OK", detail("local", None)),
            ("GET", p) if p.starts_with("/rest/vcenter/datastore/") => ("200 OK", detail("plain", None)),
            _ => ("404 Not Found", r#"{"type":"not_found"}"#.into()),
        }
    }

    pub async fn start(login: Login) -> StubVcenter {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 2048];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
                    let method = request_line.next().unwrap_or_default().to_string();
                    let path = request_line.next().unwrap_or_default().to_string();
                    let auth = head.lines().find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("authorization").then(|| v.trim().to_string())
                    });
                    log.lock().unwrap().push(format!("{method} {path}"));

                    let (status, body) = respond(login, &method, &path, auth.as_deref());
                    let resp = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });

        StubVcenter { server, requests }
    }
}
