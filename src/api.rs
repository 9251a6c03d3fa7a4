use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use vprov_vsphere::executor::GovcExecutor;
use vprov_vsphere::{ConnectionDetails, VsphereError, VsphereErrorKind};

use crate::service::{InventoryKind, VsphereService};
use crate::settings::{AppSettings, AppSettingsSafe, SettingsStore};
use crate::tfvars::{render_tfvars, VmProvisionRequest};

#[derive(Clone)]
pub struct ApiService {
    pub settings: Arc<Mutex<SettingsStore>>,
    pub vsphere: Arc<VsphereService>,
}

impl ApiService {
    pub fn new(settings: Arc<Mutex<SettingsStore>>, vsphere: Arc<VsphereService>) -> Self {
        Self { settings, vsphere }
    }

    pub async fn start_server(self: Arc<Self>, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("REST API server listening on {}", listener.local_addr()?);
        axum::serve(listener, app).await?;

        Ok(())
    }

    pub fn create_router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            // Settings
            .route("/api/settings", get(get_settings).put(put_settings))
            // vSphere discovery
            .route("/api/vsphere/test-connection", post(test_connection))
            .route("/api/vsphere/templates", get(list_templates))
            .route("/api/vsphere/datastore-clusters", get(list_datastore_clusters))
            .route("/api/vsphere/:kind", get(list_inventory))
            // Terraform
            .route("/api/terraform/tfvars", post(render_tfvars_api))
            .with_state(self)
    }

    /// Connection and settings snapshot for a request.
    async fn configured(&self) -> Result<(ConnectionDetails, AppSettings), ApiError> {
        let store = self.settings.lock().await;
        let settings = store.settings().clone();
        let conn = settings
            .vsphere
            .clone()
            .filter(|c| !c.server.trim().is_empty() && !c.user.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("vSphere connection is not configured"))?;
        Ok((conn, settings))
    }
}

// ── Errors ──────────────────────────────────────────────────────────

/// JSON error body with a status derived from the error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: msg.into(),
        }
    }

    fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: msg.into(),
        }
    }
}

pub fn status_for(kind: VsphereErrorKind) -> StatusCode {
    match kind {
        VsphereErrorKind::AuthFailure => StatusCode::UNAUTHORIZED,
        VsphereErrorKind::AccessDenied => StatusCode::FORBIDDEN,
        VsphereErrorKind::BinaryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        VsphereErrorKind::Network | VsphereErrorKind::Timeout => StatusCode::BAD_GATEWAY,
        VsphereErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<VsphereError> for ApiError {
    fn from(e: VsphereError) -> Self {
        Self {
            status: status_for(e.kind),
            kind: e.kind.as_str(),
            message: e.message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} ({}): {}", self.status, self.kind, self.message);
        }
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "error": self.message,
                "kind": self.kind,
            })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

// ── Handlers ────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vprov API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_settings(State(services): State<Arc<ApiService>>) -> ApiResult {
    let store = services.settings.lock().await;
    let safe = AppSettingsSafe::from(store.settings());
    Ok(Json(serde_json::to_value(safe).map_err(|e| ApiError::internal(e.to_string()))?))
}

async fn put_settings(
    State(services): State<Arc<ApiService>>,
    Json(mut incoming): Json<AppSettings>,
) -> ApiResult {
    let mut store = services.settings.lock().await;
    // An empty password keeps the stored one.
    if let (Some(new), Some(old)) = (incoming.vsphere.as_mut(), store.settings().vsphere.as_ref()) {
        if new.password.is_empty() && new.server == old.server && new.user == old.user {
            new.password = old.password.clone();
        }
    }
    let relaunch = !store.settings().govc.same_invocation(&incoming.govc);
    let govc = incoming.govc.clone();
    store
        .update(incoming)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    drop(store);

    if relaunch {
        let executor = GovcExecutor::new(&govc);
        tracing::info!("govc invocation changed, now using {}", executor.binary_path());
        services.vsphere.replace_runner(Arc::new(executor)).await;
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct TestConnectionRequest {
    server: String,
    user: String,
    password: String,
    #[serde(default)]
    save: bool,
}

async fn test_connection(
    State(services): State<Arc<ApiService>>,
    Json(req): Json<TestConnectionRequest>,
) -> ApiResult {
    if req.server.trim().is_empty() || req.user.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("server, user and password are required"));
    }
    let conn = ConnectionDetails::new(req.server.trim(), req.user.trim(), req.password);
    let govc = services.settings.lock().await.settings().govc.clone();

    let outcome = services.vsphere.test_connection(&conn, &govc).await?;

    if req.save {
        services
            .settings
            .lock()
            .await
            .set_connection(conn)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "format": outcome.candidate,
        "attempt": outcome.attempt,
        "url": outcome.url,
        "datacenters": outcome.datacenters,
    })))
}

#[derive(Deserialize)]
struct DatacenterQuery {
    datacenter: Option<String>,
}

async fn list_inventory(
    State(services): State<Arc<ApiService>>,
    Path(kind): Path<String>,
    Query(q): Query<DatacenterQuery>,
) -> ApiResult {
    let kind = InventoryKind::from_segment(&kind).ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        kind: "not_found",
        message: format!("Unknown inventory type '{kind}'"),
    })?;
    let (conn, settings) = services.configured().await?;
    let items = services
        .vsphere
        .list_inventory(&conn, &settings.govc, kind, q.datacenter.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "items": items })))
}

async fn list_templates(
    State(services): State<Arc<ApiService>>,
    Query(q): Query<DatacenterQuery>,
) -> ApiResult {
    let (conn, settings) = services.configured().await?;
    let templates = services
        .vsphere
        .list_templates(&conn, &settings.govc, q.datacenter.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "templates": templates })))
}

async fn list_datastore_clusters(
    State(services): State<Arc<ApiService>>,
    Query(q): Query<DatacenterQuery>,
) -> ApiResult {
    let (conn, settings) = services.configured().await?;
    let rest = settings.rest_fallback.then_some(&settings.rest);
    let groups = services
        .vsphere
        .datastore_clusters(&conn, &settings.govc, rest, q.datacenter.as_deref())
        .await?;
    let derived = groups.iter().any(|g| g.derived);
    Ok(Json(serde_json::json!({
        "success": true,
        "datastoreClusters": groups,
        "derived": derived,
    })))
}

async fn render_tfvars_api(Json(req): Json<VmProvisionRequest>) -> ApiResult {
    let text = render_tfvars(&req).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(serde_json::json!({ "success": true, "tfvars": text })))
}
