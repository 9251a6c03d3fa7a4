use std::sync::Arc;
use tokio::sync::Mutex;

use async_trait::async_trait;
use vprov_lib::api::ApiService;
use vprov_lib::service::{InventoryKind, VsphereService};
use vprov_lib::settings::{AppSettings, SettingsStore};
use vprov_lib::tfvars::{render_tfvars, VmProvisionRequest};
use vprov_vsphere::executor::{CommandRunner, GovcEnv};
use vprov_vsphere::{ConnectionDetails, GovcConfig, VsphereError, VsphereErrorKind, VsphereResult};

/// Small vCenter: one datacenter, flat datastores, no storage pods, and a
/// login that only accepts `user@domain` over https.
struct LabGovc;

#[async_trait]
impl CommandRunner for LabGovc {
    async fn run(&self, args: &[String], env: &GovcEnv) -> VsphereResult<String> {
        if env.username != "alice@CORP" || !env.url.starts_with("https://") {
            return Err(VsphereError::from_stderr(
                "govc: ServerFaultCode: Cannot complete login due to an incorrect user name or password.",
            ));
        }
        let out = match (args[0].as_str(), args.get(3).map(String::as_str)) {
            ("ls", _) => "/Lab",
            ("find", Some("s")) => "/Lab/datastore/vsan-ds01\n/Lab/datastore/vsan-ds02\n/Lab/datastore/local",
            ("find", Some("StoragePod")) => "",
            ("find", Some("m")) => "/Lab/vm/tmpl/rhel9\n/Lab/vm/tmpl/win2022",
            ("vm.info", _) => r#"{"virtualMachines":[
                {"config":{"name":"rhel9","guestId":"rhel9_64Guest","guestFullName":"Red Hat Enterprise Linux 9 (64-bit)"}},
                {"config":{"name":"win2022","guestId":"windows2019srvNext_64Guest","guestFullName":"Microsoft Windows Server 2022 (64-bit)"}}
            ]}"#,
            _ => "",
        };
        Ok(out.to_string())
    }
}

fn lab_connection() -> ConnectionDetails {
    ConnectionDetails::new("vc.lab.local", "CORP\\alice", "pw")
}

#[tokio::test]
async fn test_api_router_creation() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::with_settings(dir.path().join("settings.json"), AppSettings::default());
    let vsphere = Arc::new(VsphereService::new(Arc::new(LabGovc)));
    let api_service = ApiService::new(Arc::new(Mutex::new(store)), vsphere);

    // Test that the router can be created
    let _router = Arc::new(api_service).create_router();
}

#[tokio::test]
async fn test_probe_then_discover() {
    let svc = VsphereService::new(Arc::new(LabGovc));
    let conn = lab_connection();
    let govc = GovcConfig::default();

    let outcome = svc.test_connection(&conn, &govc).await.unwrap();
    assert_eq!(outcome.attempt, 9);
    assert_eq!(outcome.url, "https://vc.lab.local");
    assert_eq!(outcome.datacenters[0].name, "Lab");

    let datastores = svc
        .list_inventory(&conn, &govc, InventoryKind::Datastores, Some("Lab"))
        .await
        .unwrap();
    assert_eq!(datastores.len(), 3);

    let templates = svc.list_templates(&conn, &govc, None).await.unwrap();
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[1].guest_full_name, "Microsoft Windows Server 2022 (64-bit)");

    let groups = svc.datastore_clusters(&conn, &govc, None, Some("Lab")).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "vsan");
    assert!(groups[0].derived);
}

#[tokio::test]
async fn test_unprobed_connection_uses_canonical_format() {
    let svc = VsphereService::new(Arc::new(LabGovc));
    let err = svc
        .list_inventory(&lab_connection(), &GovcConfig::default(), InventoryKind::Datacenters, None)
        .await
        .unwrap_err();
    // Canonical format sends the username as given, which this lab rejects.
    assert_eq!(err.kind, VsphereErrorKind::AuthFailure);
}

#[tokio::test]
async fn test_settings_round_trip_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let mut store = SettingsStore::load(&path).await.unwrap();
    store.set_connection(lab_connection()).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("vc.lab.local"));
    assert!(text.contains("\"templateBatchSize\": 10"));
}

#[tokio::test]
async fn test_settings_update_keeps_password_and_relaunches_govc() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = AppSettings::default();
    settings.vsphere = Some(ConnectionDetails::new("vc.lab.local", "admin", "secret"));
    let store = Arc::new(Mutex::new(SettingsStore::with_settings(dir.path().join("settings.json"), settings)));
    let vsphere = Arc::new(VsphereService::new(Arc::new(LabGovc)));
    let router = Arc::new(ApiService::new(store.clone(), vsphere)).create_router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let http = reqwest::Client::new();

    // LabGovc rejects the plain username.
    let resp = http.get(format!("{base}/api/vsphere/datacenters")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = http
        .put(format!("{base}/api/settings"))
        .json(&serde_json::json!({
            "vsphere": { "server": "vc.lab.local", "user": "admin" },
            "govc": { "binaryPath": "/nonexistent/govc/bin/govc" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    {
        let store = store.lock().await;
        let saved = store.settings().vsphere.as_ref().unwrap();
        assert_eq!(saved.password, "secret");
        assert_eq!(store.settings().govc.binary_path, "/nonexistent/govc/bin/govc");
    }

    // The new binary path takes effect without a restart.
    let resp = http.get(format!("{base}/api/vsphere/datacenters")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "binary_unavailable");
}

#[test]
fn test_tfvars_for_discovered_cluster() {
    let req = VmProvisionRequest {
        vm_name: "app-01".into(),
        cpu: 4,
        memory_mb: 8192,
        datacenter: "Lab".into(),
        cluster: "cl-a".into(),
        datastore_cluster: Some("vsan".into()),
        network: "VM Network".into(),
        template: "rhel9".into(),
        ..Default::default()
    };
    let text = render_tfvars(&req).unwrap();
    assert!(text.starts_with("vm_name = \"app-01\"\n"));
}
