pub mod api;
pub mod service;
pub mod settings;
pub mod tfvars;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use api::ApiService;
use service::VsphereService;
use settings::{default_settings_path, SettingsStore};
use vprov_vsphere::executor::GovcExecutor;

/// Environment variable overriding the bind address from settings.
pub const BIND_ENV: &str = "VPROV_BIND";
/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "VPROV_LOG_FORMAT";

/// Install the global subscriber. `RUST_LOG` wins over the default
/// `info` level; `log` records from the library crates are captured too.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let json = std::env::var(LOG_FORMAT_ENV).map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    let settings_path = default_settings_path();
    let store = SettingsStore::load(&settings_path).await?;
    tracing::info!("Loaded settings from {}", settings_path.display());

    let settings = store.settings().clone();
    let addr = std::env::var(BIND_ENV).unwrap_or_else(|_| settings.bind_address.clone());

    // Replaced by `PUT /api/settings` when the binary, wrapper or timeout
    // change; the other govc options are read from settings per request.
    let executor = GovcExecutor::new(&settings.govc);
    tracing::info!("Using govc at {}", executor.binary_path());
    let vsphere = Arc::new(VsphereService::new(Arc::new(executor)));

    let api = Arc::new(ApiService::new(Arc::new(Mutex::new(store)), vsphere));
    api.start_server(&addr).await
}
