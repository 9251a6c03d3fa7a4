//! JSON settings store.
//!
//! Holds the vCenter connection and the `govc` / REST options. The
//! discovery core never reads this file; handlers pass what they need as
//! arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vprov_vsphere::{ConnectionDetails, ConnectionDetailsSafe, GovcConfig, RestConfig};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "VPROV_SETTINGS";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub vsphere: Option<ConnectionDetails>,
    #[serde(default)]
    pub govc: GovcConfig,
    #[serde(default)]
    pub rest: RestConfig,
    /// Consult the REST API when the inventory has no storage pods
    #[serde(default = "default_rest_fallback")]
    pub rest_fallback: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_rest_fallback() -> bool {
    true
}
fn default_bind_address() -> String { "127.0.0.1:3000".to_string() }

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            vsphere: None,
            govc: GovcConfig::default(),
            rest: RestConfig::default(),
            rest_fallback: true,
            bind_address: default_bind_address(),
        }
    }
}

/// Settings as returned to clients: the password is never echoed back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettingsSafe {
    pub vsphere: Option<ConnectionDetailsSafe>,
    pub govc: GovcConfig,
    pub rest: RestConfig,
    pub rest_fallback: bool,
    pub bind_address: String,
}

impl From<&AppSettings> for AppSettingsSafe {
    fn from(s: &AppSettings) -> Self {
        Self {
            vsphere: s.vsphere.as_ref().map(ConnectionDetailsSafe::from),
            govc: s.govc.clone(),
            rest: s.rest.clone(),
            rest_fallback: s.rest_fallback,
            bind_address: s.bind_address.clone(),
        }
    }
}

/// Default settings path: `$VPROV_SETTINGS`, else
/// `<config dir>/vprov/settings.json`.
pub fn default_settings_path() -> PathBuf {
    if let Ok(p) = std::env::var(SETTINGS_ENV) {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vprov")
        .join("settings.json")
}

/// File-backed settings.
pub struct SettingsStore {
    path: PathBuf,
    settings: AppSettings,
}

impl SettingsStore {
    /// Load from `path`; a missing file yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => AppSettings::default(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|source| SettingsError::Json { path: display.clone(), source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings file at {}, using defaults", display);
                AppSettings::default()
            }
            Err(source) => return Err(SettingsError::Io { path: display, source }),
        };
        Ok(Self { path, settings })
    }

    /// In-memory store for `settings`, saved to `path` on demand.
    pub fn with_settings(path: impl AsRef<Path>, settings: AppSettings) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Replace the settings and persist them.
    pub async fn update(&mut self, settings: AppSettings) -> Result<(), SettingsError> {
        self.settings = settings;
        self.save().await
    }

    /// Store a new vCenter connection and persist.
    pub async fn set_connection(&mut self, connection: ConnectionDetails) -> Result<(), SettingsError> {
        self.settings.vsphere = Some(connection);
        self.save().await
    }

    pub async fn save(&self) -> Result<(), SettingsError> {
        let display = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SettingsError::Io { path: display.clone(), source })?;
        }
        let json = serde_json::to_string_pretty(&self.settings)
            .map_err(|source| SettingsError::Json { path: display.clone(), source })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| SettingsError::Io { path: display, source })
    }
}
