use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::bus::SYNC_PATH;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [bus]
//                    reconnect_interval_ms = 500
//
//   env var:         DRAFT_BUS__RECONNECT_INTERVAL_MS=500   (double underscore = nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub bus: BusFileConfig,
    #[serde(default)]
    pub analysis: AnalysisFileConfig,
    #[serde(default)]
    pub data: DataFileConfig,
}

/// Relay listener (lives under `[relay]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Bus client tunables (lives under `[bus]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusFileConfig {
    /// Full relay URL. Derived from `[relay]` when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// How often a connected window re-sends REQUEST_SYNC. 0 disables.
    #[serde(default = "default_resync_interval_ms")]
    pub resync_interval_ms: u64,
    /// Answer REQUEST_SYNC even while holding no state.
    #[serde(default)]
    pub authoritative: bool,
}

impl Default for BusFileConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            resync_interval_ms: default_resync_interval_ms(),
            authoritative: false,
        }
    }
}

/// Analysis service tunables (lives under `[analysis]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisFileConfig {
    /// HTTP endpoint streaming analysis text. Analysis is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    /// 0 disables the timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AnalysisFileConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            publish_interval_ms: default_publish_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Data file locations (lives under `[data]` in config.toml). Relative paths
/// resolve against the data directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataFileConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    #[serde(default)]
    pub role_db: Option<PathBuf>,
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
    /// Snapshot written by `watch` windows.
    #[serde(default = "default_overlay_snapshot")]
    pub overlay_snapshot: PathBuf,
}

impl Default for DataFileConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            role_db: None,
            snapshot: default_snapshot(),
            overlay_snapshot: default_overlay_snapshot(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_reconnect_interval_ms() -> u64 {
    2000
}
fn default_resync_interval_ms() -> u64 {
    30_000
}
fn default_publish_interval_ms() -> u64 {
    100
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_catalog() -> PathBuf {
    PathBuf::from("champions.json")
}
fn default_snapshot() -> PathBuf {
    PathBuf::from("draft-snapshot.json")
}
fn default_overlay_snapshot() -> PathBuf {
    PathBuf::from("overlay-snapshot.json")
}

/// Build a figment that layers: defaults → config.toml → DRAFT_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `DRAFT_RELAY__PORT=9000`  →  `relay.port = 9000`
///   `DRAFT_ANALYSIS__ENDPOINT=http://...`  →  `analysis.endpoint = "http://..."`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("DRAFT_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", fc.host, fc.port)
            .parse()
            .with_context(|| format!("Invalid relay address {}:{}", fc.host, fc.port))?;
        Ok(Self { bind_addr })
    }
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Relay WebSocket URL.
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Periodic REQUEST_SYNC while connected, recovering dropped frames.
    pub resync_interval: Option<Duration>,
    pub channel_capacity: usize,
}

impl BusConfig {
    pub fn from_file(fc: &BusFileConfig, relay: &RelayFileConfig) -> Self {
        Self {
            url: fc
                .url
                .clone()
                .unwrap_or_else(|| format!("ws://{}:{}{}", relay.host, relay.port, SYNC_PATH)),
            reconnect_interval: Duration::from_millis(fc.reconnect_interval_ms),
            resync_interval: (fc.resync_interval_ms > 0)
                .then(|| Duration::from_millis(fc.resync_interval_ms)),
            channel_capacity: 256,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub endpoint: Option<String>,
    /// Minimum spacing between streamed bus publications per mode.
    pub publish_interval: Duration,
    pub request_timeout: Option<Duration>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_file(&AnalysisFileConfig::default())
    }
}

impl AnalysisConfig {
    pub fn from_file(fc: &AnalysisFileConfig) -> Self {
        Self {
            endpoint: fc.endpoint.clone().filter(|e| !e.is_empty()),
            publish_interval: Duration::from_millis(fc.publish_interval_ms),
            request_timeout: if fc.request_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.request_timeout_secs))
            },
        }
    }
}

// =============================================================================
// Directory layout config (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct DraftSyncConfig {
    pub data_dir: PathBuf,
}

impl DraftSyncConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".draftsync"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Using data directory: {:?}", data_dir);
        Ok(Self { data_dir })
    }

    /// Resolve a configured data file path against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}
