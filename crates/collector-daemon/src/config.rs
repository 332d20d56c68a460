//! Configuration file management.

use std::path::PathBuf;

use collector_evidence::EvidenceConfig;
use collector_types::{COMPACT_MIN_BYTES, DAY_SECS};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "COLLECTOR_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Periodic maintenance settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Admin socket settings.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Repository directory. Empty = $data_dir/evidence/.
    #[serde(default)]
    pub repo_dir: String,
    /// Chunked transfer directory. Empty = $data_dir/evidence_chunk/.
    #[serde(default)]
    pub chunk_dir: String,
    /// Days an empty idle repository is kept after its last sync.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Repositories below this size are never vacuumed.
    #[serde(default = "default_compact_min_bytes")]
    pub compact_min_bytes: u64,
}

/// Maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between retention sweeps. 0 disables the periodic sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Time out every in-flight sync at startup.
    #[serde(default = "default_true")]
    pub timeout_on_startup: bool,
    /// Sweep with forced timeout at startup, deleting every idle empty repository.
    #[serde(default)]
    pub purge_on_startup: bool,
}

/// Admin socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Serve the JSON-RPC admin socket.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Socket path. Empty = $data_dir/collector.sock.
    #[serde(default)]
    pub socket_path: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u64 {
    7
}

fn default_compact_min_bytes() -> u64 {
    COMPACT_MIN_BYTES
}

fn default_sweep_interval() -> u64 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            repo_dir: String::new(),
            chunk_dir: String::new(),
            retention_days: default_retention_days(),
            compact_min_bytes: default_compact_min_bytes(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            timeout_on_startup: true,
            purge_on_startup: false,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the repository directory path.
    pub fn repo_dir(&self) -> PathBuf {
        or_under(&self.storage.repo_dir, self.data_dir(), "evidence")
    }

    /// Get the chunked transfer directory path.
    pub fn chunk_dir(&self) -> PathBuf {
        or_under(&self.storage.chunk_dir, self.data_dir(), "evidence_chunk")
    }

    /// Get the admin socket path.
    pub fn socket_path(&self) -> PathBuf {
        or_under(&self.admin.socket_path, self.data_dir(), "collector.sock")
    }

    /// Settings for the ingestion facade.
    pub fn evidence(&self) -> EvidenceConfig {
        EvidenceConfig {
            repo_dir: self.repo_dir(),
            chunk_dir: self.chunk_dir(),
            retention_secs: self.storage.retention_days.saturating_mul(DAY_SECS),
            compact_min_bytes: self.storage.compact_min_bytes,
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Collector")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".collector")
        }
    }
}

fn or_under(configured: &str, base: PathBuf, name: &str) -> PathBuf {
    if configured.is_empty() {
        base.join(name)
    } else {
        PathBuf::from(configured)
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/collector"))
}
