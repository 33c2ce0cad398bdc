//! Configuration schema definitions.
//!
//! This module defines the service configuration of the config store daemon.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

/// Root configuration for the config store service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Admin API listener (bind address, TLS).
    pub listener: ListenerConfig,

    /// Mount table and configuration directory.
    pub storage: StorageConfig,

    /// Extra protected roots and names.
    pub protection: ProtectionConfig,

    /// Plugin content location.
    pub plugins: PluginConfig,

    /// Backup contents.
    pub backup: BackupConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Logical volume mapped onto a host directory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MountConfig {
    /// Logical prefix (e.g., "/store").
    pub prefix: String,

    /// Host directory backing the prefix.
    pub host_path: String,
}

/// Storage layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Mounted volumes.
    pub mounts: Vec<MountConfig>,

    /// Logical directory holding one file per namespace. Always protected.
    pub config_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mounts: vec![
                MountConfig {
                    prefix: "/store".to_string(),
                    host_path: "./data/store".to_string(),
                },
                MountConfig {
                    prefix: "/sd".to_string(),
                    host_path: "./data/sd".to_string(),
                },
            ],
            config_dir: "/store/ovms_config".to_string(),
        }
    }
}

/// Protected-path policy additions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Additional protected roots (logical paths).
    pub protected_roots: Vec<String>,

    /// Directory names protected wherever they appear.
    pub protected_names: Vec<String>,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            protected_roots: Vec::new(),
            protected_names: vec!["ovms_config".to_string()],
        }
    }
}

/// Plugin settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Logical directory holding one content file per plugin key.
    pub content_dir: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            content_dir: "/store/plugin".to_string(),
        }
    }
}

/// Backup settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Script/content trees stored in archives. Everything else on the
    /// volumes is user data and is neither saved nor restored.
    pub include_dirs: Vec<String>,

    /// Argon2id memory cost for new archives, in KiB.
    pub kdf_memory_kib: u32,

    /// Argon2id iterations for new archives.
    pub kdf_iterations: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            include_dirs: vec![
                "/store/events".to_string(),
                "/store/scripts".to_string(),
                "/store/plugin".to_string(),
            ],
            kdf_memory_kib: 19 * 1024,
            kdf_iterations: 2,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Admin request timeout in seconds. Restores keep running past it.
    pub request_secs: u64,

    /// Grace period between a successful restore and the restart, in milliseconds.
    pub restart_delay_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            restart_delay_ms: 500,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "cfgstore=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Maximum request body size in bytes (plugin content, file editor).
    pub max_body_size: usize,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            max_body_size: 512 * 1024,
        }
    }
}
