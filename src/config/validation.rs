//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the mount table covers every configured directory
//! - Keep plugin and backup trees out of the protected area
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), ValidationErrors>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::backup::archive::{MAX_ITERATIONS, MAX_MEMORY_KIB, MIN_MEMORY_KIB};
use crate::config::schema::ServiceConfig;
use crate::error::{FieldError, ValidationErrors};
use crate::vfs::path::{is_within, normalize};
use crate::vfs::policy::ProtectedPathPolicy;

/// Validate a loaded configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(FieldError::on(
            "listener.bind_address",
            format!("invalid socket address `{}`", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(FieldError::on(
                "listener.tls",
                "certificate and key paths are required",
            ));
        }
    }

    let mounts = &config.storage.mounts;
    if mounts.is_empty() {
        errors.push(FieldError::on("storage.mounts", "at least one mount is required"));
    }
    let mut prefixes = HashSet::new();
    for mount in mounts {
        if !mount.prefix.starts_with('/') || normalize(&mount.prefix) == "/" {
            errors.push(FieldError::on(
                "storage.mounts",
                format!("mount prefix `{}` must be an absolute sub-directory", mount.prefix),
            ));
        }
        if !prefixes.insert(normalize(&mount.prefix)) {
            errors.push(FieldError::on(
                "storage.mounts",
                format!("duplicate mount prefix `{}`", mount.prefix),
            ));
        }
        if mount.host_path.is_empty() {
            errors.push(FieldError::on(
                "storage.mounts",
                format!("mount `{}` has no host path", mount.prefix),
            ));
        }
    }

    let mounted = |path: &str| {
        let path = normalize(path);
        prefixes
            .iter()
            .any(|prefix| is_within(&path, prefix) && &path != prefix)
    };

    if !mounted(&config.storage.config_dir) {
        errors.push(FieldError::on(
            "storage.config_dir",
            format!(
                "`{}` must be a directory on a mounted volume",
                config.storage.config_dir
            ),
        ));
    }

    let policy = ProtectedPathPolicy::from_config(&config.storage, &config.protection);

    let content_dir = &config.plugins.content_dir;
    if !mounted(content_dir) {
        errors.push(FieldError::on(
            "plugins.content_dir",
            format!("`{}` must be a directory on a mounted volume", content_dir),
        ));
    } else if policy.is_protected(content_dir) {
        errors.push(FieldError::on(
            "plugins.content_dir",
            format!("`{}` is a protected path", content_dir),
        ));
    }

    for dir in &config.backup.include_dirs {
        if !mounted(dir) {
            errors.push(FieldError::on(
                "backup.include_dirs",
                format!("`{}` must be a directory on a mounted volume", dir),
            ));
        } else if policy.is_protected(dir) {
            errors.push(FieldError::on(
                "backup.include_dirs",
                format!("`{}` is a protected path", dir),
            ));
        }
    }
    let includes: Vec<String> = config.backup.include_dirs.iter().map(|d| normalize(d)).collect();
    for (i, a) in includes.iter().enumerate() {
        for b in includes.iter().skip(i + 1) {
            if is_within(a, b) || is_within(b, a) {
                errors.push(FieldError::on(
                    "backup.include_dirs",
                    format!("`{}` and `{}` overlap", a, b),
                ));
            }
        }
    }

    let backup = &config.backup;
    if !(MIN_MEMORY_KIB..=MAX_MEMORY_KIB).contains(&backup.kdf_memory_kib) {
        errors.push(FieldError::on(
            "backup.kdf_memory_kib",
            format!("must be between {} and {}", MIN_MEMORY_KIB, MAX_MEMORY_KIB),
        ));
    }
    if !(1..=MAX_ITERATIONS).contains(&backup.kdf_iterations) {
        errors.push(FieldError::on(
            "backup.kdf_iterations",
            format!("must be between 1 and {}", MAX_ITERATIONS),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(FieldError::on("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(FieldError::on(
            "observability.metrics_address",
            format!(
                "invalid socket address `{}`",
                config.observability.metrics_address
            ),
        ));
    }

    if config.admin.api_key.is_empty() {
        errors.push(FieldError::on("admin.api_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
