//! Logging settings (`log`).

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::store::{ParamMap, ParamStore};
use crate::vfs::ProtectedPathPolicy;

pub const LOG_NAMESPACE: &str = "log";

const LEVELS: &[&str] = &["none", "error", "warn", "info", "debug", "verbose"];
const LOG_ROOTS: &[&str] = &["/sd/", "/store/"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLevel {
    pub tag: String,
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingForm {
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub file_path: String,
    /// Rotation size in KiB.
    #[serde(default)]
    pub file_maxsize: Option<u32>,
    /// Days to keep rotated files.
    #[serde(default)]
    pub file_keepdays: Option<u32>,
    /// Seconds between flushes.
    #[serde(default)]
    pub file_syncperiod: Option<u32>,
    /// Default level.
    #[serde(default)]
    pub level: String,
    /// Per-component overrides. Rows with an empty tag or level are skipped.
    #[serde(default)]
    pub tag_levels: Vec<TagLevel>,
}

impl LoggingForm {
    fn to_map(&self) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert(
            "file.enable".into(),
            if self.file_enable { "yes" } else { "no" }.into(),
        );
        map.insert("file.path".into(), self.file_path.clone());
        let numbers = [
            ("file.maxsize", self.file_maxsize),
            ("file.keepdays", self.file_keepdays),
            ("file.syncperiod", self.file_syncperiod),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                map.insert(key.into(), value.to_string());
            }
        }
        map.insert("level".into(), self.level.clone());
        for tl in &self.tag_levels {
            if !tl.tag.is_empty() && !tl.level.is_empty() {
                map.insert(format!("level.{}", tl.tag), tl.level.clone());
            }
        }
        map
    }
}

/// Current settings in form shape.
pub fn load_logging(store: &ParamStore) -> LoggingForm {
    let map = store.snapshot(LOG_NAMESPACE);
    let get = |key: &str| map.get(key).cloned().unwrap_or_default();
    let number = |key: &str| map.get(key).and_then(|v| v.parse().ok());
    LoggingForm {
        file_enable: get("file.enable") == "yes",
        file_path: get("file.path"),
        file_maxsize: number("file.maxsize"),
        file_keepdays: number("file.keepdays"),
        file_syncperiod: number("file.syncperiod"),
        level: get("level"),
        tag_levels: map
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("level.").map(|tag| TagLevel {
                    tag: tag.to_string(),
                    level: v.clone(),
                })
            })
            .collect(),
    }
}

/// Replace the logging settings.
pub fn save_logging(
    store: &ParamStore,
    policy: &ProtectedPathPolicy,
    form: &LoggingForm,
) -> CfgResult<()> {
    let mut errors = ValidationErrors::new();

    if form.file_enable {
        if !LOG_ROOTS.iter().any(|root| form.file_path.starts_with(root)) {
            errors.push(FieldError::on("file_path", "File must be on '/sd' or '/store'"));
        } else if policy.is_protected(&form.file_path) {
            errors.push(FieldError::on("file_path", "protected path"));
        }
    }
    if !form.level.is_empty() && !LEVELS.contains(&form.level.as_str()) {
        errors.push(FieldError::on(
            "level",
            format!("unknown log level `{}`", form.level),
        ));
    }
    for (i, tl) in form.tag_levels.iter().enumerate() {
        if !tl.level.is_empty() && !LEVELS.contains(&tl.level.as_str()) {
            errors.push(FieldError::on(
                format!("tag_levels[{}].level", i),
                format!("unknown log level `{}`", tl.level),
            ));
        }
    }
    if !errors.is_empty() {
        return Err(CfgError::Validation(errors));
    }

    store.set_map(LOG_NAMESPACE, form.to_map())?;
    tracing::info!(file_enable = form.file_enable, "Logging configuration saved");
    Ok(())
}
