//! Web server file access (`http.server`).

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::forms::FormOutcome;
use crate::store::ParamStore;
use crate::vfs::ProtectedPathPolicy;

pub const WEBSERVER_NAMESPACE: &str = "http.server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServerForm {
    /// Directory served as `/`. Empty selects the built-in default.
    #[serde(default)]
    pub docroot: String,
    #[serde(default)]
    pub auth_domain: String,
    /// Per-directory auth file name.
    #[serde(default)]
    pub auth_file: String,
    #[serde(default)]
    pub enable_files: bool,
    #[serde(default)]
    pub enable_dirlist: bool,
    /// Protect all files with the module password.
    #[serde(default)]
    pub auth_global: bool,
}

fn parse_bool(value: Option<&String>, default: bool) -> bool {
    match value.map(|v| v.to_ascii_lowercase()) {
        Some(v) if v == "yes" || v == "true" || v == "1" => true,
        Some(v) if v == "no" || v == "false" || v == "0" => false,
        _ => default,
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

pub fn load_webserver(store: &ParamStore) -> WebServerForm {
    let map = store.snapshot(WEBSERVER_NAMESPACE);
    let get = |key: &str| map.get(key).cloned().unwrap_or_default();
    WebServerForm {
        docroot: get("docroot"),
        auth_domain: get("auth.domain"),
        auth_file: get("auth.file"),
        enable_files: parse_bool(map.get("enable.files"), true),
        enable_dirlist: parse_bool(map.get("enable.dirlist"), true),
        auth_global: parse_bool(map.get("auth.global"), true),
    }
}

/// Store the web server settings.
///
/// Keys not owned by this form are left alone. Empty text fields delete
/// their key so the server falls back to its default.
pub fn save_webserver(
    store: &ParamStore,
    policy: &ProtectedPathPolicy,
    form: &WebServerForm,
) -> CfgResult<FormOutcome> {
    let mut errors = ValidationErrors::new();
    let mut outcome = FormOutcome::default();

    if !form.docroot.is_empty() {
        if !form.docroot.starts_with('/') {
            errors.push(FieldError::on("docroot", "Document root must start with '/'"));
        } else if policy.exposes(&form.docroot) {
            outcome.warnings.push(format!(
                "Document root `{}` may open access to configuration files, consider using a sub directory",
                form.docroot
            ));
        }
    }
    if !errors.is_empty() {
        return Err(CfgError::Validation(errors));
    }

    store.replace_with(WEBSERVER_NAMESPACE, |current| {
        let mut next = current.clone();
        let texts = [
            ("docroot", &form.docroot),
            ("auth.domain", &form.auth_domain),
            ("auth.file", &form.auth_file),
        ];
        for (key, value) in texts {
            if value.is_empty() {
                next.remove(key);
            } else {
                next.insert(key.to_string(), value.clone());
            }
        }
        next.insert("enable.files".into(), yes_no(form.enable_files));
        next.insert("enable.dirlist".into(), yes_no(form.enable_dirlist));
        next.insert("auth.global".into(), yes_no(form.auth_global));
        Ok::<_, CfgError>(next)
    })?;

    tracing::info!(
        docroot = %form.docroot,
        enable_files = form.enable_files,
        "Web server configuration saved"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn store() -> ParamStore {
        ParamStore::new(Arc::new(MemoryBackend::new()), EventBus::new())
    }

    fn policy() -> ProtectedPathPolicy {
        ProtectedPathPolicy::new("/store/ovms_config").with_component("ovms_config")
    }

    fn form(docroot: &str) -> WebServerForm {
        WebServerForm {
            docroot: docroot.into(),
            auth_domain: String::new(),
            auth_file: ".htaccess".into(),
            enable_files: true,
            enable_dirlist: false,
            auth_global: true,
        }
    }

    #[test]
    fn test_defaults_when_unset() {
        let loaded = load_webserver(&store());
        assert!(loaded.enable_files);
        assert!(loaded.enable_dirlist);
        assert!(loaded.auth_global);
        assert!(loaded.docroot.is_empty());
    }

    #[test]
    fn test_docroot_warnings_follow_policy() {
        let store = store();
        for docroot in ["/", "/store", "/store/", "/STORE/ovms_config/web"] {
            let outcome = save_webserver(&store, &policy(), &form(docroot)).unwrap();
            assert_eq!(outcome.warnings.len(), 1, "{}", docroot);
        }
        for docroot in ["/sd", "/store/www", ""] {
            let outcome = save_webserver(&store, &policy(), &form(docroot)).unwrap();
            assert!(outcome.warnings.is_empty(), "{}", docroot);
        }

        assert!(matches!(
            save_webserver(&store, &policy(), &form("sd/www")),
            Err(CfgError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_fields_delete_and_others_survive() {
        let store = store();
        store.set_value(WEBSERVER_NAMESPACE, "port", "8080").unwrap();
        save_webserver(&store, &policy(), &form("/sd/www")).unwrap();
        assert_eq!(store.get_value(WEBSERVER_NAMESPACE, "docroot", ""), "/sd/www");

        save_webserver(&store, &policy(), &form("")).unwrap();
        let map = store.get_map(WEBSERVER_NAMESPACE);
        assert!(!map.contains_key("docroot"));
        assert!(!map.contains_key("auth.domain"));
        assert_eq!(map.get("auth.file").map(String::as_str), Some(".htaccess"));
        assert_eq!(map.get("enable.dirlist").map(String::as_str), Some("no"));
        assert_eq!(map.get("port").map(String::as_str), Some("8080"));

        let loaded = load_webserver(&store);
        assert!(!loaded.enable_dirlist);
        assert!(loaded.enable_files);
    }
}
