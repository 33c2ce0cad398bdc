//! Typed view of the `http.plugin` namespace.
//!
//! The namespace stores flat keys (`<key>.enable`, `<key>.page`, ...). Inside
//! the crate a plugin is a [`PluginDescriptor`] with a tagged [`PluginKind`];
//! conversion happens only at the store boundary.

use serde::{Deserialize, Serialize};

use crate::store::ParamMap;

/// Namespace holding plugin metadata.
pub const PLUGIN_NAMESPACE: &str = "http.plugin";

const ENABLE_SUFFIX: &str = ".enable";

/// Page or hook specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PluginKind {
    Page {
        #[serde(default)]
        label: String,
        #[serde(default)]
        menu: String,
        #[serde(default)]
        auth: String,
    },
    Hook {
        #[serde(default)]
        hook: String,
    },
}

impl PluginKind {
    /// Kind with empty attributes, as registered by "add".
    pub fn empty(kind: PluginType) -> Self {
        match kind {
            PluginType::Page => PluginKind::Page {
                label: String::new(),
                menu: String::new(),
                auth: String::new(),
            },
            PluginType::Hook => PluginKind::Hook {
                hook: String::new(),
            },
        }
    }

    pub fn plugin_type(&self) -> PluginType {
        match self {
            PluginKind::Page { .. } => PluginType::Page,
            PluginKind::Hook { .. } => PluginType::Hook,
        }
    }

    /// Kind of `type` with attribute values carried over from the map.
    fn carried(kind: PluginType, key: &str, map: &ParamMap) -> Self {
        let get = |attr: &str| {
            map.get(&format!("{}.{}", key, attr))
                .cloned()
                .unwrap_or_default()
        };
        match kind {
            PluginType::Page => PluginKind::Page {
                label: get("label"),
                menu: get("menu"),
                auth: get("auth"),
            },
            PluginType::Hook => PluginKind::Hook { hook: get("hook") },
        }
    }
}

/// Discriminant of [`PluginKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Page,
    Hook,
}

/// One registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub key: String,
    pub enabled: bool,
    /// Page path (pages) or page the hook attaches to (hooks).
    #[serde(default)]
    pub page: String,
    #[serde(flatten)]
    pub kind: PluginKind,
}

impl PluginDescriptor {
    /// Every descriptor in a `http.plugin` map, ordered by key.
    ///
    /// A plugin is registered iff `<key>.enable` exists; it is a hook iff
    /// `<key>.hook` exists.
    pub fn from_map(map: &ParamMap) -> Vec<PluginDescriptor> {
        map.iter()
            .filter_map(|(name, value)| {
                let key = name.strip_suffix(ENABLE_SUFFIX)?;
                let kind = if map.contains_key(&format!("{}.hook", key)) {
                    PluginType::Hook
                } else {
                    PluginType::Page
                };
                Some(PluginDescriptor {
                    key: key.to_string(),
                    enabled: parse_enable(value),
                    page: map
                        .get(&format!("{}.page", key))
                        .cloned()
                        .unwrap_or_default(),
                    kind: PluginKind::carried(kind, key, map),
                })
            })
            .collect()
    }

    /// Descriptor for `key`, if registered in `map`.
    pub fn find(map: &ParamMap, key: &str) -> Option<PluginDescriptor> {
        if !map.contains_key(&enable_key(key)) {
            return None;
        }
        Self::from_map(map).into_iter().find(|d| d.key == key)
    }

    /// Flat store entries for this descriptor.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        let key = &self.key;
        let mut entries = vec![
            (
                enable_key(key),
                if self.enabled { "yes" } else { "no" }.to_string(),
            ),
            (format!("{}.page", key), self.page.clone()),
        ];
        match &self.kind {
            PluginKind::Page { label, menu, auth } => {
                entries.push((format!("{}.label", key), label.clone()));
                entries.push((format!("{}.menu", key), menu.clone()));
                entries.push((format!("{}.auth", key), auth.clone()));
            }
            PluginKind::Hook { hook } => {
                entries.push((format!("{}.hook", key), hook.clone()));
            }
        }
        entries
    }

    /// Write this descriptor into `map`, dropping attributes of the other kind.
    pub fn apply_to(&self, map: &mut ParamMap) {
        for attr in ["label", "menu", "auth", "hook"] {
            map.remove(&format!("{}.{}", self.key, attr));
        }
        map.extend(self.to_entries());
    }
}

/// Submission mode of a plugin list row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowMode {
    /// New registration, attributes start empty.
    Add,
    /// Existing registration, attributes are carried over.
    Edit,
}

/// One row of a submitted plugin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRow {
    pub key: String,
    pub mode: RowMode,
    #[serde(rename = "type")]
    pub kind: PluginType,
    pub enabled: bool,
}

impl PluginRow {
    /// The descriptor this row registers, given the persisted map.
    pub fn to_descriptor(&self, persisted: &ParamMap) -> PluginDescriptor {
        match self.mode {
            RowMode::Add => PluginDescriptor {
                key: self.key.clone(),
                enabled: self.enabled,
                page: String::new(),
                kind: PluginKind::empty(self.kind),
            },
            RowMode::Edit => PluginDescriptor {
                key: self.key.clone(),
                enabled: self.enabled,
                page: persisted
                    .get(&format!("{}.page", self.key))
                    .cloned()
                    .unwrap_or_default(),
                kind: PluginKind::carried(self.kind, &self.key, persisted),
            },
        }
    }
}

/// Attribute edit from the plugin editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEdit {
    #[serde(default)]
    pub page: String,
    #[serde(flatten)]
    pub kind: PluginKind,
    /// New content file body.
    #[serde(default)]
    pub content: String,
}

/// Plugin keys name content files: `[A-Za-z0-9._-]+` not starting with `.`.
///
/// Dot-files are skipped by backups, so a hidden key would lose its content
/// across a restore.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

pub(crate) fn enable_key(key: &str) -> String {
    format!("{}{}", key, ENABLE_SUFFIX)
}

fn parse_enable(value: &str) -> bool {
    matches!(value, "yes" | "true" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_map_derives_type() {
        let m = map(&[
            ("foo.enable", "yes"),
            ("foo.page", "/usr/foo"),
            ("foo.label", "Foo"),
            ("foo.menu", "Tools"),
            ("foo.auth", "cookie"),
            ("bar.enable", "no"),
            ("bar.page", "/status"),
            ("bar.hook", "body.pre"),
            ("stray.page", "/x"),
        ]);
        let descriptors = PluginDescriptor::from_map(&m);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].key, "bar");
        assert!(!descriptors[0].enabled);
        assert_eq!(
            descriptors[0].kind,
            PluginKind::Hook {
                hook: "body.pre".into()
            }
        );
        assert_eq!(descriptors[1].key, "foo");
        assert_eq!(descriptors[1].page, "/usr/foo");
        assert_eq!(descriptors[1].kind.plugin_type(), PluginType::Page);
    }

    #[test]
    fn test_hook_with_empty_attribute_stays_hook() {
        let m = map(&[("h.enable", "yes"), ("h.page", ""), ("h.hook", "")]);
        let d = PluginDescriptor::find(&m, "h").unwrap();
        assert_eq!(d.kind.plugin_type(), PluginType::Hook);
        assert!(PluginDescriptor::find(&m, "missing").is_none());
    }

    #[test]
    fn test_apply_to_switches_kind() {
        let mut m = map(&[("p.enable", "yes"), ("p.page", "/p"), ("p.hook", "x")]);
        let d = PluginDescriptor {
            key: "p".into(),
            enabled: true,
            page: "/p".into(),
            kind: PluginKind::empty(PluginType::Page),
        };
        d.apply_to(&mut m);
        assert!(!m.contains_key("p.hook"));
        assert_eq!(m.get("p.label").map(String::as_str), Some(""));
        assert_eq!(PluginDescriptor::find(&m, "p").unwrap(), d);
    }

    #[test]
    fn test_row_modes() {
        let persisted = map(&[
            ("foo.enable", "yes"),
            ("foo.page", "/usr/foo"),
            ("foo.label", "Foo"),
        ]);
        let edit = PluginRow {
            key: "foo".into(),
            mode: RowMode::Edit,
            kind: PluginType::Page,
            enabled: false,
        };
        let d = edit.to_descriptor(&persisted);
        assert_eq!(d.page, "/usr/foo");
        assert!(matches!(d.kind, PluginKind::Page { ref label, .. } if label == "Foo"));

        let add = PluginRow {
            mode: RowMode::Add,
            ..edit
        };
        assert_eq!(add.to_descriptor(&persisted).page, "");
    }

    #[test]
    fn test_row_json() {
        let row: PluginRow =
            serde_json::from_str(r#"{"key":"foo","mode":"add","type":"hook","enabled":true}"#)
                .unwrap();
        assert_eq!(row.kind, PluginType::Hook);
        assert_eq!(row.mode, RowMode::Add);

        let edit: PluginEdit =
            serde_json::from_str(r#"{"page":"/x","type":"hook","hook":"body.pre","content":"c"}"#)
                .unwrap();
        assert_eq!(
            edit.kind,
            PluginKind::Hook {
                hook: "body.pre".into()
            }
        );
    }

    #[test]
    fn test_key_syntax() {
        assert!(is_valid_key("foo-bar_1.js"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("."));
        assert!(!is_valid_key(".."));
        assert!(!is_valid_key(".dash"));
        assert!(is_valid_key("dash.v2"));
        assert!(!is_valid_key("../etc"));
        assert!(!is_valid_key("a b"));
        assert!(!is_valid_key("a/b"));
    }
}
