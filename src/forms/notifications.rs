//! Pushover notification settings (`pushover`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::forms::FormOutcome;
use crate::store::{ParamMap, ParamStore};

pub const PUSHOVER_NAMESPACE: &str = "pushover";

const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -2..=2;

/// Priority for one notification type or subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPriority {
    pub notification: String,
    pub priority: String,
}

/// Message sent when a system event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub message: String,
    pub priority: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationForm {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub user_key: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub sound_normal: String,
    #[serde(default)]
    pub sound_high: String,
    #[serde(default)]
    pub sound_emergency: String,
    /// Seconds an emergency message keeps retrying.
    #[serde(default)]
    pub expire: String,
    /// Seconds between emergency retries.
    #[serde(default)]
    pub retry: String,
    /// Rows with an empty name or priority are skipped.
    #[serde(default)]
    pub priorities: Vec<NotificationPriority>,
    /// Rows with an empty event or priority are skipped.
    #[serde(default)]
    pub events: Vec<EventMessage>,
}

fn is_pushover_id(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn check_priority(errors: &mut ValidationErrors, field: String, priority: &str) {
    match priority.parse::<i32>() {
        Ok(p) if PRIORITY_RANGE.contains(&p) => {}
        _ => errors.push(FieldError::on(
            field,
            format!(
                "priority `{}` must be a number from {} to {}",
                priority,
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            ),
        )),
    }
}

/// Current settings in form shape.
pub fn load_notifications(store: &ParamStore) -> NotificationForm {
    let map = store.snapshot(PUSHOVER_NAMESPACE);
    let get = |key: &str| map.get(key).cloned().unwrap_or_default();

    let mut form = NotificationForm {
        enable: get("enable") == "yes",
        user_key: get("user_key"),
        token: get("token"),
        sound_normal: get("sound.normal"),
        sound_high: get("sound.high"),
        sound_emergency: get("sound.emergency"),
        expire: get("expire"),
        retry: get("retry"),
        ..Default::default()
    };
    for (key, value) in map.iter() {
        if let Some(notification) = key.strip_prefix("np.") {
            form.priorities.push(NotificationPriority {
                notification: notification.to_string(),
                priority: value.clone(),
            });
        } else if let Some(event) = key.strip_prefix("ep.") {
            let (priority, message) = value.split_once('/').unwrap_or((value.as_str(), ""));
            form.events.push(EventMessage {
                event: event.to_string(),
                message: message.to_string(),
                priority: priority.to_string(),
            });
        }
    }
    form
}

/// Replace the pushover settings.
pub fn save_notifications(store: &ParamStore, form: &NotificationForm) -> CfgResult<FormOutcome> {
    let mut errors = ValidationErrors::new();
    let mut outcome = FormOutcome::default();

    if form.enable {
        for (field, value, label) in [
            ("user_key", &form.user_key, "User key"),
            ("token", &form.token, "Token"),
        ] {
            if value.is_empty() {
                errors.push(FieldError::on(field, format!("{} must not be empty", label)));
            } else if !is_pushover_id(value) {
                errors.push(FieldError::on(
                    field,
                    format!("{} may only contain lower case ASCII letters and digits", label),
                ));
            }
        }
    }

    let mut map = ParamMap::new();
    map.insert("enable".into(), if form.enable { "yes" } else { "no" }.into());
    map.insert("user_key".into(), form.user_key.clone());
    map.insert("token".into(), form.token.clone());
    map.insert("sound.normal".into(), form.sound_normal.clone());
    map.insert("sound.high".into(), form.sound_high.clone());
    map.insert("sound.emergency".into(), form.sound_emergency.clone());
    map.insert("expire".into(), form.expire.clone());
    map.insert("retry".into(), form.retry.clone());

    let mut seen = HashSet::new();
    for (i, row) in form.priorities.iter().enumerate() {
        if row.notification.is_empty() || row.priority.is_empty() {
            continue;
        }
        check_priority(&mut errors, format!("priorities[{}].priority", i), &row.priority);
        if !seen.insert(row.notification.as_str()) {
            outcome.warnings.push(format!(
                "Notification `{}` listed more than once; the last row wins",
                row.notification
            ));
        }
        map.insert(format!("np.{}", row.notification), row.priority.clone());
    }

    seen.clear();
    for (i, row) in form.events.iter().enumerate() {
        if row.event.is_empty() || row.priority.is_empty() {
            continue;
        }
        check_priority(&mut errors, format!("events[{}].priority", i), &row.priority);
        if !seen.insert(row.event.as_str()) {
            outcome.warnings.push(format!(
                "Event `{}` listed more than once; the last row wins",
                row.event
            ));
        }
        map.insert(
            format!("ep.{}", row.event),
            format!("{}/{}", row.priority, row.message),
        );
    }

    if !errors.is_empty() {
        return Err(CfgError::Validation(errors));
    }

    store.set_map(PUSHOVER_NAMESPACE, map)?;
    tracing::info!(
        enable = form.enable,
        events = form.events.len(),
        "Pushover configuration saved"
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

    fn enabled() -> NotificationForm {
        NotificationForm {
            enable: true,
            user_key: "u1234abcd".into(),
            token: "t5678efgh".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentials_checked_only_when_enabled() {
        let store = store();
        let form = NotificationForm {
            user_key: "Not-Valid".into(),
            token: String::new(),
            ..enabled()
        };
        match save_notifications(&store, &form) {
            Err(CfgError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.get_map(PUSHOVER_NAMESPACE).is_empty());

        let disabled = NotificationForm {
            enable: false,
            ..form
        };
        save_notifications(&store, &disabled).unwrap();
        assert_eq!(store.get_value(PUSHOVER_NAMESPACE, "enable", ""), "no");
    }

    #[test]
    fn test_rows_flattened_and_read_back() {
        let store = store();
        store.set_value(PUSHOVER_NAMESPACE, "np.stale", "1").unwrap();

        let form = NotificationForm {
            priorities: vec![
                NotificationPriority {
                    notification: "alert.charge".into(),
                    priority: "1".into(),
                },
                NotificationPriority {
                    notification: "info".into(),
                    priority: String::new(),
                },
            ],
            events: vec![EventMessage {
                event: "vehicle.locked".into(),
                message: "Car locked / secured".into(),
                priority: "-1".into(),
            }],
            ..enabled()
        };
        let outcome = save_notifications(&store, &form).unwrap();
        assert!(outcome.warnings.is_empty());

        let map = store.get_map(PUSHOVER_NAMESPACE);
        assert_eq!(map.get("np.alert.charge").map(String::as_str), Some("1"));
        assert!(!map.contains_key("np.info"));
        assert!(!map.contains_key("np.stale"));
        assert_eq!(
            map.get("ep.vehicle.locked").map(String::as_str),
            Some("-1/Car locked / secured")
        );

        let loaded = load_notifications(&store);
        assert!(loaded.enable);
        assert_eq!(loaded.priorities.len(), 1);
        assert_eq!(loaded.events[0].message, "Car locked / secured");
        assert_eq!(loaded.events[0].priority, "-1");
    }

    #[test]
    fn test_bad_priority_and_duplicates() {
        let store = store();
        let row = |priority: &str| EventMessage {
            event: "server.v2.connected".into(),
            message: String::new(),
            priority: priority.into(),
        };

        let form = NotificationForm {
            events: vec![row("5")],
            ..enabled()
        };
        assert!(matches!(
            save_notifications(&store, &form),
            Err(CfgError::Validation(_))
        ));

        let form = NotificationForm {
            events: vec![row("0"), row("2")],
            ..enabled()
        };
        let outcome = save_notifications(&store, &form).unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            store.get_value(PUSHOVER_NAMESPACE, "ep.server.v2.connected", ""),
            "2/"
        );
    }
}
